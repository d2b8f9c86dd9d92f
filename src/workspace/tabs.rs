use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::prompt::GenerationMode;

/// Reconciliation state of an optimistically created tab. A tab is born
/// `Pending` under a local id, then either confirmed under the persisted id
/// or marked `Failed`; a failed tab stays in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabPersistence {
    Pending { local_id: String },
    Confirmed { remote_id: String },
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProjectTab {
    pub id: String,
    pub title: String,
    pub mode: GenerationMode,
    pub section: String,
    pub created_at: DateTime<Utc>,
    pub persistence: TabPersistence,
}

/// In-memory tab list. Invariant: at most one tab is active.
#[derive(Debug, Default)]
pub struct TabState {
    tabs: Vec<ProjectTab>,
    active_id: Option<String>,
}

#[allow(dead_code)]
impl TabState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[ProjectTab] {
        &self.tabs
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&ProjectTab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    /// Opens an optimistic tab under a temporary local id and activates it.
    pub fn open(&mut self, title: &str, mode: GenerationMode, section: &str) -> String {
        let local_id = Uuid::new_v4().to_string();
        self.tabs.push(ProjectTab {
            id: local_id.clone(),
            title: title.to_string(),
            mode,
            section: section.to_string(),
            created_at: Utc::now(),
            persistence: TabPersistence::Pending {
                local_id: local_id.clone(),
            },
        });
        self.active_id = Some(local_id.clone());
        local_id
    }

    /// Pending → Confirmed: the tab takes on the persisted id.
    pub fn confirm(&mut self, local_id: &str, remote_id: &str) -> bool {
        let Some(tab) = self.tabs.iter_mut().find(|tab| tab.id == local_id) else {
            return false;
        };
        if !matches!(tab.persistence, TabPersistence::Pending { .. }) {
            return false;
        }
        tab.id = remote_id.to_string();
        tab.persistence = TabPersistence::Confirmed {
            remote_id: remote_id.to_string(),
        };
        if self.active_id.as_deref() == Some(local_id) {
            self.active_id = Some(remote_id.to_string());
        }
        true
    }

    /// Pending → Failed: the optimistic entry stays in place.
    pub fn fail(&mut self, local_id: &str) -> bool {
        let Some(tab) = self.tabs.iter_mut().find(|tab| tab.id == local_id) else {
            return false;
        };
        if !matches!(tab.persistence, TabPersistence::Pending { .. }) {
            return false;
        }
        tab.persistence = TabPersistence::Failed;
        true
    }

    pub fn activate(&mut self, id: &str) -> bool {
        if self.tabs.iter().any(|tab| tab.id == id) {
            self.active_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Closes a tab. Closing the active tab hands focus to the most recent
    /// remaining tab in the same section, or clears the active id when that
    /// section is empty. Closing a non-active tab never moves focus.
    pub fn close(&mut self, id: &str) -> bool {
        let Some(index) = self.tabs.iter().position(|tab| tab.id == id) else {
            return false;
        };
        let closed = self.tabs.remove(index);

        if self.active_id.as_deref() == Some(id) {
            self.active_id = self
                .tabs
                .iter()
                .rev()
                .find(|tab| tab.section == closed.section)
                .map(|tab| tab.id.clone());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_active_tab_selects_most_recent_in_same_section() {
        let mut state = TabState::new();
        let landing_old = state.open("Hero A", GenerationMode::Portrait, "landing");
        let _profile = state.open("Avatar", GenerationMode::Portrait, "profile");
        let landing_new = state.open("Hero B", GenerationMode::Object, "landing");

        assert_eq!(state.active_id(), Some(landing_new.as_str()));
        assert!(state.close(&landing_new));
        assert_eq!(state.active_id(), Some(landing_old.as_str()));
    }

    #[test]
    fn closing_active_tab_with_empty_section_clears_focus() {
        let mut state = TabState::new();
        let only = state.open("Solo", GenerationMode::Enhance, "product");
        assert!(state.close(&only));
        assert_eq!(state.active_id(), None);
    }

    #[test]
    fn closing_non_active_tab_never_moves_focus() {
        let mut state = TabState::new();
        let first = state.open("First", GenerationMode::Portrait, "landing");
        let second = state.open("Second", GenerationMode::Portrait, "landing");

        assert_eq!(state.active_id(), Some(second.as_str()));
        assert!(state.close(&first));
        assert_eq!(state.active_id(), Some(second.as_str()));
    }

    #[test]
    fn confirm_swaps_local_id_for_remote_id() {
        let mut state = TabState::new();
        let local = state.open("Persisted", GenerationMode::Expert, "landing");

        assert!(state.confirm(&local, "remote-42"));
        assert_eq!(state.active_id(), Some("remote-42"));
        let tab = state.get("remote-42").unwrap();
        assert_eq!(
            tab.persistence,
            TabPersistence::Confirmed {
                remote_id: "remote-42".to_string()
            }
        );

        // Second confirmation attempt is a no-op.
        assert!(!state.confirm(&local, "remote-43"));
    }

    #[test]
    fn failed_persist_leaves_the_optimistic_entry() {
        let mut state = TabState::new();
        let local = state.open("Flaky", GenerationMode::Object, "landing");

        assert!(state.fail(&local));
        let tab = state.get(&local).unwrap();
        assert_eq!(tab.persistence, TabPersistence::Failed);
        assert_eq!(state.tabs().len(), 1);
    }
}
