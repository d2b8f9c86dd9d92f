use parking_lot::Mutex;

use crate::db::models::{HistoryRow, ProjectRow};

/// In-memory history feed, newest first. Entries land here immediately after
/// a batch settles; rows whose upload fell back to a data URI exist only in
/// this feed, never in the relational store.
#[derive(Debug, Default)]
pub struct HistoryFeed {
    entries: Mutex<Vec<HistoryRow>>,
}

impl HistoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, row: HistoryRow) {
        self.entries.lock().insert(0, row);
    }

    pub fn replace_all(&self, rows: Vec<HistoryRow>) {
        *self.entries.lock() = rows;
    }

    pub fn snapshot(&self) -> Vec<HistoryRow> {
        self.entries.lock().clone()
    }

    pub fn remove_by_project(&self, project_id: &str) {
        self.entries
            .lock()
            .retain(|row| row.project_id.as_deref() != Some(project_id));
    }
}

/// Optimistically mutated project list. A delete removes the entry up front;
/// if the backend delete later fails, `restore` puts it back, and the
/// existence check makes the rollback idempotent under re-entrant deletes of
/// the same id.
#[derive(Debug, Default)]
pub struct ProjectListView {
    projects: Mutex<Vec<ProjectRow>>,
}

impl ProjectListView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&self, rows: Vec<ProjectRow>) {
        *self.projects.lock() = rows;
    }

    pub fn snapshot(&self) -> Vec<ProjectRow> {
        self.projects.lock().clone()
    }

    pub fn insert(&self, row: ProjectRow) {
        self.projects.lock().insert(0, row);
    }

    pub fn contains(&self, project_id: &str) -> bool {
        self.projects.lock().iter().any(|row| row.id == project_id)
    }

    /// Optimistic removal; hands back the removed row so a failed backend
    /// delete can roll it back.
    pub fn remove(&self, project_id: &str) -> Option<ProjectRow> {
        let mut projects = self.projects.lock();
        let index = projects.iter().position(|row| row.id == project_id)?;
        Some(projects.remove(index))
    }

    /// Re-inserts a row unless an entry with the same id is already back in
    /// the list. Returns whether the row was inserted.
    pub fn restore(&self, row: ProjectRow) -> bool {
        let mut projects = self.projects.lock();
        if projects.iter().any(|existing| existing.id == row.id) {
            return false;
        }
        projects.insert(0, row);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn project(id: &str) -> ProjectRow {
        ProjectRow {
            id: id.to_string(),
            user_id: "tester".to_string(),
            title: "Landing".to_string(),
            mode: "OBJECT".to_string(),
            section: "landing".to_string(),
            created_at: Utc::now(),
        }
    }

    fn history(id: &str, project_id: Option<&str>) -> HistoryRow {
        HistoryRow {
            id: id.to_string(),
            user_id: "tester".to_string(),
            project_id: project_id.map(|value| value.to_string()),
            url: format!("https://img.example/{id}"),
            prompt: "prompt".to_string(),
            mode: "OBJECT".to_string(),
            section: "landing".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn feed_keeps_newest_first() {
        let feed = HistoryFeed::new();
        feed.push(history("a", None));
        feed.push(history("b", None));

        let snapshot = feed.snapshot();
        assert_eq!(snapshot[0].id, "b");
        assert_eq!(snapshot[1].id, "a");
    }

    #[test]
    fn removing_a_project_drops_only_its_entries() {
        let feed = HistoryFeed::new();
        feed.push(history("a", Some("p1")));
        feed.push(history("b", Some("p2")));
        feed.push(history("c", None));

        feed.remove_by_project("p1");
        let ids: Vec<String> = feed.snapshot().into_iter().map(|row| row.id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn restore_is_idempotent() {
        let view = ProjectListView::new();
        view.replace_all(vec![project("p1")]);

        let removed = view.remove("p1").unwrap();
        assert!(!view.contains("p1"));

        assert!(view.restore(removed.clone()));
        assert!(!view.restore(removed));
        assert_eq!(view.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_failed_deletes_restore_exactly_once() {
        let view = Arc::new(ProjectListView::new());
        view.replace_all(vec![project("p1")]);

        let mut attempts = Vec::new();
        for _ in 0..8 {
            let view = Arc::clone(&view);
            attempts.push(tokio::spawn(async move {
                // Re-entrant delete of the same id: only one attempt holds
                // the removed row, and only that attempt can restore it.
                if let Some(removed) = view.remove("p1") {
                    tokio::task::yield_now().await;
                    // Backend delete failed; roll the entry back.
                    view.restore(removed)
                } else {
                    false
                }
            }));
        }

        let mut restored = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                restored += 1;
            }
        }

        assert_eq!(restored, 1);
        assert_eq!(view.snapshot().len(), 1);
        assert!(view.contains("p1"));
    }
}
