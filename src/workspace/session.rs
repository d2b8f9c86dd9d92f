use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CONFIG;
use crate::db::models::HistoryRow;
use crate::llm::media::{to_data_uri, MediaFile};
use crate::llm::{generate_image, GeminiImageConfig, ImageGenerationError};
use crate::orchestrator::{run_batch, GenerationCall};
use crate::prompt::{
    assemble, ColorPalette, GenerationAttributes, GenerationMode, PromptInputs, SubjectPosition,
};
use crate::state::AppState;
use crate::utils::timing::{complete_session_timer, start_session_timer};
use crate::workspace::references::ReferenceItem;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("At least one subject image is required")]
    MissingSubject,
    #[error("No generation API key configured")]
    MissingCredential,
    #[error("Two generation batches are already in flight; wait for one to finish")]
    Busy,
    #[error("Generation failed: {0}")]
    AllFailed(String),
}

#[derive(Debug)]
pub struct SessionRequest {
    pub mode: GenerationMode,
    pub subjects: Vec<MediaFile>,
    pub references: Vec<ReferenceItem>,
    pub assets: Vec<MediaFile>,
    pub attributes: GenerationAttributes,
    pub palette: Option<ColorPalette>,
    pub position: SubjectPosition,
    pub user_instructions: String,
    pub target_width: u32,
    pub target_height: u32,
    pub batch_size: usize,
    pub section: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionResult {
    pub url: String,
    pub prompt: String,
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub results: Vec<SessionResult>,
    pub warning: Option<String>,
}

fn feed_row(url: &str, prompt: &str, mode: &str, section: &str, project_id: Option<&str>) -> HistoryRow {
    HistoryRow {
        id: Uuid::new_v4().to_string(),
        user_id: CONFIG.user_id.clone(),
        project_id: project_id.map(|value| value.to_string()),
        url: url.to_string(),
        prompt: prompt.to_string(),
        mode: mode.to_string(),
        section: section.to_string(),
        created_at: Utc::now(),
    }
}

/// One user-initiated generation session: validate, assemble, dispatch the
/// batch, persist what succeeded, surface what failed.
pub async fn run_generation_session(
    state: &AppState,
    request: SessionRequest,
) -> Result<SessionOutcome, SessionError> {
    let credentials = Arc::clone(&state.credentials);
    run_generation_session_with(state, request, move |call| {
        let api_key = credentials.generation_key().unwrap_or_default();
        async move {
            let config = GeminiImageConfig {
                aspect_ratio: Some(call.aspect_ratio.to_string()),
                image_size: None,
            };
            generate_image(&call.text, &call.images, Some(config), &api_key).await
        }
    })
    .await
}

/// Session body with the generation call injected, so batch settlement and
/// its side effects can run against a stand-in backend.
pub(crate) async fn run_generation_session_with<F, Fut>(
    state: &AppState,
    request: SessionRequest,
    dispatch: F,
) -> Result<SessionOutcome, SessionError>
where
    F: Fn(GenerationCall) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, ImageGenerationError>> + Send + 'static,
{
    if request.subjects.is_empty() {
        return Err(SessionError::MissingSubject);
    }
    if state.credentials.generation_key().is_none() {
        return Err(SessionError::MissingCredential);
    }
    if !state.gate.can_start() {
        return Err(SessionError::Busy);
    }

    let mut timer = start_session_timer(
        "generate",
        Some(&request.section),
        request.project_id.as_deref(),
        Some(&request.user_instructions),
    );

    let assembled = assemble(&PromptInputs {
        mode: request.mode,
        subjects: &request.subjects,
        references: &request.references,
        assets: &request.assets,
        attributes: &request.attributes,
        palette: request.palette.as_ref(),
        position: request.position,
        user_instructions: &request.user_instructions,
        target_width: request.target_width,
        target_height: request.target_height,
    });

    let outcome = run_batch(&assembled, request.batch_size, &state.gate, dispatch).await;

    if outcome.credential_invalid {
        state.credentials.mark_generation_key_invalid();
    }

    if outcome.successes.is_empty() {
        let message = outcome
            .user_facing_error()
            .unwrap_or_else(|| "no image data found".to_string());
        complete_session_timer(&mut timer, "error", Some(message.clone()));
        return Err(SessionError::AllFailed(message));
    }

    let mode = request.mode.as_str();
    let upload_key = state.credentials.upload_key();
    let mut results = Vec::new();
    for success in &outcome.successes {
        let url = match state
            .persistence
            .upload(
                &success.bytes,
                &upload_key,
                Some(&CONFIG.gemini_image_model),
                Some(&success.prompt),
            )
            .await
        {
            Some(url) => {
                match state
                    .persistence
                    .record_metadata(
                        &url,
                        &success.prompt,
                        mode,
                        &request.section,
                        request.project_id.as_deref(),
                    )
                    .await
                {
                    Some(row) => state.history.push(row),
                    None => state.history.push(feed_row(
                        &url,
                        &success.prompt,
                        mode,
                        &request.section,
                        request.project_id.as_deref(),
                    )),
                }
                url
            }
            None => {
                // Upload failed: keep the raw result so it is never lost.
                let data_uri = to_data_uri(&success.bytes);
                state.history.push(feed_row(
                    &data_uri,
                    &success.prompt,
                    mode,
                    &request.section,
                    request.project_id.as_deref(),
                ));
                data_uri
            }
        };
        results.push(SessionResult {
            url,
            prompt: success.prompt.clone(),
        });
    }

    let warning = outcome.user_facing_error();
    let status = if warning.is_some() { "partial" } else { "success" };
    complete_session_timer(&mut timer, status, warning.clone());
    info!(
        "Generation session produced {} result(s), {} failure(s)",
        results.len(),
        outcome.failure_count
    );

    Ok(SessionOutcome { results, warning })
}

/// Two-phase project creation: the tab appears immediately under a local id
/// (phase 1), then the persistence call either confirms it under the remote
/// id or marks it failed in place (phase 2). The second phase is awaited, so
/// a failure is never silently lost.
pub async fn create_project_tab(
    state: &AppState,
    title: &str,
    mode: GenerationMode,
    section: &str,
) -> String {
    let local_id = state.tabs.lock().open(title, mode, section);

    match state
        .persistence
        .create_project(title, mode.as_str(), section)
        .await
    {
        Some(row) => {
            state.tabs.lock().confirm(&local_id, &row.id);
            state.projects.insert(row.clone());
            row.id
        }
        None => {
            warn!("Project '{title}' failed to persist; keeping optimistic tab {local_id}");
            state.tabs.lock().fail(&local_id);
            local_id
        }
    }
}

/// Optimistic project delete with rollback: the entry leaves the visible
/// list up front; if the backend delete fails it is re-inserted exactly once.
pub async fn delete_project(state: &AppState, project_id: &str) -> bool {
    let Some(removed) = state.projects.remove(project_id) else {
        return false;
    };

    if state.persistence.delete_project(project_id).await {
        state.history.remove_by_project(project_id);
        state.tabs.lock().close(project_id);
        true
    } else {
        state.projects.restore(removed);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::db::database::Database;
    use crate::db::models::ProjectRow;
    use std::path::PathBuf;

    fn temp_credentials() -> (CredentialStore, PathBuf) {
        let path =
            std::env::temp_dir().join(format!("adforge-session-{}.json", Uuid::new_v4()));
        (CredentialStore::load(&path), path)
    }

    async fn app_state(with_key: bool) -> (AppState, PathBuf) {
        let db_path = std::env::temp_dir().join(format!("adforge-session-{}.db", Uuid::new_v4()));
        let db = Database::init(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        let (credentials, path) = temp_credentials();
        if with_key {
            credentials.set_generation_key("test-key");
        }
        (AppState::new(db, credentials), path)
    }

    fn bare_request(subjects: Vec<MediaFile>) -> SessionRequest {
        SessionRequest {
            mode: GenerationMode::Object,
            subjects,
            references: Vec::new(),
            assets: Vec::new(),
            attributes: GenerationAttributes::default(),
            palette: None,
            position: SubjectPosition::Center,
            user_instructions: String::new(),
            target_width: 1024,
            target_height: 1024,
            batch_size: 1,
            section: "landing".to_string(),
            project_id: None,
        }
    }

    #[tokio::test]
    async fn missing_subject_never_dispatches() {
        let (state, path) = app_state(true).await;
        let err = run_generation_session(&state, bare_request(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingSubject));
        assert_eq!(state.gate.in_flight(), 0);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_credential_never_dispatches() {
        let (state, path) = app_state(false).await;
        let subjects = vec![MediaFile::new(vec![1], "image/png".to_string(), None)];
        let err = run_generation_session(&state, bare_request(subjects))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingCredential));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn full_gate_turns_new_sessions_away() {
        let (state, path) = app_state(true).await;
        let first = state.gate.start();
        let second = state.gate.start();

        let subjects = vec![MediaFile::new(vec![1], "image/png".to_string(), None)];
        let err = run_generation_session(&state, bare_request(subjects))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Busy));

        drop(first);
        drop(second);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn partial_credential_failure_keeps_survivors_and_flags_key() {
        let (state, path) = app_state(true).await;
        assert!(state.credentials.generation_key_valid());

        let subjects = vec![MediaFile::new(vec![1], "image/png".to_string(), None)];
        let mut request = bare_request(subjects);
        request.batch_size = 3;

        let outcome = run_generation_session_with(&state, request, |call| async move {
            if call.text.contains("Variation 1") {
                Err(ImageGenerationError(
                    "Gemini request failed with status 404: Requested entity was not found."
                        .to_string(),
                ))
            } else {
                Ok(vec![8, 8])
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(state.history.snapshot().len(), 2);
        assert!(!state.credentials.generation_key_valid());
        assert!(outcome.warning.unwrap().contains("invalid or expired"));
        assert_eq!(state.gate.in_flight(), 0);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn project_tab_confirms_under_remote_id() {
        let (state, path) = app_state(true).await;
        let id = create_project_tab(&state, "Hero", GenerationMode::Portrait, "landing").await;

        let tabs = state.tabs.lock();
        let tab = tabs.get(&id).unwrap();
        assert!(matches!(
            tab.persistence,
            crate::workspace::tabs::TabPersistence::Confirmed { .. }
        ));
        drop(tabs);
        assert!(state.projects.contains(&id));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn failed_backend_delete_rolls_the_project_back() {
        let (state, path) = app_state(true).await;
        // Visible in the list but never persisted, so the backend delete
        // reports failure.
        state.projects.insert(ProjectRow {
            id: "ghost".to_string(),
            user_id: "tester".to_string(),
            title: "Ghost".to_string(),
            mode: "OBJECT".to_string(),
            section: "landing".to_string(),
            created_at: Utc::now(),
        });

        assert!(!delete_project(&state, "ghost").await);
        assert!(state.projects.contains("ghost"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn successful_delete_cascades_feed_entries() {
        let (state, path) = app_state(true).await;
        let remote_id =
            create_project_tab(&state, "Hero", GenerationMode::Portrait, "landing").await;
        state.history.push(feed_row(
            "https://img.example/a",
            "prompt",
            "PORTRAIT",
            "landing",
            Some(&remote_id),
        ));

        assert!(delete_project(&state, &remote_id).await);
        assert!(!state.projects.contains(&remote_id));
        assert!(state.history.snapshot().is_empty());
        let _ = std::fs::remove_file(path);
    }
}
