use tracing::warn;

use crate::db::database::Database;
use crate::db::models::{HistoryInsert, HistoryRow, ProjectInsert, ProjectRow};
use crate::llm::media::detect_mime_type;
use crate::tools::uploader::upload_image_bytes;

/// Best-effort boundary over object storage and the relational store.
/// Nothing here propagates an error; a `None`/`false`/empty result is the
/// whole failure signal, and callers fall back to in-memory state.
#[derive(Clone)]
pub struct PersistenceAdapter {
    db: Database,
    user_id: String,
}

impl PersistenceAdapter {
    pub fn new(db: Database, user_id: String) -> Self {
        PersistenceAdapter { db, user_id }
    }

    pub async fn upload(
        &self,
        image_bytes: &[u8],
        api_key: &str,
        model: Option<&str>,
        prompt: Option<&str>,
    ) -> Option<String> {
        let mime_type = detect_mime_type(image_bytes).unwrap_or_else(|| "image/png".to_string());
        upload_image_bytes(image_bytes, api_key, &mime_type, model, prompt).await
    }

    pub async fn record_metadata(
        &self,
        url: &str,
        prompt: &str,
        mode: &str,
        section: &str,
        project_id: Option<&str>,
    ) -> Option<HistoryRow> {
        let insert = HistoryInsert {
            user_id: self.user_id.clone(),
            project_id: project_id.map(|value| value.to_string()),
            url: url.to_string(),
            prompt: prompt.to_string(),
            mode: mode.to_string(),
            section: section.to_string(),
        };
        match self.db.insert_history(insert).await {
            Ok(row) => Some(row),
            Err(err) => {
                warn!("Failed to record generation metadata: {err}");
                None
            }
        }
    }

    pub async fn list_by_project(&self, project_id: &str) -> Vec<HistoryRow> {
        match self.db.list_history_by_project(project_id).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Failed to list history for project {project_id}: {err}");
                Vec::new()
            }
        }
    }

    pub async fn list_by_user(&self) -> Vec<HistoryRow> {
        match self.db.list_history_by_user(&self.user_id).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Failed to list history for user {}: {err}", self.user_id);
                Vec::new()
            }
        }
    }

    pub async fn create_project(
        &self,
        title: &str,
        mode: &str,
        section: &str,
    ) -> Option<ProjectRow> {
        let insert = ProjectInsert {
            user_id: self.user_id.clone(),
            title: title.to_string(),
            mode: mode.to_string(),
            section: section.to_string(),
        };
        match self.db.insert_project(insert).await {
            Ok(row) => Some(row),
            Err(err) => {
                warn!("Failed to create project '{title}': {err}");
                None
            }
        }
    }

    pub async fn list_projects(&self) -> Vec<ProjectRow> {
        match self.db.list_projects(&self.user_id).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Failed to list projects for user {}: {err}", self.user_id);
                Vec::new()
            }
        }
    }

    pub async fn delete_project(&self, project_id: &str) -> bool {
        match self.db.delete_project(project_id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!("Failed to delete project {project_id}: {err}");
                false
            }
        }
    }
}
