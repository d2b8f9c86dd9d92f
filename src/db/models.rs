use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub mode: String,
    pub section: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub url: String,
    pub prompt: String,
    pub mode: String,
    pub section: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HistoryInsert {
    pub user_id: String,
    pub project_id: Option<String>,
    pub url: String,
    pub prompt: String,
    pub mode: String,
    pub section: String,
}

#[derive(Debug, Clone)]
pub struct ProjectInsert {
    pub user_id: String,
    pub title: String,
    pub mode: String,
    pub section: String,
}
