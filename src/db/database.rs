use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{HistoryInsert, HistoryRow, ProjectInsert, ProjectRow};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS projects (\
                id TEXT PRIMARY KEY,\
                user_id TEXT NOT NULL,\
                title TEXT NOT NULL,\
                mode TEXT NOT NULL,\
                section TEXT NOT NULL,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS history (\
                id TEXT PRIMARY KEY,\
                user_id TEXT NOT NULL,\
                project_id TEXT,\
                url TEXT NOT NULL,\
                prompt TEXT NOT NULL,\
                mode TEXT NOT NULL,\
                section TEXT NOT NULL,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_user_id ON projects(user_id);")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_user_id ON history(user_id);")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_project_id ON history(project_id);")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_created_at ON history(created_at);")
            .execute(&pool)
            .await?;

        info!("Database tables created successfully");

        Ok(Database { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_history(&self, insert: HistoryInsert) -> Result<HistoryRow> {
        let row = HistoryRow {
            id: Uuid::new_v4().to_string(),
            user_id: insert.user_id,
            project_id: insert.project_id,
            url: insert.url,
            prompt: insert.prompt,
            mode: insert.mode,
            section: insert.section,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO history (id, user_id, project_id, url, prompt, mode, section, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.project_id)
        .bind(&row.url)
        .bind(&row.prompt)
        .bind(&row.mode)
        .bind(&row.section)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_history_by_project(&self, project_id: &str) -> Result<Vec<HistoryRow>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, user_id, project_id, url, prompt, mode, section, created_at \
             FROM history WHERE project_id = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_history_by_user(&self, user_id: &str) -> Result<Vec<HistoryRow>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, user_id, project_id, url, prompt, mode, section, created_at \
             FROM history WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn insert_project(&self, insert: ProjectInsert) -> Result<ProjectRow> {
        let row = ProjectRow {
            id: Uuid::new_v4().to_string(),
            user_id: insert.user_id,
            title: insert.title,
            mode: insert.mode,
            section: insert.section,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO projects (id, user_id, title, mode, section, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.title)
        .bind(&row.mode)
        .bind(&row.section)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, user_id, title, mode, section, created_at \
             FROM projects WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Deletes a project and every history row that belongs to it.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool> {
        sqlx::query("DELETE FROM history WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A file-backed database per test; pooled connections to ":memory:"
    // would each see their own empty database.
    async fn temp_db() -> Database {
        let path = std::env::temp_dir().join(format!("adforge-test-{}.db", Uuid::new_v4()));
        Database::init(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap()
    }

    fn history_insert(project_id: Option<&str>, url: &str) -> HistoryInsert {
        HistoryInsert {
            user_id: "tester".to_string(),
            project_id: project_id.map(|value| value.to_string()),
            url: url.to_string(),
            prompt: "prompt".to_string(),
            mode: "OBJECT".to_string(),
            section: "landing".to_string(),
        }
    }

    #[tokio::test]
    async fn history_lists_newest_first() {
        let db = temp_db().await;
        db.insert_history(history_insert(None, "first")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        db.insert_history(history_insert(None, "second")).await.unwrap();

        let rows = db.list_history_by_user("tester").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url, "second");
    }

    #[tokio::test]
    async fn deleting_a_project_cascades_its_history() {
        let db = temp_db().await;
        let project = db
            .insert_project(ProjectInsert {
                user_id: "tester".to_string(),
                title: "Landing hero".to_string(),
                mode: "PORTRAIT".to_string(),
                section: "landing".to_string(),
            })
            .await
            .unwrap();

        db.insert_history(history_insert(Some(&project.id), "kept-elsewhere"))
            .await
            .unwrap();
        db.insert_history(history_insert(None, "unowned")).await.unwrap();

        assert!(db.delete_project(&project.id).await.unwrap());
        assert!(!db.delete_project(&project.id).await.unwrap());

        assert!(db
            .list_history_by_project(&project.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(db.list_history_by_user("tester").await.unwrap().len(), 1);
    }
}
