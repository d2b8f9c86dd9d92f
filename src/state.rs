use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CONFIG;
use crate::credentials::CredentialStore;
use crate::db::database::Database;
use crate::gate::ConcurrencyGate;
use crate::persist::PersistenceAdapter;
use crate::workspace::history::{HistoryFeed, ProjectListView};
use crate::workspace::tabs::TabState;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub persistence: PersistenceAdapter,
    pub credentials: Arc<CredentialStore>,
    pub gate: Arc<ConcurrencyGate>,
    pub tabs: Arc<Mutex<TabState>>,
    pub projects: Arc<ProjectListView>,
    pub history: Arc<HistoryFeed>,
}

impl AppState {
    pub fn new(db: Database, credentials: CredentialStore) -> Self {
        let persistence = PersistenceAdapter::new(db.clone(), CONFIG.user_id.clone());
        AppState {
            db,
            persistence,
            credentials: Arc::new(credentials),
            gate: Arc::new(ConcurrencyGate::new(CONFIG.max_concurrent_batches)),
            tabs: Arc::new(Mutex::new(TabState::new())),
            projects: Arc::new(ProjectListView::new()),
            history: Arc::new(HistoryFeed::new()),
        }
    }
}
