use std::sync::Arc;

use pledge_db::Database;
use pledge_gateway::dispatcher::Dispatcher;

use crate::config::Config;
use crate::error::ApiResult;
use crate::identity::IdentityVerifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub config: Config,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppStateInner {
    pub fn new(db: Database, config: Config, identity: Arc<dyn IdentityVerifier>) -> AppState {
        Arc::new(Self {
            db: Arc::new(db),
            dispatcher: Dispatcher::new(),
            config,
            identity,
        })
    }

    /// Run a blocking DB call off the async runtime.
    pub async fn db_call<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let value = tokio::task::spawn_blocking(move || f(&db)).await??;
        Ok(value)
    }
}
