use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{HtmlFeedError, Result};
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpTransport;
use crate::fetcher::poller::ChangePoller;
use crate::fetcher::refresher::Refresher;
use crate::fetcher::Transport;
use crate::store::sqlite::SqliteStore;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub transport: Arc<dyn Transport>,
    pub poller: ChangePoller,
    pub refresher: Refresher,
    pub config: Config,
}

impl AppContext {
    pub fn new(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_config(&config.transport)?);
        Ok(Self::with_parts(store, transport, config))
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_config(&config.transport)?);
        Ok(Self::with_parts(store, transport, config))
    }

    /// Wires a context around an existing store and transport.
    pub fn with_parts(store: Arc<SqliteStore>, transport: Arc<dyn Transport>, config: Config) -> Self {
        let poller = ChangePoller::with_workers(transport.clone(), config.poller.workers);
        let refresher = Refresher::with_workers(
            transport.clone(),
            config.poller.workers,
            config.details.max_upscan,
        );

        Self {
            store,
            transport,
            poller,
            refresher,
            config,
        }
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| HtmlFeedError::Config("Could not find data directory".into()))?;
        let app_dir = data_dir.join("htmlfeed");
        std::fs::create_dir_all(&app_dir)?;
        Ok(app_dir.join("htmlfeed.db"))
    }
}
