use crate::accounts::CredentialService;
use crate::auth::TokenAuthority;
use crate::config::AppConfig;
use crate::db::{MemoryUserStore, SqliteUserStore, StoreError, UserStore};
use crate::upload::{UploadGatekeeper, UploadLimits};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<CredentialService>,
    pub tokens: Arc<TokenAuthority>,
    pub uploads: Arc<UploadGatekeeper>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn UserStore>) -> Self {
        let tokens = Arc::new(TokenAuthority::new(&config.jwt_secret, config.token_ttl()));
        let accounts = Arc::new(CredentialService::new(store, tokens.clone()));
        let uploads = Arc::new(UploadGatekeeper::new(
            config.upload_dir.clone(),
            UploadLimits {
                field: config.upload_field.clone(),
                max_file_size: config.max_file_size,
                max_files: config.max_files,
            },
        ));

        Self {
            config: Arc::new(config),
            accounts,
            tokens,
            uploads,
        }
    }

    /// Picks the user store from the config: SQLite when a database path is
    /// set, otherwise in memory.
    pub fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn UserStore> = match &config.database_path {
            Some(path) => Arc::new(SqliteUserStore::open(path)?),
            None => Arc::new(MemoryUserStore::new()),
        };
        Ok(Self::new(config, store))
    }
}
