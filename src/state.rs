use crate::{
    config::Config,
    services::{ChangeFeedService, IdentityService, StorageService},
};
use std::sync::Arc;

/// Shared application state: configuration plus the clients for the three
/// external collaborators (identity provider, storage backend, change feed).
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub identity_service: Arc<IdentityService>,
    pub storage_service: Arc<StorageService>,
    pub feed_service: Arc<ChangeFeedService>,
}

impl AppState {
    pub fn new(config: Config) -> crate::error::Result<Self> {
        let identity_service = Arc::new(IdentityService::new(&config)?);
        let storage_service = Arc::new(StorageService::new(&config)?);
        let feed_service = Arc::new(ChangeFeedService::new(&config));

        Ok(Self {
            config,
            identity_service,
            storage_service,
            feed_service,
        })
    }
}
