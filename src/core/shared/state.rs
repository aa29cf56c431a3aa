use std::sync::Arc;
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::core::shared::store::Store;
use crate::demands::NotificationDispatcher;
use crate::integrations::{CepClient, MediaSigner};
use crate::tenancy::TenantResolver;

/// Shared by every handler through `State<Arc<AppState>>`.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub tenants: TenantResolver,
    pub notifier: NotificationDispatcher,
    pub cep: CepClient,
    pub media: MediaSigner,
}

impl AppState {
    pub fn new<S: Store + 'static>(config: AppConfig, store: Arc<S>) -> Result<Self, reqwest::Error> {
        let tenants = TenantResolver::new(
            store.clone(),
            Duration::from_secs(config.tenancy.cache_ttl_secs),
        );
        let notifier = NotificationDispatcher::new(store.clone());
        let cep = CepClient::new(&config.cep)?;
        let media = MediaSigner::new(&config.media);

        Ok(Self {
            config,
            store,
            tenants,
            notifier,
            cep,
            media,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("store", &"Arc<dyn Store>")
            .field("tenants", &self.tenants)
            .field("notifier", &self.notifier)
            .field("cep", &self.cep)
            .field("media", &self.media)
            .finish()
    }
}
