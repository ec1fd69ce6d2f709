//! Cached server configuration.
//!
//! Avoids a storage read per request: the cached snapshot is served until the
//! staleness deadline passes, then refreshed. The single mutex serializes
//! refreshes, so concurrent callers hitting a stale cache coalesce into one
//! storage read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AuthError;
use crate::storage::Storage;
use crate::types::{AuthConfig, AuthConfigSet};

const UPDATE_INTERVAL: Duration = Duration::from_secs(30);

struct CacheState {
    config: AuthConfigSet,
    next_update: Instant,
}

pub(crate) struct ConfigCache {
    storage: Arc<dyn Storage>,
    state: Mutex<CacheState>,
}

impl ConfigCache {
    pub(crate) async fn new(storage: Arc<dyn Storage>) -> Result<Self, AuthError> {
        let config = storage.get_config().await?;
        Ok(Self {
            storage,
            state: Mutex::new(CacheState {
                config,
                next_update: Instant::now() + UPDATE_INTERVAL,
            }),
        })
    }

    /// The current configuration snapshot, refreshed from storage if stale.
    pub(crate) async fn get(&self) -> Result<AuthConfigSet, AuthError> {
        let mut state = self.state.lock().await;
        if Instant::now() >= state.next_update {
            debug!("refreshing cached auth config");
            state.config = self.storage.get_config().await?;
            state.next_update = Instant::now() + UPDATE_INTERVAL;
        }
        Ok(state.config.clone())
    }

    /// The engine-facing portion of the configuration.
    pub(crate) async fn app_config(&self) -> Result<AuthConfig, AuthError> {
        Ok(self.get().await?.config().clone())
    }

    /// Re-read immediately, regardless of staleness. Called after config
    /// mutations so subsequent reads observe them.
    pub(crate) async fn force_refresh(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        state.config = self.storage.get_config().await?;
        state.next_update = Instant::now() + UPDATE_INTERVAL;
        Ok(())
    }
}
