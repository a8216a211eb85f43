//! Application State Management
//!
//! Shared across all API handlers

use std::sync::Arc;
use std::time::Instant;

use crate::core::config::AppConfig;
use crate::core::sessions::DeviceLifecycleManager;
use crate::store::Store;

pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Owns every device session
    pub manager: DeviceLifecycleManager,

    /// API keys and tenant instances
    pub store: Store,

    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, manager: DeviceLifecycleManager, store: Store) -> Self {
        Self {
            config,
            manager,
            store,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn country_code(&self) -> &str {
        &self.config.recipients.default_country_code
    }
}
