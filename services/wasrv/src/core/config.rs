//! Service configuration
//!
//! Layered with figment: built-in defaults, then `config/wasrv.yaml`, then
//! `WASRV_` prefixed environment variables (`__` separates nested keys, e.g.
//! `WASRV_SESSIONS__RECONNECT_DELAY_SECS=10`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WaSrvError};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONFIG_PATH: &str = "config/wasrv.yaml";
pub const ENV_PREFIX: &str = "WASRV_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "wasrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// One credential directory per device lives under this root
    pub root: PathBuf,
    pub reconnect_delay_secs: u64,
    pub max_attempts_without_credentials: u32,
    /// Capacity of each device's event channel
    pub event_buffer: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("sessions"),
            reconnect_delay_secs: 5,
            max_attempts_without_credentials: 3,
            event_buffer: 64,
        }
    }
}

impl SessionsConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Protocol client backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientDriver {
    /// Simulated pairing, no network
    Virtual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub driver: ClientDriver,
    /// Virtual client: seconds between showing the QR and simulating a scan.
    /// `None` waits forever.
    pub pair_after_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            driver: ClientDriver::Virtual,
            pair_after_secs: Some(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/wasrv.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Inbound events are dropped when unset
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Inbound media files
    pub dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("media"),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientsConfig {
    /// Prefixed to 10-digit numbers that lack it
    pub default_country_code: String,
}

impl Default for RecipientsConfig {
    fn default() -> Self {
        Self {
            default_country_code: "92".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: PathBuf,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("logs"),
            json: false,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub sessions: SessionsConfig,
    pub client: ClientConfig,
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
    pub media: MediaConfig,
    pub recipients: RecipientsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load defaults, then the YAML file if present, then the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::figment(path.as_ref()).extract().map_err(|e| {
            WaSrvError::config(format!("Failed to load configuration: {}", e))
        })
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.port == 0 {
            return Err(WaSrvError::config("api.port must be non-zero"));
        }
        if self.sessions.root.as_os_str().is_empty() {
            return Err(WaSrvError::config("sessions.root cannot be empty"));
        }
        if self.sessions.event_buffer == 0 {
            return Err(WaSrvError::config("sessions.event_buffer must be positive"));
        }
        if self.database.url.is_empty() {
            return Err(WaSrvError::config("database.url cannot be empty"));
        }
        if !self
            .recipients
            .default_country_code
            .chars()
            .all(|c| c.is_ascii_digit())
        {
            return Err(WaSrvError::config(
                "recipients.default_country_code must contain digits only",
            ));
        }
        if let Some(url) = &self.webhook.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(WaSrvError::config(format!(
                    "webhook.url must be an http(s) URL: {}",
                    url
                )));
            }
        }
        Ok(())
    }
}
