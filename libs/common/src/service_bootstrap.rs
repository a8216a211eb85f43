//! Service startup helpers
//!
//! Startup banner, logging bootstrap and development `.env` loading shared
//! by the service binaries.

use crate::logging::{self, LogConfig};
use std::path::PathBuf;
use tracing::{info, Level};

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g. "wasrv")
    pub name: String,
    pub version: String,
    pub description: String,
    pub default_port: u16,
}

impl ServiceInfo {
    /// `version` is normally the caller's `env!("CARGO_PKG_VERSION")`
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        default_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            default_port,
        }
    }
}

/// Print the startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = match service.name.as_str() {
        "wasrv" => {
            r#"
 ██╗    ██╗ █████╗ ███████╗██████╗ ██╗   ██╗
 ██║    ██║██╔══██╗██╔════╝██╔══██╗██║   ██║
 ██║ █╗ ██║███████║███████╗██████╔╝██║   ██║
 ██║███╗██║██╔══██║╚════██║██╔══██╗╚██╗ ██╔╝
 ╚███╔███╔╝██║  ██║███████║██║  ██║ ╚████╔╝
  ╚══╝╚══╝ ╚═╝  ╚═╝╚══════╝╚═╝  ╚═╝  ╚═══╝
            "#
        },
        _ => "",
    };

    if !banner.is_empty() {
        info!("{}", banner);
    }
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
}

/// Initialize logging with the standard layout for a service
///
/// Files go to `<log_dir>/<service>/`.
pub fn init_logging(
    service: &ServiceInfo,
    log_dir: impl Into<PathBuf>,
    level: Level,
    enable_json: bool,
    ansi: bool,
) -> anyhow::Result<()> {
    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: log_dir.into().join(&service.name),
        level,
        enable_json,
        ansi,
        enable_api_log: true,
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}

/// Load `.env` into the process environment in debug builds
///
/// Variables already set win. Release builds rely on the real environment.
pub fn load_development_env() {
    #[cfg(debug_assertions)]
    {
        if let Ok(content) = std::fs::read_to_string(".env") {
            for (key, value) in parse_env_lines(&content) {
                if std::env::var(&key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }
}

fn parse_env_lines(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_string(),
                v.trim().trim_matches('"').to_string(),
            )
        })
        .collect()
}
