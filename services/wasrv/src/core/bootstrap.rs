//! Service bootstrap
//!
//! Command-line arguments, logging setup and bind address resolution.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};

use crate::core::config::{LoggingConfig, DEFAULT_CONFIG_PATH};
use crate::error::{Result, WaSrvError};
use common::service_bootstrap::ServiceInfo;

/// Command-line arguments for wasrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "wasrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Multi-device WhatsApp gateway",
    long_about = None
)]
pub struct Args {
    /// Configuration file
    #[arg(short = 'c', long, env = "WASRV_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Bind address for the API server, e.g. 0.0.0.0:8080
    #[arg(short = 'b', long)]
    pub bind_address: Option<String>,

    /// Disable colored output and the banner
    #[arg(long)]
    pub no_color: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,
}

pub fn parse_log_level(level: &str) -> Result<Level> {
    level
        .parse::<Level>()
        .map_err(|_| WaSrvError::config(format!("Invalid log level: {}", level)))
}

/// Initialize logging from CLI arguments and the logging section
pub fn initialize_logging(
    args: &Args,
    service_info: &ServiceInfo,
    logging: &LoggingConfig,
) -> Result<()> {
    common::service_bootstrap::load_development_env();

    let level = parse_log_level(args.log_level.as_deref().unwrap_or(&logging.level))?;

    common::service_bootstrap::init_logging(
        service_info,
        logging.dir.clone(),
        level,
        logging.json,
        !args.no_color,
    )
    .map_err(|e| WaSrvError::config(format!("Failed to init logging: {}", e)))
}

/// CLI argument wins over configuration
pub fn determine_bind_address(cli_arg: Option<String>, config_host: &str, config_port: u16) -> String {
    if let Some(addr) = cli_arg {
        info!("Using bind address from command line: {}", addr);
        return addr;
    }

    let host = if config_host.is_empty() {
        "0.0.0.0"
    } else {
        config_host
    };
    format!("{}:{}", host, config_port)
}
