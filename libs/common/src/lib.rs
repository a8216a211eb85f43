//! Shared basic library for the wasrv gateway
//!
//! Provides functions shared by the service binaries:
//! - API error envelope and HTTP error type
//! - logging setup and HTTP request logging middleware
//! - shutdown signal handling
//! - system metrics for health endpoints

pub mod api_types;
pub mod logging;
pub mod serde_helpers;
pub mod service_bootstrap;
pub mod shutdown;
pub mod system_metrics;

// Re-export commonly used API types
pub use api_types::{ComponentHealth, ErrorInfo, ErrorResponse, HealthStatus, ServiceStatus};

// Re-export AppError when axum feature is enabled
#[cfg(feature = "axum")]
pub use api_types::AppError;
