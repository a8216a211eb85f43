//! HTTP API
//!
//! - [`device_handlers`]: per-device control, no authentication
//! - [`v1_handlers`]: API-key authenticated tenant routes, v1 and legacy
//! - [`health_handlers`]: liveness and host metrics

pub mod auth;
pub mod device_handlers;
pub mod health_handlers;
pub mod upload;
pub mod v1_handlers;

pub use auth::{require_api_key, AuthContext};
