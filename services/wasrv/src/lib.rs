//! WaSrv library exports for testing

pub mod api;
pub mod app_state;
pub mod client;
pub mod core;
pub mod credentials;
pub mod dto;
pub mod error;
pub mod routes;
pub mod store;
pub mod utils;
pub mod webhook;

// Re-export commonly used types
pub use app_state::AppState;
pub use client::{ClientEvent, ClientHandle, MessagePayload, ProtocolClient};
pub use crate::core::config::AppConfig;
pub use crate::core::sessions::{DeviceLifecycleManager, DeviceStatus, SessionStatus};
pub use credentials::{CredentialStore, FileCredentialStore};
pub use error::{Result, WaSrvError};
pub use store::Store;
