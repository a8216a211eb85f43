//! Device session lifecycle
//!
//! - [`registry`]: the per-device session records
//! - [`reconnect`]: retry decisions on disconnect
//! - [`manager`]: start, event handling, reconnect scheduling and removal
//! - [`projector`]: the status view served to API callers

pub mod manager;
pub mod projector;
pub mod reconnect;
pub mod registry;
pub mod types;

pub use manager::{DeviceLifecycleManager, ManagerBuilder};
pub use reconnect::{GiveUpReason, ReconnectDecision, ReconnectPolicy};
pub use registry::SessionRegistry;
pub use types::{DeviceSession, DeviceStatus, SessionStatus};
