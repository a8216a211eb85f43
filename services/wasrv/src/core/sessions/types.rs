//! Device session records

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::client::ClientHandle;

/// Externally visible device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    WaitingForScan,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Starting => "starting",
            SessionStatus::WaitingForScan => "waiting_for_scan",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Reconnecting => "reconnecting",
            SessionStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Registry entry for one device
#[derive(Clone)]
pub struct DeviceSession {
    pub id: String,
    /// Present only while the session is live
    pub handle: Option<Arc<dyn ClientHandle>>,
    pub status: SessionStatus,
    /// Rendered QR, only while `waiting_for_scan` (or loading right after it)
    pub qr_payload: Option<String>,
    pub last_update: DateTime<Utc>,
    pub reconnect_attempts: u32,
    /// Evaluated when the generation started
    pub has_stored_credentials: bool,
    /// Bumped by every start; events and timers of older generations are ignored
    pub generation: u64,
    /// Set from `start` until the protocol client returns a handle or fails
    pub handshake_pending: bool,
}

impl DeviceSession {
    /// Fresh record in `starting`
    pub fn starting(
        id: impl Into<String>,
        has_stored_credentials: bool,
        generation: u64,
        reconnect_attempts: u32,
    ) -> Self {
        Self {
            id: id.into(),
            handle: None,
            status: SessionStatus::Starting,
            qr_payload: None,
            last_update: Utc::now(),
            reconnect_attempts,
            has_stored_credentials,
            generation,
            handshake_pending: true,
        }
    }

    /// Live means a handle exists or a start is still in flight
    pub fn is_live(&self) -> bool {
        self.handle.is_some() || self.handshake_pending
    }

    /// Move to `status`, clearing the QR payload
    pub fn transition(&mut self, status: SessionStatus) {
        self.status = status;
        self.qr_payload = None;
        self.last_update = Utc::now();
    }

    /// Move to `status`, keeping whatever QR payload is present
    pub fn transition_keep_qr(&mut self, status: SessionStatus) {
        self.status = status;
        self.last_update = Utc::now();
    }

    pub fn show_qr(&mut self, payload: String) {
        self.status = SessionStatus::WaitingForScan;
        self.qr_payload = Some(payload);
        self.last_update = Utc::now();
        self.reconnect_attempts = 0;
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("live_handle", &self.handle.is_some())
            .field("status", &self.status)
            .field("has_qr", &self.qr_payload.is_some())
            .field("last_update", &self.last_update)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("has_stored_credentials", &self.has_stored_credentials)
            .field("generation", &self.generation)
            .field("handshake_pending", &self.handshake_pending)
            .finish()
    }
}

/// Projection served by the HTTP API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub status: SessionStatus,
    pub qr_code: Option<String>,
    pub last_update: DateTime<Utc>,
}
