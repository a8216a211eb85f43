//! Protocol client seam
//!
//! The gateway never speaks the WhatsApp Web protocol itself. A
//! [`ProtocolClient`] opens one session per device and reports progress as
//! [`ClientEvent`]s on the channel handed to [`ProtocolClient::connect`]; the
//! returned [`ClientHandle`] sends messages and closes the session.

pub mod qr;
pub mod virt;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

pub use qr::{QrRenderer, SvgDataUrlRenderer};
pub use virt::VirtualClient;

/// Sender side of a device event stream
pub type EventSender = mpsc::Sender<ClientEvent>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The handle was closed, locally or by the remote side
    #[error("session closed")]
    Closed,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("close failed: {0}")]
    Close(String),
}

/// Why a session dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user unlinked the device; credentials are no longer valid
    LoggedOut,
    /// Anything else (network reset, server restart, ...)
    Other(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::LoggedOut => write!(f, "LOGOUT"),
            DisconnectReason::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Incoming message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    /// `media_type` is the protocol's message kind, e.g. `imageMessage`
    Media { media_type: String, data: Bytes },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender chat id
    pub from: String,
    pub content: InboundContent,
}

/// Events emitted by a session, delivered in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Raw pairing string to be rendered as a QR code
    Qr(String),
    Ready,
    Authenticated,
    AuthFailure(String),
    Disconnected(DisconnectReason),
    LoadingProgress { percent: u8, message: String },
    Message(InboundMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub data: Bytes,
    pub mime_type: String,
    pub filename: String,
    pub caption: Option<String>,
    /// Send as a document attachment instead of inline media
    pub as_document: bool,
}

/// Outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text(String),
    Media(MediaPayload),
}

impl MessagePayload {
    /// Kind string reported back to API callers
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::Text(_) => "text",
            MessagePayload::Media(m) if m.as_document => "document",
            MessagePayload::Media(_) => "image",
        }
    }
}

/// Live session for one device
#[async_trait]
pub trait ClientHandle: Send + Sync {
    /// `recipient` is a chat id such as `923001234567@c.us`
    async fn send_message(&self, recipient: &str, payload: MessagePayload)
        -> Result<(), ClientError>;

    /// Graceful close; the event stream ends afterwards
    async fn close(&self) -> Result<(), ClientError>;

    fn is_closed(&self) -> bool;
}

/// Factory for device sessions
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Open a session; the handshake continues through `events`
    async fn connect(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> Result<Arc<dyn ClientHandle>, ClientError>;

    fn name(&self) -> &'static str;
}
