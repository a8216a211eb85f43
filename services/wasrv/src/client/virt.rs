//! Virtual protocol client
//!
//! Simulates pairing without any network so the gateway runs end to end on a
//! developer machine. A device with a credential directory restores straight
//! to `ready`; a fresh device shows a QR code and, after `pair_after`, behaves
//! as if it was scanned: the credential directory is created and the session
//! becomes ready.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ClientError, ClientEvent, ClientHandle, EventSender, MessagePayload, ProtocolClient};

/// Virtual protocol client for development and demos
#[derive(Debug, Clone)]
pub struct VirtualClient {
    sessions_root: PathBuf,
    pair_after: Option<Duration>,
}

impl VirtualClient {
    pub fn new(sessions_root: impl Into<PathBuf>, pair_after: Option<Duration>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            pair_after,
        }
    }
}

pub struct VirtualHandle {
    session_id: String,
    closed: AtomicBool,
    cancel: CancellationToken,
    sent_count: AtomicU64,
}

impl std::fmt::Debug for VirtualHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualHandle")
            .field("session_id", &self.session_id)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .field("sent", &self.sent_count.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl ClientHandle for VirtualHandle {
    async fn send_message(
        &self,
        recipient: &str,
        payload: MessagePayload,
    ) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let seq = self.sent_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "[{}] virtual send #{} to {} ({})",
            self.session_id,
            seq,
            recipient,
            payload.kind()
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::Release);
        self.cancel.cancel();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ProtocolClient for VirtualClient {
    async fn connect(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> Result<Arc<dyn ClientHandle>, ClientError> {
        let handle = Arc::new(VirtualHandle {
            session_id: session_id.to_string(),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            sent_count: AtomicU64::new(0),
        });

        let auth_dir = self.sessions_root.join(session_id);
        let pair_after = self.pair_after;
        let cancel = handle.cancel.clone();
        let id = session_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("[{}] virtual session closed", id),
                _ = simulate_session(&id, auth_dir, pair_after, events) => {},
            }
        });

        info!("[{}] virtual session opened", session_id);
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "virtual"
    }
}

// Emits the handshake sequence; returns early once the receiver is gone
async fn simulate_session(
    id: &str,
    auth_dir: PathBuf,
    pair_after: Option<Duration>,
    events: EventSender,
) {
    let restored = tokio::fs::metadata(&auth_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    if !restored {
        let raw = format!("2@wasrv-virtual,{},{}", id, uuid::Uuid::new_v4());
        if events.send(ClientEvent::Qr(raw)).await.is_err() {
            return;
        }
        let Some(delay) = pair_after else {
            // Nobody will scan; keep the stream open until closed
            std::future::pending::<()>().await;
            return;
        };
        tokio::time::sleep(delay).await;
        if let Err(e) = tokio::fs::create_dir_all(&auth_dir).await {
            warn!("[{}] virtual pairing could not persist credentials: {}", id, e);
            let _ = events
                .send(ClientEvent::AuthFailure(format!("credential write: {}", e)))
                .await;
            return;
        }
    }

    let sequence = [
        ClientEvent::Authenticated,
        ClientEvent::LoadingProgress {
            percent: 100,
            message: "WhatsApp".to_string(),
        },
        ClientEvent::Ready,
    ];
    for event in sequence {
        if events.send(event).await.is_err() {
            return;
        }
    }

    // Session stays up until the handle closes
    std::future::pending::<()>().await;
}
