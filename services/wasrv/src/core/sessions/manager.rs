//! Device lifecycle manager
//!
//! Owns every protocol-client handle. Each `start` opens a new generation:
//! a fresh event channel drained by its own worker task, so events for one
//! device apply strictly in delivery order while devices progress
//! independently. Events, timers and handles of a superseded generation are
//! dropped on arrival.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::projector;
use super::reconnect::{GiveUpReason, ReconnectDecision, ReconnectPolicy};
use super::registry::SessionRegistry;
use super::types::{DeviceSession, DeviceStatus, SessionStatus};
use crate::client::{
    ClientError, ClientEvent, ClientHandle, DisconnectReason, EventSender, InboundMessage,
    MessagePayload, ProtocolClient, QrRenderer, SvgDataUrlRenderer,
};
use crate::credentials::CredentialStore;
use crate::error::{Result, WaSrvError};
use crate::webhook::InboundHandler;

const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    /// Caller-initiated; rejected while the device is live
    Manual,
    /// Caller-initiated takeover of whatever session exists
    Forced,
    /// Fired by the reconnect timer armed for this generation
    Scheduled(u64),
}

enum Claim {
    Claimed(Option<Arc<dyn ClientHandle>>),
    AlreadyRunning,
    Stale,
}

enum Attach {
    Attached,
    /// The generation's own events already tore the session down
    TornDown,
    /// Removed or superseded while connecting
    Gone,
}

/// Cancellable task bound to one generation
struct TaskSlot {
    generation: u64,
    token: CancellationToken,
}

struct Inner {
    registry: SessionRegistry,
    client: Arc<dyn ProtocolClient>,
    credentials: Arc<dyn CredentialStore>,
    qr: Arc<dyn QrRenderer>,
    policy: ReconnectPolicy,
    inbound: Option<Arc<dyn InboundHandler>>,
    retry_timers: DashMap<String, TaskSlot>,
    workers: DashMap<String, TaskSlot>,
    next_generation: AtomicU64,
    event_buffer: usize,
    shutdown: CancellationToken,
}

pub struct ManagerBuilder {
    client: Arc<dyn ProtocolClient>,
    credentials: Arc<dyn CredentialStore>,
    qr: Arc<dyn QrRenderer>,
    policy: ReconnectPolicy,
    inbound: Option<Arc<dyn InboundHandler>>,
    event_buffer: usize,
}

impl ManagerBuilder {
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn qr_renderer(mut self, qr: Arc<dyn QrRenderer>) -> Self {
        self.qr = qr;
        self
    }

    pub fn inbound_handler(mut self, handler: Arc<dyn InboundHandler>) -> Self {
        self.inbound = Some(handler);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn build(self) -> DeviceLifecycleManager {
        DeviceLifecycleManager {
            inner: Arc::new(Inner {
                registry: SessionRegistry::new(),
                client: self.client,
                credentials: self.credentials,
                qr: self.qr,
                policy: self.policy,
                inbound: self.inbound,
                retry_timers: DashMap::new(),
                workers: DashMap::new(),
                next_generation: AtomicU64::new(0),
                event_buffer: self.event_buffer,
                shutdown: CancellationToken::new(),
            }),
        }
    }
}

/// Creates, monitors, reconnects and tears down device sessions
#[derive(Clone)]
pub struct DeviceLifecycleManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DeviceLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLifecycleManager")
            .field("client", &self.inner.client.name())
            .field("sessions", &self.inner.registry.len())
            .field("pending_retries", &self.inner.retry_timers.len())
            .finish()
    }
}

impl DeviceLifecycleManager {
    pub fn builder(
        client: Arc<dyn ProtocolClient>,
        credentials: Arc<dyn CredentialStore>,
    ) -> ManagerBuilder {
        ManagerBuilder {
            client,
            credentials,
            qr: Arc::new(SvgDataUrlRenderer::default()),
            policy: ReconnectPolicy::default(),
            inbound: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn status(&self, device_id: &str) -> Option<DeviceStatus> {
        self.inner
            .registry
            .get(device_id)
            .map(|session| projector::project(&session))
    }

    pub fn statuses(&self) -> HashMap<String, DeviceStatus> {
        projector::project_all(&self.inner.registry.get_all())
    }

    /// True while a reconnect timer is armed for the device
    pub fn has_pending_retry(&self, device_id: &str) -> bool {
        self.inner.retry_timers.contains_key(device_id)
    }

    /// Start a session for `device_id`
    ///
    /// Returns once the protocol client has handed back a handle; pairing
    /// and loading continue in the background and are observable through
    /// [`status`](Self::status). With `is_reconnect_attempt` an existing
    /// session is replaced instead of rejected.
    pub async fn start(&self, device_id: &str, is_reconnect_attempt: bool) -> Result<()> {
        let mode = if is_reconnect_attempt {
            StartMode::Forced
        } else {
            StartMode::Manual
        };
        self.start_inner(device_id, mode).await
    }

    async fn start_inner(&self, device_id: &str, mode: StartMode) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(WaSrvError::internal("session manager is shut down"));
        }

        let has_credentials = self.inner.credentials.load_credentials(device_id).await;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let claim = self.inner.registry.upsert(device_id, |slot| {
            match (mode, slot.as_ref()) {
                (StartMode::Manual, Some(existing)) if existing.is_live() => {
                    return Claim::AlreadyRunning;
                }
                (StartMode::Scheduled(armed), Some(existing))
                    if existing.generation == armed
                        && existing.status == SessionStatus::Reconnecting => {}
                (StartMode::Scheduled(_), _) => return Claim::Stale,
                _ => {}
            }
            let previous = slot.take();
            let attempts = previous.as_ref().map_or(0, |s| s.reconnect_attempts);
            *slot = Some(DeviceSession::starting(
                device_id,
                has_credentials,
                generation,
                attempts,
            ));
            Claim::Claimed(previous.and_then(|s| s.handle))
        });

        let old_handle = match claim {
            Claim::AlreadyRunning => return Err(WaSrvError::already_running(device_id)),
            Claim::Stale => {
                debug!("[{}] reconnect skipped, session changed meanwhile", device_id);
                return Ok(());
            }
            Claim::Claimed(old) => old,
        };

        self.cancel_retry(device_id);
        if let Some(old) = old_handle {
            self.close_quietly(device_id, old).await;
        }

        let (tx, rx) = mpsc::channel(self.inner.event_buffer);
        let token = self.inner.shutdown.child_token();
        if let Some(previous) = self.inner.workers.insert(
            device_id.to_string(),
            TaskSlot {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }
        self.spawn_worker(device_id.to_string(), generation, rx, token);

        info!(
            "[{}] starting session via {} (generation {}, stored credentials: {})",
            device_id,
            self.inner.client.name(),
            generation,
            has_credentials
        );

        // The handshake finishes even when the caller stops waiting for it
        let manager = self.clone();
        let device = device_id.to_string();
        tokio::spawn(async move { manager.complete_handshake(&device, generation, tx).await })
            .await
            .map_err(|e| WaSrvError::internal(format!("handshake task for {}: {}", device_id, e)))?
    }

    async fn complete_handshake(
        &self,
        device_id: &str,
        generation: u64,
        tx: EventSender,
    ) -> Result<()> {
        match self.inner.client.connect(device_id, tx).await {
            Ok(handle) => {
                let attach = self
                    .inner
                    .registry
                    .update(device_id, |session| {
                        if session.generation != generation {
                            return Attach::Gone;
                        }
                        session.handshake_pending = false;
                        match session.status {
                            SessionStatus::Disconnected | SessionStatus::Reconnecting => {
                                Attach::TornDown
                            }
                            _ => {
                                session.handle = Some(Arc::clone(&handle));
                                Attach::Attached
                            }
                        }
                    })
                    .unwrap_or(Attach::Gone);

                match attach {
                    Attach::Attached => Ok(()),
                    Attach::TornDown => {
                        debug!("[{}] session ended during handshake", device_id);
                        self.close_quietly(device_id, handle).await;
                        Ok(())
                    }
                    Attach::Gone => {
                        warn!("[{}] session removed while connecting", device_id);
                        self.close_quietly(device_id, handle).await;
                        self.cancel_worker(device_id, generation);
                        Err(WaSrvError::session_gone(device_id))
                    }
                }
            }
            Err(e) => {
                self.update_current(device_id, generation, |session| {
                    session.handshake_pending = false;
                    session.transition(SessionStatus::Disconnected);
                });
                self.cancel_worker(device_id, generation);
                error!("[{}] handshake failed: {}", device_id, e);
                Err(WaSrvError::handshake(e.to_string()))
            }
        }
    }

    /// Tear down the device and purge its credentials
    ///
    /// Succeeds when nothing exists for `device_id`.
    pub async fn remove(&self, device_id: &str) -> Result<()> {
        self.cancel_retry(device_id);
        if let Some((_, worker)) = self.inner.workers.remove(device_id) {
            worker.token.cancel();
        }

        if let Some(session) = self.inner.registry.delete(device_id) {
            if let Some(handle) = session.handle {
                self.close_quietly(device_id, handle).await;
            }
        }

        match self.inner.credentials.clear_credentials(device_id).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("[{}] no stored credentials to purge", device_id);
            }
            Err(e) => {
                error!("[{}] credential purge failed: {}", device_id, e);
                return Err(WaSrvError::CredentialPurgeFailed(format!(
                    "{}: {}",
                    device_id, e
                )));
            }
        }

        info!("[{}] device removed", device_id);
        Ok(())
    }

    /// Send through the device's live handle
    pub async fn send(
        &self,
        device_id: &str,
        recipient: &str,
        payload: MessagePayload,
    ) -> Result<()> {
        let handle = self
            .inner
            .registry
            .handle(device_id)
            .filter(|h| !h.is_closed())
            .ok_or_else(|| WaSrvError::session_gone(device_id))?;

        let kind = payload.kind();
        handle
            .send_message(recipient, payload)
            .await
            .map_err(|e| match e {
                ClientError::Closed => WaSrvError::session_gone(device_id),
                other => WaSrvError::send(other.to_string()),
            })?;

        debug!("[{}] {} message sent to {}", device_id, kind, recipient);
        Ok(())
    }

    /// Cancel all timers and workers, then close every handle
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.retry_timers.clear();
        self.inner.workers.clear();

        let ids: Vec<String> = self.inner.registry.get_all().into_keys().collect();
        let mut closed = 0usize;
        for id in ids {
            let handle = self
                .inner
                .registry
                .update(&id, |session| {
                    session.transition(SessionStatus::Disconnected);
                    session.handle.take()
                })
                .flatten();
            if let Some(handle) = handle {
                self.close_quietly(&id, handle).await;
                closed += 1;
            }
        }
        info!("Session manager stopped, {} handles closed", closed);
    }

    fn spawn_worker(
        &self,
        device_id: String,
        generation: u64,
        mut rx: mpsc::Receiver<ClientEvent>,
        token: CancellationToken,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => manager.handle_event(&device_id, generation, event).await,
                        None => break,
                    },
                }
            }
            debug!("[{}] event worker {} stopped", device_id, generation);
        });
    }

    async fn handle_event(&self, device_id: &str, generation: u64, event: ClientEvent) {
        if !self.is_current(device_id, generation) {
            debug!(
                "[{}] dropping event from superseded generation {}",
                device_id, generation
            );
            return;
        }

        match event {
            ClientEvent::Qr(raw) => self.on_qr(device_id, generation, &raw).await,
            ClientEvent::Ready => self.on_ready(device_id, generation),
            ClientEvent::Authenticated => info!("[{}] authenticated", device_id),
            ClientEvent::AuthFailure(reason) => {
                warn!("[{}] authentication failed: {}", device_id, reason);
                self.purge_session(device_id, generation).await;
            }
            ClientEvent::Disconnected(DisconnectReason::LoggedOut) => {
                warn!("[{}] logged out", device_id);
                self.purge_session(device_id, generation).await;
            }
            ClientEvent::Disconnected(DisconnectReason::Other(reason)) => {
                self.on_disconnected(device_id, generation, &reason).await;
            }
            ClientEvent::LoadingProgress { percent, message } => {
                debug!("[{}] loading {}% {}", device_id, percent, message);
                self.update_current(device_id, generation, |session| {
                    session.transition_keep_qr(SessionStatus::Connecting)
                });
            }
            ClientEvent::Message(message) => self.dispatch_inbound(device_id, message).await,
        }

        if let Some(view) = self.status(device_id) {
            debug!("[{}] -> {} ({})", device_id, view.status, view.last_update);
        }
    }

    async fn on_qr(&self, device_id: &str, generation: u64, raw: &str) {
        match self.inner.qr.render(raw) {
            Ok(artifact) => {
                self.update_current(device_id, generation, |session| session.show_qr(artifact));
                info!("[{}] QR code issued, waiting for scan", device_id);
            }
            Err(e) => {
                error!("[{}] QR render failed: {}", device_id, e);
                self.degrade(device_id, generation).await;
            }
        }
    }

    fn on_ready(&self, device_id: &str, generation: u64) {
        self.update_current(device_id, generation, |session| {
            session.transition(SessionStatus::Connected);
            session.reconnect_attempts = 0;
        });
        info!("[{}] connected", device_id);
    }

    async fn on_disconnected(&self, device_id: &str, generation: u64, reason: &str) {
        let policy = &self.inner.policy;
        let outcome = self.update_current(device_id, generation, |session| {
            let decision = policy.decide(session);
            let handle = session.handle.take();
            match decision {
                ReconnectDecision::Retry(_) => session.transition(SessionStatus::Reconnecting),
                ReconnectDecision::GiveUp(_) => session.transition(SessionStatus::Disconnected),
            }
            (decision, handle, session.reconnect_attempts)
        });
        let Some((decision, handle, attempts)) = outcome else {
            return;
        };
        // Whatever follows belongs to the next generation
        self.cancel_worker(device_id, generation);

        if let Some(handle) = handle {
            self.close_quietly(device_id, handle).await;
        }

        match decision {
            ReconnectDecision::Retry(delay) => {
                info!(
                    "[{}] disconnected ({}), reconnect #{} in {:?}",
                    device_id, reason, attempts, delay
                );
                self.schedule_reconnect(device_id, generation, delay);
            }
            ReconnectDecision::GiveUp(GiveUpReason::RetryExhausted) => {
                warn!(
                    "[{}] {}",
                    device_id,
                    WaSrvError::RetryExhausted(format!("disconnected ({})", reason))
                );
            }
            ReconnectDecision::GiveUp(GiveUpReason::NoCredentials) => {
                info!(
                    "[{}] disconnected ({}), no stored credentials to reconnect with",
                    device_id, reason
                );
            }
        }
    }

    /// Auth failure and logout: credentials are void, no retry
    async fn purge_session(&self, device_id: &str, generation: u64) {
        self.cancel_retry(device_id);
        match self.inner.credentials.clear_credentials(device_id).await {
            Ok(()) => debug!("[{}] credentials purged", device_id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!("[{}] credential purge failed: {}", device_id, e),
        }
        self.degrade(device_id, generation).await;
    }

    /// Move to `disconnected`, release the handle and end the generation
    async fn degrade(&self, device_id: &str, generation: u64) {
        let Some(handle) = self.update_current(device_id, generation, |session| {
            session.transition(SessionStatus::Disconnected);
            session.reconnect_attempts = 0;
            session.handle.take()
        }) else {
            return;
        };
        self.cancel_worker(device_id, generation);
        if let Some(handle) = handle {
            self.close_quietly(device_id, handle).await;
        }
    }

    /// Runs on the device worker so webhook posts keep delivery order
    async fn dispatch_inbound(&self, device_id: &str, message: InboundMessage) {
        match &self.inner.inbound {
            Some(handler) => handler.handle_inbound(device_id, message).await,
            None => debug!("[{}] inbound message from {} ignored", device_id, message.from),
        }
    }

    fn schedule_reconnect(&self, device_id: &str, generation: u64, delay: Duration) {
        let token = self.inner.shutdown.child_token();
        if let Some(previous) = self.inner.retry_timers.insert(
            device_id.to_string(),
            TaskSlot {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        let manager = self.clone();
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("[{}] reconnect timer cancelled", device_id);
                }
                _ = tokio::time::sleep(delay) => {
                    let armed = manager
                        .inner
                        .retry_timers
                        .remove_if(&device_id, |_, slot| slot.generation == generation)
                        .is_some();
                    if !armed {
                        return;
                    }
                    if let Err(e) = manager
                        .start_inner(&device_id, StartMode::Scheduled(generation))
                        .await
                    {
                        warn!("[{}] reconnect attempt failed: {}", device_id, e);
                    }
                }
            }
        });
    }

    fn cancel_retry(&self, device_id: &str) {
        if let Some((_, timer)) = self.inner.retry_timers.remove(device_id) {
            timer.token.cancel();
            debug!("[{}] pending reconnect cancelled", device_id);
        }
    }

    fn cancel_worker(&self, device_id: &str, generation: u64) {
        if let Some((_, worker)) = self
            .inner
            .workers
            .remove_if(device_id, |_, slot| slot.generation == generation)
        {
            worker.token.cancel();
        }
    }

    fn is_current(&self, device_id: &str, generation: u64) -> bool {
        self.inner
            .registry
            .get(device_id)
            .is_some_and(|session| session.generation == generation)
    }

    fn update_current<R>(
        &self,
        device_id: &str,
        generation: u64,
        f: impl FnOnce(&mut DeviceSession) -> R,
    ) -> Option<R> {
        self.inner
            .registry
            .update(device_id, |session| {
                (session.generation == generation).then(|| f(session))
            })
            .flatten()
    }

    async fn close_quietly(&self, device_id: &str, handle: Arc<dyn ClientHandle>) {
        if handle.is_closed() {
            return;
        }
        if let Err(e) = handle.close().await {
            warn!("[{}] close failed: {}", device_id, e);
        }
    }
}
