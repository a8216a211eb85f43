//! Shared fixtures for the integration tests
//!
//! [`MockClient`] records every `connect`, keeps the latest event sender per
//! device so tests can drive the handshake, and hands out [`MockHandle`]s
//! that record sends.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
#![allow(dead_code)] // Not every test binary uses every helper

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wasrv::client::{ClientError, ClientEvent, ClientHandle, EventSender, MessagePayload};
use wasrv::core::sessions::{DeviceLifecycleManager, ReconnectPolicy};
use wasrv::{FileCredentialStore, ProtocolClient};

#[derive(Default)]
pub struct MockHandle {
    pub device_id: String,
    closed: AtomicBool,
    fail_send: AtomicBool,
    sent: Mutex<Vec<(String, MessagePayload)>>,
}

impl MockHandle {
    pub fn sent(&self) -> Vec<(String, MessagePayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientHandle for MockHandle {
    async fn send_message(
        &self,
        recipient: &str,
        payload: MessagePayload,
    ) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ClientError::Send("recipient not on WhatsApp".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload));
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockClient {
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    senders: Mutex<HashMap<String, EventSender>>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    /// Every handle created so far, oldest first
    pub fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.handles.lock().unwrap().clone()
    }

    pub fn last_handle(&self, device_id: &str) -> Option<Arc<MockHandle>> {
        self.handles()
            .into_iter()
            .rev()
            .find(|h| h.device_id == device_id)
    }

    pub fn open_handles(&self, device_id: &str) -> usize {
        self.handles()
            .iter()
            .filter(|h| h.device_id == device_id && !h.is_closed())
            .count()
    }

    /// Deliver an event on the device's most recent session
    pub async fn emit(&self, device_id: &str, event: ClientEvent) {
        assert!(
            self.try_emit(device_id, event).await,
            "event worker stopped"
        );
    }

    /// Like [`emit`](Self::emit) but reports a closed event stream instead of panicking
    pub async fn try_emit(&self, device_id: &str, event: ClientEvent) -> bool {
        let sender = self
            .senders
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .expect("device was never connected");
        sender.send(event).await.is_ok()
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    async fn connect(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> Result<Arc<dyn ClientHandle>, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.senders
            .lock()
            .unwrap()
            .insert(session_id.to_string(), events);

        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Connect("browser failed to launch".into()));
        }

        let handle = Arc::new(MockHandle {
            device_id: session_id.to_string(),
            ..MockHandle::default()
        });
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub fn manager(client: Arc<MockClient>, root: &Path, delay: Duration) -> DeviceLifecycleManager {
    DeviceLifecycleManager::builder(client, Arc::new(FileCredentialStore::new(root)))
        .policy(ReconnectPolicy::new(delay, 3))
        .build()
}

/// Pretend the device paired before: its credential directory exists
pub fn store_credentials(root: &Path, device_id: &str) {
    std::fs::create_dir_all(root.join(device_id).join("session")).unwrap();
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
