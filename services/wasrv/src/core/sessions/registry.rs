//! Session registry
//!
//! The one shared mutable structure of the lifecycle core. Every mutation
//! runs under the shard lock of its key, so readers see a session either
//! before or after a transition, never in between.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::types::DeviceSession;
use crate::client::ClientHandle;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, DeviceSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one session
    pub fn get(&self, device_id: &str) -> Option<DeviceSession> {
        self.sessions.get(device_id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every session
    pub fn get_all(&self) -> HashMap<String, DeviceSession> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Atomically apply `f` to the slot for `device_id`
    ///
    /// `f` sees `None` when no session exists. Leaving `Some` in the slot
    /// stores it, leaving `None` removes the entry.
    pub fn upsert<R>(&self, device_id: &str, f: impl FnOnce(&mut Option<DeviceSession>) -> R) -> R {
        match self.sessions.entry(device_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let mut slot = Some(occupied.get().clone());
                let out = f(&mut slot);
                match slot {
                    Some(session) => {
                        *occupied.get_mut() = session;
                    }
                    None => {
                        occupied.remove();
                    }
                }
                out
            }
            Entry::Vacant(vacant) => {
                let mut slot = None;
                let out = f(&mut slot);
                if let Some(session) = slot {
                    vacant.insert(session);
                }
                out
            }
        }
    }

    /// Atomically mutate an existing session; `None` when absent
    pub fn update<R>(&self, device_id: &str, f: impl FnOnce(&mut DeviceSession) -> R) -> Option<R> {
        self.sessions
            .get_mut(device_id)
            .map(|mut entry| f(entry.value_mut()))
    }

    pub fn delete(&self, device_id: &str) -> Option<DeviceSession> {
        self.sessions.remove(device_id).map(|(_, session)| session)
    }

    /// Live handle for `device_id`, if any
    pub fn handle(&self, device_id: &str) -> Option<Arc<dyn ClientHandle>> {
        self.sessions
            .get(device_id)
            .and_then(|entry| entry.value().handle.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
