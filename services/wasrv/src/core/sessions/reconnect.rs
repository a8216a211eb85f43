//! Reconnect policy
//!
//! Only devices that had stored credentials when their session started are
//! retried, always after the same fixed delay. A credential-less device is
//! never retried; once it has dropped more than the ceiling allows without a
//! fresh QR in between, the give-up is reported as retry exhaustion.

use std::time::Duration;

use super::types::DeviceSession;
use crate::core::config::SessionsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// Credential-less device past the attempt ceiling
    RetryExhausted,
    /// Credential-less device under the ceiling
    NoCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry(Duration),
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts_without_credentials: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts_without_credentials: 3,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts_without_credentials: u32) -> Self {
        Self {
            delay,
            max_attempts_without_credentials,
        }
    }

    pub fn from_config(config: &SessionsConfig) -> Self {
        Self::new(
            config.reconnect_delay(),
            config.max_attempts_without_credentials,
        )
    }

    /// Count the disconnect against `session` and decide what happens next
    pub fn decide(&self, session: &mut DeviceSession) -> ReconnectDecision {
        session.reconnect_attempts = session.reconnect_attempts.saturating_add(1);

        if !session.has_stored_credentials
            && session.reconnect_attempts > self.max_attempts_without_credentials
        {
            session.reconnect_attempts = 0;
            return ReconnectDecision::GiveUp(GiveUpReason::RetryExhausted);
        }

        if session.has_stored_credentials {
            ReconnectDecision::Retry(self.delay)
        } else {
            ReconnectDecision::GiveUp(GiveUpReason::NoCredentials)
        }
    }
}
