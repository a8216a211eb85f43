//! Status projection

use std::collections::HashMap;

use super::types::{DeviceSession, DeviceStatus};

pub fn project(session: &DeviceSession) -> DeviceStatus {
    DeviceStatus {
        status: session.status,
        qr_code: session.qr_payload.clone(),
        last_update: session.last_update,
    }
}

pub fn project_all(sessions: &HashMap<String, DeviceSession>) -> HashMap<String, DeviceStatus> {
    sessions
        .iter()
        .map(|(id, session)| (id.clone(), project(session)))
        .collect()
}
