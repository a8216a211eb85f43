//! Tenant API Handlers
//!
//! API-key authenticated routes. A tenant only ever sees its own connected
//! instances; sends go through the instance's device session.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::api::auth::AuthContext;
use crate::api::upload::read_media_form;
use crate::app_state::AppState;
use crate::client::{MediaPayload, MessagePayload};
use crate::dto::{
    ApiReply, InstanceDeletedData, InstanceSummary, LegacyInstanceSummary, LegacyInstancesReply,
    LegacySendMessageRequest, MediaSentData, MessageSentData, V1SendMessageRequest,
};
use crate::error::WaSrvError;
use crate::store::{instances, Instance};
use crate::utils::{format_phone_number, to_chat_id, to_jid};
use common::AppError;

const SESSION_MISSING: &str = "WhatsApp session not found for the selected instance";

async fn connected_instances(state: &AppState, user_id: i64) -> Result<Vec<Instance>, AppError> {
    instances::get_user_instances(state.store.pool(), user_id)
        .await
        .map_err(|e| {
            error!("Failed to load instances of user {}: {}", user_id, e);
            AppError::from(e)
        })
}

/// Requested instance if the tenant owns it, else the most recently updated one
pub fn select_instance(instances: Vec<Instance>, requested: Option<&str>) -> Option<Instance> {
    let mut instances = instances;
    if let Some(wanted) = requested {
        if let Some(pos) = instances.iter().position(|i| i.instance_id == wanted) {
            return Some(instances.swap_remove(pos));
        }
    }
    instances.into_iter().next()
}

fn pick_instance(instances: Vec<Instance>, requested: Option<&str>) -> Result<Instance, AppError> {
    select_instance(instances, requested).ok_or_else(|| {
        AppError::bad_request("No instances available")
            .with_details("No connected WhatsApp instances found for your account")
    })
}

fn ensure_session(state: &AppState, instance: &Instance) -> Result<(), AppError> {
    match state.manager.registry().handle(&instance.instance_id) {
        Some(handle) if !handle.is_closed() => Ok(()),
        _ => Err(AppError::service_unavailable(SESSION_MISSING)),
    }
}

/// Lost sessions are reported as unavailable on the tenant routes
fn send_error(err: WaSrvError) -> AppError {
    match err {
        WaSrvError::SessionGone(_) => AppError::service_unavailable(SESSION_MISSING),
        other => {
            error!("Tenant send failed: {}", other);
            AppError::from(other)
        }
    }
}

fn recipient_digits(state: &AppState, to: &str) -> Result<String, AppError> {
    let digits = format_phone_number(to, state.country_code());
    if digits.is_empty() {
        return Err(AppError::bad_request("Recipient must contain a phone number"));
    }
    Ok(digits)
}

async fn send_text(
    state: &AppState,
    instance: &Instance,
    to: &str,
    message: String,
) -> Result<MessageSentData, AppError> {
    let digits = recipient_digits(state, to)?;
    ensure_session(state, instance)?;

    state
        .manager
        .send(
            &instance.instance_id,
            &to_chat_id(&digits),
            MessagePayload::Text(message.clone()),
        )
        .await
        .map_err(send_error)?;

    Ok(MessageSentData {
        to: to_jid(&digits),
        message,
        instance_id: instance.instance_id.clone(),
        instance_name: instance.name.clone(),
        sent_at: Utc::now(),
    })
}

/// Send a text message from one of the tenant's instances
///
/// @route POST /api/v1/send-message
/// @input Json(body): V1SendMessageRequest - `{to, message, instance_id?}`
#[utoipa::path(
    post,
    path = "/api/v1/send-message",
    request_body = V1SendMessageRequest,
    responses(
        (status = 200, description = "Message sent", body = ApiReply<MessageSentData>),
        (status = 400, description = "Missing fields or no connected instance"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 429, description = "API key usage limit reached"),
        (status = 503, description = "No live session for the instance")
    ),
    security(("api_key" = [])),
    tag = "v1"
)]
pub async fn send_message_v1(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<V1SendMessageRequest>,
) -> Result<Json<ApiReply<MessageSentData>>, AppError> {
    if body.to.trim().is_empty() || body.message.is_empty() {
        return Err(AppError::bad_request("Missing required fields")
            .with_details("Both \"to\" and \"message\" fields are required"));
    }

    let instances = connected_instances(&state, auth.user.id).await?;
    let instance = pick_instance(instances, body.instance_id.as_deref())?;
    let data = send_text(&state, &instance, &body.to, body.message).await?;

    info!(
        "User {} sent a message via {} to {}",
        auth.user.id, instance.instance_id, data.to
    );
    Ok(Json(ApiReply::ok("Message sent successfully", data)))
}

/// Send an image or document from one of the tenant's instances
///
/// @route POST /api/v1/send-media
/// @input Multipart: file, to, type (image|document), caption?, instance_id?
#[utoipa::path(
    post,
    path = "/api/v1/send-media",
    request_body(content_type = "multipart/form-data", description = "Fields: file, to, type, caption, instance_id"),
    responses(
        (status = 200, description = "Media sent", body = ApiReply<MediaSentData>),
        (status = 400, description = "Missing fields, invalid type or no connected instance"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 413, description = "File too large"),
        (status = 503, description = "No live session for the instance")
    ),
    security(("api_key" = [])),
    tag = "v1"
)]
pub async fn send_media_v1(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    mut multipart: Multipart,
) -> Result<Json<ApiReply<MediaSentData>>, AppError> {
    let form = read_media_form(&mut multipart, state.config.media.max_upload_bytes).await?;

    let (Some(to), Some(kind)) = (form.field("to"), form.field("type")) else {
        return Err(AppError::bad_request("Missing required fields")
            .with_details("Fields \"to\", \"file\", and \"type\" are required"));
    };
    if form.file.is_none() {
        return Err(AppError::bad_request("Missing required fields")
            .with_details("Fields \"to\", \"file\", and \"type\" are required"));
    }
    let as_document = match kind {
        "image" => false,
        "document" => true,
        _ => {
            return Err(AppError::bad_request("Invalid type")
                .with_details("Type must be either \"image\" or \"document\""))
        }
    };
    let to = to.to_string();
    let kind = kind.to_string();
    let caption = form.field("caption").unwrap_or_default().to_string();
    let requested = form.field("instance_id").map(str::to_string);

    let instances = connected_instances(&state, auth.user.id).await?;
    let instance = pick_instance(instances, requested.as_deref())?;
    let digits = recipient_digits(&state, &to)?;
    ensure_session(&state, &instance)?;

    let Some(file) = form.file else {
        return Err(AppError::bad_request("No file uploaded"));
    };
    let filename = file.filename.clone();
    let payload = MessagePayload::Media(MediaPayload {
        data: file.data,
        mime_type: file.mime_type,
        filename: file.filename,
        caption: Some(caption.clone()).filter(|c| !c.is_empty()),
        as_document,
    });

    state
        .manager
        .send(&instance.instance_id, &to_chat_id(&digits), payload)
        .await
        .map_err(send_error)?;

    info!(
        "User {} sent {} {} via {}",
        auth.user.id, kind, filename, instance.instance_id
    );
    Ok(Json(ApiReply::ok(
        "Media sent successfully",
        MediaSentData {
            to: to_jid(&digits),
            kind,
            filename,
            caption,
            instance_id: instance.instance_id,
            instance_name: instance.name,
            sent_at: Utc::now(),
        },
    )))
}

/// Connected instances of the tenant
///
/// @route GET /api/v1/instances
#[utoipa::path(
    get,
    path = "/api/v1/instances",
    responses(
        (status = 200, description = "Connected instances, newest first", body = ApiReply<Vec<InstanceSummary>>),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "v1"
)]
pub async fn list_instances_v1(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiReply<Vec<InstanceSummary>>>, AppError> {
    let rows = connected_instances(&state, auth.user.id)
        .await?
        .into_iter()
        .map(|i| InstanceSummary {
            instance_id: i.instance_id,
            name: i.name,
            status: i.status,
            updated_at: i.updated_at,
        })
        .collect();

    Ok(Json(ApiReply::ok("Instances retrieved successfully", rows)))
}

/// Remove the instance's device session and mark it disconnected
///
/// @route DELETE /api/v1/instances/{instance_id}
/// @side-effects Deletes the credential directory; the QR must be scanned again
#[utoipa::path(
    delete,
    path = "/api/v1/instances/{instance_id}",
    params(("instance_id" = String, Path, description = "Instance id")),
    responses(
        (status = 200, description = "Instance deleted", body = ApiReply<InstanceDeletedData>),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "Instance not found or not owned by the caller"),
        (status = 500, description = "Failed to delete instance")
    ),
    security(("api_key" = [])),
    tag = "v1"
)]
pub async fn delete_instance_v1(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(instance_id): Path<String>,
) -> Result<Json<ApiReply<InstanceDeletedData>>, AppError> {
    let instance = connected_instances(&state, auth.user.id)
        .await?
        .into_iter()
        .find(|i| i.instance_id == instance_id)
        .ok_or_else(|| {
            AppError::not_found("Instance not found").with_details(
                "The specified instance was not found or does not belong to your account",
            )
        })?;

    state.manager.remove(&instance_id).await.map_err(|e| {
        error!("Failed to remove device {}: {}", instance_id, e);
        AppError::from(e)
    })?;

    let updated =
        instances::mark_instance_disconnected(state.store.pool(), auth.user.id, &instance_id)
            .await
            .map_err(AppError::from)?;
    if !updated {
        warn!("Instance {} vanished before it could be marked disconnected", instance_id);
    }

    info!("User {} deleted instance {}", auth.user.id, instance_id);
    Ok(Json(ApiReply::ok(
        "Instance deleted successfully",
        InstanceDeletedData {
            instance_id,
            instance_name: instance.name,
            deleted_at: Utc::now(),
            note: "All session files have been removed. You will need to scan the QR code \
                   again to reconnect this instance."
                .to_string(),
        },
    )))
}

/// Legacy listing under `instances`
///
/// @route GET /api/instances
#[utoipa::path(
    get,
    path = "/api/instances",
    responses(
        (status = 200, description = "Connected instances", body = LegacyInstancesReply),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = [])),
    tag = "legacy"
)]
pub async fn list_instances_legacy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<LegacyInstancesReply>, AppError> {
    let instances = connected_instances(&state, auth.user.id)
        .await?
        .into_iter()
        .map(|i| LegacyInstanceSummary {
            id: i.instance_id,
            name: i.name,
            status: i.status,
            updated_at: i.updated_at,
        })
        .collect();

    Ok(Json(LegacyInstancesReply {
        success: true,
        message: "Instances retrieved successfully".to_string(),
        instances,
    }))
}

/// Legacy send; the instance must be named and connected
///
/// @route POST /api/send-message
/// @input Json(body): LegacySendMessageRequest - `{instanceId, to, message}`
#[utoipa::path(
    post,
    path = "/api/send-message",
    request_body = LegacySendMessageRequest,
    responses(
        (status = 200, description = "Message sent", body = ApiReply<MessageSentData>),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "Instance not found or not owned by the caller"),
        (status = 503, description = "Instance not connected")
    ),
    security(("api_key" = [])),
    tag = "legacy"
)]
pub async fn send_message_legacy(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<LegacySendMessageRequest>,
) -> Result<Json<ApiReply<MessageSentData>>, AppError> {
    let instance_id = match body.instance_id.as_deref() {
        Some(id) if !body.to.trim().is_empty() && !body.message.is_empty() => id.to_string(),
        _ => {
            return Err(AppError::bad_request("Missing required fields")
                .with_details("Fields \"instanceId\", \"to\", and \"message\" are required"))
        }
    };

    let instance = instances::find_user_instance(state.store.pool(), auth.user.id, &instance_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            AppError::not_found("Instance not found").with_details(
                "The specified instance was not found or does not belong to your account",
            )
        })?;
    if !instance.is_connected() {
        return Err(AppError::service_unavailable("Instance not connected")
            .with_details("The selected WhatsApp instance is not connected"));
    }

    let data = send_text(&state, &instance, &body.to, body.message).await?;
    Ok(Json(ApiReply::ok("Message sent successfully", data)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn instance(id: &str) -> Instance {
        Instance {
            id: 1,
            user_id: 1,
            instance_id: id.to_string(),
            name: id.to_uppercase(),
            status: instances::STATUS_CONNECTED.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_select_instance_prefers_requested() {
        let list = vec![instance("a"), instance("b"), instance("c")];
        assert_eq!(
            select_instance(list.clone(), Some("c")).unwrap().instance_id,
            "c"
        );
        // Unknown ids fall back to the first (most recent) instance
        assert_eq!(
            select_instance(list.clone(), Some("zzz")).unwrap().instance_id,
            "a"
        );
        assert_eq!(select_instance(list, None).unwrap().instance_id, "a");
        assert!(select_instance(Vec::new(), Some("a")).is_none());
    }

    #[test]
    fn test_lost_session_maps_to_unavailable() {
        let err = send_error(WaSrvError::session_gone("a"));
        assert_eq!(err.status, axum::http::StatusCode::SERVICE_UNAVAILABLE);
        let err = send_error(WaSrvError::send("rejected"));
        assert_eq!(err.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
