//! Device API Handlers
//!
//! Unauthenticated per-device control: start, status, removal and sends.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    response::Json,
};
use tracing::{error, info};

use crate::api::upload::read_media_form;
use crate::app_state::AppState;
use crate::client::{MediaPayload, MessagePayload};
use crate::core::sessions::DeviceStatus;
use crate::dto::{RemoveResponse, SendMediaResponse, SendResponse, SendTextRequest, StartResponse};
use crate::utils::{is_valid_device_id, to_chat_id};
use common::AppError;

pub(crate) fn validate_device_id(id: &str) -> Result<(), AppError> {
    if is_valid_device_id(id) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!("Invalid device id: {:?}", id)))
    }
}

/// List every device with its status
///
/// @route GET /api/devices
/// @output Json<HashMap<String, DeviceStatus>> - device id → status
#[utoipa::path(
    get,
    path = "/api/devices",
    responses(
        (status = 200, description = "Status of every known device", body = HashMap<String, DeviceStatus>)
    ),
    tag = "devices"
)]
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<HashMap<String, DeviceStatus>> {
    Json(state.manager.statuses())
}

/// Status of one device
///
/// @route GET /api/devices/{id}/status
/// @status 404 - Unknown device
#[utoipa::path(
    get,
    path = "/api/devices/{id}/status",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Device status", body = DeviceStatus),
        (status = 404, description = "Device not found")
    ),
    tag = "devices"
)]
pub async fn get_device_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceStatus>, AppError> {
    validate_device_id(&id)?;
    state
        .manager
        .status(&id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("Device not found"))
}

/// Start a device session
///
/// @route POST /api/devices/{id}/start
/// @status 409 - Session already running
/// @status 500 - Protocol client could not create a handle
#[utoipa::path(
    post,
    path = "/api/devices/{id}/start",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Session starting", body = StartResponse),
        (status = 409, description = "Device already running"),
        (status = 500, description = "Failed to start device")
    ),
    tag = "devices"
)]
pub async fn start_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StartResponse>, AppError> {
    validate_device_id(&id)?;
    state.manager.start(&id, false).await.map_err(|e| {
        error!("[{}] start failed: {}", id, e);
        AppError::from(e)
    })?;

    Ok(Json(StartResponse {
        status: "starting".to_string(),
        device: id,
    }))
}

/// Remove a device and its stored credentials
///
/// @route DELETE /api/devices/{id}
/// @side-effects Closes the session and deletes the credential directory
#[utoipa::path(
    delete,
    path = "/api/devices/{id}",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Device removed", body = RemoveResponse),
        (status = 500, description = "Credential purge failed")
    ),
    tag = "devices"
)]
pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RemoveResponse>, AppError> {
    validate_device_id(&id)?;
    state.manager.remove(&id).await.map_err(|e| {
        error!("Failed to remove device {}: {}", id, e);
        AppError::from(e)
    })?;

    let message = format!(
        "Device {} and all associated session files have been removed. \
         User must rescan WhatsApp QR code to reconnect.",
        id
    );
    Ok(Json(RemoveResponse {
        status: "removed".to_string(),
        device: id,
        message,
    }))
}

/// Send a text message through the device
///
/// @route POST /api/devices/{id}/send
/// @input Json(body): SendTextRequest - `{to, message}`
#[utoipa::path(
    post,
    path = "/api/devices/{id}/send",
    params(("id" = String, Path, description = "Device id")),
    request_body = SendTextRequest,
    responses(
        (status = 200, description = "Message sent", body = SendResponse),
        (status = 400, description = "Missing recipient or message"),
        (status = 404, description = "Device not found or not started"),
        (status = 500, description = "Failed to send message")
    ),
    tag = "devices"
)]
pub async fn send_device_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SendTextRequest>,
) -> Result<Json<SendResponse>, AppError> {
    validate_device_id(&id)?;
    if body.to.trim().is_empty() || body.message.is_empty() {
        return Err(AppError::bad_request("Both \"to\" and \"message\" are required"));
    }

    let payload = MessagePayload::Text(body.message);
    let kind = payload.kind();
    state
        .manager
        .send(&id, &to_chat_id(&body.to), payload)
        .await
        .map_err(AppError::from)?;

    Ok(Json(SendResponse {
        status: "sent".to_string(),
        to: body.to,
        kind: kind.to_string(),
    }))
}

/// Send an uploaded file through the device
///
/// `image/*` uploads go out as inline images, anything else as a document.
///
/// @route POST /api/devices/{id}/send-media
/// @input Multipart: file, to, caption (optional)
#[utoipa::path(
    post,
    path = "/api/devices/{id}/send-media",
    params(("id" = String, Path, description = "Device id")),
    request_body(content_type = "multipart/form-data", description = "Fields: file, to, caption"),
    responses(
        (status = 200, description = "Media sent", body = SendMediaResponse),
        (status = 400, description = "No file uploaded"),
        (status = 404, description = "Device not found or not started"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Failed to send media message")
    ),
    tag = "devices"
)]
pub async fn send_device_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<SendMediaResponse>, AppError> {
    validate_device_id(&id)?;
    if state.manager.registry().handle(&id).is_none() {
        return Err(AppError::not_found("Device not found or not started"));
    }

    let form = read_media_form(&mut multipart, state.config.media.max_upload_bytes).await?;
    let to = form
        .field("to")
        .map(str::to_string)
        .ok_or_else(|| AppError::bad_request("Field \"to\" is required"))?;
    let caption = form.field("caption").map(str::to_string);
    let Some(file) = form.file else {
        return Err(AppError::bad_request("No file uploaded"));
    };

    let filename = file.filename.clone();
    let payload = MessagePayload::Media(MediaPayload {
        as_document: !file.is_image(),
        data: file.data,
        mime_type: file.mime_type,
        filename: file.filename,
        caption,
    });
    let kind = payload.kind();

    state
        .manager
        .send(&id, &to_chat_id(&to), payload)
        .await
        .map_err(AppError::from)?;
    info!("[{}] {} {} sent to {}", id, kind, filename, to);

    Ok(Json(SendMediaResponse {
        status: "sent".to_string(),
        to,
        kind: kind.to_string(),
        filename,
    }))
}
