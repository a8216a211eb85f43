//! API Route Configuration
//!
//! Central route definition for all gateway endpoints

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

#[cfg(feature = "swagger-ui")]
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::api::auth::{require_api_key, API_KEY_HEADER};
use crate::api::device_handlers::{
    get_device_status, list_devices, remove_device, send_device_media, send_device_message,
    start_device,
};
use crate::api::health_handlers::{health_check, system_info};
use crate::api::v1_handlers::{
    delete_instance_v1, list_instances_legacy, list_instances_v1, send_media_v1,
    send_message_legacy, send_message_v1,
};
use crate::app_state::AppState;

/// Room for multipart framing and text fields on top of the file itself
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

// OpenAPI documentation - only compiled when swagger-ui feature is enabled
#[cfg(feature = "swagger-ui")]
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::device_handlers::list_devices,
        crate::api::device_handlers::get_device_status,
        crate::api::device_handlers::start_device,
        crate::api::device_handlers::remove_device,
        crate::api::device_handlers::send_device_message,
        crate::api::device_handlers::send_device_media,
        crate::api::v1_handlers::send_message_v1,
        crate::api::v1_handlers::send_media_v1,
        crate::api::v1_handlers::list_instances_v1,
        crate::api::v1_handlers::delete_instance_v1,
        crate::api::v1_handlers::list_instances_legacy,
        crate::api::v1_handlers::send_message_legacy,
        crate::api::health_handlers::health_check,
        crate::api::health_handlers::system_info
    ),
    components(
        schemas(
            crate::core::sessions::DeviceStatus,
            crate::core::sessions::SessionStatus,
            crate::dto::SendTextRequest,
            crate::dto::StartResponse,
            crate::dto::RemoveResponse,
            crate::dto::SendResponse,
            crate::dto::SendMediaResponse,
            crate::dto::V1SendMessageRequest,
            crate::dto::LegacySendMessageRequest,
            crate::dto::MessageSentData,
            crate::dto::MediaSentData,
            crate::dto::InstanceSummary,
            crate::dto::InstanceDeletedData,
            crate::dto::LegacyInstanceSummary,
            crate::dto::LegacyInstancesReply,
            common::ErrorResponse,
            common::ErrorInfo
        )
    ),
    modifiers(&ApiKeyAddon),
    tags(
        (name = "devices", description = "Device session control"),
        (name = "v1", description = "API-key authenticated tenant API"),
        (name = "legacy", description = "Pre-v1 tenant routes"),
        (name = "system", description = "Health and host metrics")
    )
)]
pub struct WaSrvApiDoc;

#[cfg(feature = "swagger-ui")]
struct ApiKeyAddon;

#[cfg(feature = "swagger-ui")]
impl Modify for ApiKeyAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            },
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .allow_credentials(true)
}

/// Create all API routes for the gateway
pub fn create_routes(state: Arc<AppState>) -> Router {
    let body_limit = state.config.media.max_upload_bytes + FORM_OVERHEAD_BYTES;
    let cors = cors_layer(&state.config.api.cors_origins);

    // Tenant routes share the API key check
    let tenant = Router::new()
        .route("/api/v1/send-message", post(send_message_v1))
        .route("/api/v1/send-media", post(send_media_v1))
        .route("/api/v1/instances", get(list_instances_v1))
        .route("/api/v1/instances/{instance_id}", delete(delete_instance_v1))
        .route("/api/instances", get(list_instances_legacy))
        .route("/api/send-message", post(send_message_legacy))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/system", get(system_info))
        // Device control
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}", delete(remove_device))
        .route("/api/devices/{id}/status", get(get_device_status))
        .route("/api/devices/{id}/start", post(start_device))
        .route("/api/devices/{id}/send", post(send_device_message))
        .route("/api/devices/{id}/send-media", post(send_device_media))
        .merge(tenant)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        // Apply HTTP request logging middleware
        .layer(middleware::from_fn(common::logging::http_request_logger))
        .with_state(state)
}
