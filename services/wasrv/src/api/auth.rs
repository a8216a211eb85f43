//! API key authentication for the tenant routes
//!
//! Keys arrive as `Authorization: Bearer <key>`, a bare `Authorization: <key>`
//! or `X-API-Key: <key>`. Lookup goes by the first eight characters, then the
//! stored bcrypt hash is verified and the usage counter bumped.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::app_state::AppState;
use crate::error::{Result, WaSrvError};
use crate::store::{api_keys, Store, User};
use common::AppError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Identity attached to authenticated requests
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub key_id: i64,
    pub key_name: String,
}

/// `Authorization` wins over `X-API-Key` when both are present
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let header = |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(value) = header(AUTHORIZATION.as_str()) {
        let key = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }
    header(API_KEY_HEADER).map(str::to_string)
}

pub async fn authenticate(store: &Store, key: &str) -> Result<AuthContext> {
    if !api_keys::has_valid_scheme(key) {
        return Err(WaSrvError::unauthorized(
            "API key must start with \"wapi_\" or \"wa_\"",
        ));
    }

    let pool = store.pool();
    let record = api_keys::find_active_key_by_prefix(pool, &api_keys::key_prefix(key))
        .await?
        .ok_or_else(|| WaSrvError::unauthorized("API key not found or inactive"))?;

    if record.is_expired(Utc::now()) {
        return Err(WaSrvError::unauthorized("API key expired"));
    }
    if record.is_over_limit() {
        return Err(WaSrvError::UsageLimitExceeded(
            "API key usage limit has been reached".to_string(),
        ));
    }
    if !api_keys::verify_key(key, &record.key_hash).await? {
        return Err(WaSrvError::unauthorized("API key authentication failed"));
    }

    let user = api_keys::find_user(pool, record.user_id)
        .await?
        .ok_or_else(|| WaSrvError::unauthorized("Associated user account not found"))?;

    api_keys::record_key_usage(pool, record.id).await?;

    Ok(AuthContext {
        user,
        key_id: record.id,
        key_name: record.name,
    })
}

/// Route layer guarding the tenant routes
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let Some(key) = extract_api_key(req.headers()) else {
        return Err(AppError::unauthorized("API key required").with_details(
            "Authorization header or X-API-Key header with API key is required",
        ));
    };

    let context = authenticate(&state.store, &key).await.map_err(|e| {
        warn!("API key rejected for {}: {}", req.uri().path(), e);
        AppError::from(e)
    })?;

    debug!(
        "Authenticated user {} with key '{}'",
        context.user.id, context.key_name
    );
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}
