//! Error handling for the gateway service

use axum::http::StatusCode;
use thiserror::Error;

/// Gateway service error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaSrvError {
    /// A live handle or an in-flight start already exists for the device
    #[error("Device already running: {0}")]
    AlreadyRunning(String),

    /// No live handle, or the handle was torn down while in use
    #[error("Device not connected: {0}")]
    SessionGone(String),

    /// Credential directory could not be removed
    #[error("Credential purge failed: {0}")]
    CredentialPurgeFailed(String),

    /// The protocol client could not create a handle
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Retry ceiling reached for a device without stored credentials
    #[error("Reconnect attempts exhausted: {0}")]
    RetryExhausted(String),

    /// The protocol client rejected an outbound message
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    IoError(String),

    /// Missing, invalid or expired API key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Usage limit exceeded: {0}")]
    UsageLimitExceeded(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the gateway service
pub type Result<T> = std::result::Result<T, WaSrvError>;

impl WaSrvError {
    pub fn already_running(device_id: impl std::fmt::Display) -> Self {
        WaSrvError::AlreadyRunning(device_id.to_string())
    }

    pub fn session_gone(device_id: impl std::fmt::Display) -> Self {
        WaSrvError::SessionGone(device_id.to_string())
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        WaSrvError::HandshakeFailed(msg.into())
    }

    pub fn send(msg: impl Into<String>) -> Self {
        WaSrvError::SendFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        WaSrvError::ConfigError(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        WaSrvError::DatabaseError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        WaSrvError::IoError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        WaSrvError::Unauthorized(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        WaSrvError::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        WaSrvError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        WaSrvError::InternalError(msg.into())
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning(_) => "WASRV_ALREADY_RUNNING",
            Self::SessionGone(_) => "WASRV_SESSION_GONE",
            Self::CredentialPurgeFailed(_) => "WASRV_CREDENTIAL_PURGE_FAILED",
            Self::HandshakeFailed(_) => "WASRV_HANDSHAKE_FAILED",
            Self::RetryExhausted(_) => "WASRV_RETRY_EXHAUSTED",
            Self::SendFailed(_) => "WASRV_SEND_FAILED",
            Self::ConfigError(_) => "WASRV_CONFIG_ERROR",
            Self::DatabaseError(_) => "WASRV_DATABASE_ERROR",
            Self::IoError(_) => "WASRV_IO_ERROR",
            Self::Unauthorized(_) => "WASRV_UNAUTHORIZED",
            Self::UsageLimitExceeded(_) => "WASRV_USAGE_LIMIT",
            Self::ValidationError(_) => "WASRV_VALIDATION_ERROR",
            Self::NotFound(_) => "WASRV_NOT_FOUND",
            Self::InternalError(_) => "WASRV_INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::AlreadyRunning(_) => StatusCode::CONFLICT,
            Self::SessionGone(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RetryExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::UsageLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::CredentialPurgeFailed(_)
            | Self::HandshakeFailed(_)
            | Self::SendFailed(_)
            | Self::ConfigError(_)
            | Self::DatabaseError(_)
            | Self::IoError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for WaSrvError {
    fn from(err: std::io::Error) -> Self {
        WaSrvError::IoError(err.to_string())
    }
}

impl From<sqlx::Error> for WaSrvError {
    fn from(err: sqlx::Error) -> Self {
        WaSrvError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for WaSrvError {
    fn from(err: serde_json::Error) -> Self {
        WaSrvError::InternalError(format!("JSON: {err}"))
    }
}

impl From<figment::Error> for WaSrvError {
    fn from(err: figment::Error) -> Self {
        WaSrvError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding context to foreign errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn io_error(self, msg: &str) -> Result<T>;
    fn database_error(self, msg: &str) -> Result<T>;
    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| WaSrvError::ConfigError(format!("{msg}: {e}")))
    }

    fn io_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| WaSrvError::IoError(format!("{msg}: {e}")))
    }

    fn database_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| WaSrvError::DatabaseError(format!("{msg}: {e}")))
    }

    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| WaSrvError::InternalError(format!("{msg}: {e}")))
    }
}

// ============================================================================
// API Adaptation: WaSrvError → AppError conversion
// ============================================================================

impl From<WaSrvError> for common::AppError {
    fn from(err: WaSrvError) -> Self {
        use common::{AppError, ErrorInfo};

        let status = err.http_status();
        let error_info = ErrorInfo::new(err.to_string())
            .with_code(status.as_u16())
            .with_details(format!("error_code: {}", err.error_code()));

        AppError::new(status, error_info)
    }
}
