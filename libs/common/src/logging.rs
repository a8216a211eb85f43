//! Logging setup for gateway services
//!
//! Console output plus a daily rolling file per service. HTTP access lines go
//! to the `api_access` target and land in a separate `{service}_api` file.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Target used by [`http_request_logger`]
pub const API_ACCESS_TARGET: &str = "api_access";

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `timestamp [LEVEL] message`
///
/// Example output: `2026-03-02T00:50:44.809120Z [INFO] device started`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking writers flushing for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

fn keep_guard(guard: WorkerGuard) {
    let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
    match guards.lock() {
        Ok(mut slot) => slot.push(guard),
        Err(poisoned) => poisoned.into_inner().push(guard),
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as file prefix and default filter target
    pub service_name: String,
    /// Directory for the rolling files
    pub log_dir: PathBuf,
    /// Base level when `RUST_LOG` is unset
    pub level: Level,
    /// Write the service file as JSON lines
    pub enable_json: bool,
    /// ANSI colours on the console
    pub ansi: bool,
    /// Separate file for the `api_access` target
    pub enable_api_log: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: PathBuf::from("logs"),
            level: Level::INFO,
            enable_json: false,
            ansi: true,
            enable_api_log: true,
        }
    }
}

/// Filter string used when `RUST_LOG` is not set
pub fn default_filter(config: &LogConfig) -> String {
    let base = config.level.as_str().to_lowercase();
    let api = if config.enable_api_log { "info" } else { "off" };
    format!(
        "{},{}=debug,{}={}",
        base, config.service_name, API_ACCESS_TARGET, api
    )
}

/// Initialize the global subscriber
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.log_dir)?;

    let env_filter = match std::env::var("RUST_LOG") {
        Ok(spec) if spec.contains(API_ACCESS_TARGET) => EnvFilter::try_new(spec)?,
        Ok(spec) => EnvFilter::try_new(format!("{},{}=info", spec, API_ACCESS_TARGET))?,
        Err(_) => EnvFilter::try_new(default_filter(&config))?,
    };

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let service_appender =
        tracing_appender::rolling::daily(&config.log_dir, format!("{}.log", config.service_name));
    let (service_writer, guard) = tracing_appender::non_blocking(service_appender);
    keep_guard(guard);

    let service_file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(service_writer)
            .with_target(true)
            .with_filter(filter::filter_fn(|meta| meta.target() != API_ACCESS_TARGET))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(service_writer)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .with_filter(filter::filter_fn(|meta| meta.target() != API_ACCESS_TARGET))
            .boxed()
    };

    let api_file_layer = if config.enable_api_log {
        let api_appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}_api.log", config.service_name),
        );
        let (api_writer, api_guard) = tracing_appender::non_blocking(api_appender);
        keep_guard(api_guard);
        Some(
            fmt::layer()
                .with_writer(api_writer)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .with_filter(filter::filter_fn(|meta| meta.target() == API_ACCESS_TARGET))
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(service_file_layer)
        .with(api_file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "api_key",
    "apikey",
    "secret",
    "authorization",
];

/// Replace values of sensitive keys in a JSON document
///
/// Non-JSON input is returned unchanged.
pub fn redact_sensitive_fields(json_str: &str) -> String {
    use serde_json::Value;

    let Ok(mut value) = serde_json::from_str::<Value>(json_str) else {
        return json_str.to_string();
    };

    fn redact_recursive(value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    if SENSITIVE_KEYS.iter().any(|&k| key_lower.contains(k)) {
                        *val = Value::String("***REDACTED***".to_string());
                    } else {
                        redact_recursive(val);
                    }
                }
            },
            Value::Array(arr) => arr.iter_mut().for_each(redact_recursive),
            _ => {},
        }
    }

    redact_recursive(&mut value);
    serde_json::to_string(&value).unwrap_or_else(|_| json_str.to_string())
}

/// Cut a body to at most `max_length` bytes on a char boundary
pub fn truncate_body(body: &str, max_length: usize) -> String {
    if body.len() <= max_length {
        return body.to_string();
    }
    let mut cut = max_length;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}[truncated {} bytes]", &body[..cut], body.len() - cut)
}

/// HTTP access logger middleware
///
/// - modifying methods (POST/PUT/PATCH/DELETE) are logged at INFO without body
/// - at DEBUG every request is logged; JSON bodies are included, redacted and
///   truncated to 500 bytes
///
/// Register before `.with_state()`:
/// ```rust,ignore
/// Router::new()
///     .route("/api/devices", get(list_devices))
///     .layer(axum::middleware::from_fn(common::logging::http_request_logger))
///     .with_state(state);
/// ```
#[cfg(feature = "axum")]
pub async fn http_request_logger(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::body::Body;
    use std::time::Instant;
    use tracing::{debug, info, level_enabled};

    const MAX_BODY_LENGTH: usize = 500;
    // Larger bodies (media uploads) are never buffered for logging
    const MAX_BUFFERED_BODY: usize = 64 * 1024;

    let method = req.method().clone();
    let uri = req.uri().clone();
    let modifying = matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE");
    let is_json = req
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let start = Instant::now();

    let (req, body_str) = if level_enabled!(Level::DEBUG) && modifying && is_json {
        let (parts, body) = req.into_parts();
        match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
            Ok(bytes) => {
                let body_str = match std::str::from_utf8(&bytes) {
                    Ok(s) => truncate_body(&redact_sensitive_fields(s), MAX_BODY_LENGTH),
                    Err(_) => "<binary data>".to_string(),
                };
                (
                    axum::extract::Request::from_parts(parts, Body::from(bytes)),
                    Some(body_str),
                )
            },
            Err(e) => {
                tracing::warn!("Request body unreadable for logging: {}", e);
                let req = axum::extract::Request::from_parts(parts, Body::empty());
                return next.run(req).await;
            },
        }
    } else {
        (req, None)
    };

    let response = next.run(req).await;
    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    if modifying {
        info!(
            target: "api_access",
            method = %method,
            path = %uri.path(),
            status = %status,
            duration_ms = %duration_ms,
            "HTTP request"
        );
    }

    match body_str {
        Some(body) => debug!(
            target: "api_access",
            method = %method,
            path = %uri.path(),
            status = %status,
            duration_ms = %duration_ms,
            request_body = %body,
            "HTTP request (detailed)"
        ),
        None if !modifying => debug!(
            target: "api_access",
            method = %method,
            path = %uri.path(),
            status = %status,
            duration_ms = %duration_ms,
            "HTTP request"
        ),
        None => {},
    }

    response
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_redacts_nested_sensitive_fields() {
        let input = r#"{"to":"923001234567","auth":{"api_key":"wapi_abc","Password":"x"}}"#;
        let redacted = redact_sensitive_fields(input);
        let value: serde_json::Value = serde_json::from_str(&redacted).unwrap();
        assert_eq!(value["to"], "923001234567");
        assert_eq!(value["auth"]["api_key"], "***REDACTED***");
        assert_eq!(value["auth"]["Password"], "***REDACTED***");
    }

    #[test]
    fn test_non_json_passes_through() {
        assert_eq!(redact_sensitive_fields("plain text"), "plain text");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let body = "é".repeat(10);
        let cut = truncate_body(&body, 5);
        assert!(cut.starts_with("éé"));
        assert!(cut.ends_with("[truncated 16 bytes]"));
        assert_eq!(truncate_body("short", 500), "short");
    }

    #[test]
    fn test_default_filter_includes_service_and_access_targets() {
        let config = LogConfig {
            service_name: "wasrv".to_string(),
            ..Default::default()
        };
        assert_eq!(default_filter(&config), "info,wasrv=debug,api_access=info");

        let quiet = LogConfig {
            service_name: "wasrv".to_string(),
            enable_api_log: false,
            level: Level::WARN,
            ..Default::default()
        };
        assert_eq!(default_filter(&quiet), "warn,wasrv=debug,api_access=off");
    }

    #[cfg(feature = "axum")]
    #[tokio::test]
    async fn test_request_logger_passes_json_body_through() {
        use axum::{body::Body, http::Request, middleware, routing::post, Router};
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let app = Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .layer(middleware::from_fn(http_request_logger));

        let payload = r#"{"to":"923001234567","api_key":"wapi_secret"}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header("content-type", "application/json")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], payload.as_bytes());
    }
}
