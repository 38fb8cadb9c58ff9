//! Request logging middleware and domain event logging.
//!
//! This module provides:
//! - Subscriber initialisation for the service binaries
//! - Unique request ID tracking, with the ID echoed in `X-Request-Id`
//! - Request timing with method, path and status
//! - Structured key and server lifecycle events
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use ggmp::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use std::str::FromStr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use tracing::{info, info_span, warn, Instrument, Level};
use uuid::Uuid;

use crate::config::LoggingConfig;

/// Install the global fmt subscriber at the configured level.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logging(config: &LoggingConfig) {
    let level = Level::from_str(&config.level).unwrap_or(Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// Shorten a license key for log output.
pub fn key_prefix(key: &str) -> String {
    let prefix: String = key.chars().take(10).collect();
    if prefix.len() < key.len() {
        format!("{prefix}...")
    } else {
        prefix
    }
}

/// License key lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// Key was registered or overwritten
    Registered,
    /// Key validated successfully
    Validated,
    /// Key validation failed
    ValidationFailed,
    /// Key was revoked
    Revoked,
}

impl std::fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KeyEvent::Registered => "registered",
            KeyEvent::Validated => "validated",
            KeyEvent::ValidationFailed => "validation_failed",
            KeyEvent::Revoked => "revoked",
        };
        write!(f, "{}", s)
    }
}

/// Log a key event. The key itself is truncated.
pub fn log_key_event(event: KeyEvent, key: &str, details: Option<&str>) {
    let span = info_span!(
        "key_event",
        event = %event,
        key = %key_prefix(key),
    );
    let _enter = span.enter();

    match (event, details) {
        (KeyEvent::ValidationFailed, Some(d)) => warn!(reason = %d, "Key event occurred"),
        (KeyEvent::ValidationFailed, None) => warn!("Key event occurred"),
        (_, Some(d)) => info!(details = %d, "Key event occurred"),
        (_, None) => info!("Key event occurred"),
    }
}

/// Game-server registry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    Registered,
    Heartbeat,
    Unregistered,
    /// Removed by the stale-server sweep
    Evicted,
}

impl std::fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerEvent::Registered => "registered",
            ServerEvent::Heartbeat => "heartbeat",
            ServerEvent::Unregistered => "unregistered",
            ServerEvent::Evicted => "evicted",
        };
        write!(f, "{}", s)
    }
}

/// Log a registry event.
pub fn log_server_event(event: ServerEvent, server_id: &str, name: Option<&str>) {
    let span = info_span!(
        "server_event",
        event = %event,
        server_id = %server_id,
    );
    let _enter = span.enter();

    let name = name.unwrap_or("Unknown");
    match event {
        ServerEvent::Heartbeat => tracing::debug!(name = %name, "Server event occurred"),
        ServerEvent::Evicted => warn!(name = %name, "Server event occurred"),
        _ => info!(name = %name, "Server event occurred"),
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}
