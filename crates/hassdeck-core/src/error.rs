// ── Core error types ──
//
// User-facing errors from hassdeck-core. Consumers never see HTTP status
// codes or JSON parse failures directly; `From<hassdeck_api::Error>`
// translates transport failures into domain variants. The control state
// machines themselves never fail and do not use this type.

use thiserror::Error;

use crate::model::DeviceId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Home Assistant at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {id}")]
    DeviceNotFound { id: DeviceId },

    #[error("Device {id} is not mapped to a Home Assistant entity")]
    NotMapped { id: DeviceId },

    #[error("Entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} ({reason})")]
    Unsupported { operation: String, reason: String },

    #[error("Home Assistant error: {message}")]
    Api { message: String, status: Option<u16> },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hassdeck_api::Error> for CoreError {
    fn from(err: hassdeck_api::Error) -> Self {
        use hassdeck_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } | ApiError::Forbidden { message } => {
                CoreError::AuthenticationFailed { message }
            }
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::Api { status: 404, message } => CoreError::EntityNotFound { entity_id: message },
            ApiError::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
