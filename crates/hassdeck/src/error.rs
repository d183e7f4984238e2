//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hassdeck_config::ConfigError;
use hassdeck_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const ROLLED_BACK: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Home Assistant at {url}")]
    #[diagnostic(
        code(hassdeck::connection_failed),
        help(
            "Check that the hub is running and reachable.\n\
             URL: {url}\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(hassdeck::auth_failed),
        help(
            "Create a long-lived access token under your Home Assistant profile,\n\
             then run: hassdeck config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(hassdeck::no_token),
        help(
            "Configure one with: hassdeck config init\n\
             Or set the HASSDECK_TOKEN environment variable."
        )
    )]
    NoToken { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hassdeck::not_found),
        help("Run: hassdeck {list_command} to see what exists")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Device {id} is not mapped to a Home Assistant entity")]
    #[diagnostic(
        code(hassdeck::not_mapped),
        help("Map it first: hassdeck map set {id} <entity_id>")
    )]
    NotMapped { id: u32 },

    // ── Hub ──────────────────────────────────────────────────────────
    #[error("Home Assistant error: {message}")]
    #[diagnostic(code(hassdeck::api_error))]
    ApiError { message: String, status: Option<u16> },

    #[error("Operation '{operation}' is not supported: {reason}")]
    #[diagnostic(code(hassdeck::unsupported))]
    Unsupported { operation: String, reason: String },

    #[error("{attribute} was not confirmed by the hub; rolled back to {value}")]
    #[diagnostic(
        code(hassdeck::rolled_back),
        help(
            "The hub never reported the new value. Check the entity in Home Assistant,\n\
             or allow more time with --deadline-ms."
        )
    )]
    RolledBack { attribute: String, value: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hassdeck::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hassdeck::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hassdeck config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No hub configured")]
    #[diagnostic(
        code(hassdeck::no_config),
        help(
            "Create a profile with: hassdeck config init\n\
             Expected at: {path}\n\
             Or pass --url and --token."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(hassdeck::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(hassdeck::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(hassdeck::timeout),
        help("Increase timeout with --timeout or check hub responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoToken { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NotMapped { .. } | Self::ProfileNotFound { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::RolledBack { .. } => exit_code::ROLLED_BACK,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn device_not_found(id: u32) -> Self {
        Self::NotFound {
            resource_type: "device".into(),
            identifier: id.to_string(),
            list_command: "devices list".into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::ControllerDisconnected => CliError::ConnectionFailed {
                url: "(disconnected)".into(),
                reason: "connection to the hub was lost".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::DeviceNotFound { id } => CliError::device_not_found(id.0),

            CoreError::NotMapped { id } => CliError::NotMapped { id: id.0 },

            CoreError::EntityNotFound { entity_id } => CliError::NotFound {
                resource_type: "entity".into(),
                identifier: entity_id,
                list_command: "map list".into(),
            },

            CoreError::Unsupported { operation, reason } => {
                CliError::Unsupported { operation, reason }
            }

            CoreError::Api { message, status } => CliError::ApiError { message, status },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoToken { profile } => CliError::NoToken { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            other => CliError::Config(other),
        }
    }
}
