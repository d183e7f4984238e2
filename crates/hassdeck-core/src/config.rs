// ── Runtime connection configuration ──
//
// These types describe *how* to reach a Home Assistant hub and how
// interactive controls time out. They carry the token but never touch
// disk; the CLI builds a `ControllerConfig` from its profile and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed hubs on the LAN).
    DangerAcceptInvalid,
}

/// Timing of the optimistic commit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTiming {
    /// How long a commit may stay unconfirmed before rolling back.
    pub deadline: Duration,
    /// Spacing between unconditional re-sends of a commit.
    pub retry_interval: Duration,
    /// Re-sends per commit, not counting the first dispatch.
    pub max_retries: u8,
}

impl Default for ControlTiming {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(5000),
            retry_interval: Duration::from_millis(300),
            max_retries: 2,
        }
    }
}

/// Configuration for connecting to a single hub.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Hub URL (e.g. `http://homeassistant.local:8123`).
    pub url: Url,
    /// Long-lived access token.
    pub token: SecretString,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Period of the background state refresh. Zero disables it.
    pub refresh_interval: Duration,
    pub timing: ControlTiming,
}

impl ControllerConfig {
    pub fn new(url: Url, token: SecretString) -> Self {
        Self {
            url,
            token,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(2),
            timing: ControlTiming::default(),
        }
    }
}
