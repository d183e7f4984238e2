//! Shared configuration for hassdeck.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), the
//! file-backed store for persisted dashboard state, and translation to
//! `hassdeck_core::ControllerConfig`. The CLI adds flag-aware wrappers on top.

mod defaults;
mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hassdeck_core::{ControllerConfig, TlsVerification};

pub use defaults::default_devices;
pub use store::{DEVICES_KEY, KvStore, LOGS_KEY, MAPPINGS_KEY};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "hassdeck";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoToken { profile: String },

    #[error("profile '{name}' not found in config")]
    ProfileNotFound { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to encode '{key}': {source}")]
    Json {
        key: String,
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`, else "default".
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}

/// A named hub profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Hub base URL, e.g. "http://homeassistant.local:8123".
    pub url: String,

    /// Long-lived access token (plaintext; prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// State refresh period in seconds; 0 disables background refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,

    /// Where device lists, mappings and logs are persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Path to a custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid TLS certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Override the request timeout, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "hassdeck", "hassdeck")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Persisted-state directory for a profile.
pub fn state_dir(profile: &Profile, profile_name: &str) -> PathBuf {
    if let Some(dir) = &profile.state_dir {
        return dir.clone();
    }
    project_dirs()
        .map_or_else(
            || home_fallback(".local/share"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
        .join(profile_name)
}

fn home_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("hassdeck");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file path, layered as defaults → file →
/// `HASSDECK_` environment (nested keys separated by `__`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HASSDECK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

/// Resolve the access token: `token_env` → keyring → plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        keyring_token,
    )
}

/// The resolution chain with its two lookups injected.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(val) = profile.token_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Some(secret) = keyring(profile_name) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken {
        profile: profile_name.into(),
    })
}

fn keyring_token(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .ok()?
        .get_password()
        .ok()
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Profile → ControllerConfig ──────────────────────────────────────

/// Build a `ControllerConfig` from a profile, with no CLI overrides.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    controller_config_with_token(profile, defaults, token)
}

/// As [`profile_to_controller_config`] with the token already resolved.
pub fn controller_config_with_token(
    profile: &Profile,
    defaults: &Defaults,
    token: SecretString,
) -> Result<ControllerConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = ControllerConfig::new(url, token);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    if let Some(secs) = profile.refresh_interval {
        config.refresh_interval = Duration::from_secs(secs);
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn profile() -> Profile {
        Profile {
            url: "http://ha.local:8123".into(),
            token: Some("plain".into()),
            token_env: Some("HA_TOKEN".into()),
            ..Profile::default()
        }
    }

    fn none(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn token_env_wins() {
        let env = |name: &str| (name == "HA_TOKEN").then(|| "from-env".to_string());
        let keyring = |_: &str| Some("from-keyring".to_string());
        let token = resolve_token_with(&profile(), "home", env, keyring).unwrap();
        assert_eq!(token.expose_secret(), "from-env");
    }

    #[test]
    fn keyring_before_plaintext() {
        let keyring = |p: &str| (p == "home").then(|| "from-keyring".to_string());
        let token = resolve_token_with(&profile(), "home", none, keyring).unwrap();
        assert_eq!(token.expose_secret(), "from-keyring");
    }

    #[test]
    fn plaintext_is_the_last_resort() {
        let token = resolve_token_with(&profile(), "home", none, none).unwrap();
        assert_eq!(token.expose_secret(), "plain");

        let bare = Profile {
            token: None,
            ..profile()
        };
        let err = resolve_token_with(&bare, "home", none, none).unwrap_err();
        assert!(matches!(err, ConfigError::NoToken { .. }));
    }

    #[test]
    fn profile_maps_to_controller_config() {
        let p = Profile {
            refresh_interval: Some(5),
            insecure: Some(true),
            ..profile()
        };
        let cfg =
            controller_config_with_token(&p, &Defaults::default(), SecretString::from("t".to_string()))
                .unwrap();
        assert_eq!(cfg.url.as_str(), "http://ha.local:8123/");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(5));
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn bad_url_is_a_validation_error() {
        let p = Profile {
            url: "not a url".into(),
            ..profile()
        };
        let err = controller_config_with_token(&p, &Defaults::default(), SecretString::from("t".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn explicit_state_dir_is_used_verbatim() {
        let p = Profile {
            state_dir: Some(PathBuf::from("/tmp/hassdeck-state")),
            ..profile()
        };
        assert_eq!(state_dir(&p, "home"), PathBuf::from("/tmp/hassdeck-state"));
        assert!(state_dir(&profile(), "home").ends_with("home"));
    }
}
