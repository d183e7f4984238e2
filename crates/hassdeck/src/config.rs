//! Flag-aware configuration: layers CLI overrides on top of the
//! profiles in `hassdeck-config` and builds what the commands need.

use std::time::Duration;

use secrecy::SecretString;

use hassdeck_config::{Config, KvStore, Profile};
use hassdeck_core::{ControllerConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use hassdeck_config::{config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Open the persisted-state store for the active profile.
pub fn open_store(global: &GlobalOpts, config: &Config) -> Result<KvStore, CliError> {
    if let Some(dir) = &global.state_dir {
        return Ok(KvStore::open(dir)?);
    }
    let name = active_profile_name(global, config);
    let dir = match config.profiles.get(&name) {
        Some(profile) => hassdeck_config::state_dir(profile, &name),
        None => hassdeck_config::state_dir(&Profile::default(), &name),
    };
    Ok(KvStore::open(dir)?)
}

/// Build a `ControllerConfig` from the config file, profile, and CLI overrides.
pub fn build_controller_config(
    global: &GlobalOpts,
    config: &Config,
) -> Result<ControllerConfig, CliError> {
    let name = active_profile_name(global, config);

    // Profile with flag overrides on top
    if let Some(profile) = config.profiles.get(&name) {
        let token = match &global.token {
            Some(token) => SecretString::from(token.clone()),
            None => hassdeck_config::resolve_token(profile, &name)?,
        };
        let mut cfg =
            hassdeck_config::controller_config_with_token(profile, &config.defaults, token)?;
        apply_overrides(&mut cfg, global)?;
        return Ok(cfg);
    }

    // No profile: flags / env vars alone
    let url_str = global.url.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let token = global
        .token
        .clone()
        .ok_or(CliError::NoToken { profile: name })?;

    let mut cfg = ControllerConfig::new(parse_url(url_str)?, SecretString::from(token));
    cfg.timeout = Duration::from_secs(config.defaults.timeout);
    apply_overrides(&mut cfg, global)?;
    Ok(cfg)
}

fn apply_overrides(cfg: &mut ControllerConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(url) = &global.url {
        cfg.url = parse_url(url)?;
    }
    if global.insecure {
        cfg.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        cfg.timeout = Duration::from_secs(secs);
    }
    Ok(())
}

fn parse_url(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}
