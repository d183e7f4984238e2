//! Shared helpers for command handlers.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use hassdeck_config::{Config, DEVICES_KEY, KvStore, LOGS_KEY};
use hassdeck_core::{Controller, ControllerConfig, Device, DeviceId};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;

// ── Hub session ─────────────────────────────────────────────────────

/// A connected controller plus the store it was seeded from.
pub struct Hub {
    pub controller: Controller,
    pub store: KvStore,
}

impl Hub {
    /// Seed a controller from the persisted state and connect it.
    pub async fn connect(global: &GlobalOpts, cfg: &Config) -> Result<Self, CliError> {
        let controller_config = config::build_controller_config(global, cfg)?;
        Self::connect_with(global, cfg, controller_config).await
    }

    pub async fn connect_with(
        global: &GlobalOpts,
        cfg: &Config,
        controller_config: ControllerConfig,
    ) -> Result<Self, CliError> {
        let store = config::open_store(global, cfg)?;
        let controller =
            Controller::new(controller_config, store.load_devices(), store.load_mapping());
        controller.restore_activity(store.load_activity());

        let url = controller.config().url.to_string();
        let pb = spinner(&format!("Connecting to {url}"), global.quiet);
        let connected = controller.connect().await;
        pb.finish_and_clear();
        connected?;

        debug!(devices = controller.devices_snapshot().len(), "hub connected");
        Ok(Self { controller, store })
    }

    /// Write the device list and activity back, then disconnect.
    pub async fn close(self) -> Result<(), CliError> {
        let saved = persist(&self.controller, &self.store);
        self.controller.shutdown().await;
        saved
    }

    pub fn device(&self, id: u32) -> Result<Arc<Device>, CliError> {
        self.controller
            .device(DeviceId(id))
            .ok_or_else(|| CliError::device_not_found(id))
    }
}

fn persist(controller: &Controller, store: &KvStore) -> Result<(), CliError> {
    let devices: Vec<Device> = controller
        .devices_snapshot()
        .iter()
        .map(|d| Device::clone(d))
        .collect();
    store.save(DEVICES_KEY, &devices)?;
    store.save(LOGS_KEY, &controller.activity())?;
    Ok(())
}

// ── Local lookups ───────────────────────────────────────────────────

pub fn find_device(devices: &[Device], id: u32) -> Result<&Device, CliError> {
    devices
        .iter()
        .find(|d| d.id == DeviceId(id))
        .ok_or_else(|| CliError::device_not_found(id))
}

// ── Interaction ─────────────────────────────────────────────────────

/// A ticking spinner on stderr; hidden in quiet mode.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {elapsed:.dim}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_owned());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}
