//! `watch`: follow device changes and IR telemetry until interrupted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::broadcast::error::RecvError;

use hassdeck_config::Config;
use hassdeck_core::{Device, DeviceId, IrTelemetry};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::Hub;

const FALLBACK_REFRESH: Duration = Duration::from_secs(2);

pub async fn handle(args: WatchArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let mut controller_config = config::build_controller_config(global, cfg)?;
    if controller_config.refresh_interval.is_zero() {
        controller_config.refresh_interval = FALLBACK_REFRESH;
    }
    let hub = Hub::connect_with(global, cfg, controller_config).await?;
    let result = follow(&hub, &args, global).await;
    let closed = hub.close().await;
    result.and(closed)
}

async fn follow(hub: &Hub, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(id) = args.device {
        hub.device(id)?;
    }
    let only = args.device.map(DeviceId);

    let mut devices = hub.controller.devices();
    let mut telemetry = hub.controller.subscribe_telemetry();
    let mut previous = index(devices.current());

    let stop = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(stop);

    if !global.quiet {
        eprintln!("{}", output::muted("watching; Ctrl-C to stop"));
    }

    loop {
        tokio::select! {
            biased;
            () = &mut stop => break,
            snapshot = devices.changed() => {
                let Some(snapshot) = snapshot else { break };
                let next = index(&snapshot);
                for device in snapshot.iter() {
                    if only.is_some_and(|id| id != device.id) {
                        continue;
                    }
                    let changed = previous
                        .get(&device.id)
                        .is_none_or(|before| !Arc::ptr_eq(before, device));
                    if changed {
                        print_device(device, global)?;
                    }
                }
                previous = next;
            }
            event = telemetry.recv() => match event {
                Ok(event) => {
                    if only.is_none_or(|id| id == event.device_id) {
                        print_telemetry(&event, global)?;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    let line = output::warning(&format!("skipped {n} telemetry events"));
                    output::print_output(&line, global.quiet);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn index(devices: &[Arc<Device>]) -> HashMap<DeviceId, Arc<Device>> {
    devices.iter().map(|d| (d.id, Arc::clone(d))).collect()
}

fn stamp() -> String {
    output::muted(&Local::now().format("%H:%M:%S").to_string())
}

fn print_device(device: &Device, global: &GlobalOpts) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            let state = device.ha_state.as_deref().unwrap_or("-");
            format!(
                "{} {} {} [{}] {}",
                stamp(),
                device.id,
                device.name,
                output::on_off(device.is_on),
                state
            )
        }
        _ => output::render_json(device, true)?,
    };
    output::print_output(&line, global.quiet);
    Ok(())
}

fn print_telemetry(event: &IrTelemetry, global: &GlobalOpts) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            let target = event
                .entity_id
                .as_ref()
                .map_or_else(|| "(unmapped)".to_owned(), ToString::to_string);
            let status = if event.ok {
                output::success("ok")
            } else {
                output::warning(event.error.as_deref().unwrap_or("failed"))
            };
            format!("{} IR {} → {target} {status}", stamp(), event.code)
        }
        _ => output::render_json(event, true)?,
    };
    output::print_output(&line, global.quiet);
    Ok(())
}
