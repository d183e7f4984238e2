//! Remote-control handlers.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use strum::IntoEnumIterator;
use tabled::Tabled;
use tokio::sync::mpsc;
use tracing::debug;

use hassdeck_config::Config;
use hassdeck_core::{ControlVariant, DeviceId, RemoteInputController, RemoteKey};

use crate::cli::{GlobalOpts, RemoteArgs, RemoteCommand};
use crate::error::CliError;
use crate::output;

use super::util::Hub;

#[derive(Clone, Serialize, Tabled)]
struct KeyRow {
    #[tabled(rename = "Key")]
    key: String,
}

pub async fn handle(args: RemoteArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    match args.command {
        RemoteCommand::Keys => {
            let keys: Vec<KeyRow> = RemoteKey::iter()
                .map(|k| KeyRow { key: k.to_string() })
                .collect();
            let out = output::render_list(&global.output, &keys, KeyRow::clone, |k| {
                k.key.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        RemoteCommand::Send { id, codes } => {
            let hub = Hub::connect(global, cfg).await?;
            let result = send_codes(&hub, id, &codes, global).await;
            let closed = hub.close().await;
            result.and(closed)
        }

        RemoteCommand::Press {
            id,
            key,
            times,
            gap_ms,
        } => {
            let key = RemoteKey::from_str(&key).map_err(|_| CliError::Validation {
                field: "key".into(),
                reason: format!("unknown key '{key}' (see `hassdeck remote keys`)"),
            })?;
            let hub = Hub::connect(global, cfg).await?;
            let result = press(&hub, id, key, times, Duration::from_millis(gap_ms), global).await;
            let closed = hub.close().await;
            result.and(closed)
        }
    }
}

fn require_remote(hub: &Hub, id: u32) -> Result<(), CliError> {
    let device = hub.device(id)?;
    if device.control_variant() == ControlVariant::Remote {
        Ok(())
    } else {
        Err(CliError::Unsupported {
            operation: "remote".into(),
            reason: format!("device {id} is a {}, not a remote", device.control_variant()),
        })
    }
}

async fn send_codes(
    hub: &Hub,
    id: u32,
    codes: &[String],
    global: &GlobalOpts,
) -> Result<(), CliError> {
    require_remote(hub, id)?;
    for code in codes {
        hub.controller.send_remote(DeviceId(id), code).await?;
        output::print_output(&output::success(&format!("sent {code}")), global.quiet);
    }
    Ok(())
}

/// Presses go through the panel arbiter, so presses closer together than
/// its minimum interval are dropped exactly as on the dashboard.
async fn press(
    hub: &Hub,
    id: u32,
    key: RemoteKey,
    times: u32,
    gap: Duration,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    require_remote(hub, id)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let panel = RemoteInputController::builder(move |key| {
        let _ = tx.send(key);
    })
    .on_telemetry(|t| {
        if !t.accepted {
            debug!(code = %t.code, at = ?t.at, "press debounced");
        }
    })
    .build();
    let button = panel.handlers_for(key);

    let mut sent = 0u32;
    for i in 0..times {
        if i > 0 && !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }
        button.on_key_down("Enter");
        while let Ok(code) = rx.try_recv() {
            hub.controller
                .send_remote(DeviceId(id), &code.to_string())
                .await?;
            sent += 1;
        }
    }

    let dropped = times - sent;
    let mut line = output::success(&format!("{key}: sent {sent} of {times}"));
    if dropped > 0 {
        line.push_str(&output::muted(&format!(" ({dropped} debounced)")));
    }
    output::print_output(&line, global.quiet);
    Ok(())
}
