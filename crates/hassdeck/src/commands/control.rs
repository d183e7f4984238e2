//! Control handlers: each one runs a single optimistic commit against
//! the hub and reports whether it was confirmed or rolled back.

use std::fmt::Display;
use std::time::Duration;

use hassdeck_config::Config;
use hassdeck_core::{
    ClimateFanMode, ClimateMode, ClimateTemperature, Command, CommandResult, ControlVariant,
    ControlledAttribute, CurtainPosition, Device, DeviceId, Gesture, LightBrightness,
    LightColorTemp, Outcome,
};

use crate::cli::{ControlArgs, ControlCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::{self, Hub};

pub async fn handle(args: ControlArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let mut controller_config = config::build_controller_config(global, cfg)?;
    if let Some(ms) = args.deadline_ms {
        controller_config.timing.deadline = Duration::from_millis(ms);
    }
    let hub = Hub::connect_with(global, cfg, controller_config).await?;

    let result = run(&hub, args.command, global).await;
    let closed = hub.close().await;
    result.and(closed)
}

async fn run(hub: &Hub, command: ControlCommand, global: &GlobalOpts) -> Result<(), CliError> {
    match command {
        ControlCommand::Position { id, position } => {
            require(hub, id, ControlVariant::Curtain, "position")?;
            drive::<CurtainPosition>(hub, id, Gesture::Select(position), global).await
        }
        ControlCommand::Brightness { id, brightness } => {
            require(hub, id, ControlVariant::Light, "brightness")?;
            drive::<LightBrightness>(hub, id, Gesture::Select(brightness), global).await
        }
        ControlCommand::ColorTemp { id, color_temp } => {
            require(hub, id, ControlVariant::Light, "color-temp")?;
            drive::<LightColorTemp>(hub, id, Gesture::Select(color_temp), global).await
        }
        ControlCommand::Setpoint { id, temperature } => {
            let device = require(hub, id, ControlVariant::Climate, "setpoint")?;
            let (min, max) = device.setpoint_range();
            if !(min..=max).contains(&temperature) {
                return Err(CliError::Validation {
                    field: "temperature".into(),
                    reason: format!("{temperature} is outside {min}-{max}"),
                });
            }
            drive::<ClimateTemperature>(hub, id, Gesture::Select(temperature), global).await
        }
        ControlCommand::Step { id, delta } => {
            require(hub, id, ControlVariant::Climate, "step")?;
            drive::<ClimateTemperature>(hub, id, Gesture::Step(delta), global).await
        }
        ControlCommand::Mode { id, mode } => {
            let device = require(hub, id, ControlVariant::Climate, "mode")?;
            if mode != "off" {
                offered("mode", &mode, &device.offered_hvac_modes())?;
            }
            drive::<ClimateMode>(hub, id, Gesture::Select(mode), global).await
        }
        ControlCommand::Fan { id, fan_mode } => {
            let device = require(hub, id, ControlVariant::Climate, "fan")?;
            offered("fan_mode", &fan_mode, &device.offered_fan_modes())?;
            drive::<ClimateFanMode>(hub, id, Gesture::Select(fan_mode), global).await
        }
        ControlCommand::Swing { id, swing_mode } => {
            require(hub, id, ControlVariant::Climate, "swing")?;
            let result = hub
                .controller
                .execute(Command::SetSwingMode {
                    id: DeviceId(id),
                    swing_mode: swing_mode.clone(),
                })
                .await?;
            report_direct(&result, &format!("swing {swing_mode}"), global);
            Ok(())
        }
        ControlCommand::Toggle { id } => toggle(hub, id, global).await,
    }
}

/// Curtains and lit lights toggle through a confirmed commit; anything
/// else is a plain power command.
async fn toggle(hub: &Hub, id: u32, global: &GlobalOpts) -> Result<(), CliError> {
    let device = hub.device(id)?;
    match device.control_variant() {
        ControlVariant::Curtain => {
            drive::<CurtainPosition>(hub, id, Gesture::Toggle, global).await
        }
        ControlVariant::Light if device.is_on => {
            drive::<LightBrightness>(hub, id, Gesture::Toggle, global).await
        }
        ControlVariant::Sensor | ControlVariant::BinarySensor | ControlVariant::Remote => {
            Err(CliError::Unsupported {
                operation: "toggle".into(),
                reason: format!("{} devices have no power state", device.control_variant()),
            })
        }
        _ => {
            let on = !device.is_on;
            let result = hub
                .controller
                .execute(Command::SetPower {
                    id: DeviceId(id),
                    on,
                })
                .await?;
            report_direct(&result, &format!("power {}", output::on_off(on)), global);
            Ok(())
        }
    }
}

// ── Commit driver ───────────────────────────────────────────────────

async fn drive<A>(
    hub: &Hub,
    id: u32,
    gesture: Gesture<A::Value>,
    global: &GlobalOpts,
) -> Result<(), CliError>
where
    A: ControlledAttribute,
    A::Value: Display,
{
    let mut handle = hub.controller.control::<A>(DeviceId(id))?;
    let before = handle.view().authoritative;

    let pb = util::spinner(&format!("Setting {} on device {id}", A::NAME), global.quiet);
    let outcome = handle.perform(gesture).await;
    pb.finish_and_clear();
    handle.close().await;

    match outcome? {
        None => {
            output::print_output(
                &output::muted(&format!("{} already {before}", A::NAME)),
                global.quiet,
            );
            Ok(())
        }
        Some(Outcome::Confirmed(value)) => {
            output::print_output(
                &output::success(&format!("{} {before} → {value} (confirmed)", A::NAME)),
                global.quiet,
            );
            Ok(())
        }
        Some(Outcome::RolledBack(value)) => Err(CliError::RolledBack {
            attribute: A::NAME.into(),
            value: value.to_string(),
        }),
    }
}

fn report_direct(result: &CommandResult, what: &str, global: &GlobalOpts) {
    let line = match result {
        CommandResult::Sent { entity_id, .. } => format!("{what} → {entity_id}"),
        CommandResult::Local => format!("{what} (local only, device is unmapped)"),
    };
    output::print_output(&output::success(&line), global.quiet);
}

// ── Prechecks ───────────────────────────────────────────────────────

fn require(
    hub: &Hub,
    id: u32,
    variant: ControlVariant,
    operation: &str,
) -> Result<std::sync::Arc<Device>, CliError> {
    let device = hub.device(id)?;
    if device.control_variant() == variant {
        Ok(device)
    } else {
        Err(CliError::Unsupported {
            operation: operation.into(),
            reason: format!(
                "device {id} is a {}, not a {variant}",
                device.control_variant()
            ),
        })
    }
}

fn offered(field: &str, value: &str, options: &[String]) -> Result<(), CliError> {
    if options.iter().any(|o| o == value) {
        Ok(())
    } else {
        Err(CliError::Validation {
            field: field.into(),
            reason: format!("'{value}' is not one of: {}", options.join(", ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offered_lists_the_choices() {
        let modes = vec!["cool".to_string(), "heat".to_string()];
        assert!(offered("mode", "cool", &modes).is_ok());
        match offered("mode", "dry", &modes) {
            Err(CliError::Validation { reason, .. }) => assert!(reason.contains("cool, heat")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
