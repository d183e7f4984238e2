//! Device command handlers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tabled::Tabled;

use hassdeck_config::{Config, DEVICES_KEY, default_devices};
use hassdeck_core::{ControlVariant, Device, DeviceMapping};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::{self, Hub};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Reading")]
    reading: String,
    #[tabled(rename = "Entity")]
    entity: String,
}

fn row(d: &Device, mapping: &DeviceMapping) -> DeviceRow {
    DeviceRow {
        id: d.id.0,
        name: d.name.clone(),
        room: d.room.clone(),
        kind: d.control_variant().to_string(),
        power: output::on_off(d.is_on),
        reading: reading(d),
        entity: mapping
            .get(d.id)
            .map_or_else(|| output::muted("-"), ToString::to_string),
    }
}

/// The one value a tile would headline.
fn reading(d: &Device) -> String {
    match d.control_variant() {
        ControlVariant::Curtain => format!("{}%", d.display_position()),
        ControlVariant::Light => format!("{}%", d.brightness_percent()),
        ControlVariant::Climate => format!("{:.1}° {}", d.display_setpoint(), d.display_mode()),
        ControlVariant::Sensor | ControlVariant::BinarySensor => {
            d.ha_state.clone().unwrap_or_else(|| d.count.clone())
        }
        _ => String::new(),
    }
}

fn detail(d: &Device, mapping: &DeviceMapping) -> String {
    let mut lines = vec![
        format!("ID:        {}", d.id),
        format!("Name:      {}", d.name),
        format!("Room:      {}", d.room),
        format!("Type:      {} ({})", d.kind, d.control_variant()),
        format!("Power:     {}", output::on_off(d.is_on)),
        format!(
            "Entity:    {}",
            mapping.get(d.id).map_or("-", |e| e.as_str())
        ),
    ];

    match d.control_variant() {
        ControlVariant::Curtain => lines.push(format!("Position:  {}%", d.display_position())),
        ControlVariant::Light => {
            lines.push(format!(
                "Brightness: {} ({}%)",
                d.display_brightness(),
                d.brightness_percent()
            ));
            lines.push(format!("Color temp: {} mireds", d.display_color_temp()));
        }
        ControlVariant::Climate => {
            let (min, max) = d.setpoint_range();
            lines.push(format!(
                "Setpoint:  {:.1}° (range {min:.0}-{max:.0})",
                d.display_setpoint()
            ));
            if let Some(current) = d.current_temperature {
                lines.push(format!("Current:   {current:.1}°"));
            }
            lines.push(format!(
                "Mode:      {} [{}]",
                d.display_mode(),
                d.offered_hvac_modes().join(", ")
            ));
            lines.push(format!(
                "Fan:       {} [{}]",
                d.display_fan_mode(),
                d.offered_fan_modes().join(", ")
            ));
            if let Some(swing) = &d.swing_mode {
                lines.push(format!("Swing:     {swing}"));
            }
        }
        _ => {}
    }

    if let Some(state) = &d.ha_state {
        lines.push(format!("Hub state: {state}"));
    }
    if d.ha_available == Some(false) {
        lines.push(format!("           {}", output::warning("unavailable")));
    }
    if let Some(changed) = d.last_changed {
        lines.push(format!("Changed:   {} ago", age(changed)));
    }
    lines.join("\n")
}

/// Whole-second age, e.g. "3m 12s".
fn age(since: DateTime<Utc>) -> String {
    let secs = (Utc::now() - since).num_seconds().max(0).unsigned_abs();
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List {
            room,
            common,
            local,
        } => {
            let (devices, mapping) = load(global, cfg, local).await?;
            let shown: Vec<Device> = devices
                .into_iter()
                .filter(|d| room.as_deref().is_none_or(|r| d.room.eq_ignore_ascii_case(r)))
                .filter(|d| !common || d.is_common)
                .collect();
            let out = output::render_list(
                &global.output,
                &shown,
                |d| row(d, &mapping),
                |d| d.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Show { id, local } => {
            let (devices, mapping) = load(global, cfg, local).await?;
            let device = util::find_device(&devices, id)?;
            let out = output::render_single(
                &global.output,
                device,
                |d| detail(d, &mapping),
                |d| d.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Sync => {
            let hub = Hub::connect(global, cfg).await?;
            let mapped = hub.controller.mapping().len();
            let total = hub.controller.devices_snapshot().len();
            hub.close().await?;
            output::print_output(
                &output::success(&format!("Synced {mapped} of {total} devices from the hub")),
                global.quiet,
            );
            Ok(())
        }

        DevicesCommand::Reset => {
            if !util::confirm("Replace the device list with the defaults?", global.yes)? {
                return Ok(());
            }
            let store = config::open_store(global, cfg)?;
            store.save(DEVICES_KEY, &default_devices())?;
            output::print_output(&output::success("Device list reset"), global.quiet);
            Ok(())
        }
    }
}

/// The device list, live from the hub unless `local`.
async fn load(
    global: &GlobalOpts,
    cfg: &Config,
    local: bool,
) -> Result<(Vec<Device>, DeviceMapping), CliError> {
    if local {
        let store = config::open_store(global, cfg)?;
        return Ok((store.load_devices(), store.load_mapping()));
    }

    let hub = Hub::connect(global, cfg).await?;
    let devices = hub
        .controller
        .devices_snapshot()
        .iter()
        .map(|d| Device::clone(d))
        .collect();
    let mapping = DeviceMapping::clone(&hub.controller.mapping());
    hub.close().await?;
    Ok((devices, mapping))
}

#[cfg(test)]
mod tests {
    use hassdeck_core::{DeviceId, EntityId};

    use super::*;

    #[test]
    fn reading_follows_the_control_variant() {
        let curtain = Device {
            position: Some(40),
            ..Device::new(DeviceId(3), "curtain")
        };
        assert_eq!(reading(&curtain), "40%");

        let ac = Device {
            temperature: Some(24.0),
            mode: Some("cool".into()),
            ..Device::new(DeviceId(1), "ac")
        };
        assert_eq!(reading(&ac), "24.0° cool");

        let off_light = Device {
            brightness: Some(255),
            ..Device::new(DeviceId(2), "light")
        };
        assert_eq!(reading(&off_light), "0%");
    }

    #[test]
    fn age_is_whole_seconds() {
        let then = Utc::now() - chrono::Duration::seconds(192);
        assert_eq!(age(then), "3m 12s");
        assert_eq!(age(Utc::now() + chrono::Duration::seconds(5)), "0s");
    }

    #[test]
    fn detail_names_the_mapped_entity() {
        let mut mapping = DeviceMapping::new();
        mapping.insert(DeviceId(3), EntityId::from("cover.living_room"));
        let text = detail(&Device::new(DeviceId(3), "curtain"), &mapping);
        assert!(text.contains("cover.living_room"));
        assert!(text.contains("Position:  0%"));
    }
}
