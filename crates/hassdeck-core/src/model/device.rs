// ── Dashboard device records ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::ids::DeviceId;

/// `type` values rendered as numeric/text sensors.
pub const SENSOR_TYPES: &[&str] = &[
    "sensor",
    "temp_sensor",
    "humidity_sensor",
    "light_sensor",
    "pm25_sensor",
    "co2_sensor",
    "power_sensor",
    "energy_sensor",
    "battery_sensor",
];

/// `type` values rendered as on/off sensors.
pub const BINARY_SENSOR_TYPES: &[&str] = &[
    "binary_sensor",
    "motion_sensor",
    "door_sensor",
    "window_sensor",
    "smoke_sensor",
    "water_leak",
];

/// Icons that imply a binary sensor regardless of `type`.
const BINARY_SENSOR_ICONS: &[&str] = &["motion", "door", "water"];

/// `type` values driven by the climate control.
pub const CLIMATE_TYPES: &[&str] = &["ac", "climate", "heater", "fan"];

pub const DEFAULT_COLOR_TEMP: u16 = 153;
pub const DEFAULT_SETPOINT: f64 = 26.0;
pub const DEFAULT_MIN_TEMP: f64 = 16.0;
pub const DEFAULT_MAX_TEMP: f64 = 30.0;
pub const DEFAULT_HVAC_MODES: &[&str] = &["cool", "heat", "auto", "dry", "fan_only"];
pub const DEFAULT_FAN_MODES: &[&str] = &["auto", "low", "medium", "high", "turbo"];

/// Which interactive control a device gets, derived from `type` and `icon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ControlVariant {
    Light,
    Switch,
    Curtain,
    Sensor,
    BinarySensor,
    Climate,
    Remote,
    Plain,
}

/// A device tile on the dashboard.
///
/// Field names on the wire follow the dashboard's persisted JSON, which
/// mixes camelCase flags with the hub's snake_case attribute names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
    /// Free-form display text; sensors carry their reading here.
    #[serde(default)]
    pub count: String,
    #[serde(default)]
    pub power: String,
    #[serde(rename = "isOn", default)]
    pub is_on: bool,
    #[serde(default)]
    pub room: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "isCommon", default)]
    pub is_common: bool,

    // ── Cover ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u8>,

    // ── Light ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp: Option<u16>,

    // ── Climate ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_modes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_modes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing_modes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_temp: Option<f64>,

    // ── Hub mirror ──
    #[serde(rename = "haState", default, skip_serializing_if = "Option::is_none")]
    pub ha_state: Option<String>,
    #[serde(rename = "haAvailable", default, skip_serializing_if = "Option::is_none")]
    pub ha_available: Option<bool>,
    #[serde(rename = "deviceClass", default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(rename = "lastChanged", default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Device {
    /// A bare device of the given `type` with every optional field unset.
    pub fn new(id: DeviceId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Classify by `type`, falling back to `icon` where the dashboard does.
    pub fn control_variant(&self) -> ControlVariant {
        let kind = self.kind.as_str();
        let icon = self.icon.as_str();

        if kind == "light" || icon == "lamp" {
            ControlVariant::Light
        } else if kind == "switch" {
            ControlVariant::Switch
        } else if kind == "curtain" {
            ControlVariant::Curtain
        } else if SENSOR_TYPES.contains(&kind) {
            ControlVariant::Sensor
        } else if BINARY_SENSOR_TYPES.contains(&kind) || BINARY_SENSOR_ICONS.contains(&icon) {
            ControlVariant::BinarySensor
        } else if CLIMATE_TYPES.contains(&kind) {
            ControlVariant::Climate
        } else if kind == "remote" {
            ControlVariant::Remote
        } else {
            ControlVariant::Plain
        }
    }

    // ── Displayed values ─────────────────────────────────────────────

    /// Curtain position, `0` when unknown.
    pub fn display_position(&self) -> u8 {
        self.position.unwrap_or(0)
    }

    /// Light brightness; an off light always reads `0`.
    pub fn display_brightness(&self) -> u8 {
        if self.is_on {
            self.brightness.unwrap_or(0)
        } else {
            0
        }
    }

    /// Brightness as a rounded percentage of 255.
    pub fn brightness_percent(&self) -> u8 {
        let pct = (u16::from(self.display_brightness()) * 100 + 127) / 255;
        u8::try_from(pct).unwrap_or(100)
    }

    pub fn display_color_temp(&self) -> u16 {
        self.color_temp.unwrap_or(DEFAULT_COLOR_TEMP)
    }

    pub fn display_setpoint(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_SETPOINT)
    }

    pub fn display_mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("off")
    }

    pub fn display_fan_mode(&self) -> &str {
        self.fan_mode.as_deref().unwrap_or("auto")
    }

    /// Setpoint bounds, `16..=30` unless the hub reported its own.
    pub fn setpoint_range(&self) -> (f64, f64) {
        (
            self.min_temp.unwrap_or(DEFAULT_MIN_TEMP),
            self.max_temp.unwrap_or(DEFAULT_MAX_TEMP),
        )
    }

    /// HVAC modes offered by the climate control, without `off`.
    pub fn offered_hvac_modes(&self) -> Vec<String> {
        match &self.hvac_modes {
            Some(modes) => modes.iter().filter(|m| *m != "off").cloned().collect(),
            None => DEFAULT_HVAC_MODES.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn offered_fan_modes(&self) -> Vec<String> {
        match &self.fan_modes {
            Some(modes) => modes.clone(),
            None => DEFAULT_FAN_MODES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Append a remote-control device when the list has none.
///
/// The new device takes `max(id) + 1`. Returns `true` if one was added.
pub fn ensure_remote_device(devices: &mut Vec<Device>) -> bool {
    if devices.iter().any(|d| d.kind == "remote") {
        return false;
    }

    let next_id = devices.iter().map(|d| d.id.0).max().unwrap_or(0) + 1;
    devices.push(Device {
        name: "Living Room TV Remote".into(),
        icon: "remote".into(),
        room: "Living Room".into(),
        is_common: true,
        ..Device::new(DeviceId(next_id), "remote")
    });
    true
}
