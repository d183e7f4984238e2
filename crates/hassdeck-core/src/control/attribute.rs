// ── Attribute bindings ──
//
// Each binding tells the generic machine how to read one attribute off a
// device, when a hub value counts as confirming a commit, and which
// command carries a new value.

use std::fmt::Debug;

use crate::command::Command;
use crate::model::{Device, DeviceId};

/// An attribute driven through [`OptimisticControl`](super::OptimisticControl).
pub trait ControlledAttribute: Send + Sync + 'static {
    type Value: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Short name used in logs.
    const NAME: &'static str;

    /// Current value on the device, with the dashboard's defaults applied.
    fn read(device: &Device) -> Self::Value;

    /// Whether `reported` is close enough to `committed` to confirm it.
    fn within_tolerance(committed: &Self::Value, reported: &Self::Value) -> bool;

    /// The command that sets this attribute to `value`.
    fn command(id: DeviceId, value: Self::Value) -> Command;

    /// Target value for a power toggle, if the toggle maps onto this attribute.
    fn toggle_target(_device: &Device) -> Option<Self::Value> {
        None
    }

    /// Target for a `delta` step from `current`, if this attribute steps.
    fn step_target(_current: &Self::Value, _delta: f64, _device: &Device) -> Option<Self::Value> {
        None
    }
}

/// Curtain opening, 0..=100.
#[derive(Debug)]
pub struct CurtainPosition;

impl ControlledAttribute for CurtainPosition {
    type Value = u8;
    const NAME: &'static str = "position";

    fn read(device: &Device) -> u8 {
        device.display_position()
    }

    fn within_tolerance(committed: &u8, reported: &u8) -> bool {
        committed.abs_diff(*reported) <= 1
    }

    fn command(id: DeviceId, position: u8) -> Command {
        Command::SetPosition { id, position }
    }

    fn toggle_target(device: &Device) -> Option<u8> {
        Some(if device.is_on { 0 } else { 100 })
    }
}

/// Light brightness, 0..=255.
#[derive(Debug)]
pub struct LightBrightness;

impl ControlledAttribute for LightBrightness {
    type Value = u8;
    const NAME: &'static str = "brightness";

    fn read(device: &Device) -> u8 {
        device.display_brightness()
    }

    fn within_tolerance(committed: &u8, reported: &u8) -> bool {
        committed.abs_diff(*reported) <= 5
    }

    fn command(id: DeviceId, brightness: u8) -> Command {
        Command::SetBrightness { id, brightness }
    }

    /// Turning a light off means brightness 0; turning it on has no
    /// known target level.
    fn toggle_target(device: &Device) -> Option<u8> {
        device.is_on.then_some(0)
    }
}

/// Light color temperature in mireds.
#[derive(Debug)]
pub struct LightColorTemp;

impl ControlledAttribute for LightColorTemp {
    type Value = u16;
    const NAME: &'static str = "color_temp";

    fn read(device: &Device) -> u16 {
        device.display_color_temp()
    }

    fn within_tolerance(committed: &u16, reported: &u16) -> bool {
        committed.abs_diff(*reported) <= 5
    }

    fn command(id: DeviceId, color_temp: u16) -> Command {
        Command::SetColorTemp { id, color_temp }
    }
}

/// Climate setpoint in degrees.
#[derive(Debug)]
pub struct ClimateTemperature;

impl ControlledAttribute for ClimateTemperature {
    type Value = f64;
    const NAME: &'static str = "temperature";

    fn read(device: &Device) -> f64 {
        device.display_setpoint()
    }

    fn within_tolerance(committed: &f64, reported: &f64) -> bool {
        (committed - reported).abs() <= 0.5
    }

    fn command(id: DeviceId, temperature: f64) -> Command {
        Command::SetTemperature { id, temperature }
    }

    /// Clamped to the device's `[min_temp, max_temp]`.
    fn step_target(current: &f64, delta: f64, device: &Device) -> Option<f64> {
        let (min, max) = device.setpoint_range();
        if min > max {
            return None;
        }
        Some((current + delta).clamp(min, max))
    }
}

/// Climate HVAC mode.
#[derive(Debug)]
pub struct ClimateMode;

impl ControlledAttribute for ClimateMode {
    type Value = String;
    const NAME: &'static str = "hvac_mode";

    /// A powered-down unit reads as `off`. Sync keeps the last active
    /// mode on the device, so `mode` alone never reports it.
    fn read(device: &Device) -> String {
        if device.is_on {
            device.display_mode().to_owned()
        } else {
            "off".to_owned()
        }
    }

    fn within_tolerance(committed: &String, reported: &String) -> bool {
        committed == reported
    }

    fn command(id: DeviceId, mode: String) -> Command {
        Command::SetHvacMode { id, mode }
    }
}

/// Climate fan mode.
#[derive(Debug)]
pub struct ClimateFanMode;

impl ControlledAttribute for ClimateFanMode {
    type Value = String;
    const NAME: &'static str = "fan_mode";

    fn read(device: &Device) -> String {
        device.display_fan_mode().to_owned()
    }

    fn within_tolerance(committed: &String, reported: &String) -> bool {
        committed == reported
    }

    fn command(id: DeviceId, fan_mode: String) -> Command {
        Command::SetFanMode { id, fan_mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_apply_defaults() {
        let blank = Device::new(DeviceId(1), "light");
        assert_eq!(CurtainPosition::read(&blank), 0);
        assert_eq!(LightBrightness::read(&blank), 0);
        assert_eq!(LightColorTemp::read(&blank), 153);
        assert!((ClimateTemperature::read(&blank) - 26.0).abs() < f64::EPSILON);
        assert_eq!(ClimateMode::read(&blank), "off");
        assert_eq!(ClimateFanMode::read(&blank), "auto");
    }

    #[test]
    fn powered_down_climate_reads_off() {
        let ac = Device {
            mode: Some("cool".into()),
            is_on: false,
            ..Device::new(DeviceId(1), "ac")
        };
        assert_eq!(ClimateMode::read(&ac), "off");
        assert_eq!(ClimateMode::read(&Device { is_on: true, ..ac }), "cool");
    }

    #[test]
    fn tolerance_bands() {
        assert!(CurtainPosition::within_tolerance(&80, &79));
        assert!(!CurtainPosition::within_tolerance(&80, &78));
        assert!(LightColorTemp::within_tolerance(&300, &305));
        assert!(!LightColorTemp::within_tolerance(&300, &306));
        assert!(!ClimateFanMode::within_tolerance(&"low".into(), &"Low".into()));
    }

    #[test]
    fn commands_carry_the_value() {
        assert_eq!(
            LightColorTemp::command(DeviceId(2), 370),
            Command::SetColorTemp {
                id: DeviceId(2),
                color_temp: 370
            }
        );
        assert_eq!(
            ClimateMode::command(DeviceId(1), "dry".into()),
            Command::SetHvacMode {
                id: DeviceId(1),
                mode: "dry".into()
            }
        );
    }
}
