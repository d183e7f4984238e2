// ── Command API ──
//
// All writes flow through one `Command` enum. Mapped devices are routed
// to a hub service call chosen by the entity's domain; unmapped devices
// are patched in the local store instead.

use std::fmt;

use serde_json::{Value, json};

use crate::error::CoreError;
use crate::model::{Device, DeviceId, EntityId};

/// A command envelope sent through the command channel.
///
/// `response_tx` is `None` for fire-and-forget dispatches.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: Option<tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>>,
}

/// Every write the dashboard can make against a device.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPower { id: DeviceId, on: bool },
    SetPosition { id: DeviceId, position: u8 },
    SetBrightness { id: DeviceId, brightness: u8 },
    SetColorTemp { id: DeviceId, color_temp: u16 },
    SetTemperature { id: DeviceId, temperature: f64 },
    SetHvacMode { id: DeviceId, mode: String },
    SetFanMode { id: DeviceId, fan_mode: String },
    SetSwingMode { id: DeviceId, swing_mode: String },
    SendRemote { id: DeviceId, code: String },
}

/// Somewhere fire-and-forget commands can be sent.
///
/// Implemented by the [`Controller`](crate::Controller); control sessions
/// only ever see this seam.
pub trait CommandSink: Send + Sync + 'static {
    fn dispatch(&self, command: Command);
}

impl CommandSink for tokio::sync::mpsc::UnboundedSender<Command> {
    fn dispatch(&self, command: Command) {
        let _ = self.send(command);
    }
}

/// What happened to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Sent to the hub; `changed` is how many states the hub reported back.
    Sent { entity_id: EntityId, changed: usize },
    /// The device has no entity; the store was patched directly.
    Local,
}

/// A resolved `POST /api/services/{domain}/{service}` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: &'static str,
    pub data: Value,
}

impl Command {
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::SetPower { id, .. }
            | Self::SetPosition { id, .. }
            | Self::SetBrightness { id, .. }
            | Self::SetColorTemp { id, .. }
            | Self::SetTemperature { id, .. }
            | Self::SetHvacMode { id, .. }
            | Self::SetFanMode { id, .. }
            | Self::SetSwingMode { id, .. }
            | Self::SendRemote { id, .. } => *id,
        }
    }

    /// Pick the hub service for this command against `entity`.
    ///
    /// Attribute commands require the matching entity domain; power
    /// falls back to `<domain>.toggle` for anything unrecognized.
    pub fn service_call(&self, entity: &EntityId) -> Result<ServiceCall, CoreError> {
        let domain = entity.domain();
        let id = entity.as_str();

        let call = match self {
            Self::SetPower { on, .. } => {
                let service = match (domain, on) {
                    ("cover", true) => "open_cover",
                    ("cover", false) => "close_cover",
                    ("light" | "switch", true) => "turn_on",
                    ("light" | "switch", false) => "turn_off",
                    _ => "toggle",
                };
                ServiceCall::new(domain, service, json!({ "entity_id": id }))
            }
            Self::SetPosition { position, .. } => {
                require_domain(self, entity, "cover")?;
                ServiceCall::new(
                    "cover",
                    "set_cover_position",
                    json!({ "entity_id": id, "position": position }),
                )
            }
            Self::SetBrightness { brightness: 0, .. } => {
                require_domain(self, entity, "light")?;
                ServiceCall::new("light", "turn_off", json!({ "entity_id": id }))
            }
            Self::SetBrightness { brightness, .. } => {
                require_domain(self, entity, "light")?;
                ServiceCall::new(
                    "light",
                    "turn_on",
                    json!({ "entity_id": id, "brightness": brightness }),
                )
            }
            Self::SetColorTemp { color_temp, .. } => {
                require_domain(self, entity, "light")?;
                ServiceCall::new(
                    "light",
                    "turn_on",
                    json!({ "entity_id": id, "color_temp": color_temp }),
                )
            }
            Self::SetTemperature { temperature, .. } => {
                require_domain(self, entity, "climate")?;
                ServiceCall::new(
                    "climate",
                    "set_temperature",
                    json!({ "entity_id": id, "temperature": temperature }),
                )
            }
            Self::SetHvacMode { mode, .. } => {
                require_domain(self, entity, "climate")?;
                ServiceCall::new(
                    "climate",
                    "set_hvac_mode",
                    json!({ "entity_id": id, "hvac_mode": mode }),
                )
            }
            Self::SetFanMode { fan_mode, .. } => {
                require_domain(self, entity, "climate")?;
                ServiceCall::new(
                    "climate",
                    "set_fan_mode",
                    json!({ "entity_id": id, "fan_mode": fan_mode }),
                )
            }
            Self::SetSwingMode { swing_mode, .. } => {
                require_domain(self, entity, "climate")?;
                ServiceCall::new(
                    "climate",
                    "set_swing_mode",
                    json!({ "entity_id": id, "swing_mode": swing_mode }),
                )
            }
            Self::SendRemote { code, .. } => ServiceCall::new(
                "remote",
                "send_command",
                json!({ "entity_id": id, "command": code }),
            ),
        };

        Ok(call)
    }

    /// Patch a local-only device as if the hub had accepted the command.
    pub fn apply_local(&self, device: &mut Device) {
        match self {
            Self::SetPower { on, .. } => device.is_on = *on,
            Self::SetPosition { position, .. } => {
                device.position = Some(*position);
                device.is_on = *position > 0;
            }
            Self::SetBrightness { brightness, .. } => {
                device.brightness = Some(*brightness);
                device.is_on = *brightness > 0;
            }
            Self::SetColorTemp { color_temp, .. } => device.color_temp = Some(*color_temp),
            Self::SetTemperature { temperature, .. } => device.temperature = Some(*temperature),
            Self::SetHvacMode { mode, .. } => {
                device.is_on = mode != "off";
                device.mode = Some(mode.clone());
            }
            Self::SetFanMode { fan_mode, .. } => device.fan_mode = Some(fan_mode.clone()),
            Self::SetSwingMode { swing_mode, .. } => device.swing_mode = Some(swing_mode.clone()),
            Self::SendRemote { .. } => {}
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetPower { id, on } => {
                write!(f, "device {id}: power {}", if *on { "on" } else { "off" })
            }
            Self::SetPosition { id, position } => write!(f, "device {id}: position {position}%"),
            Self::SetBrightness { id, brightness } => {
                write!(f, "device {id}: brightness {brightness}")
            }
            Self::SetColorTemp { id, color_temp } => {
                write!(f, "device {id}: color temp {color_temp} mired")
            }
            Self::SetTemperature { id, temperature } => {
                write!(f, "device {id}: setpoint {temperature}°")
            }
            Self::SetHvacMode { id, mode } => write!(f, "device {id}: mode {mode}"),
            Self::SetFanMode { id, fan_mode } => write!(f, "device {id}: fan {fan_mode}"),
            Self::SetSwingMode { id, swing_mode } => write!(f, "device {id}: swing {swing_mode}"),
            Self::SendRemote { id, code } => write!(f, "device {id}: IR {code}"),
        }
    }
}

impl ServiceCall {
    fn new(domain: &str, service: &'static str, data: Value) -> Self {
        Self {
            domain: domain.to_owned(),
            service,
            data,
        }
    }
}

fn require_domain(cmd: &Command, entity: &EntityId, expected: &str) -> Result<(), CoreError> {
    if entity.domain() == expected {
        Ok(())
    } else {
        Err(CoreError::Unsupported {
            operation: cmd.to_string(),
            reason: format!("{entity} is not a {expected} entity"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ID: DeviceId = DeviceId(1);

    fn route(cmd: &Command, entity: &str) -> (String, &'static str, Value) {
        let call = cmd.service_call(&EntityId::from(entity)).unwrap();
        (call.domain, call.service, call.data)
    }

    #[test]
    fn power_routes_by_domain() {
        let on = Command::SetPower { id: ID, on: true };
        let off = Command::SetPower { id: ID, on: false };

        assert_eq!(route(&on, "cover.a").1, "open_cover");
        assert_eq!(route(&off, "cover.a").1, "close_cover");
        assert_eq!(route(&on, "light.a").1, "turn_on");
        assert_eq!(route(&off, "switch.a").1, "turn_off");

        let (domain, service, data) = route(&on, "fan.ceiling");
        assert_eq!((domain.as_str(), service), ("fan", "toggle"));
        assert_eq!(data, json!({ "entity_id": "fan.ceiling" }));
    }

    #[test]
    fn position_targets_cover_service() {
        let cmd = Command::SetPosition { id: ID, position: 80 };
        assert_eq!(
            route(&cmd, "cover.living_room"),
            (
                "cover".to_string(),
                "set_cover_position",
                json!({ "entity_id": "cover.living_room", "position": 80 })
            )
        );
    }

    #[test]
    fn position_rejects_non_cover_entity() {
        let cmd = Command::SetPosition { id: ID, position: 80 };
        let err = cmd.service_call(&EntityId::from("switch.blinds")).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
    }

    #[test]
    fn zero_brightness_turns_light_off() {
        let cmd = Command::SetBrightness { id: ID, brightness: 0 };
        assert_eq!(route(&cmd, "light.a").1, "turn_off");

        let cmd = Command::SetBrightness { id: ID, brightness: 200 };
        let (_, service, data) = route(&cmd, "light.a");
        assert_eq!(service, "turn_on");
        assert_eq!(data["brightness"], json!(200));
    }

    #[test]
    fn climate_commands() {
        let (_, service, data) = route(
            &Command::SetTemperature { id: ID, temperature: 23.5 },
            "climate.ac",
        );
        assert_eq!(service, "set_temperature");
        assert_eq!(data["temperature"], json!(23.5));

        let (_, service, data) = route(
            &Command::SetHvacMode { id: ID, mode: "heat".into() },
            "climate.ac",
        );
        assert_eq!(service, "set_hvac_mode");
        assert_eq!(data["hvac_mode"], json!("heat"));

        let (_, service, data) = route(
            &Command::SetFanMode { id: ID, fan_mode: "low".into() },
            "climate.ac",
        );
        assert_eq!(service, "set_fan_mode");
        assert_eq!(data["fan_mode"], json!("low"));
    }

    #[test]
    fn remote_sends_code_verbatim() {
        let cmd = Command::SendRemote { id: ID, code: "vol_up".into() };
        assert_eq!(
            route(&cmd, "remote.living_room_tv"),
            (
                "remote".to_string(),
                "send_command",
                json!({ "entity_id": "remote.living_room_tv", "command": "vol_up" })
            )
        );
    }

    #[test]
    fn local_apply_mirrors_hub_semantics() {
        let mut curtain = Device::new(ID, "curtain");
        Command::SetPosition { id: ID, position: 0 }.apply_local(&mut curtain);
        assert_eq!(curtain.position, Some(0));
        assert!(!curtain.is_on);

        let mut light = Device::new(ID, "light");
        Command::SetBrightness { id: ID, brightness: 120 }.apply_local(&mut light);
        assert!(light.is_on);
        Command::SetBrightness { id: ID, brightness: 0 }.apply_local(&mut light);
        assert!(!light.is_on);
        assert_eq!(light.display_brightness(), 0);

        let mut ac = Device::new(ID, "ac");
        Command::SetHvacMode { id: ID, mode: "cool".into() }.apply_local(&mut ac);
        assert!(ac.is_on);
        assert_eq!(ac.display_mode(), "cool");
    }
}
