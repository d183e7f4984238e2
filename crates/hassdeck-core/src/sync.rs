// ── Entity → device synchronization ──
//
// Merges one hub snapshot into the device list. Pure: no I/O, no clocks.
// Devices that come out identical keep their `Arc`, and an unchanged list
// is returned as the very same `Arc` so watchers can skip work by
// pointer comparison.

use std::sync::Arc;

use tracing::trace;

use crate::model::{ControlVariant, Device, DeviceMapping, EntitySnapshot, EntityState};

/// Hub states that mean "triggered" for a binary sensor.
const BINARY_ON_STATES: &[&str] = &["on", "open", "detected", "unsafe"];

/// Merge `entities` into `devices` through `mapping`.
///
/// Unmapped devices, and devices whose entity is missing from the
/// snapshot, are passed through untouched.
pub fn sync_devices(
    devices: &Arc<Vec<Arc<Device>>>,
    entities: &EntitySnapshot,
    mapping: &DeviceMapping,
) -> Arc<Vec<Arc<Device>>> {
    let mut any_changed = false;

    let next: Vec<Arc<Device>> = devices
        .iter()
        .map(|device| {
            let entity = mapping.get(device.id).and_then(|id| entities.get(id));
            match entity.and_then(|e| sync_device(device, e)) {
                Some(updated) => {
                    trace!(device = %device.id, "device changed by hub state");
                    any_changed = true;
                    Arc::new(updated)
                }
                None => Arc::clone(device),
            }
        })
        .collect();

    if any_changed {
        Arc::new(next)
    } else {
        Arc::clone(devices)
    }
}

/// Apply one entity to one device. `None` when nothing would change.
pub fn sync_device(device: &Device, entity: &EntityState) -> Option<Device> {
    let mut next = device.clone();
    apply_entity(&mut next, entity);
    (next != *device).then_some(next)
}

fn apply_entity(device: &mut Device, entity: &EntityState) {
    let state = entity.state.as_str();
    let available = entity.is_available();

    match device.control_variant() {
        ControlVariant::Light => {
            device.is_on = state == "on";
            let reported = entity.attr_f64("brightness").map(|b| to_u8(b, u8::MAX));
            device.brightness = Some(if device.is_on { reported.unwrap_or(0) } else { 0 });
            if let Some(ct) = entity.attr_f64("color_temp") {
                device.color_temp = Some(to_u16(ct));
            }
        }
        ControlVariant::Switch => {
            device.is_on = state == "on";
        }
        ControlVariant::Curtain => {
            let open = state == "open";
            device.is_on = open;
            device.position = Some(match entity.attr_f64("current_position") {
                Some(p) => to_u8(p, 100),
                None if open => 100,
                None => 0,
            });
        }
        ControlVariant::Sensor => {
            let unit = entity.attr_str("unit_of_measurement").unwrap_or_default();
            device.count = format!("{state}{unit}");
            device.is_on = available;
        }
        ControlVariant::BinarySensor => {
            device.is_on = BINARY_ON_STATES.contains(&state);
        }
        ControlVariant::Climate => apply_climate(device, entity),
        ControlVariant::Remote | ControlVariant::Plain => {}
    }

    device.ha_state = Some(entity.state.clone());
    device.ha_available = Some(available);
    device.device_class = entity.attr_str("device_class").map(ToOwned::to_owned);
    if entity.last_updated.is_some() {
        device.last_updated = entity.last_updated;
    }
    if entity.last_changed.is_some() {
        device.last_changed = entity.last_changed;
    }
}

fn apply_climate(device: &mut Device, entity: &EntityState) {
    let state = entity.state.as_str();
    device.is_on = state != "off";

    // A present-but-null attribute clears the field, as the hub intends.
    if entity.attr("temperature").is_some() {
        device.temperature = entity.attr_f64("temperature");
    }
    if entity.attr("current_temperature").is_some() {
        device.current_temperature = entity.attr_f64("current_temperature");
    }
    if state != "off" {
        device.mode = Some(state.to_owned());
    }
    if entity.attr("fan_mode").is_some() {
        device.fan_mode = entity.attr_str("fan_mode").map(ToOwned::to_owned);
    }
    if entity.attr("swing_mode").is_some() {
        device.swing_mode = entity.attr_str("swing_mode").map(ToOwned::to_owned);
    }

    if let Some(modes) = entity.attr_str_list("hvac_modes") {
        device.hvac_modes = Some(modes);
    }
    if let Some(modes) = entity.attr_str_list("fan_modes") {
        device.fan_modes = Some(modes);
    }
    if let Some(modes) = entity.attr_str_list("swing_modes") {
        device.swing_modes = Some(modes);
    }
    if let Some(min) = entity.attr_f64("min_temp") {
        device.min_temp = Some(min);
    }
    if let Some(max) = entity.attr_f64("max_temp") {
        device.max_temp = Some(max);
    }
}

// Both helpers clamp before casting, so truncation cannot occur.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn to_u8(value: f64, max: u8) -> u8 {
    value.round().clamp(0.0, f64::from(max)) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn to_u16(value: f64) -> u16 {
    value.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceId, EntityId};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn list(devices: Vec<Device>) -> Arc<Vec<Arc<Device>>> {
        Arc::new(devices.into_iter().map(Arc::new).collect())
    }

    fn mapping(pairs: &[(u32, &str)]) -> DeviceMapping {
        pairs
            .iter()
            .map(|(id, e)| (DeviceId(*id), EntityId::from(*e)))
            .collect()
    }

    fn snapshot(states: Vec<EntityState>) -> EntitySnapshot {
        states.into_iter().collect()
    }

    fn light(id: u32) -> Device {
        Device {
            icon: "lamp".into(),
            ..Device::new(DeviceId(id), "light")
        }
    }

    #[test]
    fn off_light_forces_zero_brightness() {
        let devices = list(vec![Device {
            is_on: true,
            brightness: Some(255),
            ..light(2)
        }]);
        let entities = snapshot(vec![
            EntityState::new("light.bedroom", "off").with_attr("brightness", 255),
        ]);

        let out = sync_devices(&devices, &entities, &mapping(&[(2, "light.bedroom")]));
        assert!(!out[0].is_on);
        assert_eq!(out[0].brightness, Some(0));
    }

    #[test]
    fn on_light_copies_brightness_and_color_temp() {
        let devices = list(vec![light(2)]);
        let entities = snapshot(vec![
            EntityState::new("light.bedroom", "on")
                .with_attr("brightness", 180)
                .with_attr("color_temp", 370),
        ]);

        let out = sync_devices(&devices, &entities, &mapping(&[(2, "light.bedroom")]));
        assert!(out[0].is_on);
        assert_eq!(out[0].brightness, Some(180));
        assert_eq!(out[0].color_temp, Some(370));
    }

    #[test]
    fn off_light_still_tracks_color_temp() {
        let devices = list(vec![light(2)]);
        let entities =
            snapshot(vec![EntityState::new("light.bedroom", "off").with_attr("color_temp", 250)]);

        let out = sync_devices(&devices, &entities, &mapping(&[(2, "light.bedroom")]));
        assert_eq!(out[0].color_temp, Some(250));
    }

    #[test]
    fn switch_ignores_light_attributes() {
        let devices = list(vec![Device::new(DeviceId(4), "switch")]);
        let entities =
            snapshot(vec![EntityState::new("switch.fan", "on").with_attr("brightness", 99)]);

        let out = sync_devices(&devices, &entities, &mapping(&[(4, "switch.fan")]));
        assert!(out[0].is_on);
        assert_eq!(out[0].brightness, None);
    }

    #[test]
    fn curtain_position_prefers_current_position() {
        let devices = list(vec![
            Device::new(DeviceId(3), "curtain"),
            Device::new(DeviceId(4), "curtain"),
            Device::new(DeviceId(5), "curtain"),
        ]);
        let entities = snapshot(vec![
            EntityState::new("cover.a", "open").with_attr("current_position", 42),
            EntityState::new("cover.b", "open"),
            EntityState::new("cover.c", "closed"),
        ]);
        let map = mapping(&[(3, "cover.a"), (4, "cover.b"), (5, "cover.c")]);

        let out = sync_devices(&devices, &entities, &map);
        assert_eq!(out[0].position, Some(42));
        assert!(out[0].is_on);
        assert_eq!(out[1].position, Some(100));
        assert_eq!(out[2].position, Some(0));
        assert!(!out[2].is_on);
    }

    #[test]
    fn sensor_reading_with_unit() {
        let devices = list(vec![Device::new(DeviceId(6), "temp_sensor")]);
        let entities = snapshot(vec![
            EntityState::new("sensor.hall_temp", "21.5")
                .with_attr("unit_of_measurement", "°C")
                .with_attr("device_class", "temperature"),
        ]);

        let out = sync_devices(&devices, &entities, &mapping(&[(6, "sensor.hall_temp")]));
        assert_eq!(out[0].count, "21.5°C");
        assert!(out[0].is_on);
        assert_eq!(out[0].device_class.as_deref(), Some("temperature"));
    }

    #[test]
    fn unavailable_sensor_goes_offline() {
        let devices = list(vec![Device {
            is_on: true,
            ..Device::new(DeviceId(6), "sensor")
        }]);
        let entities = snapshot(vec![EntityState::new("sensor.x", "unavailable")]);

        let out = sync_devices(&devices, &entities, &mapping(&[(6, "sensor.x")]));
        assert!(!out[0].is_on);
        assert_eq!(out[0].ha_available, Some(false));
        assert_eq!(out[0].ha_state.as_deref(), Some("unavailable"));
    }

    #[test]
    fn binary_sensor_on_states() {
        for (state, expected) in [
            ("on", true),
            ("open", true),
            ("detected", true),
            ("unsafe", true),
            ("off", false),
            ("clear", false),
        ] {
            let devices = list(vec![Device {
                icon: "motion".into(),
                ..Device::new(DeviceId(7), "other")
            }]);
            let entities = snapshot(vec![EntityState::new("binary_sensor.hall", state)]);
            let out = sync_devices(&devices, &entities, &mapping(&[(7, "binary_sensor.hall")]));
            assert_eq!(out[0].is_on, expected, "state {state}");
        }
    }

    #[test]
    fn climate_copies_attributes_and_capabilities() {
        let devices = list(vec![Device {
            mode: Some("heat".into()),
            ..Device::new(DeviceId(1), "ac")
        }]);
        let entities = snapshot(vec![
            EntityState::new("climate.living_room", "cool")
                .with_attr("temperature", 24)
                .with_attr("current_temperature", 27.5)
                .with_attr("fan_mode", "low")
                .with_attr("swing_mode", "vertical")
                .with_attr("hvac_modes", json!(["off", "cool", "heat"]))
                .with_attr("fan_modes", json!(["auto", "low"]))
                .with_attr("min_temp", 17)
                .with_attr("max_temp", 31),
        ]);

        let out = sync_devices(&devices, &entities, &mapping(&[(1, "climate.living_room")]));
        let ac = &out[0];
        assert!(ac.is_on);
        assert_eq!(ac.temperature, Some(24.0));
        assert_eq!(ac.current_temperature, Some(27.5));
        assert_eq!(ac.mode.as_deref(), Some("cool"));
        assert_eq!(ac.fan_mode.as_deref(), Some("low"));
        assert_eq!(ac.swing_mode.as_deref(), Some("vertical"));
        assert_eq!(ac.hvac_modes.as_ref().map(Vec::len), Some(3));
        assert_eq!(ac.fan_modes.as_ref().map(Vec::len), Some(2));
        assert_eq!(ac.min_temp, Some(17.0));
        assert_eq!(ac.max_temp, Some(31.0));
    }

    #[test]
    fn climate_off_keeps_last_mode() {
        let devices = list(vec![Device {
            is_on: true,
            mode: Some("heat".into()),
            ..Device::new(DeviceId(1), "climate")
        }]);
        let entities = snapshot(vec![EntityState::new("climate.x", "off")]);

        let out = sync_devices(&devices, &entities, &mapping(&[(1, "climate.x")]));
        assert!(!out[0].is_on);
        assert_eq!(out[0].mode.as_deref(), Some("heat"));
    }

    #[test]
    fn timestamps_follow_the_hub() {
        let changed = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();

        let devices = list(vec![Device::new(DeviceId(9), "scene")]);
        let mut entity = EntityState::new("scene.movie", "scening");
        entity.last_changed = Some(changed);
        entity.last_updated = Some(updated);

        let out = sync_devices(&devices, &snapshot(vec![entity]), &mapping(&[(9, "scene.movie")]));
        assert_eq!(out[0].last_changed, Some(changed));
        assert_eq!(out[0].last_updated, Some(updated));
        assert_eq!(out[0].ha_state.as_deref(), Some("scening"));
    }

    #[test]
    fn unmapped_and_missing_devices_keep_identity() {
        let devices = list(vec![light(1), light(2)]);
        let entities = snapshot(vec![EntityState::new("light.b", "on").with_attr("brightness", 10)]);
        // Device 1 is unmapped; device 2 maps to an entity absent from the snapshot.
        let map = mapping(&[(2, "light.gone")]);

        let out = sync_devices(&devices, &entities, &map);
        assert!(Arc::ptr_eq(&out, &devices));
    }

    #[test]
    fn unchanged_devices_keep_identity() {
        let devices = list(vec![light(1), Device::new(DeviceId(2), "curtain")]);
        let entities = snapshot(vec![
            EntityState::new("light.a", "on").with_attr("brightness", 100),
            EntityState::new("cover.b", "closed"),
        ]);
        let map = mapping(&[(1, "light.a"), (2, "cover.b")]);

        let first = sync_devices(&devices, &entities, &map);
        assert!(!Arc::ptr_eq(&first, &devices));

        // A second pass over the same snapshot changes nothing.
        let second = sync_devices(&first, &entities, &map);
        assert!(Arc::ptr_eq(&second, &first));
        assert!(Arc::ptr_eq(&second[0], &first[0]));
    }

    #[test]
    fn only_changed_devices_are_reallocated() {
        let devices = list(vec![light(1), light(2)]);
        let entities = snapshot(vec![EntityState::new("light.b", "on").with_attr("brightness", 10)]);
        let map = mapping(&[(2, "light.b")]);

        let out = sync_devices(&devices, &entities, &map);
        assert!(Arc::ptr_eq(&out[0], &devices[0]));
        assert!(!Arc::ptr_eq(&out[1], &devices[1]));
    }
}
