// First-run device list.

use hassdeck_core::{Device, DeviceId};

/// The starter dashboard: one device of each common kind.
pub fn default_devices() -> Vec<Device> {
    vec![
        Device {
            name: "Living Room AC".into(),
            icon: "wind".into(),
            power: "1000W".into(),
            is_on: true,
            room: "Living Room".into(),
            is_common: true,
            temperature: Some(24.0),
            current_temperature: Some(26.0),
            mode: Some("cool".into()),
            fan_mode: Some("auto".into()),
            swing_mode: Some("off".into()),
            ..Device::new(DeviceId(1), "ac")
        },
        Device {
            name: "Master Bedroom Ceiling Light".into(),
            icon: "lamp".into(),
            power: "50W".into(),
            is_on: true,
            room: "Master Bedroom".into(),
            is_common: true,
            brightness: Some(80),
            color_temp: Some(300),
            ..Device::new(DeviceId(2), "light")
        },
        Device {
            name: "Living Room Curtain".into(),
            icon: "curtain".into(),
            room: "Living Room".into(),
            is_common: true,
            position: Some(0),
            ..Device::new(DeviceId(3), "curtain")
        },
        Device {
            name: "Hallway Motion Sensor".into(),
            icon: "motion".into(),
            room: "Hallway".into(),
            is_common: true,
            ..Device::new(DeviceId(4), "sensor")
        },
        Device {
            name: "Living Room TV Remote".into(),
            icon: "remote".into(),
            room: "Living Room".into(),
            is_common: true,
            ..Device::new(DeviceId(5), "remote")
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use hassdeck_core::ControlVariant;

    use super::*;

    #[test]
    fn ids_are_unique_and_variants_cover_the_controls() {
        let devices = default_devices();
        let ids: HashSet<_> = devices.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), devices.len());

        let variants: Vec<_> = devices.iter().map(Device::control_variant).collect();
        assert!(variants.contains(&ControlVariant::Climate));
        assert!(variants.contains(&ControlVariant::Light));
        assert!(variants.contains(&ControlVariant::Curtain));
        assert!(variants.contains(&ControlVariant::Sensor));
        assert!(variants.contains(&ControlVariant::Remote));
    }
}
