// ── IR send telemetry ──
//
// One record per remote-control send attempt, published on the
// controller's broadcast channel for diagnostics panels and `hassdeck watch`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DeviceId, EntityId};

/// Outcome of a single IR send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrTelemetry {
    pub device_id: DeviceId,
    /// `None` when the remote device has no mapped entity.
    pub entity_id: Option<EntityId>,
    pub code: String,
    pub ok: bool,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IrTelemetry {
    pub(crate) fn unmapped(device_id: DeviceId, code: &str) -> Self {
        Self {
            device_id,
            entity_id: None,
            code: code.to_owned(),
            ok: false,
            ts: Utc::now(),
            error: None,
        }
    }

    pub(crate) fn sent(device_id: DeviceId, entity_id: EntityId, code: &str) -> Self {
        Self {
            device_id,
            entity_id: Some(entity_id),
            code: code.to_owned(),
            ok: true,
            ts: Utc::now(),
            error: None,
        }
    }

    pub(crate) fn failed(
        device_id: DeviceId,
        entity_id: EntityId,
        code: &str,
        error: impl ToString,
    ) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            ..Self::sent(device_id, entity_id, code)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_dashboard_field_names() {
        let t = IrTelemetry::failed(
            DeviceId(12),
            EntityId::from("remote.living_room_tv"),
            "vol_up",
            "hub unreachable",
        );
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["deviceId"], json!(12));
        assert_eq!(v["entityId"], json!("remote.living_room_tv"));
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["error"], json!("hub unreachable"));
    }

    #[test]
    fn unmapped_has_no_entity_and_no_error() {
        let t = IrTelemetry::unmapped(DeviceId(12), "power");
        assert!(!t.ok);
        assert!(t.entity_id.is_none());
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["entityId"], json!(null));
        assert!(v.get("error").is_none());
    }
}
