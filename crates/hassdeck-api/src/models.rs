// Wire types for the Home Assistant REST API.
//
// These mirror the JSON the hub sends and nothing more. Domain
// conversion happens in `hassdeck-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single entity state as returned by `GET /api/states`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Response body of `GET /api/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiStatus {
    pub message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_parses_hub_timestamps() {
        let raw = json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": { "brightness": 180, "friendly_name": "Kitchen" },
            "last_changed": "2024-03-01T10:15:00.123456+00:00",
            "last_updated": "2024-03-01T10:15:02+00:00",
            "context": { "id": "01HQ", "parent_id": null, "user_id": null }
        });

        let state: HassState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.entity_id, "light.kitchen");
        assert_eq!(state.attributes["brightness"], json!(180));
        assert!(state.last_changed.is_some());
        assert!(state.last_updated.unwrap() > state.last_changed.unwrap());
    }

    #[test]
    fn state_tolerates_missing_attributes() {
        let state: HassState =
            serde_json::from_value(json!({ "entity_id": "sun.sun", "state": "above_horizon" }))
                .unwrap();
        assert!(state.attributes.is_empty());
        assert!(state.last_changed.is_none());
    }
}
