// ── API-to-domain type conversions ──
//
// Bridges raw `hassdeck_api` wire types into the core model. The hub's
// state payload is already close to what the sync engine wants, so this
// is mostly a rename into strong id types.

use hassdeck_api::HassState;

use crate::model::{EntityId, EntitySnapshot, EntityState};

impl From<HassState> for EntityState {
    fn from(s: HassState) -> Self {
        Self {
            entity_id: EntityId::from(s.entity_id),
            state: s.state,
            attributes: s.attributes,
            last_changed: s.last_changed,
            last_updated: s.last_updated,
        }
    }
}

/// Build a snapshot from one `GET /api/states` response.
pub fn snapshot_from_states(states: Vec<HassState>) -> EntitySnapshot {
    states.into_iter().map(EntityState::from).collect()
}
