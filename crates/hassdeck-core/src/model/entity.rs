// ── Hub entity snapshots ──

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::ids::EntityId;

/// States the hub reports for an entity it cannot reach.
pub const UNAVAILABLE_STATES: &[&str] = &["unavailable", "unknown"];

/// One entity as last reported by the hub. Read-only to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub last_changed: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<EntityId>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: None,
            last_updated: None,
        }
    }

    /// Builder-style attribute setter, mostly for tests and fixtures.
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    pub fn is_available(&self) -> bool {
        !UNAVAILABLE_STATES.contains(&self.state.as_str())
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Attribute as a number, if present and numeric.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key).and_then(Value::as_f64)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    /// Attribute as a string list, if present and array-valued.
    ///
    /// Non-string elements are rendered with their JSON text.
    pub fn attr_str_list(&self, key: &str) -> Option<Vec<String>> {
        self.attr(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
    }
}

/// Entity id → latest state, as produced by one `fetch_states` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySnapshot(HashMap<EntityId, EntityState>);

impl EntitySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityState> {
        self.0.get(id)
    }

    pub fn insert(&mut self, state: EntityState) {
        self.0.insert(state.entity_id.clone(), state);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityState> {
        self.0.values()
    }
}

impl FromIterator<EntityState> for EntitySnapshot {
    fn from_iter<I: IntoIterator<Item = EntityState>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|s| (s.entity_id.clone(), s))
                .collect(),
        )
    }
}
