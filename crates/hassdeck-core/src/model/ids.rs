// ── Identity types ──
//
// Dashboard devices are keyed by small integers; hub entities by their
// `domain.object_id` string. The mapping between the two is user config.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identity of a dashboard device, unique within the device list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// A Home Assistant entity id such as `light.kitchen` or `cover.living_room`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The service domain: everything before the first `.`.
    ///
    /// An id without a dot is treated as a bare domain.
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(d, _)| d)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Device id → entity id. Devices absent from the map are local-only.
///
/// Serializes as a JSON object with stringified integer keys, matching
/// the persisted `device_mappings` blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceMapping(BTreeMap<DeviceId, EntityId>);

impl DeviceMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: DeviceId) -> Option<&EntityId> {
        self.0.get(&id)
    }

    pub fn insert(&mut self, id: DeviceId, entity: EntityId) -> Option<EntityId> {
        self.0.insert(id, entity)
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<EntityId> {
        self.0.remove(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &EntityId)> {
        self.0.iter().map(|(id, e)| (*id, e))
    }
}

impl FromIterator<(DeviceId, EntityId)> for DeviceMapping {
    fn from_iter<I: IntoIterator<Item = (DeviceId, EntityId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
