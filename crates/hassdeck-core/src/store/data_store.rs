// ── Central reactive data store ──
//
// Holds the dashboard device list, the device → entity mapping, and the
// last hub snapshot. Every collection lives in a `watch` channel, so reads
// are a borrow and writers are serialized by the channel itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{Device, DeviceId, DeviceMapping, EntityId, EntitySnapshot, EntityState};
use crate::stream::DeviceStream;
use crate::sync::sync_devices;

pub struct DataStore {
    devices: watch::Sender<Arc<Vec<Arc<Device>>>>,
    mapping: watch::Sender<Arc<DeviceMapping>>,
    entities: watch::Sender<Arc<EntitySnapshot>>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new(devices: Vec<Device>, mapping: DeviceMapping) -> Self {
        let devices = devices.into_iter().map(Arc::new).collect();
        let (devices, _) = watch::channel(Arc::new(devices));
        let (mapping, _) = watch::channel(Arc::new(mapping));
        let (entities, _) = watch::channel(Arc::new(EntitySnapshot::default()));
        let (last_refresh, _) = watch::channel(None);

        Self {
            devices,
            mapping,
            entities,
            last_refresh,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.borrow().clone()
    }

    pub fn device(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.devices.borrow().iter().find(|d| d.id == id).cloned()
    }

    pub fn mapping(&self) -> Arc<DeviceMapping> {
        self.mapping.borrow().clone()
    }

    /// The entity a device is mapped to, if any.
    pub fn entity_for(&self, id: DeviceId) -> Option<EntityId> {
        self.mapping.borrow().get(id).cloned()
    }

    /// The most recent hub snapshot. Empty until the first refresh.
    pub fn entities_snapshot(&self) -> Arc<EntitySnapshot> {
        self.entities.borrow().clone()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Merge a fresh hub snapshot into the device list.
    ///
    /// Returns whether any device changed. Subscribers are only woken
    /// when one did.
    pub fn apply_entities(&self, snapshot: EntitySnapshot) -> bool {
        self.entities.send_replace(Arc::new(snapshot));
        let _ = self.last_refresh.send_replace(Some(Utc::now()));
        self.resync()
    }

    /// Fold a handful of changed states (e.g. a service call's response)
    /// into the last snapshot without waiting for the next refresh.
    pub fn merge_entities(&self, states: impl IntoIterator<Item = EntityState>) -> bool {
        self.entities.send_modify(|current| {
            let snapshot = Arc::make_mut(current);
            for state in states {
                snapshot.insert(state);
            }
        });
        self.resync()
    }

    /// Replace the mapping and re-sync against the last hub snapshot.
    pub fn set_mapping(&self, mapping: DeviceMapping) -> bool {
        self.mapping.send_replace(Arc::new(mapping));
        self.resync()
    }

    /// Replace the whole device list (e.g. after loading persisted state).
    pub fn replace_devices(&self, devices: Vec<Device>) {
        let devices = devices.into_iter().map(Arc::new).collect();
        self.devices.send_replace(Arc::new(devices));
        self.resync();
    }

    /// Patch one device in place. Returns whether it changed.
    pub fn update_device(
        &self,
        id: DeviceId,
        patch: impl FnOnce(&mut Device),
    ) -> Result<bool, CoreError> {
        let mut found = false;
        let changed = self.devices.send_if_modified(|current| {
            let Some(idx) = current.iter().position(|d| d.id == id) else {
                return false;
            };
            found = true;

            let mut next = Device::clone(&current[idx]);
            patch(&mut next);
            if next == *current[idx] {
                return false;
            }

            let mut list: Vec<Arc<Device>> = current.iter().cloned().collect();
            list[idx] = Arc::new(next);
            *current = Arc::new(list);
            true
        });

        if found {
            Ok(changed)
        } else {
            Err(CoreError::DeviceNotFound { id })
        }
    }

    /// Re-run the sync engine against the newest snapshot and mapping.
    ///
    /// Both are read while the device channel is held, so a concurrent
    /// writer's resync always sees whatever the other one published.
    fn resync(&self) -> bool {
        let mut entities = 0;
        let changed = self.devices.send_if_modified(|current| {
            let snapshot = self.entities_snapshot();
            let mapping = self.mapping();
            entities = snapshot.len();
            let next = sync_devices(current, &snapshot, &mapping);
            if Arc::ptr_eq(&next, current) {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(entities, "device list updated from hub");
        }
        changed
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_devices(&self) -> DeviceStream {
        DeviceStream::new(self.devices.subscribe())
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(Vec::new(), DeviceMapping::default())
    }
}
