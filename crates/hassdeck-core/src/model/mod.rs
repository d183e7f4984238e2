// ── Domain model ──
//
// Dashboard devices, hub entity snapshots, and the identity types that
// connect the two.

pub mod device;
pub mod entity;
pub mod ids;

pub use device::{ControlVariant, Device, ensure_remote_device};
pub use entity::{EntitySnapshot, EntityState};
pub use ids::{DeviceId, DeviceMapping, EntityId};
