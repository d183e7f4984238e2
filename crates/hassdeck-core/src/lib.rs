// hassdeck-core: Device state, hub sync, and optimistic controls between
// hassdeck-api and consumers (CLI).

pub mod activity;
pub mod command;
pub mod config;
pub mod control;
pub mod controller;
pub mod convert;
pub mod error;
pub mod model;
pub mod remote;
pub mod store;
pub mod stream;
pub mod sync;
pub mod telemetry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use activity::{ActivityEntry, ActivityLog};
pub use command::{Command, CommandResult, CommandSink, ServiceCall};
pub use config::{ControlTiming, ControllerConfig, TlsVerification};
pub use control::{
    ClimateFanMode, ClimateMode, ClimateTemperature, ControlHandle, ControlView,
    ControlledAttribute, CurtainPosition, Effect, Gesture, LightBrightness, LightColorTemp,
    OptimisticControl, Outcome, Phase,
};
pub use controller::{ConnectionState, Controller};
pub use error::CoreError;
pub use remote::{InputSource, InputTelemetry, RemoteInputController, RemoteKey};
pub use store::DataStore;
pub use stream::DeviceStream;
pub use sync::{sync_device, sync_devices};
pub use telemetry::IrTelemetry;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ControlVariant, Device, DeviceId, DeviceMapping, EntityId, EntitySnapshot, EntityState,
    ensure_remote_device,
};
