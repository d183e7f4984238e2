// ── Interactive device controls ──
//
// A generic optimistic-commit state machine, the per-attribute bindings
// that specialize it, and the actor that hosts one instance at runtime.

pub mod attribute;
pub mod machine;
pub mod session;

pub use attribute::{
    ClimateFanMode, ClimateMode, ClimateTemperature, ControlledAttribute, CurtainPosition,
    LightBrightness, LightColorTemp,
};
pub use machine::{Effect, OptimisticControl, PendingCommit, Phase};
pub use session::{ControlHandle, ControlSession, ControlView, Gesture, Outcome};
