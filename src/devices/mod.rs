//! Device state for the three sensor slots
//!
//! The registry holds the per-device connection/validity/value records,
//! `hint` maps free-form device hints from the wire onto slots, and `state`
//! derives the single combined state the installation reacts to.

pub mod hint;
pub mod registry;
pub mod state;

pub use hint::resolve_hint;
pub use registry::{DeviceId, DeviceRegistry, DeviceStatus, RegistrySnapshot, SensorDevice};
pub use state::{derive_state, CombinedState};
