//! Combined state derivation
//!
//! The combined state is never stored. It is recomputed from the set of
//! valid devices after every registry mutation, so it cannot drift from the
//! device records it summarises.

use super::registry::{DeviceId, DeviceRegistry, RegistrySnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete summary of which devices currently hold valid data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CombinedState {
    #[default]
    #[serde(rename = "STATE_IDLE")]
    Idle,
    #[serde(rename = "STATE_A")]
    A,
    #[serde(rename = "STATE_B")]
    B,
    #[serde(rename = "STATE_C")]
    C,
    #[serde(rename = "STATE_AB")]
    Ab,
    #[serde(rename = "STATE_AC")]
    Ac,
    #[serde(rename = "STATE_BC")]
    Bc,
    #[serde(rename = "STATE_ALL")]
    All,
}

impl CombinedState {
    /// Ordered rule table, first match wins.
    pub fn from_valid(a: bool, b: bool, c: bool) -> Self {
        if a && b && c {
            CombinedState::All
        } else if b && c {
            CombinedState::Bc
        } else if a && c {
            CombinedState::Ac
        } else if a && b {
            CombinedState::Ab
        } else if c {
            CombinedState::C
        } else if b {
            CombinedState::B
        } else if a {
            CombinedState::A
        } else {
            CombinedState::Idle
        }
    }

    /// Same derivation over an already-taken snapshot
    pub fn from_snapshot(snapshot: &RegistrySnapshot) -> Self {
        let valid = |id| snapshot.device(id).is_some_and(|d| d.valid);
        Self::from_valid(valid(DeviceId::A), valid(DeviceId::B), valid(DeviceId::C))
    }

    /// Scene label used by the installation's visuals and audio
    pub fn scene(self) -> &'static str {
        match self {
            CombinedState::Idle => "idle",
            CombinedState::A => "soil",
            CombinedState::B => "light",
            CombinedState::C => "temp",
            CombinedState::Ab => "growth",
            CombinedState::Ac => "mirrage",
            CombinedState::Bc => "flower",
            CombinedState::All => "total",
        }
    }

    /// Look a state up by scene label or `STATE_*` name, ignoring case
    pub fn from_scene(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL_STATES.into_iter().find(|state| {
            state.scene().eq_ignore_ascii_case(name) || state.to_string().eq_ignore_ascii_case(name)
        })
    }

    /// Devices that must be valid for this state
    pub fn members(self) -> &'static [DeviceId] {
        match self {
            CombinedState::Idle => &[],
            CombinedState::A => &[DeviceId::A],
            CombinedState::B => &[DeviceId::B],
            CombinedState::C => &[DeviceId::C],
            CombinedState::Ab => &[DeviceId::A, DeviceId::B],
            CombinedState::Ac => &[DeviceId::A, DeviceId::C],
            CombinedState::Bc => &[DeviceId::B, DeviceId::C],
            CombinedState::All => &[DeviceId::A, DeviceId::B, DeviceId::C],
        }
    }

    pub const ALL_STATES: [CombinedState; 8] = [
        CombinedState::Idle,
        CombinedState::A,
        CombinedState::B,
        CombinedState::C,
        CombinedState::Ab,
        CombinedState::Ac,
        CombinedState::Bc,
        CombinedState::All,
    ];
}

impl fmt::Display for CombinedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CombinedState::Idle => "STATE_IDLE",
            CombinedState::A => "STATE_A",
            CombinedState::B => "STATE_B",
            CombinedState::C => "STATE_C",
            CombinedState::Ab => "STATE_AB",
            CombinedState::Ac => "STATE_AC",
            CombinedState::Bc => "STATE_BC",
            CombinedState::All => "STATE_ALL",
        };
        f.write_str(name)
    }
}

/// Derive the combined state from the current registry contents
pub fn derive_state(registry: &DeviceRegistry) -> CombinedState {
    let valid = |id| registry.device(id).is_valid();
    CombinedState::from_valid(valid(DeviceId::A), valid(DeviceId::B), valid(DeviceId::C))
}
