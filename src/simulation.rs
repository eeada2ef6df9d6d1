//! Gateway simulator
//!
//! Produces the frames a real gateway would send to put the installation
//! into a chosen combined state, for bench testing without hardware.
//! Valid readings are drawn from 0.4..=0.8, the range the sensors report
//! when something is actually happening.

use crate::devices::{CombinedState, DeviceId};
use crate::hub::SensorHub;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::ops::RangeInclusive;
use tracing::debug;

/// Range valid simulated readings are drawn from
pub const VALID_RANGE: RangeInclusive<f64> = 0.4..=0.8;

/// Stateful frame generator mirroring three simulated devices
#[derive(Debug)]
pub struct GatewaySimulator<R = StdRng> {
    rng: R,
    connected: [bool; 3],
}

impl GatewaySimulator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for GatewaySimulator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> GatewaySimulator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            connected: [false; 3],
        }
    }

    /// A reading inside [`VALID_RANGE`]
    pub fn random_value(&mut self) -> f64 {
        self.rng.gen_range(VALID_RANGE)
    }

    pub fn random_state(&mut self) -> CombinedState {
        CombinedState::ALL_STATES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or_default()
    }

    /// Frames that move the simulated devices to `target`: members get a
    /// fresh valid reading, everyone else is disconnected.
    pub fn frames_for_state(&mut self, target: CombinedState) -> Vec<String> {
        let mut frames = Vec::new();
        for id in DeviceId::ALL {
            let wanted = target.members().contains(&id);
            let connected = &mut self.connected[id.index()];
            match (wanted, *connected) {
                (true, false) => {
                    frames.push(connected_frame(id));
                    *connected = true;
                }
                (false, true) => {
                    frames.push(disconnected_frame(id));
                    *connected = false;
                }
                _ => {}
            }
            if wanted {
                let value = self.random_value();
                frames.push(reading_frame(id, Some(value)));
            }
        }
        frames
    }

    /// Feed the frames for `target` straight into a hub and report where it
    /// ended up
    pub fn drive(&mut self, hub: &SensorHub, target: CombinedState) -> CombinedState {
        for frame in self.frames_for_state(target) {
            debug!(%frame, "Simulated frame");
            hub.handle_frame(&frame);
        }
        hub.get_current_state()
    }
}

/// `sensor_data` frame; `None` sends an explicit null reading
pub fn reading_frame(id: DeviceId, value: Option<f64>) -> String {
    json!({
        "type": "sensor_data",
        "sensor": id.sensor_kind(),
        "name": id.default_name(),
        "value": value,
    })
    .to_string()
}

pub fn connected_frame(id: DeviceId) -> String {
    json!({
        "type": "esp_connected",
        "name": id.default_name(),
        "sensor": id.sensor_kind(),
    })
    .to_string()
}

pub fn disconnected_frame(id: DeviceId) -> String {
    json!({
        "type": "esp_disconnected",
        "name": id.default_name(),
        "sensor": id.sensor_kind(),
    })
    .to_string()
}
