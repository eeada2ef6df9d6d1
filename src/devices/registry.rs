//! In-memory table of the three sensor device slots
//!
//! Entries are created once with disconnected defaults and only ever
//! mutated. Every mutator keeps `valid ⇒ connected` and
//! `!connected ⇒ value.is_none() && !valid`, and reports whether anything
//! observable changed so callers can skip no-op notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Stable identifier of a device slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceId {
    /// Soil moisture sensor (ESP32-1)
    #[serde(rename = "DEVICE_A")]
    A,
    /// Light sensor (ESP32-2)
    #[serde(rename = "DEVICE_B")]
    B,
    /// Temperature sensor (ESP32-3)
    #[serde(rename = "DEVICE_C")]
    C,
}

impl DeviceId {
    /// All slots in registry order
    pub const ALL: [DeviceId; 3] = [DeviceId::A, DeviceId::B, DeviceId::C];

    /// Zero-based slot position
    pub fn index(self) -> usize {
        match self {
            DeviceId::A => 0,
            DeviceId::B => 1,
            DeviceId::C => 2,
        }
    }

    /// What the slot measures in the installation
    pub fn sensor_kind(self) -> &'static str {
        match self {
            DeviceId::A => "soil",
            DeviceId::B => "light",
            DeviceId::C => "temperature",
        }
    }

    /// Name used until a device announces its own
    pub fn default_name(self) -> &'static str {
        match self {
            DeviceId::A => "ESP32-1",
            DeviceId::B => "ESP32-2",
            DeviceId::C => "ESP32-3",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::A => write!(f, "DEVICE_A"),
            DeviceId::B => write!(f, "DEVICE_B"),
            DeviceId::C => write!(f, "DEVICE_C"),
        }
    }
}

/// One sensor device slot
#[derive(Debug, Clone)]
pub struct SensorDevice {
    id: DeviceId,
    display_name: String,
    connected: bool,
    valid: bool,
    value: Option<f64>,
    last_activity_at: Option<Instant>,
    last_seen: Option<DateTime<Utc>>,
}

impl SensorDevice {
    fn new(id: DeviceId) -> Self {
        Self {
            id,
            display_name: id.default_name().to_string(),
            connected: false,
            valid: false,
            value: None,
            last_activity_at: None,
            last_seen: None,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Monotonic time of the most recent accepted message
    pub fn last_activity_at(&self) -> Option<Instant> {
        self.last_activity_at
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity_at = Some(now);
        self.last_seen = Some(Utc::now());
    }

    fn rename(&mut self, name: Option<&str>) -> bool {
        match name.map(str::trim) {
            Some(name) if !name.is_empty() && name != self.display_name => {
                self.display_name = name.to_string();
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self) -> bool {
        let changed = self.connected || self.valid || self.value.is_some();
        self.connected = false;
        self.valid = false;
        self.value = None;
        changed
    }

    fn status(&self) -> DeviceStatus {
        DeviceStatus {
            id: self.id,
            display_name: self.display_name.clone(),
            connected: self.connected,
            valid: self.valid,
            value: self.value,
            last_seen: self.last_seen,
        }
    }
}

/// Immutable view of one device, attached to notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub display_name: String,
    pub connected: bool,
    pub valid: bool,
    pub value: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Immutable view of the whole registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub devices: Vec<DeviceStatus>,
    pub connected_count: usize,
    pub valid_count: usize,
}

impl RegistrySnapshot {
    pub fn device(&self, id: DeviceId) -> Option<&DeviceStatus> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// Fixed-cardinality device table
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: [SensorDevice; 3],
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Create a registry with every slot disconnected
    pub fn new() -> Self {
        Self {
            devices: DeviceId::ALL.map(SensorDevice::new),
        }
    }

    pub fn device(&self, id: DeviceId) -> &SensorDevice {
        &self.devices[id.index()]
    }

    fn device_mut(&mut self, id: DeviceId) -> &mut SensorDevice {
        &mut self.devices[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorDevice> {
        self.devices.iter()
    }

    pub fn any_connected(&self) -> bool {
        self.devices.iter().any(|d| d.connected)
    }

    /// Record a reading attributed to `id`.
    ///
    /// The device becomes connected; it is valid only when `value` is a
    /// finite number, otherwise the stored value is cleared.
    pub fn record_reading(
        &mut self,
        id: DeviceId,
        name: Option<&str>,
        value: Option<f64>,
        now: Instant,
    ) -> bool {
        let device = self.device_mut(id);
        let value = value.filter(|v| v.is_finite());
        let valid = value.is_some();

        let renamed = device.rename(name);
        let changed = !device.connected || device.valid != valid || device.value != value;

        device.connected = true;
        device.valid = valid;
        device.value = value;
        device.touch(now);

        renamed || changed
    }

    /// Mark `id` connected without a reading.
    ///
    /// A device that is already connected keeps its current reading; a newly
    /// connected one stays invalid until data arrives.
    pub fn mark_connected(&mut self, id: DeviceId, name: Option<&str>, now: Instant) -> bool {
        let device = self.device_mut(id);
        let renamed = device.rename(name);
        let changed = !device.connected;

        if changed {
            device.connected = true;
            device.valid = false;
            device.value = None;
        }
        device.touch(now);

        renamed || changed
    }

    /// Mark `id` disconnected, clearing its reading
    pub fn mark_disconnected(&mut self, id: DeviceId) -> bool {
        self.device_mut(id).reset()
    }

    /// Reset every slot to disconnected in one pass
    pub fn disconnect_all(&mut self) -> bool {
        self.devices
            .iter_mut()
            .fold(false, |changed, device| device.reset() || changed)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            devices: self.devices.iter().map(SensorDevice::status).collect(),
            connected_count: self.devices.iter().filter(|d| d.connected).count(),
            valid_count: self.devices.iter().filter(|d| d.valid).count(),
        }
    }
}
