//! Sensor hub: registry mutation, state derivation and notification
//!
//! Every write goes through one path: lock the registry, mutate, derive the
//! combined state before and after, release, then emit `deviceStatusChanged`
//! followed by `stateChanged`. A mutation that changes nothing emits nothing.
//! A reentrant dispatch
//! lock spans the whole sequence so notifications leave in the same order
//! the mutations happened, while handlers may still read (or even mutate)
//! the hub from inside a callback.

use crate::devices::{
    derive_state, resolve_hint, CombinedState, DeviceId, DeviceRegistry, RegistrySnapshot,
};
use crate::error::{HubError, Result};
use crate::events::{Notification, NotificationBus};
use crate::protocol::GatewayMessage;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct Tracked {
    registry: DeviceRegistry,
    last_activity: Option<Instant>,
}

struct HubInner {
    tracked: Mutex<Tracked>,
    dispatch: ReentrantMutex<()>,
    bus: NotificationBus,
}

/// Shared handle to the device registry and its notification bus
#[derive(Clone)]
pub struct SensorHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for SensorHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorHub")
            .field("state", &self.get_current_state())
            .field("bus", &self.inner.bus)
            .finish()
    }
}

impl SensorHub {
    /// Create a hub with a fresh, all-disconnected registry
    pub fn new(bus: NotificationBus) -> Self {
        Self {
            inner: Arc::new(HubInner {
                tracked: Mutex::new(Tracked {
                    registry: DeviceRegistry::new(),
                    last_activity: None,
                }),
                dispatch: ReentrantMutex::new(()),
                bus,
            }),
        }
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    /// Snapshot of all three devices
    pub fn get_status(&self) -> RegistrySnapshot {
        self.inner.tracked.lock().registry.snapshot()
    }

    /// Combined state derived from the current registry
    pub fn get_current_state(&self) -> CombinedState {
        derive_state(&self.inner.tracked.lock().registry)
    }

    /// Most recent activity attributed to any device
    pub fn last_activity(&self) -> Option<Instant> {
        self.inner.tracked.lock().last_activity
    }

    /// Parse and apply one text frame. Malformed frames are logged and
    /// dropped without touching the registry.
    pub fn handle_frame(&self, text: &str) -> bool {
        self.try_handle_frame(text).unwrap_or(false)
    }

    /// Like [`handle_frame`](Self::handle_frame) but hands the parse error
    /// back after logging it
    pub fn try_handle_frame(&self, text: &str) -> Result<bool> {
        match GatewayMessage::parse(text) {
            Ok(message) => Ok(self.apply(message)),
            Err(e) => {
                warn!(error = %e, category = e.category(), "Discarding gateway frame");
                Err(e)
            }
        }
    }

    /// Apply one parsed message. Returns true when the registry changed.
    pub fn apply(&self, message: GatewayMessage) -> bool {
        match message {
            GatewayMessage::Welcome { message } => {
                info!(
                    "Gateway says: {}",
                    message.as_deref().unwrap_or("(no message)")
                );
                false
            }
            GatewayMessage::SensorData(reading) => {
                let id = match Self::resolve(&reading.hints) {
                    Ok(id) => id,
                    Err(e) => {
                        debug!(error = %e, "Dropping reading");
                        return false;
                    }
                };
                debug!(device = %id, value = ?reading.value, "Sensor reading");
                self.mutate("sensor reading", |tracked, now| {
                    tracked.last_activity = Some(now);
                    tracked
                        .registry
                        .record_reading(id, reading.display_name(), reading.value, now)
                })
            }
            GatewayMessage::DeviceConnected { hints, name } => {
                let id = match Self::resolve(&hints) {
                    Ok(id) => id,
                    Err(e) => {
                        debug!(error = %e, "Ignoring connect");
                        return false;
                    }
                };
                info!(device = %id, ?name, "Device connected");
                self.mutate("device connected", |tracked, now| {
                    tracked.last_activity = Some(now);
                    tracked.registry.mark_connected(id, name.as_deref(), now)
                })
            }
            GatewayMessage::DeviceDisconnected { hints, name } => {
                let id = match Self::resolve(&hints) {
                    Ok(id) => id,
                    Err(e) => {
                        debug!(error = %e, "Ignoring disconnect");
                        return false;
                    }
                };
                info!(device = %id, ?name, "Device disconnected");
                self.mutate("device disconnected", |tracked, now| {
                    tracked.last_activity = Some(now);
                    tracked.registry.mark_disconnected(id)
                })
            }
            GatewayMessage::DeviceStatus { devices } => {
                let resolved: Vec<_> = devices
                    .iter()
                    .filter_map(|device| {
                        let id = resolve_hint(&device.name)?;
                        Some((id, device))
                    })
                    .collect();
                if resolved.is_empty() {
                    debug!("Status snapshot names no known devices");
                    return false;
                }
                self.mutate("status snapshot", |tracked, now| {
                    tracked.last_activity = Some(now);
                    resolved.iter().fold(false, |changed, (id, device)| {
                        let mut device_changed =
                            tracked
                                .registry
                                .mark_connected(*id, Some(&device.name), now);
                        if let Some(reading) = &device.last_data {
                            device_changed |= tracked.registry.record_reading(
                                *id,
                                Some(&device.name),
                                reading.value,
                                now,
                            );
                        }
                        changed | device_changed
                    })
                })
            }
            GatewayMessage::Heartbeat => {
                debug!("Gateway heartbeat");
                false
            }
            GatewayMessage::Informational { kind } => {
                debug!(%kind, "Ignoring informational frame");
                false
            }
        }
    }

    /// Reset every device to disconnected in one batched update
    pub fn reset_all(&self, reason: &str) -> bool {
        let changed = self.mutate(reason, |tracked, _| tracked.registry.disconnect_all());
        if changed {
            info!(%reason, "All devices reset");
        }
        changed
    }

    /// Reset every connected device if nothing has been heard for longer
    /// than `threshold`. The check and the reset happen under one lock.
    pub fn expire_stale(&self, now: Instant, threshold: Duration) -> bool {
        self.mutate_at(now, "staleness timeout", |tracked, now| {
            if !tracked.registry.any_connected() {
                return false;
            }
            let silent_for = tracked
                .last_activity
                .map(|at| now.saturating_duration_since(at));
            match silent_for {
                Some(silent_for) if silent_for > threshold => {
                    warn!(
                        silent_ms = silent_for.as_millis() as u64,
                        "No device activity, resetting connected devices"
                    );
                    tracked.registry.disconnect_all()
                }
                _ => false,
            }
        })
    }

    /// First hint that names a known device wins
    fn resolve(hints: &[String]) -> Result<DeviceId> {
        hints
            .iter()
            .find_map(|hint| resolve_hint(hint))
            .ok_or_else(|| HubError::unknown_device(hints.join(", ")))
    }

    fn mutate<F>(&self, reason: &str, f: F) -> bool
    where
        F: FnOnce(&mut Tracked, Instant) -> bool,
    {
        self.mutate_at(Instant::now(), reason, f)
    }

    fn mutate_at<F>(&self, now: Instant, reason: &str, f: F) -> bool
    where
        F: FnOnce(&mut Tracked, Instant) -> bool,
    {
        let _ordering = self.inner.dispatch.lock();

        let outcome = {
            let mut tracked = self.inner.tracked.lock();
            let before = derive_state(&tracked.registry);
            if !f(&mut tracked, now) {
                None
            } else {
                let after = derive_state(&tracked.registry);
                Some((Arc::new(tracked.registry.snapshot()), before, after))
            }
        };

        let Some((snapshot, before, after)) = outcome else {
            return false;
        };

        debug!(
            %reason,
            connected = snapshot.connected_count,
            valid = snapshot.valid_count,
            "Device status changed"
        );
        self.inner
            .bus
            .emit(Notification::DeviceStatusChanged { status: snapshot });

        if before != after {
            info!(from = %before, to = %after, scene = after.scene(), "Combined state changed");
        }
        self.inner.bus.emit(Notification::StateChanged {
            state: after,
            previous: before,
        });

        true
    }
}
