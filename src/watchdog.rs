//! Periodic staleness check
//!
//! Devices that stop reporting without a disconnect message would otherwise
//! stay "connected" forever. The watchdog uses one global activity clock:
//! when no device has been heard from for longer than the threshold, every
//! connected device is reset together.

use crate::config::WatchdogConfig;
use crate::hub::SensorHub;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct StalenessWatchdog {
    hub: SensorHub,
    interval: Duration,
    threshold: Duration,
}

impl StalenessWatchdog {
    pub fn new(hub: SensorHub, config: &WatchdogConfig) -> Self {
        Self {
            hub,
            interval: config.interval,
            threshold: config.staleness_threshold,
        }
    }

    /// Run one check as of `now`. Returns true if devices were reset.
    pub fn check(&self, now: Instant) -> bool {
        self.hub.expire_stale(now, self.threshold)
    }

    /// Run checks on a fixed interval until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            info!(
                interval_ms = self.interval.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "Staleness watchdog started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if self.check(Instant::now()) {
                            debug!("Watchdog reset stale devices");
                        }
                    }
                }
            }

            debug!("Staleness watchdog stopped");
        })
    }
}
