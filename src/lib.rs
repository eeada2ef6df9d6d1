//! CreaTune sensor hub
//!
//! Keeps a live picture of the installation's three ESP32 sensor devices
//! (soil, light, temperature) fed by a WebSocket gateway, and derives the
//! single combined state the visuals and audio react to.
//!
//! # Features
//!
//! - Fixed three-slot device registry with validity tracking
//! - Combined state derivation with a fixed precedence order
//! - Synchronous notification bus with immutable snapshots
//! - Gateway client with fixed-delay reconnection and batched resets
//! - Staleness watchdog for devices that go quiet without saying goodbye
//! - Frame simulator for bench testing without hardware
//!
//! # Example
//!
//! ```no_run
//! use creatune_hub::{EventKind, GatewayClient, HubConfig, NotificationBus, SensorHub};
//!
//! # async fn run() -> creatune_hub::Result<()> {
//! let config = HubConfig::load(None)?;
//! let hub = SensorHub::new(NotificationBus::new());
//! hub.bus().subscribe(EventKind::StateChanged, |n| println!("{n:?}"));
//!
//! let client = GatewayClient::new(config, hub.clone());
//! client.connect()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod hub;
pub mod logging;
pub mod protocol;
pub mod simulation;
pub mod watchdog;

// Re-export main types for convenience
pub use client::{ClientStats, ConnectionState, GatewayClient, ReconnectPolicy};
pub use config::HubConfig;
pub use devices::{CombinedState, DeviceId, RegistrySnapshot};
pub use error::{HubError, Result};
pub use events::{EventKind, Notification, NotificationBus, Subscription};
pub use hub::SensorHub;
pub use simulation::GatewaySimulator;
pub use watchdog::StalenessWatchdog;
