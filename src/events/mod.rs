//! Notification fan-out to UI and audio consumers

pub mod bus;

pub use bus::{EventKind, Notification, NotificationBus, Subscription};
