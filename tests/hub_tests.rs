//! End-to-end hub behaviour through the public API

use creatune_hub::config::WatchdogConfig;
use creatune_hub::simulation::{connected_frame, reading_frame};
use creatune_hub::{
    CombinedState, DeviceId, EventKind, GatewaySimulator, Notification, NotificationBus,
    SensorHub, StalenessWatchdog,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod common;
use common::drain;

#[rstest]
#[case(&[DeviceId::A, DeviceId::B, DeviceId::C], CombinedState::All)]
#[case(&[DeviceId::B, DeviceId::C], CombinedState::Bc)]
#[case(&[DeviceId::A, DeviceId::C], CombinedState::Ac)]
#[case(&[DeviceId::A, DeviceId::B], CombinedState::Ab)]
#[case(&[DeviceId::C], CombinedState::C)]
#[case(&[], CombinedState::Idle)]
fn test_frames_to_state(#[case] valid: &[DeviceId], #[case] expected: CombinedState) {
    let hub = SensorHub::new(NotificationBus::new());
    for id in valid {
        hub.handle_frame(&reading_frame(*id, Some(0.5)));
    }
    assert_eq!(hub.get_current_state(), expected);
}

#[test]
fn test_connected_without_data_stays_idle() {
    let hub = SensorHub::new(NotificationBus::new());
    for id in DeviceId::ALL {
        hub.handle_frame(&connected_frame(id));
    }
    assert_eq!(hub.get_status().connected_count, 3);
    assert_eq!(hub.get_current_state(), CombinedState::Idle);
}

#[test]
fn test_status_precedes_state_for_each_mutation() {
    let hub = SensorHub::new(NotificationBus::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::DeviceStatusChanged, EventKind::StateChanged] {
        let order = order.clone();
        hub.bus()
            .subscribe(kind, move |n| order.lock().push(n.kind()));
    }

    hub.handle_frame(&reading_frame(DeviceId::A, Some(0.6)));
    // Same value again: no change, no notifications
    hub.handle_frame(&reading_frame(DeviceId::A, Some(0.6)));
    // Value changes but the combined state does not; it is still announced
    hub.handle_frame(&reading_frame(DeviceId::A, Some(0.7)));

    assert_eq!(
        *order.lock(),
        vec![
            EventKind::DeviceStatusChanged,
            EventKind::StateChanged,
            EventKind::DeviceStatusChanged,
            EventKind::StateChanged,
        ]
    );
}

#[test]
fn test_snapshots_are_independent_of_later_mutations() {
    let hub = SensorHub::new(NotificationBus::new());
    let (_sub, mut rx) = hub.bus().subscribe_channel(EventKind::DeviceStatusChanged);

    hub.handle_frame(&reading_frame(DeviceId::B, Some(0.5)));
    hub.reset_all("test");

    let snapshots: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|n| match n {
            Notification::DeviceStatusChanged { status } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].device(DeviceId::B).unwrap().value, Some(0.5));
    assert_eq!(snapshots[1].device(DeviceId::B).unwrap().value, None);
}

#[tokio::test(start_paused = true)]
async fn test_silence_resets_to_idle_once() {
    let hub = SensorHub::new(NotificationBus::new());
    let (_sub, mut states) = hub.bus().subscribe_channel(EventKind::StateChanged);
    let mut simulator = GatewaySimulator::seeded(3);
    simulator.drive(&hub, CombinedState::All);
    drain(&mut states);

    let token = CancellationToken::new();
    let watchdog = StalenessWatchdog::new(hub.clone(), &WatchdogConfig::default());
    let handle = watchdog.spawn(token.clone());

    // Well past the threshold and several more ticks
    tokio::time::sleep(Duration::from_secs(60)).await;

    let transitions = drain(&mut states);
    assert_eq!(
        transitions,
        vec![Notification::StateChanged {
            state: CombinedState::Idle,
            previous: CombinedState::All,
        }]
    );
    assert_eq!(hub.get_status().connected_count, 0);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silence_after_bare_connect_announces_idle() {
    let hub = SensorHub::new(NotificationBus::new());
    let (_sub, mut states) = hub.bus().subscribe_channel(EventKind::StateChanged);
    hub.handle_frame(&connected_frame(DeviceId::A));
    drain(&mut states);

    let token = CancellationToken::new();
    let watchdog = StalenessWatchdog::new(hub.clone(), &WatchdogConfig::default());
    let handle = watchdog.spawn(token.clone());

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(
        drain(&mut states),
        vec![Notification::StateChanged {
            state: CombinedState::Idle,
            previous: CombinedState::Idle,
        }]
    );
    assert_eq!(hub.get_status().connected_count, 0);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_activity_from_any_device_keeps_all_alive() {
    let hub = SensorHub::new(NotificationBus::new());
    let watchdog = StalenessWatchdog::new(hub.clone(), &WatchdogConfig::default());
    hub.handle_frame(&reading_frame(DeviceId::A, Some(0.5)));
    hub.handle_frame(&reading_frame(DeviceId::C, Some(0.5)));

    // Only C keeps talking; the clock is global, so A survives too
    for _ in 0..6 {
        tokio::time::advance(Duration::from_secs(10)).await;
        hub.handle_frame(&reading_frame(DeviceId::C, Some(0.6)));
        assert!(!watchdog.check(tokio::time::Instant::now()));
    }
    assert_eq!(hub.get_current_state(), CombinedState::Ac);
}
