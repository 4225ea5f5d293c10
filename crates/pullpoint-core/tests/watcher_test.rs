#![allow(clippy::unwrap_used)]
// FleetWatcher tests: polling, reconciliation, registry outages, and
// health checks.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{Harness, eventually};
use pullpoint_api::ConnectionSignal;
use pullpoint_core::{DeviceId, EngineConfig, FleetWatcher, SessionPhase};

fn quiet_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::ZERO,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn start_creates_a_session_per_device_without_waiting() {
    let h = Harness::with_config(&[1, 2, 3], quiet_config());
    h.connector.connect_gate.hold();
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;

    assert_eq!(
        h.manager.device_ids(),
        vec![DeviceId(1), DeviceId(2), DeviceId(3)]
    );
    assert_eq!(watcher.watched_devices().len(), 3);

    eventually(|| h.connector.connects() == 3).await;
    for id in [1, 2, 3] {
        let session = h.manager.session(DeviceId(id)).unwrap();
        assert_eq!(session.phase(), SessionPhase::Connecting);
        assert!(!session.is_connected());
    }

    watcher.stop().await;
    assert!(!watcher.is_running().await);
    assert!(watcher.watched_devices().is_empty());
}

#[tokio::test]
async fn start_is_idempotent() {
    let h = Harness::with_config(&[1], quiet_config());
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    watcher.start().await;
    assert!(watcher.is_running().await);

    eventually(|| h.manager.is_subscribed(DeviceId(1))).await;
    assert_eq!(h.connector.connects(), 1);
    assert_eq!(h.manager.device_ids(), vec![DeviceId(1)]);

    watcher.stop().await;
    // Sessions outlive the watcher.
    assert!(h.manager.is_subscribed(DeviceId(1)));
}

#[tokio::test]
async fn disabled_devices_are_retired() {
    let h = Harness::with_config(&[1, 2], quiet_config());
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    eventually(|| h.manager.is_subscribed(DeviceId(1)) && h.manager.is_subscribed(DeviceId(2)))
        .await;
    let retired = h.manager.session(DeviceId(2)).unwrap();

    h.registry.update(2, |r| r.disabled = true);
    watcher.poll_devices().await;

    assert_eq!(h.manager.device_ids(), vec![DeviceId(1)]);
    assert_eq!(watcher.watched_devices(), vec![DeviceId(1)]);
    assert!(retired.is_closed());
    assert!(h.manager.is_subscribed(DeviceId(1)));
}

#[tokio::test]
async fn registry_outage_keeps_known_sessions() {
    let h = Harness::with_config(&[1, 2], quiet_config());
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    eventually(|| h.manager.is_subscribed(DeviceId(1)) && h.manager.is_subscribed(DeviceId(2)))
        .await;

    h.registry.unavailable.store(true, Ordering::SeqCst);
    watcher.poll_devices().await;

    assert_eq!(h.manager.device_ids(), vec![DeviceId(1), DeviceId(2)]);
    assert_eq!(watcher.watched_devices(), vec![DeviceId(1), DeviceId(2)]);
    assert_eq!(h.connector.connects(), 2);
}

#[tokio::test]
async fn poll_picks_up_new_devices() {
    let h = Harness::with_config(&[1, 2], quiet_config());
    h.registry.update(2, |r| r.events_enabled = false);
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    assert_eq!(watcher.watched_devices(), vec![DeviceId(1)]);

    h.registry.update(2, |r| r.events_enabled = true);
    watcher.poll_devices().await;

    assert_eq!(watcher.watched_devices(), vec![DeviceId(1), DeviceId(2)]);
    eventually(|| h.manager.is_subscribed(DeviceId(2))).await;
}

#[tokio::test]
async fn poll_restores_a_session_removed_through_the_manager() {
    let h = Harness::with_config(&[1], quiet_config());
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    eventually(|| h.manager.is_subscribed(DeviceId(1))).await;
    let removed = h.manager.session(DeviceId(1)).unwrap();

    assert!(h.manager.unsubscribe(DeviceId(1)).await);
    assert!(h.manager.device_ids().is_empty());

    watcher.poll_devices().await;

    assert_eq!(h.manager.device_ids(), vec![DeviceId(1)]);
    assert_eq!(watcher.watched_devices(), vec![DeviceId(1)]);
    eventually(|| h.manager.is_subscribed(DeviceId(1))).await;
    assert!(removed.is_closed());
    assert_eq!(h.connector.connects(), 2);

    watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn health_check_ends_with_its_session() {
    let config = EngineConfig {
        health_check_interval: Duration::from_secs(15),
        ..quiet_config()
    };
    let h = Harness::with_config(&[1], config);
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    eventually(|| h.manager.is_subscribed(DeviceId(1))).await;
    h.manager.unsubscribe(DeviceId(1)).await;

    // Several health-check periods pass without a session; nothing is
    // re-created until the next poll.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.manager.device_ids().is_empty());
    assert_eq!(h.connector.connects(), 1);

    watcher.poll_devices().await;
    eventually(|| h.manager.is_subscribed(DeviceId(1))).await;
    assert_eq!(h.connector.connects(), 2);

    watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn health_check_reconnects_dropped_sessions() {
    let config = EngineConfig {
        retry_delay: Duration::from_secs(3600),
        ..quiet_config()
    };
    let h = Harness::with_config(&[1], config);
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    eventually(|| h.manager.is_subscribed(DeviceId(1))).await;
    let session = h.manager.session(DeviceId(1)).unwrap();

    h.connector
        .last_connection()
        .signal(ConnectionSignal::Closed);
    eventually(|| !session.is_connected()).await;
    assert_eq!(h.connector.connects(), 1);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(h.connector.connects(), 2);
    assert!(session.is_subscribed());

    watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn periodic_repoll_follows_registry() {
    let config = EngineConfig {
        poll_interval: Duration::from_secs(60),
        ..EngineConfig::default()
    };
    let h = Harness::with_config(&[1, 2], config);
    h.registry.update(2, |r| r.disabled = true);
    let watcher = FleetWatcher::new(h.manager.clone());

    watcher.start().await;
    assert_eq!(watcher.watched_devices(), vec![DeviceId(1)]);

    h.registry.update(2, |r| r.disabled = false);
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(watcher.watched_devices(), vec![DeviceId(1), DeviceId(2)]);
    watcher.stop().await;
}
