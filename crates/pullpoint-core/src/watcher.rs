// ── Fleet watcher ──
//
// Keeps every enabled device subscribed: polls the registry, creates
// sessions for new devices, runs a per-device health check that repairs
// dropped connections, and retires sessions for devices that were
// disabled. An owned object; create one per manager.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::manager::SubscriptionManager;
use crate::model::DeviceId;

#[derive(Clone)]
pub struct FleetWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    manager: Arc<SubscriptionManager>,
    health: DashMap<DeviceId, CancellationToken>,
    run: Mutex<Option<CancellationToken>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FleetWatcher {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                manager,
                health: DashMap::new(),
                run: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.inner.manager
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Poll once, then keep re-polling at the configured interval.
    /// Calling `start` on a running watcher does nothing.
    pub async fn start(&self) {
        let cancel = {
            let mut run = self.inner.run.lock().await;
            if run.is_some() {
                debug!("fleet watcher already running");
                return;
            }
            let cancel = CancellationToken::new();
            *run = Some(cancel.clone());
            cancel
        };

        info!("fleet watcher starting");
        self.poll_devices().await;

        let interval = self.inner.manager.config().poll_interval;
        if !interval.is_zero() {
            let watcher = self.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(repoll_task(watcher, interval, cancel)));
        }
    }

    /// Stop polling and health checks. Sessions keep running.
    pub async fn stop(&self) {
        let Some(cancel) = self.inner.run.lock().await.take() else {
            return;
        };
        cancel.cancel();

        let ids: Vec<DeviceId> = self.inner.health.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.stop_health_check(id);
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("fleet watcher stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.run.lock().await.is_some()
    }

    /// Devices with an active health check, sorted.
    pub fn watched_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.inner.health.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Reconcile sessions with the registry.
    ///
    /// Devices without a live session (new ones, or ones whose session was
    /// removed through the manager) get a session, a fresh health check,
    /// and a background establish (not awaited). When the registry cannot
    /// be reached the already known devices are used and nothing is torn
    /// down.
    pub async fn poll_devices(&self) {
        let manager = &self.inner.manager;

        let (devices, authoritative) = match manager.registry().find_all_enabled().await {
            Ok(devices) => (devices, true),
            Err(e) => {
                warn!(error = %e, "device registry unavailable, keeping known sessions");
                (manager.known_devices(), false)
            }
        };

        let enabled: HashSet<DeviceId> = devices.iter().map(|d| d.id).collect();
        debug!(devices = enabled.len(), authoritative, "polled device registry");

        for info in devices {
            let device_id = info.id;
            let live = manager.session(device_id).is_some_and(|s| !s.is_closed());
            if live && self.inner.health.contains_key(&device_id) {
                continue;
            }

            let session = manager.ensure_session(info).await;
            self.start_health_check(device_id);

            tokio::spawn(async move {
                if let Err(e) = session.establish().await {
                    log_failure(device_id, &e);
                }
            });
        }

        if !authoritative {
            return;
        }

        let mut stale: Vec<DeviceId> = manager
            .device_ids()
            .into_iter()
            .chain(self.inner.health.iter().map(|e| *e.key()))
            .filter(|id| !enabled.contains(id))
            .collect();
        stale.sort_unstable();
        stale.dedup();

        for device_id in stale {
            self.stop_health_check(device_id);
            if manager.unsubscribe(device_id).await {
                info!(%device_id, "device no longer enabled, session removed");
            }
        }
    }

    // ── Health checks ────────────────────────────────────────────────

    fn start_health_check(&self, device_id: DeviceId) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.inner.health.insert(device_id, cancel.clone()) {
            previous.cancel();
        }

        let manager = Arc::clone(&self.inner.manager);
        let period = manager.config().health_check_interval;
        tokio::spawn(health_check_task(manager, device_id, period, cancel));
    }

    fn stop_health_check(&self, device_id: DeviceId) {
        if let Some((_, cancel)) = self.inner.health.remove(&device_id) {
            cancel.cancel();
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn repoll_task(watcher: FleetWatcher, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => watcher.poll_devices().await,
        }
    }
}

/// Re-establish the device's session whenever it is found disconnected.
/// Ends once the session is gone; the next poll starts a new check along
/// with the new session.
async fn health_check_task(
    manager: Arc<SubscriptionManager>,
    device_id: DeviceId,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(session) = manager.session(device_id) else {
                    debug!(%device_id, "health check: session removed, stopping");
                    break;
                };
                if session.is_connected() {
                    continue;
                }
                debug!(%device_id, "health check: not connected, re-establishing");
                if let Err(e) = session.establish().await {
                    log_failure(device_id, &e);
                }
            }
        }
    }
}

fn log_failure(device_id: DeviceId, err: &CoreError) {
    let at = Utc::now();
    match err {
        CoreError::CoolingDown { retry_in, .. } => {
            debug!(%device_id, ?retry_in, %at, "establish deferred, cooling down");
        }
        CoreError::SessionClosed { .. } => {}
        _ => {
            let kind = err.kind().map(|k| k.to_string());
            warn!(
                %device_id,
                kind = kind.as_deref().unwrap_or("unknown"),
                %at,
                error = %err,
                "establish failed"
            );
        }
    }
}
