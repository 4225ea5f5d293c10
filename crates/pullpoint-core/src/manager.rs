// ── Subscription manager ──
//
// The single owned registry of device sessions. Creation and removal are
// serialized by the lifecycle lock so there is never more than one session
// per device. The fleet watcher and any API surface share one manager.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use pullpoint_api::Connector;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::failure::FailureStatus;
use crate::model::{DeviceConnectionInfo, DeviceId, TopicEvent};
use crate::registry::DeviceRegistry;
use crate::session::{DeviceSession, SessionContext};
use crate::sink::TriggerSink;

pub struct SubscriptionManager {
    ctx: SessionContext,
    registry: Arc<dyn DeviceRegistry>,
    sessions: DashMap<DeviceId, Arc<DeviceSession>>,
    lifecycle: Mutex<()>,
}

impl SubscriptionManager {
    pub fn new(
        config: EngineConfig,
        registry: Arc<dyn DeviceRegistry>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn TriggerSink>,
    ) -> Self {
        Self::with_context(SessionContext::new(config, connector, sink), registry)
    }

    pub fn with_context(ctx: SessionContext, registry: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            ctx,
            registry,
            sessions: DashMap::new(),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn registry(&self) -> &Arc<dyn DeviceRegistry> {
        &self.registry
    }

    // ── Public surface ───────────────────────────────────────────────

    /// Make sure the device has a live subscription.
    ///
    /// Idempotent: a device that is already subscribed returns at once,
    /// without consulting the registry. The session is kept when
    /// establishing fails so its failure history (and cooldown) carries
    /// over to the next attempt.
    pub async fn subscribe(&self, device_id: DeviceId) -> Result<(), CoreError> {
        if let Some(session) = self.session(device_id) {
            if !session.is_closed() && session.is_subscribed() {
                debug!(%device_id, "already subscribed");
                return Ok(());
            }
        }

        let info = self
            .registry
            .find_by_id(device_id)
            .await?
            .ok_or(CoreError::DeviceNotFound { device_id })?;

        if !info.is_watchable() {
            return Err(CoreError::DeviceDisabled { device_id });
        }

        let session = self.ensure_session(info).await;
        session.establish().await
    }

    /// Tear down the device's session. Returns whether one existed.
    pub async fn unsubscribe(&self, device_id: DeviceId) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let Some((_, session)) = self.sessions.remove(&device_id) else {
            return false;
        };
        session.cleanup().await;
        info!(%device_id, "unsubscribed");
        true
    }

    pub fn is_subscribed(&self, device_id: DeviceId) -> bool {
        self.sessions
            .get(&device_id)
            .is_some_and(|s| s.is_subscribed())
    }

    // ── Session registry ─────────────────────────────────────────────

    /// The device's session, created from `info` if missing.
    pub async fn ensure_session(&self, info: DeviceConnectionInfo) -> Arc<DeviceSession> {
        let _lifecycle = self.lifecycle.lock().await;
        let device_id = info.id;

        if let Some(existing) = self.sessions.get(&device_id) {
            if !existing.is_closed() {
                return Arc::clone(existing.value());
            }
        }

        let session = DeviceSession::new(info, self.ctx.clone());
        self.sessions.insert(device_id, Arc::clone(&session));
        debug!(%device_id, "session created");
        session
    }

    pub fn session(&self, device_id: DeviceId) -> Option<Arc<DeviceSession>> {
        self.sessions.get(&device_id).map(|s| Arc::clone(s.value()))
    }

    /// Ids of every device with a session, sorted.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Connection snapshots of every device with a session.
    pub fn known_devices(&self) -> Vec<DeviceConnectionInfo> {
        let mut devices: Vec<_> = self
            .sessions
            .iter()
            .map(|e| e.value().info().clone())
            .collect();
        devices.sort_by_key(|d| d.id);
        devices
    }

    pub async fn failure_status(&self, device_id: DeviceId) -> Option<FailureStatus> {
        let session = self.session(device_id)?;
        Some(session.failure_status().await)
    }

    /// Subscribe to emitted trigger events across all sessions.
    pub fn events(&self) -> broadcast::Receiver<TopicEvent> {
        self.ctx.events.subscribe()
    }

    /// Clean up every session.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let ids: Vec<DeviceId> = self.sessions.iter().map(|e| *e.key()).collect();
        let sessions: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id).map(|(_, s)| s))
            .collect();

        let count = sessions.len();
        join_all(sessions.iter().map(|s| s.cleanup())).await;
        info!(sessions = count, "subscription manager shut down");
    }
}
