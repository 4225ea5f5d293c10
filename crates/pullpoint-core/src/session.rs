// ── Device session ──
//
// One `DeviceSession` owns the protocol connection to a single camera and
// the pull-point subscription on it. It pumps inbound event messages,
// edge-detects per-topic boolean state, and hands transitions to the
// trigger sink. The subscription is renewed at a fraction of its lease;
// lost connections and failed subscriptions are retried after a delay,
// subject to the failure cooldown.
//
// Every background task (message pump, signal watcher, timers) holds only
// a `Weak` reference to the session and a child of the session's
// cancellation token, so `cleanup()` stops all of them at once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use futures_util::future::BoxFuture;
use pullpoint_api::{Connection, ConnectionSignal, Connector, EventMessage, Subscription};
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::classifier::TopicClassifier;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::failure::{FailureStatus, FailureTracker};
use crate::model::{
    DeviceConnectionInfo, DeviceId, EventTopicState, TopicEvent, TriggerRecord, Transition,
};
use crate::payload;
use crate::sink::{QueuedSink, TriggerSink};

// ── Phase ────────────────────────────────────────────────────────────

/// Observable lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Connected,
    Subscribed,
    Failed,
    Closed,
}

// ── Shared collaborators ─────────────────────────────────────────────

/// Everything a session needs besides its device snapshot. Shared by all
/// sessions of one manager.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<EngineConfig>,
    pub classifier: Arc<TopicClassifier>,
    pub connector: Arc<dyn Connector>,
    pub sink: Arc<dyn TriggerSink>,
    pub events: broadcast::Sender<TopicEvent>,
}

impl SessionContext {
    /// Triggers reach `sink` through an ordered delivery queue.
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn TriggerSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            classifier: Arc::new(config.classifier()),
            sink: Arc::new(QueuedSink::new(sink, config.trigger_queue)),
            config: Arc::new(config),
            connector,
            events,
        }
    }
}

// ── Internal state ───────────────────────────────────────────────────

/// A live connection plus the token that stops its pump and signal tasks.
struct Link {
    conn: Arc<dyn Connection>,
    token: CancellationToken,
    pump_started: AtomicBool,
}

impl Link {
    async fn release(&self) {
        self.token.cancel();
        self.conn.remove_event_handlers();
        self.conn.close().await;
    }
}

/// The subscription currently held, with its effective lease.
struct ActiveSubscription {
    subscription: Subscription,
    lease: Duration,
}

#[derive(Default)]
struct Timers {
    renewal: Option<CancellationToken>,
    retry: Option<CancellationToken>,
}

// ── DeviceSession ────────────────────────────────────────────────────

pub struct DeviceSession {
    info: DeviceConnectionInfo,
    ctx: SessionContext,
    link: ArcSwapOption<Link>,
    subscription: ArcSwapOption<ActiveSubscription>,
    failures: Mutex<FailureTracker>,
    timers: Mutex<Timers>,
    // Lock order: attempt_lock before subscribe_lock.
    attempt_lock: Mutex<()>,
    subscribe_lock: Mutex<()>,
    topics: DashMap<String, EventTopicState>,
    seen_topics: DashSet<String>,
    cancel: CancellationToken,
    phase: watch::Sender<SessionPhase>,
}

impl DeviceSession {
    pub fn new(info: DeviceConnectionInfo, ctx: SessionContext) -> Arc<Self> {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Arc::new(Self {
            failures: Mutex::new(FailureTracker::new(ctx.config.cooldown)),
            info,
            ctx,
            link: ArcSwapOption::empty(),
            subscription: ArcSwapOption::empty(),
            timers: Mutex::new(Timers::default()),
            attempt_lock: Mutex::new(()),
            subscribe_lock: Mutex::new(()),
            topics: DashMap::new(),
            seen_topics: DashSet::new(),
            cancel: CancellationToken::new(),
            phase,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn device_id(&self) -> DeviceId {
        self.info.id
    }

    pub fn info(&self) -> &DeviceConnectionInfo {
        &self.info
    }

    pub fn is_connected(&self) -> bool {
        self.link.load().is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.load().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Effective lease of the current subscription.
    pub fn lease(&self) -> Option<Duration> {
        self.subscription.load().as_ref().map(|s| s.lease)
    }

    /// Current subscription reference, if subscribed.
    pub fn subscription_reference(&self) -> Option<String> {
        self.subscription
            .load()
            .as_ref()
            .map(|s| s.subscription.reference.clone())
    }

    pub async fn failure_status(&self) -> FailureStatus {
        self.failures.lock().await.status().clone()
    }

    pub fn topic_state(&self, topic: &str) -> Option<EventTopicState> {
        self.topics.get(topic).map(|s| s.value().clone())
    }

    /// All topic states, sorted by topic.
    pub fn topic_states(&self) -> Vec<(String, EventTopicState)> {
        let mut states: Vec<_> = self
            .topics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Every topic observed on this session, supported or not.
    pub fn seen_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.seen_topics.iter().map(|t| t.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Open a protocol connection, replacing any existing one.
    pub async fn connect(self: &Arc<Self>) -> Result<(), CoreError> {
        let _attempt = self.attempt_lock.lock().await;
        self.connect_inner().await
    }

    async fn connect_inner(self: &Arc<Self>) -> Result<(), CoreError> {
        self.ensure_open()?;
        self.check_gate().await?;

        let device_id = self.device_id();
        self.set_phase(SessionPhase::Connecting);
        debug!(%device_id, address = %self.info.address, port = self.info.port, "connecting");

        let options = self.info.connect_options(self.ctx.config.protocol_timeout);
        let conn = match self.bounded(self.ctx.connector.connect(&options)).await {
            Ok(conn) => conn,
            Err(e) => {
                let message = e.to_string();
                let kind = self.record_failure(&message).await;
                self.set_phase(SessionPhase::Failed);
                warn!(%device_id, %kind, error = %message, "connect failed");
                return Err(CoreError::Connect {
                    device_id,
                    kind,
                    message,
                });
            }
        };

        if self.is_closed() {
            conn.close().await;
            return Err(CoreError::SessionClosed { device_id });
        }

        let link = Arc::new(Link {
            conn: Arc::from(conn),
            token: self.cancel.child_token(),
            pump_started: AtomicBool::new(false),
        });

        self.subscription.store(None);
        if let Some(previous) = self.link.swap(Some(Arc::clone(&link))) {
            previous.release().await;
        }

        // cleanup() may have run between the check above and the swap
        if self.is_closed() {
            if let Some(stale) = self.link.swap(None) {
                stale.release().await;
            }
            return Err(CoreError::SessionClosed { device_id });
        }

        self.spawn_signal_watcher(&link);
        self.set_phase(SessionPhase::Connected);
        info!(%device_id, address = %self.info.address, "connected");
        Ok(())
    }

    // ── Subscribe ────────────────────────────────────────────────────

    /// Create a pull-point subscription on the current connection.
    pub async fn start_event_subscription(self: &Arc<Self>) -> Result<(), CoreError> {
        let _guard = self.subscribe_lock.lock().await;
        self.subscribe_locked().await
    }

    async fn subscribe_locked(self: &Arc<Self>) -> Result<(), CoreError> {
        self.ensure_open()?;
        let device_id = self.device_id();
        let link = self
            .link
            .load_full()
            .ok_or(CoreError::NotConnected { device_id })?;
        self.check_gate().await?;

        self.start_pump(&link);

        let subscription = match self
            .bounded(link.conn.create_pull_point_subscription())
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                let message = e.to_string();
                let kind = self.record_failure(&message).await;
                self.set_phase(SessionPhase::Failed);
                warn!(
                    %device_id,
                    %kind,
                    error = %message,
                    retry_in = ?self.ctx.config.retry_delay,
                    "subscription failed"
                );
                self.schedule_retry(self.ctx.config.retry_delay).await;
                return Err(CoreError::Subscribe {
                    device_id,
                    kind,
                    message,
                });
            }
        };

        self.ensure_open()?;
        let still_current = self
            .link
            .load()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &link));
        if !still_current {
            debug!(%device_id, "connection replaced during subscribe, discarding result");
            return Err(CoreError::NotConnected { device_id });
        }

        let lease = subscription
            .lease
            .filter(|l| !l.is_zero())
            .unwrap_or(self.ctx.config.default_lease);
        let renew_in = self.ctx.config.renewal_delay(lease);

        info!(
            %device_id,
            reference = %subscription.reference,
            ?lease,
            ?renew_in,
            "subscribed"
        );

        self.subscription.store(Some(Arc::new(ActiveSubscription {
            subscription,
            lease,
        })));
        self.cancel_retry().await;
        self.schedule_renewal(renew_in).await;
        self.set_phase(SessionPhase::Subscribed);
        Ok(())
    }

    /// Re-run the subscription flow. Skipped while another subscribe is in
    /// flight; falls back to a full reconnect on failure.
    pub async fn renew_subscription(self: &Arc<Self>) -> Result<(), CoreError> {
        self.ensure_open()?;
        let device_id = self.device_id();

        let result = {
            let Ok(_guard) = self.subscribe_lock.try_lock() else {
                debug!(%device_id, "renewal skipped, subscription already in flight");
                return Ok(());
            };
            debug!(%device_id, "renewing subscription");
            self.subscribe_locked().await
        };

        match result {
            Ok(()) => Ok(()),
            Err(e @ (CoreError::SessionClosed { .. } | CoreError::CoolingDown { .. })) => Err(e),
            Err(e) => {
                warn!(%device_id, error = %e, "renewal failed, reconnecting");
                self.cancel_retry().await;
                let _attempt = self.attempt_lock.lock().await;
                self.connect_inner().await?;
                self.start_event_subscription().await
            }
        }
    }

    // ── Establish ────────────────────────────────────────────────────

    /// Connect if needed, then subscribe. No-op when already connected and
    /// subscribed.
    pub async fn establish(self: &Arc<Self>) -> Result<(), CoreError> {
        let _attempt = self.attempt_lock.lock().await;
        self.ensure_open()?;

        if self.is_connected() && self.is_subscribed() {
            return Ok(());
        }
        if !self.is_connected() {
            self.connect_inner().await?;
        }
        self.start_event_subscription().await
    }

    // ── Cleanup ──────────────────────────────────────────────────────

    /// Tear the session down. Idempotent; every later operation fails with
    /// `SessionClosed`.
    pub async fn cleanup(&self) {
        let device_id = self.device_id();
        let first = !self.cancel.is_cancelled();
        self.cancel.cancel();

        {
            let mut timers = self.timers.lock().await;
            timers.renewal.take();
            timers.retry.take();
        }

        if let Some(link) = self.link.swap(None) {
            link.token.cancel();
            link.conn.remove_event_handlers();
            if self.subscription.load().is_some() {
                if let Err(e) = self.bounded(link.conn.unsubscribe()).await {
                    warn!(%device_id, error = %e, "unsubscribe failed during cleanup");
                }
            }
            link.conn.close().await;
        }
        self.subscription.store(None);
        self.set_phase(SessionPhase::Closed);

        if first {
            info!(%device_id, "session closed");
        }
    }

    // ── Message handling ─────────────────────────────────────────────

    async fn handle_message(&self, message: EventMessage) {
        let device_id = self.device_id();

        let parsed = match payload::parse_message(&message.message) {
            Ok(value) => value,
            Err(e) => {
                warn!(%device_id, error = %e, "dropping unparseable event message");
                return;
            }
        };

        let Some(topic) = payload::extract_topic(&parsed).map(str::to_owned) else {
            debug!(%device_id, "dropping event message without topic");
            return;
        };
        self.seen_topics.insert(topic.clone());

        let classification = self.ctx.classifier.classify(&topic);
        if !classification.supported {
            trace!(%device_id, %topic, "ignoring unsupported topic");
            return;
        }

        let state = payload::extract_state(&parsed).unwrap_or(false);
        let now = Utc::now();

        let changed = {
            let mut entry = self
                .topics
                .entry(topic.clone())
                .or_insert_with(EventTopicState::new);
            entry.last_update = now;
            if entry.is_active == state {
                false
            } else {
                entry.is_active = state;
                true
            }
        };

        if !changed {
            trace!(%device_id, %topic, state, "state unchanged");
            return;
        }

        let transition = Transition::from_state(state);
        let record = TriggerRecord {
            device_id,
            label: classification.label,
            transition,
            timestamp: now,
        };
        info!(
            %device_id,
            %topic,
            label = %record.label,
            %transition,
            "state change"
        );

        self.ctx.sink.emit(&record).await;

        // No receivers is fine.
        let _ = self.ctx.events.send(TopicEvent {
            device_id,
            kind: crate::classifier::topic_kind(&topic),
            topic,
            label: record.label,
            state,
            transition,
            timestamp: now,
            payload: parsed,
        });
    }

    // ── Background tasks ─────────────────────────────────────────────

    /// Register the message handler once per connection and pump messages
    /// in receipt order.
    fn start_pump(self: &Arc<Self>, link: &Arc<Link>) {
        if link.pump_started.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut messages = link.conn.register_event_handler();
        let token = link.token.clone();
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    message = messages.recv() => {
                        let Some(message) = message else { break };
                        let Some(session) = weak.upgrade() else { break };
                        session.handle_message(message).await;
                    }
                }
            }
        });
    }

    fn spawn_signal_watcher(self: &Arc<Self>, link: &Arc<Link>) {
        let mut signals = link.conn.signals();
        let token = link.token.clone();
        let weak = Arc::downgrade(self);
        let link = Arc::downgrade(link);

        tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    signal = signals.recv() => signal,
                };

                let Some(session) = weak.upgrade() else { break };
                match signal {
                    Ok(ConnectionSignal::Error(message)) => {
                        session.on_connection_error(&message).await;
                    }
                    Ok(ConnectionSignal::Closed) => {
                        session.on_connection_closed(&link).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(device_id = %session.device_id(), skipped, "signal receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn on_connection_error(self: &Arc<Self>, message: &str) {
        let delay = self.ctx.config.retry_delay;
        warn!(
            device_id = %self.device_id(),
            error = %message,
            retry_in = ?delay,
            "connection error, scheduling resubscribe"
        );
        self.schedule_retry(delay).await;
    }

    async fn on_connection_closed(self: &Arc<Self>, link: &Weak<Link>) {
        let Some(link) = link.upgrade() else { return };
        let was_current = {
            let previous = self
                .link
                .compare_and_swap(&Some(Arc::clone(&link)), None::<Arc<Link>>);
            previous.as_ref().is_some_and(|l| Arc::ptr_eq(l, &link))
        };
        if !was_current {
            return;
        }

        link.release().await;
        self.subscription.store(None);
        self.set_phase(SessionPhase::Idle);

        let delay = self.ctx.config.retry_delay;
        warn!(
            device_id = %self.device_id(),
            retry_in = ?delay,
            "connection closed, scheduling reconnect"
        );
        self.schedule_retry(delay).await;
    }

    // ── Timers ───────────────────────────────────────────────────────

    async fn schedule_renewal(self: &Arc<Self>, delay: Duration) {
        let token = self.cancel.child_token();
        if let Some(previous) = self.timers.lock().await.renewal.replace(token.clone()) {
            previous.cancel();
        }
        spawn_timer(Arc::downgrade(self), token, delay, Self::renewal_fired);
    }

    async fn schedule_retry(self: &Arc<Self>, delay: Duration) {
        let token = self.cancel.child_token();
        if let Some(previous) = self.timers.lock().await.retry.replace(token.clone()) {
            previous.cancel();
        }
        spawn_timer(Arc::downgrade(self), token, delay, Self::retry_fired);
    }

    async fn cancel_retry(&self) {
        if let Some(token) = self.timers.lock().await.retry.take() {
            token.cancel();
        }
    }

    fn renewal_fired(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = self.renew_subscription().await {
                warn!(device_id = %self.device_id(), error = %e, "renewal failed");
            }
        })
    }

    /// Retry path for lost connections, connection errors, and failed
    /// subscriptions. Re-subscribes on a live connection, reconnects
    /// otherwise.
    fn retry_fired(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let device_id = self.device_id();
            let result = {
                let _attempt = self.attempt_lock.lock().await;
                match self.ensure_open() {
                    Err(e) => Err(e),
                    Ok(()) if self.is_connected() => self.start_event_subscription().await,
                    Ok(()) => match self.connect_inner().await {
                        Ok(()) => self.start_event_subscription().await,
                        Err(e) => Err(e),
                    },
                }
            };

            match result {
                Ok(()) => debug!(%device_id, "retry succeeded"),
                Err(CoreError::SessionClosed { .. }) => {}
                Err(CoreError::CoolingDown { retry_in, .. }) => {
                    info!(%device_id, ?retry_in, "cooling down, retry postponed");
                    self.schedule_retry(retry_in).await;
                }
                // Subscribe failures reschedule themselves.
                Err(CoreError::Subscribe { .. }) => {}
                Err(e) => {
                    warn!(%device_id, error = %e, "retry failed");
                    self.schedule_retry(self.ctx.config.retry_delay).await;
                }
            }
        })
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::SessionClosed {
                device_id: self.device_id(),
            });
        }
        Ok(())
    }

    async fn check_gate(&self) -> Result<(), CoreError> {
        self.failures
            .lock()
            .await
            .permit_attempt(Instant::now())
            .map_err(|retry_in| {
                debug!(device_id = %self.device_id(), ?retry_in, "attempt refused, cooling down");
                CoreError::CoolingDown {
                    device_id: self.device_id(),
                    retry_in,
                }
            })
    }

    async fn record_failure(&self, message: &str) -> crate::failure::FailureKind {
        self.failures
            .lock()
            .await
            .record_failure(message, Instant::now())
    }

    /// Bound a protocol call by the protocol timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, pullpoint_api::Error>>,
    ) -> Result<T, pullpoint_api::Error> {
        let timeout = self.ctx.config.protocol_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(pullpoint_api::Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            })
    }

    fn set_phase(&self, phase: SessionPhase) {
        if self.is_closed() && phase != SessionPhase::Closed {
            return;
        }
        self.phase.send_replace(phase);
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device_id", &self.info.id)
            .field("phase", &self.phase())
            .field("connected", &self.is_connected())
            .field("subscribed", &self.is_subscribed())
            .finish_non_exhaustive()
    }
}

/// Sleep, then run `fire` unless the token is cancelled or the session is
/// gone.
fn spawn_timer(
    session: Weak<DeviceSession>,
    token: CancellationToken,
    delay: Duration,
    fire: fn(Arc<DeviceSession>) -> BoxFuture<'static, ()>,
) {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = token.cancelled() => {}
            () = tokio::time::sleep(delay) => {
                if let Some(session) = session.upgrade() {
                    fire(session).await;
                }
            }
        }
    });
}
