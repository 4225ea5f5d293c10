#![allow(clippy::unwrap_used, dead_code)]
// Shared fakes for pullpoint-core integration tests: a scriptable protocol
// connector, an in-memory trigger sink, and a mutable registry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use pullpoint_api::{
    ConnectOptions, Connection, ConnectionSignal, Connector, Error, EventMessage, Subscription,
};
use pullpoint_core::{
    CoreError, DeviceConnectionInfo, DeviceId, DeviceRegistry, EngineConfig, RegistryRecord,
    SubscriptionManager, TriggerRecord, TriggerSink,
};

pub const PEOPLE: &str = "tns1:RuleEngine/MyRuleDetector/PeopleDetect";
pub const VEHICLE: &str = "tns1:RuleEngine/MyRuleDetector/VehicleDetect";
pub const DIGITAL_INPUT: &str = "tns1:Device/Trigger/DigitalInput";
pub const PERSON: &str = "tns1:RuleEngine/MyRuleDetector/PersonDetect";

// ── Messages ────────────────────────────────────────────────────────

/// A notification in the shape protocol libraries produce.
pub fn event(topic: &str, value: &str) -> Value {
    json!({
        "topic": { "_": topic },
        "message": {
            "message": {
                "data": { "simpleItem": { "$": { "Name": "State", "Value": value } } }
            }
        }
    })
}

/// Poll `check` until it holds, sleeping briefly between attempts.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

/// Holds fake protocol calls open until released.
pub struct Gate(watch::Sender<bool>);

impl Default for Gate {
    fn default() -> Self {
        Self(watch::channel(false).0)
    }
}

impl Gate {
    pub fn hold(&self) {
        self.0.send_replace(true);
    }

    pub fn release(&self) {
        self.0.send_replace(false);
    }

    async fn pass(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|held| !*held).await;
    }
}

// ── Connection ──────────────────────────────────────────────────────

pub struct FakeConnection {
    lease: Option<Duration>,
    subscribe_failures: Arc<Mutex<VecDeque<String>>>,
    handler: Mutex<Option<mpsc::Sender<EventMessage>>>,
    signals: broadcast::Sender<ConnectionSignal>,
    pub subscribe_gate: Gate,
    pub subscribe_times: Mutex<Vec<Instant>>,
    pub register_calls: AtomicUsize,
    pub handlers_removed: AtomicUsize,
    pub unsubscribe_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

impl FakeConnection {
    fn new(lease: Option<Duration>, subscribe_failures: Arc<Mutex<VecDeque<String>>>) -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            lease,
            subscribe_failures,
            handler: Mutex::new(None),
            signals,
            subscribe_gate: Gate::default(),
            subscribe_times: Mutex::new(Vec::new()),
            register_calls: AtomicUsize::new(0),
            handlers_removed: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_times.lock().unwrap().len()
    }

    /// Deliver a notification to the registered handler.
    pub async fn push(&self, message: Value) {
        let tx = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .expect("no event handler registered");
        tx.send(EventMessage::new(message)).await.unwrap();
    }

    pub fn signal(&self, signal: ConnectionSignal) {
        self.signals.send(signal).unwrap();
    }
}

struct ConnHandle(Arc<FakeConnection>);

#[async_trait]
impl Connection for ConnHandle {
    async fn create_pull_point_subscription(&self) -> Result<Subscription, Error> {
        let conn = &self.0;
        conn.subscribe_times.lock().unwrap().push(Instant::now());
        conn.subscribe_gate.pass().await;
        let failure = conn.subscribe_failures.lock().unwrap().pop_front();
        if let Some(message) = failure {
            return Err(Error::protocol(message));
        }
        let n = conn.subscribe_calls();
        Ok(Subscription {
            reference: format!("http://camera/onvif/subscription/{n}"),
            lease: conn.lease,
        })
    }

    fn register_event_handler(&self) -> mpsc::Receiver<EventMessage> {
        self.0.register_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        *self.0.handler.lock().unwrap() = Some(tx);
        rx
    }

    fn remove_event_handlers(&self) {
        self.0.handlers_removed.fetch_add(1, Ordering::SeqCst);
        self.0.handler.lock().unwrap().take();
    }

    async fn unsubscribe(&self) -> Result<(), Error> {
        self.0.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn signals(&self) -> broadcast::Receiver<ConnectionSignal> {
        self.0.signals.subscribe()
    }

    async fn close(&self) {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Connector ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeConnector {
    pub connect_calls: AtomicUsize,
    pub connect_gate: Gate,
    lease: Mutex<Option<Duration>>,
    connect_failures: Mutex<VecDeque<String>>,
    fail_always: Mutex<Option<String>>,
    subscribe_failures: Arc<Mutex<VecDeque<String>>>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeConnector {
    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn set_lease(&self, lease: Option<Duration>) {
        *self.lease.lock().unwrap() = lease;
    }

    pub fn fail_next_connect(&self, message: &str) {
        self.connect_failures
            .lock()
            .unwrap()
            .push_back(message.to_owned());
    }

    pub fn fail_every_connect(&self, message: &str) {
        *self.fail_always.lock().unwrap() = Some(message.to_owned());
    }

    pub fn fail_next_subscribe(&self, message: &str) {
        self.subscribe_failures
            .lock()
            .unwrap()
            .push_back(message.to_owned());
    }

    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        Arc::clone(&self.connections.lock().unwrap()[index])
    }

    pub fn last_connection(&self) -> Arc<FakeConnection> {
        Arc::clone(self.connections.lock().unwrap().last().unwrap())
    }

    fn next_failure(&self) -> Option<String> {
        self.connect_failures
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fail_always.lock().unwrap().clone())
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn Connection>, Error> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connect_gate.pass().await;
        if let Some(message) = self.next_failure() {
            return Err(Error::protocol(message));
        }

        let lease = *self.lease.lock().unwrap();
        let conn = Arc::new(FakeConnection::new(
            lease,
            Arc::clone(&self.subscribe_failures),
        ));
        self.connections.lock().unwrap().push(Arc::clone(&conn));
        Ok(Box::new(ConnHandle(conn)))
    }
}

// ── Sink ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<TriggerRecord>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl TriggerSink for MemorySink {
    async fn deliver(&self, record: &TriggerRecord) -> Result<(), CoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ── Registry ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct TestRegistry {
    records: Mutex<Vec<RegistryRecord>>,
    pub unavailable: AtomicBool,
}

impl TestRegistry {
    pub fn new(records: Vec<RegistryRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn update(&self, id: u32, f: impl FnOnce(&mut RegistryRecord)) {
        let mut records = self.records.lock().unwrap();
        let record = records.iter_mut().find(|r| r.id == id).unwrap();
        f(record);
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::Registry {
                message: "database offline".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for TestRegistry {
    async fn find_all_enabled(&self) -> Result<Vec<DeviceConnectionInfo>, CoreError> {
        self.check()?;
        let records = self.records.lock().unwrap().clone();
        records
            .into_iter()
            .filter(|r| r.events_enabled && !r.disabled)
            .map(RegistryRecord::into_connection_info)
            .collect()
    }

    async fn find_by_id(&self, id: DeviceId) -> Result<Option<DeviceConnectionInfo>, CoreError> {
        self.check()?;
        let record = self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id.get())
            .cloned();
        record.map(RegistryRecord::into_connection_info).transpose()
    }
}

pub fn record(id: u32) -> RegistryRecord {
    RegistryRecord {
        id,
        address: format!("192.168.1.{id}"),
        port: Some(8000),
        username: "admin".into(),
        password: "0x68756e74657232".into(),
        events_enabled: true,
        disabled: false,
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub connector: Arc<FakeConnector>,
    pub sink: Arc<MemorySink>,
    pub registry: Arc<TestRegistry>,
    pub manager: Arc<SubscriptionManager>,
}

impl Harness {
    pub fn new(ids: &[u32]) -> Self {
        Self::with_config(ids, EngineConfig::default())
    }

    pub fn with_config(ids: &[u32], config: EngineConfig) -> Self {
        let connector = Arc::new(FakeConnector::default());
        let sink = Arc::new(MemorySink::default());
        let registry = Arc::new(TestRegistry::new(ids.iter().copied().map(record).collect()));
        let manager = Arc::new(SubscriptionManager::new(
            config,
            registry.clone(),
            connector.clone(),
            sink.clone(),
        ));
        Self {
            connector,
            sink,
            registry,
            manager,
        }
    }
}
