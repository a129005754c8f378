#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::network::{NetworkChangeStream, NetworkInfo, NetworkMonitor};
use core_async::sync::{broadcast, watch};
use core_async::time::{sleep, timeout, Duration};
use core_offline::{
    Callbacks, ConnectivityMonitor, OfflineError, OfflineOperation, OfflineWrapper, OperationError,
    OperationStore,
};
use core_runtime::config::OfflineConfig;
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};

const WAIT: Duration = Duration::from_secs(60);

/// Network monitor whose state is flipped by the test.
pub struct ScriptedMonitor {
    state: watch::Sender<bool>,
}

impl ScriptedMonitor {
    pub fn new(online: bool) -> Arc<Self> {
        let (state, _) = watch::channel(online);
        Arc::new(Self { state })
    }

    pub fn set_online(&self, online: bool) {
        self.state.send_replace(online);
    }
}

fn info_for(online: bool) -> NetworkInfo {
    if online {
        NetworkInfo::online()
    } else {
        NetworkInfo::offline()
    }
}

struct ScriptedStream(watch::Receiver<bool>);

#[async_trait]
impl NetworkChangeStream for ScriptedStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        self.0.changed().await.ok()?;
        let online = *self.0.borrow_and_update();
        Some(info_for(online))
    }
}

#[async_trait]
impl NetworkMonitor for ScriptedMonitor {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        Ok(info_for(*self.state.borrow()))
    }

    async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(ScriptedStream(self.state.subscribe())))
    }
}

/// Operation returning its label, or failing while `fail` is set.
#[derive(Clone)]
pub struct ScriptedOp {
    label: String,
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl ScriptedOp {
    pub fn succeeding(label: &str) -> Self {
        Self {
            label: label.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing(label: &str) -> Self {
        let op = Self::succeeding(label);
        op.set_failing(true);
        op
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OfflineOperation for ScriptedOp {
    type Output = String;

    async fn execute(&self) -> Result<String, OperationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(OperationError::new(format!("{} failed", self.label)))
        } else {
            Ok(self.label.clone())
        }
    }
}

/// Collects everything a handler receives.
pub struct Recorder<T> {
    successes: Mutex<Vec<T>>,
    errors: Mutex<Vec<OfflineError>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            successes: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        })
    }

    pub fn handler(
        self: &Arc<Self>,
    ) -> Callbacks<impl Fn(T) + Send + Sync + 'static, impl Fn(OfflineError) + Send + Sync + 'static>
    {
        let on_success = self.clone();
        let on_error = self.clone();
        Callbacks::new(
            move |value: T| on_success.successes.lock().unwrap().push(value),
            move |error: OfflineError| on_error.errors.lock().unwrap().push(error),
        )
    }

    pub fn successes(&self) -> Vec<T> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<OfflineError> {
        self.errors.lock().unwrap().clone()
    }
}

pub struct Harness {
    pub host: Arc<ScriptedMonitor>,
    pub wrapper: OfflineWrapper,
    pub events: broadcast::Receiver<CoreEvent>,
}

impl Harness {
    pub async fn new(online: bool) -> Self {
        Self::with(online, OfflineConfig::default(), None).await
    }

    pub async fn with(
        online: bool,
        config: OfflineConfig,
        store: Option<Arc<dyn OperationStore>>,
    ) -> Self {
        let host = ScriptedMonitor::new(online);
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let connectivity =
            Arc::new(ConnectivityMonitor::new(host.clone(), online).with_events(bus.clone()));

        let mut builder = OfflineWrapper::builder(connectivity)
            .config(config)
            .events(bus);
        if let Some(store) = store {
            builder = builder.store(store);
        }
        let wrapper = builder.build().unwrap();
        wrapper.start().await.unwrap();

        Self {
            host,
            wrapper,
            events,
        }
    }

    pub async fn go_online(&self) {
        self.host.set_online(true);
        let wrapper = self.wrapper.clone();
        eventually("online", move || !wrapper.is_offline()).await;
    }

    pub async fn go_offline(&self) {
        self.host.set_online(false);
        let wrapper = self.wrapper.clone();
        eventually("offline", move || wrapper.is_offline()).await;
    }

    pub async fn wait_until_drained(&self) {
        let mut pending = self.wrapper.subscribe_pending();
        timeout(WAIT, pending.wait_for(|has_pending| !*has_pending))
            .await
            .expect("timed out waiting for the queue to drain")
            .unwrap();
    }

    /// Next queue event matching `predicate`, skipping everything else.
    pub async fn next_event(&mut self, predicate: impl Fn(&QueueEvent) -> bool) -> QueueEvent {
        let events = &mut self.events;
        timeout(WAIT, async move {
            loop {
                match events.recv().await {
                    Ok(CoreEvent::Queue(event)) if predicate(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for queue event")
    }
}

pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
