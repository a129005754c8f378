//! # Offline Wrapper
//!
//! Runs operations immediately when the device is online and queues them
//! when it is not. Queued work drains in batches every time connectivity
//! comes back.
//!
//! ## Outcomes
//!
//! | Situation | Handler sees | Queue |
//! |-----------|--------------|-------|
//! | offline | `on_error(Deferred)` | queued |
//! | online, succeeds | `on_success(value)` | untouched |
//! | online, fails, required | nothing yet | queued |
//! | online, fails, optional | `on_error(Operation)` | untouched |
//! | drained, succeeds | `on_success(value)` | removed |
//! | drained, fails, optional | nothing | removed |
//! | drained, fails, required | nothing | kept for the next drain |
//! | drained, out of attempts | `on_error(RetriesExhausted)` | removed |
//!
//! Queued operations are de-duplicated by key: submitting a key that is
//! already queued replaces the older entry.
//!
//! ## Usage
//!
//! ```ignore
//! let wrapper = OfflineWrapper::builder(connectivity)
//!     .events(bus.clone())
//!     .build()?;
//! wrapper.start().await?;
//!
//! wrapper
//!     .execute_with_offline_support(
//!         "upload-photo-u8812",
//!         operation_fn(move || upload(photo.clone())),
//!         true,
//!         Callbacks::new(|receipt| show(receipt), |err| toast(err)),
//!     )
//!     .await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use bridge_traits::time::{Clock, SystemClock};
use core_async::sync::{watch, CancellationToken, Mutex};
use core_async::time::sleep;
use core_runtime::config::OfflineConfig;
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use core_runtime::logging::redact_key;
use tracing::{debug, error, info, instrument, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{OfflineError, OperationError, Result};
use crate::operation::{BoundOperation, OfflineOperation, QueuedJob, ResultHandler};
use crate::queue::{OperationId, PendingOperation, PendingQueue, PendingSummary};
use crate::registry::OperationRegistry;
use crate::store::{OperationRecord, OperationStore};

/// Tally of a single drain run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: usize,
    pub completed: usize,
    /// Optional operations discarded after failing
    pub dropped: usize,
    pub dead_lettered: usize,
    /// Operations still queued when the drain stopped
    pub remaining: usize,
}

pub struct OfflineWrapperBuilder {
    connectivity: Arc<ConnectivityMonitor>,
    config: OfflineConfig,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
    store: Option<Arc<dyn OperationStore>>,
}

impl OfflineWrapperBuilder {
    pub fn config(mut self, config: OfflineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Persist required operations that carry a descriptor.
    pub fn store(mut self, store: Arc<dyn OperationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<OfflineWrapper> {
        self.config.validate()?;

        let online = self.connectivity.is_online();
        let (offline, _) = watch::channel(!online);
        let (pending, _) = watch::channel(false);
        let store = self.store.filter(|_| self.config.persist_required);

        Ok(OfflineWrapper {
            inner: Arc::new(Inner {
                queue: Mutex::new(PendingQueue::new()),
                connectivity: self.connectivity,
                offline,
                pending,
                draining: AtomicBool::new(false),
                config: self.config,
                clock: self.clock,
                events: self.events.unwrap_or_else(EventBus::default),
                store,
                listener: StdMutex::new(None),
            }),
        })
    }
}

struct Inner {
    queue: Mutex<PendingQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    offline: watch::Sender<bool>,
    pending: watch::Sender<bool>,
    draining: AtomicBool,
    config: OfflineConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    store: Option<Arc<dyn OperationStore>>,
    listener: StdMutex<Option<CancellationToken>>,
}

impl Inner {
    fn emit(&self, event: QueueEvent) {
        let _ = self.events.emit(CoreEvent::Queue(event));
    }

    fn stop_listener(&self) {
        let token = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(token) = token {
            token.cancel();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

/// Resets the single-drain flag when a drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Offline-aware executor with a de-duplicated pending queue.
///
/// Cheap to clone; clones share the same queue and state.
#[derive(Clone)]
pub struct OfflineWrapper {
    inner: Arc<Inner>,
}

impl OfflineWrapper {
    pub fn builder(connectivity: Arc<ConnectivityMonitor>) -> OfflineWrapperBuilder {
        OfflineWrapperBuilder {
            connectivity,
            config: OfflineConfig::default(),
            clock: Arc::new(SystemClock),
            events: None,
            store: None,
        }
    }

    /// Start following connectivity: every offline to online edge drains
    /// the queue. Also starts the underlying [`ConnectivityMonitor`].
    pub async fn start(&self) -> Result<()> {
        self.spawn_listener();
        self.inner.connectivity.start_monitoring().await
    }

    fn spawn_listener(&self) {
        let token = CancellationToken::new();
        {
            let mut guard = match self.inner.listener.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if guard.is_some() {
                return;
            }
            *guard = Some(token.clone());
        }

        let mut online_rx = self.inner.connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();
        self.inner.offline.send_replace(!was_online);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        core_async::task::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        let Some(inner) = weak.upgrade() else { break };
                        inner.offline.send_replace(!online);

                        if online && !was_online {
                            OfflineWrapper { inner }.spawn_drain();
                        }
                        was_online = online;
                    }
                }
            }
            debug!("Offline wrapper listener exited");
        });
    }

    /// Run `operation` now if online, otherwise queue it.
    ///
    /// Offline: the operation is queued and `handler.on_error` receives
    /// [`OfflineError::Deferred`] right away; `on_success` may still fire
    /// later when the queue drains.
    ///
    /// Online: `on_success` gets the value. On failure a required operation
    /// is queued for retry without notifying the handler, while an optional
    /// one reports [`OfflineError::Operation`] and is not queued.
    pub async fn execute_with_offline_support<O, H>(
        &self,
        key: impl Into<String>,
        operation: O,
        is_required: bool,
        handler: H,
    ) where
        O: OfflineOperation,
        H: ResultHandler<O::Output>,
    {
        let key = key.into();
        let job: Arc<dyn QueuedJob> = Arc::new(BoundOperation::new(operation, handler));

        if !self.inner.connectivity.is_online() {
            debug!(key = %redact_key(&key), is_required, "Offline; queueing operation");
            self.enqueue(key, job, is_required, true).await;
            return;
        }

        match job.run().await {
            Ok(()) => {
                debug!(key = %redact_key(&key), "Operation succeeded");
            }
            Err(err) if is_required => {
                warn!(
                    key = %redact_key(&key),
                    error = %err,
                    "Required operation failed online; queueing for retry"
                );
                self.enqueue(key, job, true, false).await;
            }
            Err(err) => {
                debug!(key = %redact_key(&key), error = %err, "Optional operation failed");
                job.fail(OfflineError::Operation(err));
            }
        }
    }

    /// Queue `job` under `key`. With `defer`, the handler gets
    /// [`OfflineError::Deferred`] before the queue lock is released, so no
    /// drain can report on the operation first.
    async fn enqueue(&self, key: String, job: Arc<dyn QueuedJob>, is_required: bool, defer: bool) {
        let handle = job.clone();
        let operation = PendingOperation::new(key, is_required, self.inner.clock.now(), job);
        let record = self.persistable(&operation);
        let id = operation.id;
        let key = operation.key.clone();

        let mut queue = self.inner.queue.lock().await;
        let replaced = queue.push(operation);
        let pending = queue.len();
        self.inner.pending.send_replace(true);

        if let Some(store) = &self.inner.store {
            // Whatever is stored under this key is older than the new entry.
            let result = match &record {
                Some(record) => store.save(record).await,
                None => store.remove_key(&key).await,
            };
            if let Err(e) = result {
                warn!(key = %redact_key(&key), error = %e, "Failed to persist pending operation");
            }
        }
        if defer {
            handle.fail(OfflineError::Deferred { key: key.clone() });
        }
        drop(queue);

        info!(
            key = %redact_key(&key),
            id = %id,
            is_required,
            replaced = replaced.is_some(),
            pending,
            "Operation queued"
        );
        self.inner.emit(QueueEvent::OperationQueued {
            key,
            required: is_required,
            replaced: replaced.is_some(),
            pending,
        });
    }

    fn persistable(&self, operation: &PendingOperation) -> Option<OperationRecord> {
        self.inner.store.as_ref()?;
        if !operation.is_required {
            return None;
        }
        let descriptor = operation.job.descriptor()?;
        Some(OperationRecord {
            id: operation.id,
            key: operation.key.clone(),
            descriptor,
            is_required: operation.is_required,
            attempts: operation.attempts,
            created_at: operation.created_at,
        })
    }

    fn spawn_drain(&self) {
        let wrapper = self.clone();
        core_async::task::spawn(async move {
            wrapper.drain().await;
        });
    }

    /// Drain the queue now.
    ///
    /// Returns `None` when offline or when another drain is already running.
    pub async fn drain_now(&self) -> Option<DrainReport> {
        self.drain().await
    }

    #[instrument(skip(self), name = "offline_drain")]
    async fn drain(&self) -> Option<DrainReport> {
        if !self.inner.connectivity.is_online() {
            debug!("Still offline; not draining");
            return None;
        }
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            debug!("Drain already in progress");
            return None;
        }
        let _guard = DrainGuard(&self.inner.draining);

        let mut report = DrainReport::default();
        let initial = self.inner.queue.lock().await.len();
        if initial == 0 {
            return Some(report);
        }

        info!(pending = initial, "Draining pending operations");
        self.inner.emit(QueueEvent::DrainStarted { pending: initial });

        let batch_size = self.inner.config.batch_size;
        'drain: loop {
            let batch = self.inner.queue.lock().await.batch(batch_size);
            if batch.is_empty() {
                break;
            }
            report.batches += 1;
            debug!(batch = report.batches, size = batch.len(), "Executing batch");

            for operation in batch {
                if !self.inner.connectivity.is_online() {
                    info!("Connectivity lost; pausing drain");
                    break 'drain;
                }
                // Cleared or replaced since the batch was taken
                if !self.inner.queue.lock().await.contains(operation.id) {
                    debug!(key = %redact_key(&operation.key), "Skipping operation no longer queued");
                    continue;
                }

                let outcome = operation.job.run().await;
                self.settle(operation, outcome, &mut report).await;
            }

            let remaining = self.publish_pending().await;
            if remaining == 0 {
                break;
            }
            sleep(self.inner.config.batch_delay()).await;
        }

        report.remaining = self.publish_pending().await;
        info!(
            completed = report.completed,
            dropped = report.dropped,
            dead_lettered = report.dead_lettered,
            remaining = report.remaining,
            "Drain finished"
        );
        self.inner.emit(QueueEvent::DrainFinished {
            remaining: report.remaining,
            completed: report.completed,
        });
        Some(report)
    }

    async fn settle(
        &self,
        operation: PendingOperation,
        outcome: std::result::Result<(), OperationError>,
        report: &mut DrainReport,
    ) {
        let err = match outcome {
            Ok(()) => {
                self.forget(operation.id).await;
                report.completed += 1;
                debug!(key = %redact_key(&operation.key), "Pending operation completed");
                self.inner.emit(QueueEvent::OperationCompleted { key: operation.key });
                return;
            }
            Err(err) => err,
        };

        if !operation.is_required {
            self.forget(operation.id).await;
            report.dropped += 1;
            warn!(
                key = %redact_key(&operation.key),
                error = %err,
                "Optional operation failed; dropping it"
            );
            self.inner.emit(QueueEvent::OperationDropped {
                key: operation.key,
                message: err.to_string(),
            });
            return;
        }

        let attempts = {
            let mut queue = self.inner.queue.lock().await;
            let attempts = queue.record_failure(operation.id);
            if let (Some(attempts), Some(store)) = (attempts, &self.inner.store) {
                if let Err(e) = store.record_attempt(operation.id, attempts).await {
                    warn!(error = %e, "Failed to persist attempt count");
                }
            }
            attempts
        };
        let Some(attempts) = attempts else {
            return;
        };

        match self.inner.config.max_attempts {
            Some(max) if attempts >= max => {
                self.forget(operation.id).await;
                report.dead_lettered += 1;
                error!(
                    key = %redact_key(&operation.key),
                    attempts,
                    error = %err,
                    "Required operation out of attempts; giving up"
                );
                self.inner.emit(QueueEvent::OperationDeadLettered {
                    key: operation.key.clone(),
                    attempts,
                    message: err.to_string(),
                });
                operation.job.fail(OfflineError::RetriesExhausted {
                    key: operation.key,
                    attempts,
                    last_error: err,
                });
            }
            _ => {
                warn!(
                    key = %redact_key(&operation.key),
                    attempts,
                    error = %err,
                    "Required operation failed; keeping it for the next drain"
                );
            }
        }
    }

    async fn forget(&self, id: OperationId) {
        let mut queue = self.inner.queue.lock().await;
        queue.remove(id);
        if let Some(store) = &self.inner.store {
            if let Err(e) = store.remove(id).await {
                warn!(id = %id, error = %e, "Failed to remove persisted operation");
            }
        }
    }

    async fn publish_pending(&self) -> usize {
        let queue = self.inner.queue.lock().await;
        let remaining = queue.len();
        self.inner.pending.send_replace(remaining > 0);
        remaining
    }

    /// Re-queue operations persisted by an earlier session.
    ///
    /// Records whose kind is not in `registry` are skipped and left in the
    /// store. Keys already queued in this session keep their newer entry,
    /// and the superseded record is deleted.
    /// Restored operations have no handler; their outcomes are visible
    /// through queue events only. Starts a drain when online.
    #[instrument(skip(self, registry))]
    pub async fn restore(&self, registry: &OperationRegistry) -> Result<usize> {
        let Some(store) = &self.inner.store else {
            return Ok(0);
        };
        let records = store.load_all().await?;

        let mut restored = 0;
        {
            let mut queue = self.inner.queue.lock().await;
            for record in records {
                if queue.contains(record.id) {
                    continue;
                }
                if queue.contains_key(&record.key) {
                    debug!(key = %redact_key(&record.key), "Newer operation already queued");
                    if let Err(e) = store.remove(record.id).await {
                        warn!(key = %redact_key(&record.key), error = %e, "Failed to drop superseded record");
                    }
                    continue;
                }
                match registry.build(&record.descriptor) {
                    Ok(job) => {
                        queue.push(PendingOperation {
                            id: record.id,
                            key: record.key,
                            is_required: record.is_required,
                            created_at: record.created_at,
                            attempts: record.attempts,
                            job,
                        });
                        restored += 1;
                    }
                    Err(e) => {
                        warn!(
                            key = %redact_key(&record.key),
                            kind = %record.descriptor.kind,
                            error = %e,
                            "Skipping persisted operation that cannot be rebuilt"
                        );
                    }
                }
            }
            self.inner.pending.send_replace(!queue.is_empty());
        }

        info!(restored, "Restored pending operations");
        if restored > 0 && self.inner.connectivity.is_online() {
            self.spawn_drain();
        }
        Ok(restored)
    }

    /// Drop every queued operation, including persisted ones. Handlers are
    /// not notified. Returns how many operations were removed.
    pub async fn clear_pending_operations(&self) -> usize {
        let removed = {
            let mut queue = self.inner.queue.lock().await;
            let removed = queue.clear();
            if let Some(store) = &self.inner.store {
                if let Err(e) = store.clear().await {
                    warn!(error = %e, "Failed to clear persisted operations");
                }
            }
            self.inner.pending.send_replace(false);
            removed
        };

        info!(removed, "Cleared pending operations");
        self.inner.emit(QueueEvent::QueueCleared { removed });
        removed
    }

    pub async fn pending_operations_count(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    /// Queued keys in execution order.
    pub async fn pending_keys(&self) -> Vec<String> {
        self.inner.queue.lock().await.keys()
    }

    pub async fn pending_operations(&self) -> Vec<PendingSummary> {
        self.inner.queue.lock().await.summaries()
    }

    pub fn has_pending_operations(&self) -> bool {
        *self.inner.pending.borrow()
    }

    pub fn is_offline(&self) -> bool {
        !self.inner.connectivity.is_online()
    }

    /// Receiver for the offline flag. Updated once [`start`](Self::start)
    /// has been called.
    pub fn subscribe_offline(&self) -> watch::Receiver<bool> {
        self.inner.offline.subscribe()
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<bool> {
        self.inner.pending.subscribe()
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.inner.connectivity
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.inner.config
    }

    /// Stop connectivity monitoring and the drain trigger. Queued
    /// operations are kept.
    pub fn cleanup(&self) {
        self.inner.connectivity.stop_monitoring();
        self.inner.stop_listener();
        info!("Offline wrapper stopped");
    }
}

impl std::fmt::Debug for OfflineWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWrapper")
            .field("offline", &self.is_offline())
            .field("has_pending", &self.has_pending_operations())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
