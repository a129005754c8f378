//! Operations and their result handlers.
//!
//! An [`OfflineOperation`] is the deferred unit of work; a [`ResultHandler`]
//! receives its outcome. Once submitted the pair is bound into a
//! type-erased [`QueuedJob`] so the queue can hold heterogeneous outputs.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{OfflineError, OperationError, Result};

/// Serializable identity of an operation, used to persist and rebuild it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Registry key of the factory that rebuilds the operation
    pub kind: String,
    pub payload: serde_json::Value,
}

impl OperationDescriptor {
    pub fn new<P: Serialize>(kind: impl Into<String>, payload: &P) -> Result<Self> {
        Ok(Self {
            kind: kind.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn decode<P: DeserializeOwned>(&self) -> Result<P> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A unit of work that may be deferred until the device is online.
///
/// `execute` may be called more than once: immediately when submitted
/// online and again on every drain while it stays queued.
#[async_trait]
pub trait OfflineOperation: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn execute(&self) -> std::result::Result<Self::Output, OperationError>;

    /// Operations that return a descriptor survive restarts when
    /// persistence is enabled.
    fn descriptor(&self) -> Option<OperationDescriptor> {
        None
    }
}

/// Receives the outcome of a submitted operation.
pub trait ResultHandler<T>: Send + Sync + 'static {
    fn on_success(&self, value: T);

    fn on_error(&self, error: OfflineError);
}

/// Handler that ignores every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreResult;

impl<T> ResultHandler<T> for IgnoreResult {
    fn on_success(&self, _value: T) {}

    fn on_error(&self, _error: OfflineError) {}
}

/// Closure-backed [`ResultHandler`].
///
/// ```ignore
/// let handler = Callbacks::new(
///     |receipt: Receipt| println!("uploaded {}", receipt.id),
///     |error| eprintln!("{error}"),
/// );
/// ```
pub struct Callbacks<S, E> {
    on_success: S,
    on_error: E,
}

impl<S, E> Callbacks<S, E> {
    pub fn new(on_success: S, on_error: E) -> Self {
        Self {
            on_success,
            on_error,
        }
    }
}

impl<T, S, E> ResultHandler<T> for Callbacks<S, E>
where
    S: Fn(T) + Send + Sync + 'static,
    E: Fn(OfflineError) + Send + Sync + 'static,
{
    fn on_success(&self, value: T) {
        (self.on_success)(value)
    }

    fn on_error(&self, error: OfflineError) {
        (self.on_error)(error)
    }
}

/// Closure-backed [`OfflineOperation`]. Built with [`operation_fn`].
pub struct FnOperation<F> {
    f: F,
    descriptor: Option<OperationDescriptor>,
}

impl<F> FnOperation<F> {
    /// Attach a descriptor so the operation can be persisted.
    pub fn with_descriptor(mut self, descriptor: OperationDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }
}

/// Wrap an async closure as an operation.
pub fn operation_fn<F, Fut, T>(f: F) -> FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, OperationError>> + Send + 'static,
    T: Send + 'static,
{
    FnOperation {
        f,
        descriptor: None,
    }
}

#[async_trait]
impl<F, Fut, T> OfflineOperation for FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, OperationError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn execute(&self) -> std::result::Result<T, OperationError> {
        (self.f)().await
    }

    fn descriptor(&self) -> Option<OperationDescriptor> {
        self.descriptor.clone()
    }
}

/// An operation bound to its handler with the output type erased.
#[async_trait]
pub(crate) trait QueuedJob: Send + Sync {
    /// Execute once, delivering the value to the handler on success.
    async fn run(&self) -> std::result::Result<(), OperationError>;

    /// Deliver a terminal error to the handler.
    fn fail(&self, error: OfflineError);

    fn descriptor(&self) -> Option<OperationDescriptor>;
}

pub(crate) struct BoundOperation<O, H> {
    operation: O,
    handler: H,
}

impl<O, H> BoundOperation<O, H> {
    pub(crate) fn new(operation: O, handler: H) -> Self {
        Self { operation, handler }
    }
}

#[async_trait]
impl<O, H> QueuedJob for BoundOperation<O, H>
where
    O: OfflineOperation,
    H: ResultHandler<O::Output>,
{
    async fn run(&self) -> std::result::Result<(), OperationError> {
        let outcome = AssertUnwindSafe(self.operation.execute())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(OperationError::new("operation panicked")));

        let value = outcome?;
        self.handler.on_success(value);
        Ok(())
    }

    fn fail(&self, error: OfflineError) {
        self.handler.on_error(error);
    }

    fn descriptor(&self) -> Option<OperationDescriptor> {
        self.operation.descriptor()
    }
}

/// Operation rebuilt from a persisted payload.
pub(crate) struct PayloadOperation<P, F> {
    payload: P,
    descriptor: OperationDescriptor,
    f: F,
}

impl<P, F> PayloadOperation<P, F> {
    pub(crate) fn new(payload: P, descriptor: OperationDescriptor, f: F) -> Self {
        Self {
            payload,
            descriptor,
            f,
        }
    }
}

#[async_trait]
impl<P, F, Fut> OfflineOperation for PayloadOperation<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), OperationError>> + Send + 'static,
{
    type Output = ();

    async fn execute(&self) -> std::result::Result<(), OperationError> {
        (self.f)(self.payload.clone()).await
    }

    fn descriptor(&self) -> Option<OperationDescriptor> {
        Some(self.descriptor.clone())
    }
}
