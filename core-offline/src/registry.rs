//! Rebuilds persisted operations from their descriptors.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{OfflineError, OperationError, Result};
use crate::operation::{BoundOperation, IgnoreResult, OperationDescriptor, PayloadOperation, QueuedJob};

type Factory = Box<dyn Fn(&OperationDescriptor) -> Result<Arc<dyn QueuedJob>> + Send + Sync>;

/// Maps an operation kind to the code that re-creates it.
///
/// ```ignore
/// let mut registry = OperationRegistry::new();
/// registry.register("upload", move |upload: Upload| {
///     let client = client.clone();
///     async move { client.upload(&upload).await.map_err(OperationError::from_error) }
/// });
/// wrapper.restore(&registry).await?;
/// ```
#[derive(Default)]
pub struct OperationRegistry {
    factories: HashMap<String, Factory>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `kind`. The payload is decoded into `P` and
    /// handed to `f` on every execution. A later registration for the
    /// same kind replaces the earlier one.
    pub fn register<P, F, Fut>(&mut self, kind: impl Into<String>, f: F)
    where
        P: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(P) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), OperationError>> + Send + 'static,
    {
        let factory: Factory = Box::new(move |descriptor: &OperationDescriptor| {
            let payload: P = descriptor.decode()?;
            let operation = PayloadOperation::new(payload, descriptor.clone(), f.clone());
            Ok(Arc::new(BoundOperation::new(operation, IgnoreResult)) as Arc<dyn QueuedJob>)
        });
        self.factories.insert(kind.into(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub(crate) fn build(&self, descriptor: &OperationDescriptor) -> Result<Arc<dyn QueuedJob>> {
        let factory = self
            .factories
            .get(&descriptor.kind)
            .ok_or_else(|| OfflineError::UnknownOperationKind(descriptor.kind.clone()))?;
        factory(descriptor)
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("OperationRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}
