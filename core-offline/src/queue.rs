//! # Pending Queue
//!
//! Ordered, key-deduplicated collection of operations waiting for
//! connectivity. Pure data structure; locking and execution live in
//! [`OfflineWrapper`](crate::OfflineWrapper).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OfflineError, Result};
use crate::operation::QueuedJob;

/// Type-safe identifier of a single queued attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| OfflineError::Store(format!("invalid operation id {s}: {e}")))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operation waiting in the queue.
#[derive(Clone)]
pub(crate) struct PendingOperation {
    pub id: OperationId,
    pub key: String,
    pub is_required: bool,
    pub created_at: DateTime<Utc>,
    /// Failed executions so far
    pub attempts: u32,
    pub job: Arc<dyn QueuedJob>,
}

impl PendingOperation {
    pub fn new(
        key: String,
        is_required: bool,
        created_at: DateTime<Utc>,
        job: Arc<dyn QueuedJob>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            key,
            is_required,
            created_at,
            attempts: 0,
            job,
        }
    }

    pub fn summary(&self) -> PendingSummary {
        PendingSummary {
            id: self.id,
            key: self.key.clone(),
            is_required: self.is_required,
            created_at: self.created_at,
            attempts: self.attempts,
        }
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("is_required", &self.is_required)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a queued operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub id: OperationId,
    pub key: String,
    pub is_required: bool,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

/// FIFO queue holding at most one operation per key.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    entries: VecDeque<PendingOperation>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `operation`, evicting any entry with the same key.
    ///
    /// The new entry always lands at the tail. Returns the evicted entry.
    pub fn push(&mut self, operation: PendingOperation) -> Option<PendingOperation> {
        let replaced = self
            .entries
            .iter()
            .position(|entry| entry.key == operation.key)
            .and_then(|index| self.entries.remove(index));
        self.entries.push_back(operation);
        replaced
    }

    /// Copy of the first `size` entries in queue order.
    pub fn batch(&self, size: usize) -> Vec<PendingOperation> {
        self.entries.iter().take(size).cloned().collect()
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    pub fn remove(&mut self, id: OperationId) -> Option<PendingOperation> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index)
    }

    /// Bump the attempt counter; `None` if the entry is gone.
    pub fn record_failure(&mut self, id: OperationId) -> Option<u32> {
        let entry = self.entries.iter_mut().find(|entry| entry.id == id)?;
        entry.attempts = entry.attempts.saturating_add(1);
        Some(entry.attempts)
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    pub fn summaries(&self) -> Vec<PendingSummary> {
        self.entries.iter().map(PendingOperation::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use crate::operation::{operation_fn, BoundOperation, IgnoreResult};

    fn pending(key: &str, required: bool) -> PendingOperation {
        let job = BoundOperation::new(
            operation_fn(|| async { Ok::<(), OperationError>(()) }),
            IgnoreResult,
        );
        PendingOperation::new(key.to_string(), required, Utc::now(), Arc::new(job))
    }

    #[test]
    fn test_operation_id() {
        let id = OperationId::new();
        let parsed = OperationId::from_string(&id.as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(OperationId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_push_keeps_insertion_order() {
        let mut queue = PendingQueue::new();
        queue.push(pending("a", true));
        queue.push(pending("b", false));
        queue.push(pending("c", true));

        assert_eq!(queue.keys(), vec!["a", "b", "c"]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_same_key_replaces_and_moves_to_tail() {
        let mut queue = PendingQueue::new();
        let first = pending("a", true);
        let first_id = first.id;
        queue.push(first);
        queue.push(pending("b", true));

        let newer = pending("a", false);
        let newer_id = newer.id;
        let replaced = queue.push(newer).unwrap();

        assert_eq!(replaced.id, first_id);
        assert_eq!(queue.keys(), vec!["b", "a"]);
        assert!(!queue.contains(first_id));
        assert!(queue.contains(newer_id));
        assert!(queue.contains_key("a"));
        assert!(!queue.contains_key("z"));
        assert!(!queue.summaries()[1].is_required);
    }

    #[test]
    fn test_batch_is_a_snapshot() {
        let mut queue = PendingQueue::new();
        for i in 0..12 {
            queue.push(pending(&format!("op-{i}"), true));
        }

        let batch = queue.batch(5);
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0].key, "op-0");
        assert_eq!(batch[4].key, "op-4");

        queue.push(pending("late", true));
        assert_eq!(batch.len(), 5);
        assert_eq!(queue.len(), 13);
    }

    #[test]
    fn test_remove_and_record_failure() {
        let mut queue = PendingQueue::new();
        let op = pending("a", true);
        let id = op.id;
        queue.push(op);

        assert_eq!(queue.record_failure(id), Some(1));
        assert_eq!(queue.record_failure(id), Some(2));
        assert_eq!(queue.summaries()[0].attempts, 2);

        assert!(queue.remove(id).is_some());
        assert!(queue.remove(id).is_none());
        assert_eq!(queue.record_failure(id), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_reports_removed() {
        let mut queue = PendingQueue::new();
        queue.push(pending("a", true));
        queue.push(pending("b", true));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }
}
