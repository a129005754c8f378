//! # Offline Operation Queue
//!
//! Executes work immediately when the device is online and defers it to a
//! de-duplicated queue when it is not.
//!
//! ## Overview
//!
//! Connectivity comes from a host [`NetworkMonitor`](bridge_traits::NetworkMonitor)
//! wrapped in a [`ConnectivityMonitor`]. On every offline to online
//! transition the [`OfflineWrapper`] drains its queue in fixed-size batches
//! with a pause between them. Hosts observe two flags, "is offline" and
//! "has pending operations", through `watch` receivers.
//!
//! ## Components
//!
//! - **Offline Wrapper** (`wrapper`): Entry point; immediate-or-queue execution and draining
//! - **Operations** (`operation`): [`OfflineOperation`] and [`ResultHandler`] plus closure adapters
//! - **Pending Queue** (`queue`): Ordered queue holding one operation per key
//! - **Connectivity** (`connectivity`): Online flag fed by the host network monitor
//! - **Store** (`store`): Optional SQLite persistence of required operations
//! - **Registry** (`registry`): Rebuilds persisted operations by kind

pub mod connectivity;
pub mod error;
pub mod operation;
pub mod queue;
pub mod registry;
pub mod store;
pub mod wrapper;

pub use connectivity::ConnectivityMonitor;
pub use error::{OfflineError, OperationError, Result};
pub use operation::{
    operation_fn, Callbacks, FnOperation, IgnoreResult, OfflineOperation, OperationDescriptor,
    ResultHandler,
};
pub use queue::{OperationId, PendingSummary};
pub use registry::OperationRegistry;
pub use store::{InMemoryOperationStore, OperationRecord, OperationStore, SqliteOperationStore};
pub use wrapper::{DrainReport, OfflineWrapper, OfflineWrapperBuilder};
