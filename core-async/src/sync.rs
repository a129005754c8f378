//! Synchronization primitives.
//!
//! Re-exports the async-aware primitives from `tokio::sync` together with the
//! cooperative cancellation token from `tokio-util`. All types are
//! `Send + Sync` and never block the executor.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let (tx, rx) = watch::channel(false);
//!     tx.send_replace(true);
//!     assert!(*rx.borrow());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
