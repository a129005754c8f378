//! Driving futures from synchronous code.

use std::future::Future;

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Drive `future` to completion on a fresh current-thread runtime.
///
/// Backs `#[core_async::test]` and `#[core_async::main]`, and the logging
/// layer when an event is recorded outside any runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be built, or when called from inside a
/// running runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}
