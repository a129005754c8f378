//! Marker traits that keep bridge trait bounds in one place.
//!
//! Every bridge implementation is shared across async tasks behind an `Arc`,
//! so the bounds are `Send + Sync`. Hosts that embed the core on a
//! single-threaded executor still satisfy them through their own wrappers.

/// Marker trait for bridge objects shared across tasks.
pub trait PlatformSendSync: Send + Sync {}

impl<T> PlatformSendSync for T where T: Send + Sync {}

/// Marker trait for bridge objects moved into a single task.
pub trait PlatformSend: Send {}

impl<T> PlatformSend for T where T: Send {}
