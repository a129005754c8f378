//! # Host Bridge Traits
//!
//! Platform abstraction traits that each iStick host (Android, iOS, desktop
//! tooling) implements so the shared core can stay platform-agnostic.
//!
//! ## Traits
//!
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity state and change stream
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Android  | host app            | 📋 Planned |
//! | iOS      | host app            | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors into it and keep messages
//! actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared behind an
//! `Arc` across async tasks.

pub mod error;
pub mod network;
pub mod platform;
pub mod time;

pub use error::BridgeError;

pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
