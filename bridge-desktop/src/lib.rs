//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts (developer
//! tooling, integration test rigs, the admin console).
//!
//! - `NetworkMonitor` using a TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::DesktopNetworkMonitor;
//! use std::sync::Arc;
//!
//! let monitor = Arc::new(DesktopNetworkMonitor::new());
//! // Hand it to CoreConfig::builder().network_monitor(monitor)
//! ```

mod network;

pub use network::{DesktopNetworkMonitor, ProbeConfig};
