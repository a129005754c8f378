//! Network Monitoring Abstraction
//!
//! Provides connectivity information so the core can defer remote writes
//! (campaign applications, sticker photo uploads, payout requests) while the
//! device is offline and replay them once it reconnects.

use async_trait::async_trait;

use crate::{
    error::Result,
    platform::{PlatformSend, PlatformSendSync},
};

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

impl NetworkStatus {
    /// Collapse the status into an online flag.
    ///
    /// Returns `None` for `Indeterminate` so callers can keep their last
    /// known value instead of flapping.
    pub fn as_online(&self) -> Option<bool> {
        match self {
            Self::Connected => Some(true),
            Self::Disconnected => Some(false),
            Self::Indeterminate => None,
        }
    }
}

/// Network information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    /// Connected via an unspecified network.
    pub fn online() -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(NetworkType::Other),
            is_metered: false,
        }
    }

    /// No connectivity.
    pub fn offline() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
        }
    }
}

/// Network monitor trait
///
/// Implemented per host platform:
///
/// - **Desktop**: TCP reachability probe (`bridge-desktop`)
/// - **Android**: ConnectivityManager callbacks
/// - **iOS**: Network framework path monitor
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn can_upload(monitor: &dyn NetworkMonitor) -> bool {
///     monitor.is_connected().await
/// }
/// ```
#[async_trait]
pub trait NetworkMonitor: PlatformSendSync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }

    /// Subscribe to network status changes
    ///
    /// Returns a stream of network info updates. Implementations should
    /// emit an event whenever network status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait]
pub trait NetworkChangeStream: PlatformSend {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Monitor {}

        #[async_trait]
        impl NetworkMonitor for Monitor {
            async fn get_network_info(&self) -> Result<NetworkInfo>;
            async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
        }
    }

    #[test]
    fn test_status_as_online() {
        assert_eq!(NetworkStatus::Connected.as_online(), Some(true));
        assert_eq!(NetworkStatus::Disconnected.as_online(), Some(false));
        assert_eq!(NetworkStatus::Indeterminate.as_online(), None);
    }

    #[test]
    fn test_network_info_constructors() {
        assert_eq!(NetworkInfo::online().status, NetworkStatus::Connected);
        let offline = NetworkInfo::offline();
        assert_eq!(offline.status, NetworkStatus::Disconnected);
        assert_eq!(offline.network_type, None);
    }

    #[tokio::test]
    async fn test_is_connected_default_impl() {
        let mut monitor = MockMonitor::new();
        monitor
            .expect_get_network_info()
            .times(1)
            .returning(|| Ok(NetworkInfo::online()));
        assert!(monitor.is_connected().await);

        let mut monitor = MockMonitor::new();
        monitor
            .expect_get_network_info()
            .times(1)
            .returning(|| Err(crate::BridgeError::NetworkProbe("timeout".to_string())));
        assert!(!monitor.is_connected().await);
    }
}
