//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use core_async::time::{sleep, timeout, Duration};
use tokio::net::TcpStream;
use tracing::debug;

/// Reachability probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// `host:port` to open a TCP connection to
    pub address: String,
    /// How long a single probe may take before counting as offline
    pub timeout: Duration,
    /// Polling period for `subscribe_changes`
    pub poll_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            address: "8.8.8.8:53".to_string(),
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Desktop network monitor implementation
///
/// Considers the host online when a TCP connection to the probe address
/// succeeds within the timeout. Platform APIs (netlink, SCNetworkReachability,
/// Network List Manager) would react faster but need extra dependencies.
#[derive(Debug, Clone, Default)]
pub struct DesktopNetworkMonitor {
    probe: ProbeConfig,
}

impl DesktopNetworkMonitor {
    /// Create a monitor with the default probe
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor with a custom probe
    pub fn with_probe(probe: ProbeConfig) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &ProbeConfig {
        &self.probe
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match timeout(self.probe.timeout, TcpStream::connect(self.probe.address.as_str())).await {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;

        let info = NetworkInfo {
            status,
            // Can't tell WiFi from Ethernet without platform APIs
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
        };

        debug!(status = ?status, probe = %self.probe.address, "Network info updated");

        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            if self.last_status.is_some() {
                sleep(self.monitor.probe.poll_interval).await;
            }

            if let Ok(info) = self.monitor.get_network_info().await {
                // Only return if status changed
                if self.last_status != Some(info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn probe_for(address: String) -> ProbeConfig {
        ProbeConfig {
            address,
            timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[core_async::test]
    async fn test_reachable_probe_reports_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let monitor = DesktopNetworkMonitor::with_probe(probe_for(address));
        let info = monitor.get_network_info().await.unwrap();

        assert_eq!(info.status, NetworkStatus::Connected);
        assert_eq!(info.network_type, Some(NetworkType::Other));
        assert!(monitor.is_connected().await);
    }

    #[core_async::test]
    async fn test_unreachable_probe_reports_disconnected() {
        // Bind then drop so the port is known to be closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let monitor = DesktopNetworkMonitor::with_probe(probe_for(address));
        let info = monitor.get_network_info().await.unwrap();

        assert_eq!(info.status, NetworkStatus::Disconnected);
        assert_eq!(info.network_type, None);
    }

    #[core_async::test]
    async fn test_change_stream_emits_initial_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let monitor = DesktopNetworkMonitor::with_probe(probe_for(address));
        let mut stream = monitor.subscribe_changes().await.unwrap();

        let first = stream.next().await.unwrap();
        assert_eq!(first.status, NetworkStatus::Connected);
    }

    #[test]
    fn test_default_probe() {
        let monitor = DesktopNetworkMonitor::new();
        assert_eq!(monitor.probe().address, "8.8.8.8:53");
        assert_eq!(monitor.probe().timeout, Duration::from_secs(5));
    }
}
