//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided [`NetworkMonitor`](bridge_traits::NetworkMonitor)
//! and the settings in [`CoreConfig`] into a running offline queue. Desktop
//! tools typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and get a TCP-probe network monitor for free; mobile
//! hosts inject their own monitor.
//!
//! ```ignore
//! use core_service::CoreService;
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .network_monitor(host_monitor)
//!     .database_path(data_dir.join("offline.db"))
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//! core.restore_pending(&registry).await?;
//!
//! core.offline()
//!     .execute_with_offline_support("upload-photo-1", upload, true, handler)
//!     .await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{DesktopNetworkMonitor, ProbeConfig};

use std::sync::Arc;

use core_offline::{
    ConnectivityMonitor, OfflineWrapper, OperationRegistry, SqliteOperationStore,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use tracing::{info, warn};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    offline: OfflineWrapper,
    events: EventBus,
    config: Arc<CoreConfig>,
}

impl CoreService {
    /// Validate `config`, open the operation store when persistence is
    /// enabled, and start following connectivity.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);
        let connectivity = Arc::new(
            ConnectivityMonitor::new(config.network_monitor.clone(), false)
                .with_events(events.clone()),
        );

        let mut builder = OfflineWrapper::builder(connectivity)
            .config(config.offline.clone())
            .clock(config.clock.clone())
            .events(events.clone());

        if config.persistence_enabled() {
            if let Some(path) = &config.database_path {
                let store = SqliteOperationStore::open(path).await.map_err(|e| {
                    CoreError::InitializationFailed(format!(
                        "cannot open operation store at {}: {e}",
                        path.display()
                    ))
                })?;
                builder = builder.store(Arc::new(store));
            }
        }

        let offline = builder.build()?;
        offline.start().await?;

        info!(
            persistence = config.persistence_enabled(),
            batch_size = config.offline.batch_size,
            offline = offline.is_offline(),
            "Core service started"
        );

        Ok(Self {
            offline,
            events,
            config: Arc::new(config),
        })
    }

    pub fn offline(&self) -> &OfflineWrapper {
        &self.offline
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stream of every core event.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Re-queue operations persisted by a previous session.
    pub async fn restore_pending(&self, registry: &OperationRegistry) -> Result<usize> {
        if !self.config.persistence_enabled() {
            warn!("Persistence disabled; nothing to restore");
            return Ok(0);
        }
        Ok(self.offline.restore(registry).await?)
    }

    /// Stop background work. Queued operations stay in memory (and in the
    /// store when persistence is enabled).
    pub fn shutdown(&self) {
        self.offline.cleanup();
        info!("Core service stopped");
    }
}
