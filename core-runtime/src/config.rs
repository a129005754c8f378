//! # Core Configuration Module
//!
//! Provides configuration management for the iStick core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the bridges and tuning knobs the offline queue needs.
//! It enforces fail-fast validation so a misconfigured host finds out at
//! startup rather than on the first dropped upload.
//!
//! ## Required Dependencies
//!
//! - `NetworkMonitor` - Required for offline detection. When the
//!   `desktop-shims` feature is enabled, `DesktopNetworkMonitor` is injected
//!   automatically if none is provided.
//!
//! ## Optional Settings
//!
//! - `database_path` - Enables persistence of required operations across
//!   restarts (SQLite)
//! - `Clock` - Time source for operation timestamps (default: system clock)
//! - `OfflineConfig` - Batch size, inter-batch delay, retry limit
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, OfflineConfig};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .network_monitor(Arc::new(MyNetworkMonitor))
//!     .database_path("/data/istick/offline.db")
//!     .offline(OfflineConfig::default().with_max_attempts(20))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, NetworkMonitor, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of operations executed per drain batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default pause between drain batches in milliseconds.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 500;

/// Tuning for the offline operation queue.
///
/// # Example
///
/// ```
/// use core_runtime::config::OfflineConfig;
///
/// let config = OfflineConfig::default()
///     .with_batch_size(10)
///     .with_max_attempts(5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineConfig {
    /// Operations executed per drain batch
    pub batch_size: usize,

    /// Pause between drain batches, in milliseconds
    pub batch_delay_ms: u64,

    /// Failed drain attempts after which a required operation is
    /// dead-lettered. `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Persist required operations that carry a descriptor
    /// (only effective when a database path is configured)
    pub persist_required: bool,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            max_attempts: None,
            persist_required: true,
        }
    }
}

impl OfflineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_delay_ms(mut self, delay_ms: u64) -> Self {
        self.batch_delay_ms = delay_ms;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.persist_required = enabled;
        self
    }

    /// Pause between drain batches.
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "Offline batch size must be greater than 0".to_string(),
            ));
        }

        if self.batch_size > 100 {
            return Err(Error::Config(
                "Offline batch size exceeds maximum of 100".to_string(),
            ));
        }

        if self.batch_delay_ms > 60_000 {
            return Err(Error::Config(
                "Offline batch delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if self.max_attempts == Some(0) {
            return Err(Error::Config(
                "Max attempts must be at least 1. Leave it unset to retry forever.".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the iStick core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite file backing persisted operations
    pub database_path: Option<PathBuf>,

    /// Network connectivity monitor (required)
    pub network_monitor: Arc<dyn NetworkMonitor>,

    /// Time source for operation timestamps
    pub clock: Arc<dyn Clock>,

    /// Offline queue tuning
    pub offline: OfflineConfig,

    /// Event bus buffer size
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("network_monitor", &"NetworkMonitor { ... }")
            .field("clock", &"Clock { ... }")
            .field("offline", &self.offline)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Whether required operations should be written to SQLite.
    pub fn persistence_enabled(&self) -> bool {
        self.offline.persist_required && self.database_path.is_some()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.offline.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn network_monitor_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "NetworkMonitor".to_string(),
        message: "NetworkMonitor implementation is required for offline detection. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default DesktopNetworkMonitor. \
                 Mobile: inject a ConnectivityManager / NWPathMonitor backed adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    use bridge_desktop::DesktopNetworkMonitor;

    let monitor: Arc<dyn NetworkMonitor> = Arc::new(DesktopNetworkMonitor::new());
    Ok(monitor)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Err(network_monitor_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    offline: Option<OfflineConfig>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite path used to persist required operations.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/data/istick/offline.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the network monitor.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets offline queue tuning.
    pub fn offline(mut self, config: OfflineConfig) -> Self {
        self.offline = Some(config);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if the network monitor is missing (and no desktop
    /// default is available) or if any value fails validation.
    pub fn build(self) -> Result<CoreConfig> {
        let network_monitor = match self.network_monitor {
            Some(monitor) => monitor,
            None => provide_default_network_monitor()?,
        };

        let config = CoreConfig {
            database_path: self.database_path,
            network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            offline: self.offline.unwrap_or_default(),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
