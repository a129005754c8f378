//! # Connectivity Monitor
//!
//! Turns a host [`NetworkMonitor`] into a single observable online flag.
//!
//! The monitor probes once when started, then follows the host's change
//! stream until stopped. Hosts without a usable stream can drive the flag
//! directly with [`ConnectivityMonitor::set_online`].

use std::sync::{Arc, Mutex};

use bridge_traits::network::{NetworkInfo, NetworkMonitor};
use core_async::sync::{watch, CancellationToken};
use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
use tracing::{debug, info, warn};

use crate::error::Result;

pub struct ConnectivityMonitor {
    monitor: Arc<dyn NetworkMonitor>,
    online: Arc<watch::Sender<bool>>,
    events: Option<EventBus>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ConnectivityMonitor {
    /// Create a stopped monitor. The flag starts at `initially_online`
    /// until the first probe.
    pub fn new(monitor: Arc<dyn NetworkMonitor>, initially_online: bool) -> Self {
        let (online, _) = watch::channel(initially_online);
        Self {
            monitor,
            online: Arc::new(online),
            events: None,
            cancel: Mutex::new(None),
        }
    }

    /// Publish `WentOnline`/`WentOffline` on `bus` for every transition.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Receiver that sees every change of the online flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    pub fn is_monitoring(&self) -> bool {
        self.cancel
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Probe the host once, then follow its change stream in the background.
    ///
    /// Calling this while already monitoring is a no-op.
    pub async fn start_monitoring(&self) -> Result<()> {
        if self.is_monitoring() {
            debug!("Connectivity monitoring already running");
            return Ok(());
        }

        match self.monitor.get_network_info().await {
            Ok(info) => self.apply(&info),
            Err(e) => warn!(error = %e, "Initial connectivity probe failed; keeping current state"),
        }

        let mut stream = self.monitor.subscribe_changes().await?;
        let token = CancellationToken::new();

        {
            let mut guard = match self.cancel.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if guard.is_some() {
                // Lost a race with a concurrent start.
                return Ok(());
            }
            *guard = Some(token.clone());
        }

        let online = self.online.clone();
        let events = self.events.clone();
        core_async::task::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = stream.next() => match next {
                        Some(info) => update_flag(&online, events.as_ref(), &info),
                        None => {
                            warn!("Network change stream ended; connectivity is no longer tracked");
                            break;
                        }
                    },
                }
            }
            debug!("Connectivity monitoring task exited");
        });

        info!(online = self.is_online(), "Connectivity monitoring started");
        Ok(())
    }

    /// Stop following the host's change stream. The flag keeps its last value.
    pub fn stop_monitoring(&self) {
        let token = match self.cancel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(token) = token {
            token.cancel();
            info!("Connectivity monitoring stopped");
        }
    }

    /// Force the online flag, e.g. from a host callback or in tests.
    pub fn set_online(&self, online: bool) {
        let info = if online {
            NetworkInfo::online()
        } else {
            NetworkInfo::offline()
        };
        self.apply(&info);
    }

    fn apply(&self, info: &NetworkInfo) {
        update_flag(&self.online, self.events.as_ref(), info);
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}

fn update_flag(online: &watch::Sender<bool>, events: Option<&EventBus>, info: &NetworkInfo) {
    // Unknown keeps the last known value
    let Some(now_online) = info.status.as_online() else {
        debug!(status = ?info.status, "Ignoring indeterminate network status");
        return;
    };

    let changed = online.send_if_modified(|current| {
        if *current == now_online {
            false
        } else {
            *current = now_online;
            true
        }
    });

    if !changed {
        return;
    }

    let event = if now_online {
        info!(network_type = ?info.network_type, "Device went online");
        NetworkEvent::WentOnline
    } else {
        info!("Device went offline");
        NetworkEvent::WentOffline
    };
    if let Some(bus) = events {
        let _ = bus.emit(CoreEvent::Network(event));
    }
}
