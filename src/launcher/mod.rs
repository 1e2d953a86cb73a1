//! Supervision of the node/wallet pair.
//!
//! The [`Launcher`] owns one [`ServiceHandle`] per child process and
//! sequences their lifecycles: the node starts first, the wallet only
//! after the node's start operation has resolved, and a readiness probe
//! watches the wallet's advertised port. Stopping is coordinated and
//! idempotent; however many triggers race (either service exiting on its
//! own, explicit stop calls, host signals), the terminal `Exited` event
//! fires exactly once.

mod events;
mod probe;
mod signals;
mod wallet;

pub use events::{EventBus, LauncherEvent};
pub use signals::SignalBridge;
pub use wallet::{Api, WalletBackend};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::config::LaunchConfig;
use crate::error::{Error, Result};
use crate::service::{
    CombinedExitStatus, ManagedService, ProcessService, ServiceHandle, ServiceStatus,
};

/// Host the wallet API binds on.
const API_HOST: &str = "127.0.0.1";

/// Default grace period for [`Launcher::stop`] callers that take the
/// conventional one.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) struct LauncherInner {
    pub(crate) node: ServiceHandle,
    pub(crate) wallet: ServiceHandle,
    pub(crate) events: EventBus,
    signals: SignalBridge,
    started: AtomicBool,
    port_tx: watch::Sender<Option<u16>>,
    poll_interval: Duration,
    pub(crate) api_host: String,
}

/// Orchestrates the chain node and the wallet backend as one unit.
///
/// Construction wires everything up without starting anything; both
/// child processes only run once [`Launcher::start`] is called. Must be
/// created inside a tokio runtime: supervision tasks are spawned at
/// construction time.
#[derive(Clone)]
pub struct Launcher {
    inner: Arc<LauncherInner>,
}

impl Launcher {
    /// Build a launcher whose services are real OS processes described
    /// by `config`.
    pub fn new(config: LaunchConfig) -> Result<Self> {
        config.validate()?;
        let node = Arc::new(ProcessService::new(config.node_spec()?));
        let wallet = Arc::new(ProcessService::new(config.wallet_spec()?));
        Self::with_services(&config, node, wallet)
    }

    /// Build a launcher over caller-provided services. This is the seam
    /// the test doubles plug into.
    pub fn with_services(
        config: &LaunchConfig,
        node: Arc<dyn ManagedService>,
        wallet: Arc<dyn ManagedService>,
    ) -> Result<Self> {
        let signals = if config.install_signal_handlers {
            SignalBridge::install(Arc::clone(&node), Arc::clone(&wallet))
        } else {
            SignalBridge::disabled()
        };

        let (port_tx, _) = watch::channel(None);
        let inner = Arc::new(LauncherInner {
            node: ServiceHandle::new(node),
            wallet: ServiceHandle::new(wallet),
            events: EventBus::new(),
            signals,
            started: AtomicBool::new(false),
            port_tx,
            poll_interval: config.poll_interval(),
            api_host: API_HOST.to_string(),
        });

        spawn_exit_watcher(&inner, Side::Node);
        spawn_exit_watcher(&inner, Side::Wallet);

        Ok(Self { inner })
    }

    /// Facade handle for API access and event subscription.
    pub fn wallet_backend(&self) -> WalletBackend {
        WalletBackend {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Start both services and wait for the wallet API to become
    /// reachable.
    ///
    /// The node starts first; the wallet's start is chained strictly
    /// after the node's start operation resolves. Resolves with the API
    /// descriptor on `Ready` and fails with [`Error::BackendExited`] if
    /// the pair terminates first. The event subscription is taken before
    /// any start operation is invoked, so neither outcome can be lost to
    /// a race.
    pub async fn start(&self) -> Result<Api> {
        let mut events = self.inner.events.subscribe();

        if let Some(status) = self.inner.events.exited() {
            return Err(Error::BackendExited(status));
        }
        if let Some(api) = self.inner.events.ready_api() {
            return Ok(api);
        }

        // Only the first caller launches the start chain; later callers
        // just wait on the same events.
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.spawn_startup();
        }

        loop {
            match events.recv().await {
                Ok(LauncherEvent::Ready(api)) => return Ok(api),
                Ok(LauncherEvent::Exited(status)) => return Err(Error::BackendExited(status)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    let status = self
                        .inner
                        .events
                        .exited()
                        .unwrap_or_else(CombinedExitStatus::unknown);
                    return Err(Error::BackendExited(status));
                }
            }
        }
    }

    /// Stop both services, giving each `timeout` to exit gracefully.
    ///
    /// Safe to call from any number of tasks, any number of times; every
    /// caller resolves with the same combined status and the terminal
    /// event fires at most once across all of them.
    pub async fn stop(&self, timeout: Duration) -> CombinedExitStatus {
        self.inner.stop(timeout).await
    }

    /// Current status of the node service.
    pub fn node_status(&self) -> ServiceStatus {
        self.inner.node.status()
    }

    /// Current status of the wallet service.
    pub fn wallet_status(&self) -> ServiceStatus {
        self.inner.wallet.status()
    }
}

impl LauncherInner {
    /// Launch the start chain and the readiness probe. Subscriptions
    /// must already be in place when this is called.
    fn spawn_startup(self: &Arc<Self>) {
        // Readiness probe: runs from the outset, no-ops until the wallet
        // advertises its port, halts when either service has progressed
        // past `Started`.
        let probe_inner = Arc::clone(self);
        let port_rx = self.port_tx.subscribe();
        tokio::spawn(async move {
            let stop_inner = Arc::clone(&probe_inner);
            let should_stop = move || {
                stop_inner.node.status() > ServiceStatus::Started
                    || stop_inner.wallet.status() > ServiceStatus::Started
            };
            let api = probe::wait_for_api(
                probe_inner.api_host.clone(),
                port_rx,
                probe_inner.poll_interval,
                should_stop,
            )
            .await;

            if let Some(api) = api {
                if probe_inner.events.emit_ready(api.clone()) {
                    info!(api = %api, "wallet backend ready");
                }
            }
        });

        // Start chain: node strictly before wallet.
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.node.start().await {
                Ok(info) => {
                    debug!(pid = ?info.pid, "node start resolved");
                }
                Err(err) => {
                    error!(error = %err, "node failed to start; wallet will not be started");
                    inner.stop(Duration::ZERO).await;
                    return;
                }
            }

            // The node may have stopped again between its start
            // resolving and this point; starting the wallet then would
            // only prolong shutdown.
            if inner.node.status() > ServiceStatus::Started {
                warn!("node stopped during startup; wallet will not be started");
                inner.stop(Duration::ZERO).await;
                return;
            }

            match inner.wallet.start().await {
                Ok(info) => match info.api_port {
                    Some(port) => {
                        debug!(port, "wallet advertised its API port");
                        let _ = inner.port_tx.send(Some(port));
                    }
                    None => {
                        warn!("wallet start reported no API port; readiness cannot be probed");
                    }
                },
                Err(err) => {
                    error!(error = %err, "wallet failed to start");
                    inner.stop(Duration::ZERO).await;
                }
            }
        });
    }

    async fn stop(&self, timeout: Duration) -> CombinedExitStatus {
        debug!(timeout_ms = timeout.as_millis() as u64, "stopping backend");
        let (node_exit, wallet_exit) =
            tokio::join!(self.node.stop(timeout), self.wallet.stop(timeout));

        let status = CombinedExitStatus {
            node: node_exit,
            wallet: wallet_exit,
        };

        if self.events.emit_exited(status.clone()) {
            info!(status = %status, "backend exited");
        }

        self.signals.uninstall();
        status
    }
}

enum Side {
    Node,
    Wallet,
}

/// Watch one handle for reaching `Stopped` and schedule a launcher-wide
/// stop when it does. The stop is idempotent, so this also fires
/// harmlessly at the tail of an orderly shutdown.
fn spawn_exit_watcher(inner: &Arc<LauncherInner>, side: Side) {
    let weak: Weak<LauncherInner> = Arc::downgrade(inner);
    let (name, mut status_rx) = match side {
        Side::Node => ("node", inner.node.status_changes()),
        Side::Wallet => ("wallet", inner.wallet.status_changes()),
    };

    tokio::spawn(async move {
        if status_rx
            .wait_for(|status| *status == ServiceStatus::Stopped)
            .await
            .is_err()
        {
            // Service dropped without ever stopping; nothing to do.
            return;
        }

        let Some(inner) = weak.upgrade() else {
            return;
        };

        debug!(service = name, "service stopped, scheduling backend stop");
        inner.stop(Duration::ZERO).await;
    });
}
