//! Host signal handling.
//!
//! The bridge installs listeners for the termination-requesting signals
//! and turns each receipt into a best-effort zero-timeout stop of both
//! managed services. Teardown is an idempotent state transition
//! (installed to uninstalled) so every shutdown path can call it without
//! coordination.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::service::ManagedService;

enum BridgeState {
    Installed { tasks: Vec<JoinHandle<()>> },
    Uninstalled,
}

/// Holds the currently-installed signal handler set.
pub struct SignalBridge {
    state: Mutex<BridgeState>,
}

impl SignalBridge {
    /// A bridge that never installed anything; `uninstall` is a no-op.
    pub fn disabled() -> Self {
        Self {
            state: Mutex::new(BridgeState::Uninstalled),
        }
    }

    /// Install handlers for interrupt, terminate, and hang-up (break on
    /// Windows). Must be called from within a tokio runtime.
    pub fn install(node: Arc<dyn ManagedService>, wallet: Arc<dyn ManagedService>) -> Self {
        let mut tasks = Vec::new();

        #[cfg(unix)]
        {
            use tokio::signal::unix::SignalKind;

            let kinds = [
                (SignalKind::interrupt(), "SIGINT"),
                (SignalKind::terminate(), "SIGTERM"),
                (SignalKind::hangup(), "SIGHUP"),
            ];
            for (kind, label) in kinds {
                tasks.push(tokio::spawn(listen_unix(
                    kind,
                    label,
                    Arc::clone(&node),
                    Arc::clone(&wallet),
                )));
            }
        }

        #[cfg(windows)]
        {
            tasks.push(tokio::spawn(listen_ctrl_c(
                Arc::clone(&node),
                Arc::clone(&wallet),
            )));
            tasks.push(tokio::spawn(listen_ctrl_break(
                Arc::clone(&node),
                Arc::clone(&wallet),
            )));
        }

        debug!(handlers = tasks.len(), "signal handlers installed");
        Self {
            state: Mutex::new(BridgeState::Installed { tasks }),
        }
    }

    /// Remove all installed handlers. Safe to call from multiple
    /// shutdown paths; only the first call has any effect.
    pub fn uninstall(&self) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, BridgeState::Uninstalled)
        };

        if let BridgeState::Installed { tasks } = previous {
            for task in &tasks {
                task.abort();
            }
            debug!(handlers = tasks.len(), "signal handlers removed");
        }
    }

    /// Whether handlers are currently installed.
    pub fn installed(&self) -> bool {
        matches!(*self.state.lock(), BridgeState::Installed { .. })
    }
}

/// Stop both services with a zero grace period. Signal context: nothing
/// here may propagate an error.
async fn stop_both(
    label: &'static str,
    node: Arc<dyn ManagedService>,
    wallet: Arc<dyn ManagedService>,
) {
    info!(signal = label, "termination signal received, stopping services");
    let (node_exit, wallet_exit) =
        tokio::join!(node.stop(Duration::ZERO), wallet.stop(Duration::ZERO));
    debug!(
        signal = label,
        node = %node_exit,
        wallet = %wallet_exit,
        "signal-initiated stop finished"
    );
}

#[cfg(unix)]
async fn listen_unix(
    kind: tokio::signal::unix::SignalKind,
    label: &'static str,
    node: Arc<dyn ManagedService>,
    wallet: Arc<dyn ManagedService>,
) {
    let mut stream = match tokio::signal::unix::signal(kind) {
        Ok(stream) => stream,
        Err(err) => {
            error!(signal = label, error = %err, "cannot install signal handler");
            return;
        }
    };

    while stream.recv().await.is_some() {
        stop_both(label, Arc::clone(&node), Arc::clone(&wallet)).await;
    }
}

#[cfg(windows)]
async fn listen_ctrl_c(node: Arc<dyn ManagedService>, wallet: Arc<dyn ManagedService>) {
    let mut stream = match tokio::signal::windows::ctrl_c() {
        Ok(stream) => stream,
        Err(err) => {
            error!(signal = "CTRL_C", error = %err, "cannot install signal handler");
            return;
        }
    };

    while stream.recv().await.is_some() {
        stop_both("CTRL_C", Arc::clone(&node), Arc::clone(&wallet)).await;
    }
}

#[cfg(windows)]
async fn listen_ctrl_break(node: Arc<dyn ManagedService>, wallet: Arc<dyn ManagedService>) {
    let mut stream = match tokio::signal::windows::ctrl_break() {
        Ok(stream) => stream,
        Err(err) => {
            error!(signal = "CTRL_BREAK", error = %err, "cannot install signal handler");
            return;
        }
    };

    while stream.recv().await.is_some() {
        stop_both("CTRL_BREAK", Arc::clone(&node), Arc::clone(&wallet)).await;
    }
}
