//! Launcher event bus.
//!
//! A thin publish/subscribe surface for the two launcher-level events.
//! `Exited` is terminal: many producers may race to report it (either
//! service exiting on its own, an explicit stop call, a host signal), but
//! only the first writer emits. The terminal status stays queryable so
//! late subscribers do not depend on having seen the broadcast.

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::launcher::Api;
use crate::service::CombinedExitStatus;

/// Events observable on a running launcher.
#[derive(Debug, Clone)]
pub enum LauncherEvent {
    /// The wallet API endpoint accepted its first connection.
    Ready(Api),
    /// Both services have been stopped; fired at most once.
    Exited(CombinedExitStatus),
}

pub struct EventBus {
    tx: broadcast::Sender<LauncherEvent>,
    ready: Mutex<Option<Api>>,
    terminal: Mutex<Option<CombinedExitStatus>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            ready: Mutex::new(None),
            terminal: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LauncherEvent> {
        self.tx.subscribe()
    }

    /// The API descriptor, once `Ready` has fired.
    pub fn ready_api(&self) -> Option<Api> {
        self.ready.lock().clone()
    }

    /// The combined exit status, once the terminal event has fired.
    pub fn exited(&self) -> Option<CombinedExitStatus> {
        self.terminal.lock().clone()
    }

    /// Emit `Ready` unless the launcher has already terminated.
    /// Returns whether the event was emitted.
    pub fn emit_ready(&self, api: Api) -> bool {
        let terminal = self.terminal.lock();
        if terminal.is_some() {
            return false;
        }
        *self.ready.lock() = Some(api.clone());
        let _ = self.tx.send(LauncherEvent::Ready(api));
        true
    }

    /// Emit `Exited` if no producer has yet; first writer wins.
    /// Returns whether this call was the one that emitted.
    pub fn emit_exited(&self, status: CombinedExitStatus) -> bool {
        let mut terminal = self.terminal.lock();
        if terminal.is_some() {
            return false;
        }
        *terminal = Some(status.clone());
        let _ = self.tx.send(LauncherEvent::Exited(status));
        true
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
