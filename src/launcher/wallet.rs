//! Public facade over the supervised wallet backend.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::service::CombinedExitStatus;

use super::events::LauncherEvent;
use super::LauncherInner;

/// Connection descriptor for the wallet backend's HTTP API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Api {
    pub host: String,
    pub port: u16,
}

impl Api {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL of the wallet API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Handle onto the running wallet backend.
///
/// The API descriptor only becomes valid once the launcher has emitted
/// [`LauncherEvent::Ready`]; before that, [`WalletBackend::api`] returns
/// [`Error::ApiNotReady`]. Cloning is cheap and every clone observes the
/// same launcher.
#[derive(Clone)]
pub struct WalletBackend {
    pub(super) inner: Arc<LauncherInner>,
}

impl WalletBackend {
    /// The wallet API connection descriptor.
    ///
    /// Reads the port cached from the wallet service's start info; guard
    /// calls with the `Ready` event.
    pub fn api(&self) -> Result<Api> {
        let port = self
            .inner
            .wallet
            .start_info()
            .and_then(|info| info.api_port)
            .ok_or(Error::ApiNotReady)?;
        Ok(Api::new(self.inner.api_host.clone(), port))
    }

    /// Subscribe to `Ready`/`Exited` events.
    pub fn subscribe(&self) -> broadcast::Receiver<LauncherEvent> {
        self.inner.events.subscribe()
    }

    /// The combined exit status, if the backend has already exited.
    pub fn exit_status(&self) -> Option<CombinedExitStatus> {
        self.inner.events.exited()
    }
}
