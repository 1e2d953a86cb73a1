//! The contract a supervised child process exposes to the launcher, and
//! the per-service handle the launcher keeps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::ServiceError;

use super::{ExitStatus, ServiceStatus};

/// Data returned by a service's start operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartInfo {
    /// OS process id, when a real process was spawned.
    pub pid: Option<u32>,
    /// The port the service listens on. Set by the wallet backend; the
    /// node leaves it empty.
    pub api_port: Option<u16>,
}

/// One supervised child process.
///
/// Implementations own the mechanics of spawning, monitoring, and killing
/// a single process. The launcher consumes them purely through this trait
/// so tests can substitute scripted doubles.
///
/// # Contract
///
/// - `start` may be called at most once; later calls fail with
///   [`ServiceError::AlreadyStarted`].
/// - `stop` is idempotent: concurrent and repeated callers all resolve
///   with the same cached [`ExitStatus`]. A service that was never started
///   records [`ExitStatus::Unknown`].
/// - `status` only ever moves forward through the [`ServiceStatus`] order,
///   and `status_changes` receivers observe every forward transition.
#[async_trait]
pub trait ManagedService: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Current lifecycle status.
    fn status(&self) -> ServiceStatus;

    /// Watch stream of status transitions.
    fn status_changes(&self) -> watch::Receiver<ServiceStatus>;

    /// Start the underlying process.
    async fn start(&self) -> Result<StartInfo, ServiceError>;

    /// Stop the underlying process, giving it `timeout` to exit
    /// gracefully before it is killed.
    async fn stop(&self, timeout: Duration) -> ExitStatus;
}

/// Pairs a [`ManagedService`] with the cached result of its start call.
///
/// Created by the launcher at construction, one per process, and dropped
/// with it.
pub struct ServiceHandle {
    service: Arc<dyn ManagedService>,
    start_info: Mutex<Option<StartInfo>>,
}

impl ServiceHandle {
    pub fn new(service: Arc<dyn ManagedService>) -> Self {
        Self {
            service,
            start_info: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.service.name()
    }

    pub fn status(&self) -> ServiceStatus {
        self.service.status()
    }

    pub fn status_changes(&self) -> watch::Receiver<ServiceStatus> {
        self.service.status_changes()
    }

    /// The service behind this handle.
    pub fn service(&self) -> Arc<dyn ManagedService> {
        Arc::clone(&self.service)
    }

    /// Info returned by `start`, if the service has started.
    pub fn start_info(&self) -> Option<StartInfo> {
        self.start_info.lock().clone()
    }

    /// Start the service and cache its [`StartInfo`].
    pub async fn start(&self) -> Result<StartInfo, ServiceError> {
        let info = self.service.start().await?;
        *self.start_info.lock() = Some(info.clone());
        Ok(info)
    }

    pub async fn stop(&self, timeout: Duration) -> ExitStatus {
        self.service.stop(timeout).await
    }
}
