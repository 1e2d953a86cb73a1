//! Scripted [`ManagedService`] double.
//!
//! Behaves like a well-mannered managed process without spawning one:
//! start and stop outcomes, delays, and self-exits are all scripted up
//! front, and every call is counted so tests can assert ordering and
//! idempotence.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::ServiceError;
use crate::service::{ExitStatus, ManagedService, ServiceStatus, StartInfo};

/// Shared call journal for asserting cross-service ordering.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Create an empty journal.
pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A scripted managed service.
///
/// Defaults: starts instantly with no API port, stops instantly with
/// `ExitStatus::Exited(0)`.
pub struct ScriptedService {
    name: String,
    api_port: Option<u16>,
    start_delay: Duration,
    start_error: Option<String>,
    self_exit_after_start: Option<ExitStatus>,
    stop_delay: Duration,
    stop_exit: ExitStatus,
    status_tx: watch::Sender<ServiceStatus>,
    exit: Mutex<Option<ExitStatus>>,
    start_count: AtomicU32,
    stop_count: AtomicU32,
    stop_timeouts: Mutex<Vec<Duration>>,
    journal: Option<Journal>,
}

impl ScriptedService {
    pub fn new(name: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(ServiceStatus::NotStarted);
        Self {
            name: name.into(),
            api_port: None,
            start_delay: Duration::ZERO,
            start_error: None,
            self_exit_after_start: None,
            stop_delay: Duration::ZERO,
            stop_exit: ExitStatus::Exited(0),
            status_tx,
            exit: Mutex::new(None),
            start_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
            stop_timeouts: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    /// Port reported through [`StartInfo`] once started.
    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = Some(port);
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Make `start` fail after any configured delay.
    pub fn with_start_error(mut self, reason: impl Into<String>) -> Self {
        self.start_error = Some(reason.into());
        self
    }

    /// Report `Stopped` immediately after a successful start, as a
    /// process that crashes right out of the gate would.
    pub fn with_self_exit_after_start(mut self, exit: ExitStatus) -> Self {
        self.self_exit_after_start = Some(exit);
        self
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn with_stop_exit(mut self, exit: ExitStatus) -> Self {
        self.stop_exit = exit;
        self
    }

    /// Record start/stop calls into a shared journal.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Finish the script and share the service.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Simulate the process exiting on its own with `exit`.
    pub fn terminate(&self, exit: ExitStatus) {
        {
            let mut cached = self.exit.lock();
            if cached.is_none() {
                *cached = Some(exit);
            }
        }
        self.advance(ServiceStatus::Stopped);
    }

    pub fn start_count(&self) -> u32 {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stop_count.load(Ordering::SeqCst)
    }

    /// Timeouts observed by every stop call, in call order.
    pub fn stop_timeouts(&self) -> Vec<Duration> {
        self.stop_timeouts.lock().clone()
    }

    fn advance(&self, next: ServiceStatus) {
        self.status_tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    fn record(&self, entry: &str) {
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("{}:{}", self.name, entry));
        }
    }
}

#[async_trait]
impl ManagedService for ScriptedService {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> ServiceStatus {
        *self.status_tx.borrow()
    }

    fn status_changes(&self) -> watch::Receiver<ServiceStatus> {
        self.status_tx.subscribe()
    }

    async fn start(&self) -> Result<StartInfo, ServiceError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        self.record("start-called");
        self.advance(ServiceStatus::Starting);

        if self.start_delay > Duration::ZERO {
            tokio::time::sleep(self.start_delay).await;
        }

        if let Some(reason) = &self.start_error {
            {
                let mut cached = self.exit.lock();
                if cached.is_none() {
                    *cached = Some(ExitStatus::FailedToLaunch(reason.clone()));
                }
            }
            self.advance(ServiceStatus::Stopped);
            return Err(ServiceError::Spawn {
                name: self.name.clone(),
                source: std::io::Error::other(reason.clone()),
            });
        }

        self.advance(ServiceStatus::Started);
        self.record("started");

        if let Some(exit) = &self.self_exit_after_start {
            self.terminate(exit.clone());
        }

        Ok(StartInfo {
            pid: Some(4242),
            api_port: self.api_port,
        })
    }

    async fn stop(&self, timeout: Duration) -> ExitStatus {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.stop_timeouts.lock().push(timeout);
        self.record("stop-called");

        if let Some(exit) = self.exit.lock().clone() {
            self.advance(ServiceStatus::Stopped);
            return exit;
        }

        // Never started: record the same outcome a real service would.
        if self.status() < ServiceStatus::Started {
            {
                let mut cached = self.exit.lock();
                if cached.is_none() {
                    *cached = Some(ExitStatus::Unknown);
                }
            }
            self.advance(ServiceStatus::Stopped);
            return ExitStatus::Unknown;
        }

        self.advance(ServiceStatus::Stopping);

        if self.stop_delay > Duration::ZERO {
            tokio::time::sleep(self.stop_delay).await;
        }

        let exit = {
            let mut cached = self.exit.lock();
            match &*cached {
                Some(exit) => exit.clone(),
                None => {
                    *cached = Some(self.stop_exit.clone());
                    self.stop_exit.clone()
                }
            }
        };

        self.advance(ServiceStatus::Stopped);
        exit
    }
}
