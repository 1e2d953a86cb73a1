//! Process-backed [`ManagedService`] implementation.
//!
//! [`ProcessService`] spawns one child process from a [`LaunchSpec`],
//! pumps its output into the configured sink, and tracks its lifecycle
//! through the ordered [`ServiceStatus`]. A waiter task owns the child
//! after spawn: it records the OS exit status and flips the service to
//! `Stopped`, whether the process ended on its own or was asked to.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;

use super::{ExitStatus, ManagedService, ServiceStatus, StartInfo};

/// Where a child's stdout/stderr goes.
#[derive(Debug, Clone, Default)]
pub enum LogSink {
    /// Inherit the supervisor's own stdio.
    #[default]
    Inherit,
    /// Append timestamped lines to a file.
    File(PathBuf),
}

/// Everything needed to launch one child process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Short name used in logs ("node", "wallet").
    pub name: String,
    /// Executable to run.
    pub program: PathBuf,
    /// Full argument list.
    pub args: Vec<String>,
    /// Working directory, created on start if absent.
    pub work_dir: PathBuf,
    /// Optional generated config file written into the working directory
    /// before spawning.
    pub config_file: Option<(PathBuf, serde_json::Value)>,
    /// Output sink for stdout and stderr.
    pub sink: LogSink,
    /// Listening port advertised through [`StartInfo`], when known
    /// up front.
    pub api_port: Option<u16>,
}

enum ProcState {
    Idle,
    Running {
        pid: Option<u32>,
        kill_tx: mpsc::Sender<()>,
        exit_rx: watch::Receiver<Option<ExitStatus>>,
    },
    Stopped(ExitStatus),
}

struct Shared {
    name: String,
    status_tx: watch::Sender<ServiceStatus>,
    state: Mutex<ProcState>,
}

impl Shared {
    /// Move the status forward; transitions never go backwards.
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

    fn record_exit(&self, exit: ExitStatus) {
        *self.state.lock() = ProcState::Stopped(exit);
        self.advance(ServiceStatus::Stopped);
    }
}

/// A [`ManagedService`] backed by a real OS process.
pub struct ProcessService {
    spec: LaunchSpec,
    shared: Arc<Shared>,
}

impl ProcessService {
    pub fn new(spec: LaunchSpec) -> Self {
        let (status_tx, _) = watch::channel(ServiceStatus::NotStarted);
        let shared = Arc::new(Shared {
            name: spec.name.clone(),
            status_tx,
            state: Mutex::new(ProcState::Idle),
        });
        Self { spec, shared }
    }

    fn check_startable(&self) -> Result<(), ServiceError> {
        let state = self.shared.state.lock();
        match &*state {
            ProcState::Idle => Ok(()),
            ProcState::Stopped(_) => Err(ServiceError::StoppedBeforeStart {
                name: self.spec.name.clone(),
            }),
            ProcState::Running { .. } => Err(ServiceError::AlreadyStarted {
                name: self.spec.name.clone(),
            }),
        }
    }

    /// Write generated launch files and make sure the working directory
    /// exists.
    async fn prepare(&self) -> Result<(), ServiceError> {
        let prepare = async {
            tokio::fs::create_dir_all(&self.spec.work_dir).await?;
            if let Some((path, settings)) = &self.spec.config_file {
                let rendered = serde_json::to_vec_pretty(settings)
                    .map_err(|err| std::io::Error::other(err.to_string()))?;
                tokio::fs::write(path, rendered).await?;
                debug!(
                    service = %self.spec.name,
                    config = %path.display(),
                    "wrote generated config file"
                );
            }
            Ok(())
        };

        prepare.await.map_err(|source| ServiceError::Prepare {
            name: self.spec.name.clone(),
            source,
        })
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .current_dir(&self.spec.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match &self.spec.sink {
            LogSink::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            LogSink::File(_) => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        command
    }
}

#[async_trait]
impl ManagedService for ProcessService {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn status(&self) -> ServiceStatus {
        *self.shared.status_tx.borrow()
    }

    fn status_changes(&self) -> watch::Receiver<ServiceStatus> {
        self.shared.status_tx.subscribe()
    }

    async fn start(&self) -> Result<StartInfo, ServiceError> {
        self.check_startable()?;
        self.shared.advance(ServiceStatus::Starting);
        self.prepare().await?;

        let mut command = self.build_command();
        debug!(
            service = %self.spec.name,
            program = %self.spec.program.display(),
            args = ?self.spec.args,
            "spawning child process"
        );

        // Spawn under the state lock so a concurrent zero-timeout stop
        // cannot slip between the idle check and the transition to
        // `Running`.
        let (mut child, pid, exit_tx, mut kill_rx) = {
            let mut state = self.shared.state.lock();
            match &*state {
                ProcState::Idle => {}
                ProcState::Stopped(_) => {
                    return Err(ServiceError::StoppedBeforeStart {
                        name: self.spec.name.clone(),
                    })
                }
                ProcState::Running { .. } => {
                    return Err(ServiceError::AlreadyStarted {
                        name: self.spec.name.clone(),
                    })
                }
            }

            match command.spawn() {
                Ok(child) => {
                    let pid = child.id();
                    let (exit_tx, exit_rx) = watch::channel(None);
                    let (kill_tx, kill_rx) = mpsc::channel::<()>(1);
                    *state = ProcState::Running {
                        pid,
                        kill_tx,
                        exit_rx,
                    };
                    (child, pid, exit_tx, kill_rx)
                }
                Err(source) => {
                    *state = ProcState::Stopped(ExitStatus::FailedToLaunch(source.to_string()));
                    drop(state);
                    error!(service = %self.spec.name, error = %source, "spawn failed");
                    self.shared.advance(ServiceStatus::Stopped);
                    return Err(ServiceError::Spawn {
                        name: self.spec.name.clone(),
                        source,
                    });
                }
            }
        };

        self.shared.advance(ServiceStatus::Started);
        info!(service = %self.spec.name, pid = ?pid, "child process started");

        if let LogSink::File(path) = &self.spec.sink {
            if let Some(stdout) = child.stdout.take() {
                spawn_output_pump(self.spec.name.clone(), path.clone(), stdout);
            }
            if let Some(stderr) = child.stderr.take() {
                spawn_output_pump(self.spec.name.clone(), path.clone(), stderr);
            }
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx.recv() => {
                    warn!(service = %shared.name, "grace period expired, killing process");
                    if let Err(err) = child.start_kill() {
                        error!(service = %shared.name, error = %err, "kill failed");
                    }
                    child.wait().await
                }
            };

            let exit = match status {
                Ok(status) => ExitStatus::from_os(status),
                Err(err) => {
                    error!(service = %shared.name, error = %err, "wait failed");
                    ExitStatus::Unknown
                }
            };

            info!(service = %shared.name, exit = %exit, "child process ended");
            shared.record_exit(exit.clone());
            let _ = exit_tx.send(Some(exit));
        });

        Ok(StartInfo {
            pid,
            api_port: self.spec.api_port,
        })
    }

    async fn stop(&self, timeout: Duration) -> ExitStatus {
        enum Plan {
            Done(ExitStatus),
            NeverStarted,
            Terminate {
                pid: Option<u32>,
                kill_tx: mpsc::Sender<()>,
                exit_rx: watch::Receiver<Option<ExitStatus>>,
            },
        }

        let plan = {
            let mut state = self.shared.state.lock();
            match &*state {
                ProcState::Stopped(exit) => Plan::Done(exit.clone()),
                ProcState::Idle => {
                    *state = ProcState::Stopped(ExitStatus::Unknown);
                    Plan::NeverStarted
                }
                ProcState::Running {
                    pid,
                    kill_tx,
                    exit_rx,
                } => Plan::Terminate {
                    pid: *pid,
                    kill_tx: kill_tx.clone(),
                    exit_rx: exit_rx.clone(),
                },
            }
        };

        let (pid, kill_tx, mut exit_rx) = match plan {
            Plan::Done(exit) => return exit,
            Plan::NeverStarted => {
                self.shared.advance(ServiceStatus::Stopped);
                return ExitStatus::Unknown;
            }
            Plan::Terminate {
                pid,
                kill_tx,
                exit_rx,
            } => (pid, kill_tx, exit_rx),
        };

        self.shared.advance(ServiceStatus::Stopping);
        debug!(
            service = %self.spec.name,
            timeout_ms = timeout.as_millis() as u64,
            "stopping child process"
        );

        request_graceful_exit(&self.spec.name, pid);

        match tokio::time::timeout(timeout, wait_for_exit(&mut exit_rx)).await {
            Ok(exit) => exit,
            Err(_) => {
                let _ = kill_tx.try_send(());
                wait_for_exit(&mut exit_rx).await
            }
        }
    }
}

/// Ask the process to exit on its own terms.
fn request_graceful_exit(name: &str, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        debug!(service = %name, pid, "sending SIGTERM");
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        return;
    }

    // Without a pid (or off unix) there is no graceful channel; the
    // timeout path escalates to a kill.
    let _ = (name, pid);
}

async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<ExitStatus>>) -> ExitStatus {
    loop {
        if let Some(exit) = exit_rx.borrow().clone() {
            return exit;
        }
        if exit_rx.changed().await.is_err() {
            return ExitStatus::Unknown;
        }
    }
}

/// Copy one child output stream into the log file, one timestamped line
/// at a time.
fn spawn_output_pump(
    name: String,
    path: PathBuf,
    stream: impl AsyncRead + Unpin + Send + 'static,
) {
    tokio::spawn(async move {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await;

        let mut file = match file {
            Ok(file) => file,
            Err(err) => {
                warn!(service = %name, path = %path.display(), error = %err, "cannot open log sink");
                return;
            }
        };

        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let stamped = format!(
                "[{}] {}\n",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                line
            );
            if file.write_all(stamped.as_bytes()).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> LaunchSpec {
        LaunchSpec {
            name: name.to_string(),
            program: PathBuf::from("/bin/true"),
            args: vec![],
            work_dir: std::env::temp_dir(),
            config_file: None,
            sink: LogSink::Inherit,
            api_port: None,
        }
    }

    #[tokio::test]
    async fn stop_before_start_records_unknown() {
        let service = ProcessService::new(spec("node"));

        let exit = service.stop(Duration::from_secs(1)).await;

        assert_eq!(exit, ExitStatus::Unknown);
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn start_after_stop_is_rejected() {
        let service = ProcessService::new(spec("node"));
        service.stop(Duration::ZERO).await;

        let result = service.start().await;

        assert!(matches!(
            result,
            Err(ServiceError::StoppedBeforeStart { .. })
        ));
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded_as_failed_to_launch() {
        let mut spec = spec("node");
        spec.program = PathBuf::from("/nonexistent/definitely-not-a-binary");
        let service = ProcessService::new(spec);

        let result = service.start().await;

        assert!(matches!(result, Err(ServiceError::Spawn { .. })));
        assert_eq!(service.status(), ServiceStatus::Stopped);
        assert!(matches!(
            service.stop(Duration::ZERO).await,
            ExitStatus::FailedToLaunch(_)
        ));
    }
}
