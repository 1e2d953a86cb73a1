//! Terminal outcomes of supervised processes.

use std::fmt;

/// How a single managed service ended.
///
/// Produced once per service when its process terminates (or fails to
/// launch at all) and cached so repeated `stop` calls observe the same
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The process exited on its own with the given code.
    Exited(i32),
    /// The process was terminated by a signal.
    Signaled(i32),
    /// The process could never be spawned.
    FailedToLaunch(String),
    /// The service was stopped without ever producing an OS status
    /// (e.g. it was never started).
    Unknown,
}

impl ExitStatus {
    /// Translate an OS exit status into the supervision taxonomy.
    pub fn from_os(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatus::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signaled(signal);
            }
        }

        ExitStatus::Unknown
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exited with status {code}"),
            ExitStatus::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            ExitStatus::FailedToLaunch(reason) => write!(f, "failed to launch: {reason}"),
            ExitStatus::Unknown => f.write_str("exited with unknown status"),
        }
    }
}

/// The paired outcome of both supervised services, node first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedExitStatus {
    pub node: ExitStatus,
    pub wallet: ExitStatus,
}

impl CombinedExitStatus {
    /// Placeholder for paths where neither process ever reported an
    /// OS-level outcome.
    pub fn unknown() -> Self {
        Self {
            node: ExitStatus::Unknown,
            wallet: ExitStatus::Unknown,
        }
    }
}

impl fmt::Display for CombinedExitStatus {
    /// Renders one line per service in a stable order, for logs and
    /// error messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node: {}\nwallet: {}", self.node, self.wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::{CombinedExitStatus, ExitStatus};

    #[test]
    fn exit_status_renders_all_variants() {
        assert_eq!(ExitStatus::Exited(0).to_string(), "exited with status 0");
        assert_eq!(ExitStatus::Exited(137).to_string(), "exited with status 137");
        assert_eq!(
            ExitStatus::Signaled(9).to_string(),
            "terminated by signal 9"
        );
        assert_eq!(
            ExitStatus::FailedToLaunch("no such file".into()).to_string(),
            "failed to launch: no such file"
        );
        assert_eq!(
            ExitStatus::Unknown.to_string(),
            "exited with unknown status"
        );
    }

    #[test]
    fn combined_status_renders_node_before_wallet() {
        let combined = CombinedExitStatus {
            node: ExitStatus::Exited(0),
            wallet: ExitStatus::Signaled(15),
        };

        assert_eq!(
            combined.to_string(),
            "node: exited with status 0\nwallet: terminated by signal 15"
        );
    }

    #[test]
    fn combined_status_rendering_is_stable_across_calls() {
        let combined = CombinedExitStatus {
            node: ExitStatus::FailedToLaunch("missing executable".into()),
            wallet: ExitStatus::Unknown,
        };

        assert_eq!(combined.to_string(), combined.to_string());
    }
}
