//! Ordered lifecycle status for a managed service.

use std::fmt;

/// Lifecycle status of a supervised child process.
///
/// The variants form a total order so callers can ask "has this service
/// progressed past X" with a plain comparison, e.g.
/// `status > ServiceStatus::Started` is true once the service is stopping
/// or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceStatus {
    NotStarted,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceStatus::NotStarted => "not started",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Started => "started",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceStatus;

    #[test]
    fn status_ordering_is_lifecycle_order() {
        assert!(ServiceStatus::NotStarted < ServiceStatus::Starting);
        assert!(ServiceStatus::Starting < ServiceStatus::Started);
        assert!(ServiceStatus::Started < ServiceStatus::Stopping);
        assert!(ServiceStatus::Stopping < ServiceStatus::Stopped);
    }

    #[test]
    fn progressed_past_started_means_stopping_or_stopped() {
        assert!(!(ServiceStatus::NotStarted > ServiceStatus::Started));
        assert!(!(ServiceStatus::Starting > ServiceStatus::Started));
        assert!(!(ServiceStatus::Started > ServiceStatus::Started));
        assert!(ServiceStatus::Stopping > ServiceStatus::Started);
        assert!(ServiceStatus::Stopped > ServiceStatus::Started);
    }

    #[test]
    fn display_names_are_human_readable() {
        assert_eq!(ServiceStatus::NotStarted.to_string(), "not started");
        assert_eq!(ServiceStatus::Stopped.to_string(), "stopped");
    }
}
