//! Managed services: the per-process supervision capability.

mod exit;
mod handle;
mod process;
mod status;

pub use exit::{CombinedExitStatus, ExitStatus};
pub use handle::{ManagedService, ServiceHandle, StartInfo};
pub use process::{LaunchSpec, LogSink, ProcessService};
pub use status::ServiceStatus;
