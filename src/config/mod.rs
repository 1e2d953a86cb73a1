//! Configuration loading and logging setup.

mod logging;
mod settings;

pub use logging::LoggingConfig;
pub use settings::{LaunchConfig, Network, NodeConfig, WalletConfig};
