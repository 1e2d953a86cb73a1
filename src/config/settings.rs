//! Launch configuration loading and validation.
//!
//! Provides the [`LaunchConfig`] struct describing where state lives,
//! which network the pair runs against, and how each child process is
//! launched. Loaded from a TOML file; every field has a workable
//! default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use chaperone::config::LaunchConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LaunchConfig::load("chaperone.toml")?;
//!     config.logging.init();
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::logging::LoggingConfig;
use crate::error::{ConfigError, Result};
use crate::service::{LaunchSpec, LogSink};

/// Network the node and wallet operate against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    /// Any other named network, passed through verbatim.
    #[serde(untagged)]
    Named(String),
}

impl Network {
    pub fn name(&self) -> &str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Named(name) => name,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match raw {
            "mainnet" => Network::Mainnet,
            "testnet" => Network::Testnet,
            other => Network::Named(other.to_string()),
        })
    }
}

/// Chain node launch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node executable to run.
    #[serde(default = "default_node_executable")]
    pub executable: String,
    /// Extra arguments appended after the generated ones.
    #[serde(default)]
    pub args: Vec<String>,
    /// Node settings rendered to a config file in the node's state
    /// directory and passed via `--config`.
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
    /// Log file for the node's output; inherits the supervisor's stdio
    /// when absent.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            executable: default_node_executable(),
            args: vec![],
            settings: None,
            log_file: None,
        }
    }
}

/// Wallet backend launch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Wallet backend executable to run.
    #[serde(default = "default_wallet_executable")]
    pub executable: String,
    /// Extra arguments appended after the generated ones.
    #[serde(default)]
    pub args: Vec<String>,
    /// Fixed API port; an ephemeral free port is picked when absent.
    #[serde(default)]
    pub api_port: Option<u16>,
    /// Log file for the wallet's output; inherits the supervisor's
    /// stdio when absent.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            executable: default_wallet_executable(),
            args: vec![],
            api_port: None,
            log_file: None,
        }
    }
}

fn default_node_executable() -> String {
    "chain-node".into()
}

fn default_wallet_executable() -> String {
    "wallet-backend".into()
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("chaperone"))
        .unwrap_or_else(|| PathBuf::from(".chaperone"))
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_install_signal_handlers() -> bool {
    true
}

/// Main launch configuration.
#[derive(Debug, Deserialize)]
pub struct LaunchConfig {
    /// Directory holding both services' state, one subdirectory each.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Network identity passed to both children.
    #[serde(default)]
    pub network: Network,

    /// Chain node launch settings.
    #[serde(default)]
    pub node: NodeConfig,

    /// Wallet backend launch settings.
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Whether the launcher installs host signal handlers.
    #[serde(default = "default_install_signal_handlers")]
    pub install_signal_handlers: bool,

    /// Interval between wallet API readiness probes, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            network: Network::default(),
            node: NodeConfig::default(),
            wallet: WalletConfig::default(),
            install_signal_handlers: default_install_signal_handlers(),
            poll_interval_ms: default_poll_interval_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LaunchConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let config = Self::parse_toml(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw).map_err(ConfigError::Parse)?)
    }

    /// Reject configurations the launcher cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField { field: "state_dir" }.into());
        }
        if self.node.executable.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "node.executable",
            }
            .into());
        }
        if self.wallet.executable.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "wallet.executable",
            }
            .into());
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms",
                reason: "must be greater than zero".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Interval between readiness probes.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Launch description for the chain node.
    pub fn node_spec(&self) -> Result<LaunchSpec> {
        let work_dir = self.state_dir.join("node");
        let config_file = self
            .node
            .settings
            .clone()
            .map(|settings| (work_dir.join("config.json"), settings));

        let mut args = vec![
            "--network".to_string(),
            self.network.name().to_string(),
            "--state-dir".to_string(),
            work_dir.display().to_string(),
        ];
        if let Some((path, _)) = &config_file {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args.extend(self.node.args.iter().cloned());

        Ok(LaunchSpec {
            name: "node".to_string(),
            program: PathBuf::from(&self.node.executable),
            args,
            work_dir,
            config_file,
            sink: sink_for(&self.node.log_file),
            api_port: None,
        })
    }

    /// Launch description for the wallet backend. Picks an ephemeral
    /// API port when the configuration does not fix one.
    pub fn wallet_spec(&self) -> Result<LaunchSpec> {
        let work_dir = self.state_dir.join("wallet");
        let port = match self.wallet.api_port {
            Some(port) => port,
            None => pick_free_port()?,
        };

        let mut args = vec![
            "--network".to_string(),
            self.network.name().to_string(),
            "--port".to_string(),
            port.to_string(),
        ];
        args.extend(self.wallet.args.iter().cloned());

        Ok(LaunchSpec {
            name: "wallet".to_string(),
            program: PathBuf::from(&self.wallet.executable),
            args,
            work_dir,
            config_file: None,
            sink: sink_for(&self.wallet.log_file),
            api_port: Some(port),
        })
    }
}

fn sink_for(log_file: &Option<PathBuf>) -> LogSink {
    match log_file {
        Some(path) => LogSink::File(path.clone()),
        None => LogSink::Inherit,
    }
}

fn pick_free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
