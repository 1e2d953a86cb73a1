//! Chaperone - supervision of a blockchain node and its wallet backend.
//!
//! This crate launches two dependent long-running child processes - a
//! chain node and the wallet backend that talks to it - as one unit. It
//! sequences their startup (node strictly first), detects when the
//! wallet's HTTP endpoint becomes reachable, propagates host signals,
//! and coordinates graceful-then-forced shutdown with an exactly-once
//! exit notification.
//!
//! # Architecture
//!
//! - **`service`** - The per-process supervision capability: the
//!   [`ManagedService`](service::ManagedService) contract, the ordered
//!   [`ServiceStatus`](service::ServiceStatus), exit-status taxonomy, and
//!   the `tokio::process`-backed implementation.
//! - **`launcher`** - The orchestrator: dependency-ordered startup,
//!   readiness probing, the signal bridge, and the
//!   [`WalletBackend`](launcher::WalletBackend) facade.
//! - **`config`** - TOML configuration and logging setup.
//! - **`error`** - Error types for the crate.
//!
//! # Example
//!
//! ```no_run
//! use chaperone::config::LaunchConfig;
//! use chaperone::launcher::{Launcher, DEFAULT_STOP_TIMEOUT};
//!
//! # async fn example() -> chaperone::Result<()> {
//! let launcher = Launcher::new(LaunchConfig::default())?;
//! let api = launcher.start().await?;
//! println!("wallet API at {}", api.base_url());
//! launcher.stop(DEFAULT_STOP_TIMEOUT).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod launcher;
pub mod service;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, Result};
