use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use chaperone::config::{LaunchConfig, Network};
use chaperone::launcher::{Launcher, LauncherEvent};
use chaperone::service::{CombinedExitStatus, ExitStatus};

/// Chaperone - supervises a chain node and its wallet backend.
#[derive(Parser, Debug)]
#[command(name = "chaperone")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "chaperone.toml")]
    config: PathBuf,

    /// Override the state directory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Override the network (mainnet, testnet, or a named network)
    #[arg(long)]
    network: Option<Network>,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Do not install process signal handlers
    #[arg(long)]
    no_signal_handlers: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    config.logging.init();
    info!(
        network = %config.network,
        state_dir = %config.state_dir.display(),
        "chaperone starting"
    );

    match run(config).await {
        Ok(code) => {
            info!("chaperone stopped");
            std::process::exit(code);
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LaunchConfig> {
    let mut config = LaunchConfig::load(&cli.config)?;

    if let Some(ref state_dir) = cli.state_dir {
        config.state_dir = state_dir.clone();
    }
    if let Some(ref network) = cli.network {
        config.network = network.clone();
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.format = "json".to_string();
    }
    if cli.no_signal_handlers {
        config.install_signal_handlers = false;
    }

    config.validate()?;
    Ok(config)
}

async fn run(config: LaunchConfig) -> chaperone::Result<i32> {
    let launcher = Launcher::new(config)?;
    let backend = launcher.wallet_backend();
    let mut events = backend.subscribe();

    let api = launcher.start().await?;
    info!(url = %api.base_url(), "wallet API ready");

    loop {
        match events.recv().await {
            Ok(LauncherEvent::Exited(status)) => {
                info!(status = %status, "backend exited");
                return Ok(exit_code(&status));
            }
            Ok(LauncherEvent::Ready(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(0),
        }
    }
}

/// Process exit code for the supervisor: the first non-zero child code,
/// zero when both ended cleanly, one for anything that never produced a
/// code.
fn exit_code(status: &CombinedExitStatus) -> i32 {
    for exit in [&status.node, &status.wallet] {
        match exit {
            ExitStatus::Exited(0) => continue,
            ExitStatus::Exited(code) => return *code,
            _ => return 1,
        }
    }
    0
}
