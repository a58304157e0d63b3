//! proxy-box command line.
//!
//! ```text
//! proxy-box run   -c config.toml   build, start, wait for SIGINT/SIGTERM, close
//! proxy-box check -c config.toml   load, validate and build without starting
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use proxy_box::config::load_config;
use proxy_box::error::{BoxError, CloseError};
use proxy_box::lifecycle::shutdown_signal;
use proxy_box::{Options, ProxyBox};

#[derive(Parser)]
#[command(name = "proxy-box", version)]
#[command(about = "Assemble and run a proxy platform from configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run until interrupted
    Run {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Validate the configuration and build every component without starting
    Check {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Check { config } => check(&config).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &Path) -> Result<(), BoxError> {
    let config = load_config(path)?;
    let instance = ProxyBox::new(Options::new(config)).await?;
    instance.start().await?;

    tokio::select! {
        signal = shutdown_signal() => {
            let signal = signal?;
            tracing::info!(signal = ?signal, "shutdown signal received");
        }
        _ = instance.closed() => {}
    }

    match instance.close().await {
        Ok(()) | Err(CloseError::AlreadyClosed) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn check(path: &Path) -> Result<(), BoxError> {
    let config = load_config(path)?;
    // Built but never started, so there is nothing to close.
    ProxyBox::new(Options::new(config)).await?;
    println!("{}: ok", path.display());
    Ok(())
}
