//! Merke CLI entry point.

use anyhow::Result;
use clap::Parser;
use merke::cli::{run_config, run_doctor, Cli, Commands};
use merke::config::Settings;
use merke::server::run_server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Initialize logging; -v flags override the configured level
    let log_level = match cli.verbose {
        0 => settings.server.log_level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("merke={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ensure data directories exist
    if let Some(parent) = settings.sqlite_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(settings.upload_dir())?;

    // Execute command
    match &cli.command {
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| settings.server.host.clone());
            let port = port.unwrap_or(settings.server.port);
            run_server(&host, port, settings).await?;
        }

        Commands::Doctor => {
            run_doctor(&settings).await?;
        }

        Commands::Config { action } => {
            run_config(action, &settings)?;
        }
    }

    Ok(())
}
