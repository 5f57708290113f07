//! CLI definition and local commands.

use crate::config::Settings;
use crate::media::ffmpeg_available;
use crate::openai::is_api_key_configured;
use clap::{Parser, Subcommand};

/// Merke - Video Transcription and Study Artifacts
///
/// A self-hosted service that turns uploaded videos into navigable
/// transcripts, chapter markers, mind maps, quizzes, and tags.
/// The name "Merke" comes from the Norwegian word for "mark."
#[derive(Parser, Debug)]
#[command(name = "merke")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the current configuration to the default config file
    Init,

    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Check system requirements: external tools, API key, data directories.
pub async fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    println!("Merke doctor\n");

    let ffmpeg = ffmpeg_available().await;
    println!(
        "  ffmpeg:          {}",
        if ffmpeg { "ok" } else { "MISSING (install ffmpeg and ensure it is on PATH)" }
    );

    println!(
        "  OPENAI_API_KEY:  {}",
        if is_api_key_configured() {
            "set"
        } else {
            "not set (transcription and generation disabled)"
        }
    );

    let config_path = Settings::default_config_path();
    println!(
        "  config file:     {} ({})",
        config_path.display(),
        if config_path.exists() { "present" } else { "using defaults" }
    );

    println!("  database:        {}", settings.sqlite_path().display());
    println!("  upload dir:      {}", settings.upload_dir().display());

    if !ffmpeg {
        anyhow::bail!("ffmpeg is required for video processing");
    }

    Ok(())
}

/// Handle the `config` subcommand.
pub fn run_config(action: &ConfigAction, settings: &Settings) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = Settings::default_config_path();
            settings.save_to(&path)?;
            println!("Wrote configuration to {}", path.display());
        }
        ConfigAction::Show => {
            let toml = toml::to_string_pretty(settings)?;
            println!("{}", toml);
        }
        ConfigAction::Path => {
            println!("{}", Settings::default_config_path().display());
        }
    }
    Ok(())
}
