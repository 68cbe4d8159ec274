mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grabmodels_core::config::DEFAULT_TESTDATA_KEY;
use grabmodels_core::{Config, ModelManager};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grabmodels")]
#[command(author, version, about = "Provision detection models for the image analysis pipeline", long_about = None)]
struct Cli {
    /// Models base directory (skips MODEL_DIR / WBIA_MODELS_DIR / mount resolution)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Config file (default: ~/.config/wbia/grabmodels.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show download progress bars
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download any missing models
    Ensure,

    /// Verify that every model directory exists
    Check,

    /// Delete the models directory and download everything again
    Redownload,

    /// Print the resolved models directory
    Where {
        /// Print the random forest trees directory for this species instead
        #[arg(long)]
        species: Option<String>,
    },

    /// Show the effective configuration
    Config,

    /// Download a zipped test data fixture and print its directory
    Testdata {
        /// Fixture key
        #[arg(default_value = DEFAULT_TESTDATA_KEY)]
        key: String,

        /// Only print where the fixture would be, without downloading
        #[arg(long)]
        no_ensure: bool,
    },

    /// Send one image to the detector inference service
    Detect {
        /// Image id attached to every detection
        gid: u64,

        /// Image path or URI as seen by the service
        image: String,

        /// Model tag to run
        model: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Detect { gid, image, model } = &cli.command {
        return commands::detect::execute(*gid, image, model).await;
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.progress {
        config.download.show_progress = true;
    }
    let manager = ModelManager::new(config)?;
    let base = || {
        cli.dir
            .clone()
            .unwrap_or_else(|| manager.default_dir().to_path_buf())
    };

    match cli.command {
        Commands::Ensure => {
            commands::ensure::execute(&manager, &base()).await?;
        }
        Commands::Check => {
            commands::check::execute(&manager, &base())?;
        }
        Commands::Redownload => {
            commands::redownload::execute(&manager, &base()).await?;
        }
        Commands::Where { species } => {
            commands::locate::execute(&manager, &base(), species.as_deref())?;
        }
        Commands::Config => {
            let source = Config::source_path(cli.config.as_deref());
            commands::config::execute(manager.config(), manager.registry(), source.as_deref())?;
        }
        Commands::Testdata { key, no_ensure } => {
            commands::testdata::execute(&manager, &key, !no_ensure).await?;
        }
        Commands::Detect { .. } => {}
    }

    Ok(())
}
