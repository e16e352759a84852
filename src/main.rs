//! cttsfs - Read-only overlay that hides the `ctts` box of MP4 files
//!
//! Usage:
//!   cttsfs <source> <mount_point> [-o opt[,opt...]]

use clap::error::ErrorKind;
use clap::Parser;
use cttsfs::{config::Config, fs::CttsEraserFs, Error, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "cttsfs")]
#[command(author = "cttsfs Contributors")]
#[command(version)]
#[command(about = "Read-only FUSE overlay that hides the ctts box of MP4 files")]
struct Cli {
    /// Directory to serve
    source: PathBuf,

    /// Mount point directory
    mount_point: PathBuf,

    /// Mount options, comma separated (e.g. -o allow_other,noatime)
    #[arg(short = 'o', value_delimiter = ',')]
    options: Vec<String>,

    /// Configuration file with mount defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, visible_short_alias = 'd')]
    verbose: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    if let Err(e) = run(cli) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.as_deref().map(expand_tilde);
    let config = Config::for_mount(
        config_file.as_deref(),
        cli.source,
        cli.mount_point,
        cli.options,
    )?;

    config.validate()?;
    cmd_mount(&config)
}

fn cmd_mount(config: &Config) -> Result<()> {
    let fs = CttsEraserFs::from_config(config)?;
    let options = config.mount.mount_options()?;

    info!(
        "Serving {:?} at {:?}",
        config.source, config.mount.mount_point
    );

    fuser::mount2(fs, &config.mount.mount_point, &options)
        .map_err(|e| Error::Mount(e.to_string()))?;

    info!("Unmounted {:?}", config.mount.mount_point);
    Ok(())
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
