use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bookmark_archiver::config::{AppConfig, CliConfig, FileConfig};
use bookmark_archiver::maintenance::prune;
use bookmark_archiver::HashLedger;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// Delete archived files and drop their hash ledger entries.
#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the TOML configuration file.
    #[clap(short, long, value_parser = parse_path, default_value = "config.toml")]
    pub config: PathBuf,

    /// Files to delete, relative to the download root or absolute inside it.
    #[clap(required = true)]
    pub paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    let file_config = FileConfig::load(&cli_args.config)?;
    let config = AppConfig::resolve(&CliConfig::default(), Some(file_config))?;
    let root = parse_path(&config.paths.download.to_string_lossy())?;

    let mut ledger = HashLedger::load(&config.paths.hashdb)?;
    info!("Pruning {} path(s) under {:?}", cli_args.paths.len(), root);
    let report = prune(&mut ledger, &root, &cli_args.paths)?;

    for path in &report.deleted {
        println!("deleted  {}", path.display());
    }
    for path in &report.missing {
        println!("missing  {}", path.display());
    }
    for (path, reason) in &report.failed {
        println!("FAILED   {} ({})", path.display(), reason);
    }
    for record in &report.removed_entries {
        println!("unlisted {} {}", record.sha256, record.filepath.display());
    }
    println!(
        "{} deleted, {} missing, {} failed, {} ledger entries removed",
        report.deleted.len(),
        report.missing.len(),
        report.failed.len(),
        report.removed_entries.len()
    );

    if !report.is_clean() {
        bail!("{} file(s) could not be deleted", report.failed.len());
    }
    Ok(())
}
