use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bookmark_archiver::bookmarks::{BookmarkSource, MastodonClient};
use bookmark_archiver::config::{AppConfig, CliConfig, FileConfig};
use bookmark_archiver::download_manager::{DownloadManager, ReqwestFetcher};
use bookmark_archiver::orchestrator::{InstanceJob, Orchestrator, ProgressLevel, RunProgress};
use bookmark_archiver::{HashLedger, RemovedMediaTracker, SystemClock};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(about = "Archive media from bookmarked Mastodon statuses")]
struct CliArgs {
    /// Path to the TOML configuration file.
    #[clap(short, long, value_parser = parse_path, default_value = "config.toml")]
    pub config: PathBuf,

    /// Maximum number of bookmarked statuses to process per instance.
    #[clap(short, long)]
    pub limit: Option<usize>,

    /// Request rate for media downloads, e.g. "2/minute", or "off".
    #[clap(long)]
    pub rate: Option<String>,

    /// Walk bookmarks and report what would be stored, without fetching or writing.
    #[clap(long, visible_alias = "dry-run")]
    pub simulate: bool,

    /// Remove the bookmark once all of a status' media are archived.
    #[clap(long, conflicts_with = "no_unbookmark")]
    pub unbookmark: bool,

    /// Keep bookmarks even if the config enables unbookmarking.
    #[clap(long)]
    pub no_unbookmark: bool,

    /// Number of media fetches in flight at once.
    #[clap(long)]
    pub concurrency: Option<usize>,

    /// Progress display: off, count or filesize.
    #[clap(long, value_enum)]
    pub progress: Option<ProgressLevel>,

    /// Only process the named instance (repeatable).
    #[clap(long = "instance")]
    pub instances: Vec<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        let unbookmark = match (self.unbookmark, self.no_unbookmark) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        CliConfig {
            limit: self.limit,
            rate: self.rate.clone(),
            simulate: self.simulate,
            unbookmark,
            concurrency: self.concurrency,
            progress: self.progress,
            instances: self.instances.clone(),
        }
    }
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

    info!("Loading config from {:?}", cli_args.config);
    let file_config = FileConfig::load(&cli_args.config)?;
    let config = AppConfig::resolve(&cli_args.to_cli_config(), Some(file_config))?;

    let ledger = HashLedger::load(&config.paths.hashdb)?;
    info!(
        "Hash ledger {:?}: {} entries",
        config.paths.hashdb,
        ledger.len()
    );
    let tracker = RemovedMediaTracker::load(&config.paths.removed, config.removed_window)?;

    let fetcher = ReqwestFetcher::new(&config.user_agent, config.timeout)
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
    let downloads = DownloadManager::new(
        config.download_settings(),
        Arc::new(fetcher),
        Arc::new(RwLock::new(ledger)),
        Arc::new(RwLock::new(tracker)),
        Arc::new(SystemClock),
    )
    .with_throttle(config.rate.build());

    let mut jobs = Vec::with_capacity(config.instances.len());
    for instance in &config.instances {
        let client = MastodonClient::new(
            instance.name.clone(),
            &instance.base_url,
            instance.access_token.clone(),
            &config.user_agent,
            config.timeout,
        )
        .with_context(|| format!("Failed to set up instance {:?}", instance.name))?;
        info!("Instance {:?} at {}", instance.name, client.base_url());
        jobs.push(InstanceJob {
            source: Arc::new(client) as Arc<dyn BookmarkSource>,
            me: instance.self_account(),
            unbookmark: config.unbookmark_for(instance),
            throttle: instance.rate.as_ref().map(|rate| rate.build()),
        });
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing downloads in flight...");
            signal_token.cancel();
        }
    });

    let mut orchestrator = Orchestrator::new(downloads, config.run_settings())
        .with_cancellation(cancel)
        .with_progress(RunProgress::new(config.progress));
    if let Some(journal) = config.journal.clone() {
        if !config.simulate {
            orchestrator = orchestrator.with_journal(journal);
        }
    }

    match orchestrator.run(&jobs).await {
        Ok(stats) => {
            if jobs.len() > 1 {
                stats.log_summary("total");
            }
            Ok(())
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            Err(e.into())
        }
    }
}
