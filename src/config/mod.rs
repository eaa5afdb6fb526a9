mod file_config;
mod units;

pub use file_config::{
    ArchiveConfig, BackoffKind, ClassifyConfig, ClassifyRuleConfig, DownloadConfig, FileConfig,
    FilterConfig, InstanceConfig, JournalConfig, PathsConfig, RateConfig, RemovedConfig,
    ResponsesConfig, RetryConfig, RuntimeConfig,
};
pub use units::{
    duration_value, optional_duration, parse_duration, rate_interval, HumanValue,
};

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::bookmarks::{SelfAccount, StatusFilter};
use crate::download_manager::{
    ArchivePolicy, BackoffSchedule, DownloadSettings, RateLimit, ResponseClassifier, RetryPolicy,
};
use crate::orchestrator::{ActivityJournal, ProgressLevel, RunSettings};
use crate::path_template::{HostClassifier, PathTemplate, DEFAULT_FILENAME_PATTERN};

pub const DEFAULT_USER_AGENT: &str = concat!("bookmark-archiver/", env!("CARGO_PKG_VERSION"));

/// CLI arguments that can be used for config resolution.
/// Unlike the file, these are one-off overrides for a single run, so they win
/// over the TOML values.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub limit: Option<usize>,
    pub rate: Option<String>,
    pub simulate: bool,
    /// `Some(true)` for --unbookmark, `Some(false)` for --no-unbookmark.
    pub unbookmark: Option<bool>,
    pub concurrency: Option<usize>,
    pub progress: Option<ProgressLevel>,
    /// Restrict the run to these instance names.
    pub instances: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub download: PathBuf,
    pub logs: PathBuf,
    pub tmp: PathBuf,
    pub archive: PathBuf,
    pub hashdb: PathBuf,
    pub removed: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        let download = PathBuf::from("data");
        Self {
            tmp: download.join(".tmp"),
            download,
            logs: PathBuf::from("logs"),
            archive: PathBuf::from("archive"),
            hashdb: PathBuf::from("hashdb.jsonl"),
            removed: PathBuf::from("removed.jsonl"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceSettings {
    pub name: String,
    pub base_url: String,
    pub access_token: String,
    pub account_id: Option<String>,
    pub account_handle: Option<String>,
    pub rate: Option<RateLimit>,
    pub unbookmark: Option<bool>,
}

impl InstanceSettings {
    pub fn self_account(&self) -> SelfAccount {
        SelfAccount {
            account_id: self.account_id.clone(),
            handle: self.account_handle.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: PathSettings,
    pub filename_template: PathTemplate,
    pub classifier: HostClassifier,
    pub filter: StatusFilter,
    pub user_agent: String,
    pub timeout: Duration,
    pub concurrency: usize,
    pub progress: ProgressLevel,
    pub rate: RateLimit,
    pub retry: RetryPolicy,
    pub responses: ResponseClassifier,
    pub policy: ArchivePolicy,
    pub keep_replaced: bool,
    /// `None` disables removed-media tracking.
    pub removed_window: Option<Duration>,
    /// `None` when the journal is disabled.
    pub journal: Option<ActivityJournal>,
    pub limit: Option<usize>,
    pub simulate: bool,
    pub unbookmark: bool,
    pub instances: Vec<InstanceSettings>,
}

impl AppConfig {
    /// Resolve and validate the configuration once, at startup.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let paths = resolve_paths(file.paths.unwrap_or_default());
        let download = file.download.unwrap_or_default();

        let pattern = download
            .filename_pattern
            .as_deref()
            .unwrap_or(DEFAULT_FILENAME_PATTERN);
        let filename_template = PathTemplate::parse(pattern)
            .with_context(|| format!("Invalid [download] filename_pattern {:?}", pattern))?;

        let rules = file.classify.unwrap_or_default().rules;
        let classifier = HostClassifier::from_pairs(
            rules.iter().map(|r| (r.pattern.as_str(), r.group.as_str())),
        )
        .context("Invalid [[classify.rules]] entry")?;

        let filter_file = download.filter.clone().unwrap_or_default();
        let filter = StatusFilter {
            include_self: filter_file.include_self.unwrap_or(false),
            include_gifv: filter_file.include_gifv.unwrap_or(false),
            include_audio: filter_file.include_audio.unwrap_or(false),
            include_video: filter_file.include_video.unwrap_or(false),
            include_thumbnail_only: filter_file.include_thumbnail_only.unwrap_or(false),
            include_nsfw: filter_file.include_nsfw.unwrap_or(false),
            try_unknown_media: filter_file.try_unknown_media.unwrap_or(false),
        };

        let timeout = match &download.timeout {
            Some(value) => duration_value(value).context("Invalid [download] timeout")?,
            None => Duration::from_secs(30),
        };
        if timeout.is_zero() {
            bail!("[download] timeout must be positive");
        }

        let concurrency = cli
            .concurrency
            .or(download.concurrency)
            .unwrap_or(4);
        if concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        let progress = cli.progress.or(download.progress).unwrap_or_default();

        let rate_file = download.rate.clone().unwrap_or_default();
        let burst = rate_file.burst.unwrap_or(1);
        let rate = match &cli.rate {
            Some(text) => rate_limit(
                rate_interval(&HumanValue::Text(text.clone()))
                    .with_context(|| format!("Invalid --rate {:?}", text))?,
                burst,
            ),
            None => resolve_file_rate(&rate_file, burst)?,
        };

        let retry = resolve_retry(download.retry.clone().unwrap_or_default(), &rate)?;

        let responses_file = download.responses.clone().unwrap_or_default();
        let defaults = ResponseClassifier::default();
        let responses = ResponseClassifier {
            not_found: responses_file.not_found.unwrap_or(defaults.not_found),
            retryable: responses_file.retryable.unwrap_or(defaults.retryable),
            retry_server_errors: responses_file
                .retry_server_errors
                .unwrap_or(defaults.retry_server_errors),
        };
        if let Some(code) = responses
            .not_found
            .iter()
            .chain(responses.retryable.iter())
            .find(|code| !(100..600).contains(*code) || (200..300).contains(*code))
        {
            bail!("[download.responses] lists invalid status code {}", code);
        }

        let archive = file.archive.unwrap_or_default();
        let policy = archive.policy.unwrap_or_default();
        let keep_replaced = archive.keep_replaced.unwrap_or(true);

        let removed_window = match file.removed.unwrap_or_default().skip_for {
            Some(value) => optional_duration(&value).context("Invalid [removed] skip_for")?,
            None => None,
        };

        let journal_file = file.journal.unwrap_or_default();
        let journal = if journal_file.enabled.unwrap_or(true) {
            let journal = ActivityJournal::new(
                &paths.logs,
                journal_file.frequency.unwrap_or_default(),
                journal_file.filename_pattern.as_deref(),
            )
            .context("Invalid [journal] filename_pattern")?
            .with_toggles(
                journal_file.log_removed.unwrap_or(true),
                journal_file.log_duplicate.unwrap_or(true),
            );
            Some(journal)
        } else {
            None
        };

        let runtime = file.runtime.unwrap_or_default();
        let limit = cli.limit.or(runtime.limit);
        if limit == Some(0) {
            bail!("limit must be at least 1");
        }
        let simulate = cli.simulate || runtime.simulate.unwrap_or(false);
        let unbookmark = cli.unbookmark.or(runtime.unbookmark).unwrap_or(false);

        let instances = resolve_instances(file.instances, &cli.instances, burst)?;

        Ok(Self {
            paths,
            filename_template,
            classifier,
            filter,
            user_agent: download
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            timeout,
            concurrency,
            progress,
            rate,
            retry,
            responses,
            policy,
            keep_replaced,
            removed_window,
            journal,
            limit,
            simulate,
            unbookmark,
            instances,
        })
    }

    /// Settings for the download manager.
    pub fn download_settings(&self) -> DownloadSettings {
        DownloadSettings {
            download_root: self.paths.download.clone(),
            tmp_dir: self.paths.tmp.clone(),
            policy: self.policy,
            archive_dir: self.keep_replaced.then(|| self.paths.archive.clone()),
            responses: self.responses.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Settings for the orchestrator.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            template: self.filename_template.clone(),
            classifier: self.classifier.clone(),
            filter: self.filter.clone(),
            limit: self.limit,
            concurrency: self.concurrency,
            simulate: self.simulate,
            page_retry: self.retry.clone(),
        }
    }

    /// Whether `instance` unbookmarks processed statuses.
    pub fn unbookmark_for(&self, instance: &InstanceSettings) -> bool {
        !self.simulate && instance.unbookmark.unwrap_or(self.unbookmark)
    }
}

fn resolve_paths(file: PathsConfig) -> PathSettings {
    let defaults = PathSettings::default();
    let download = file.download.map(PathBuf::from).unwrap_or(defaults.download);
    PathSettings {
        tmp: file
            .tmp
            .map(PathBuf::from)
            .unwrap_or_else(|| download.join(".tmp")),
        download,
        logs: file.logs.map(PathBuf::from).unwrap_or(defaults.logs),
        archive: file.archive.map(PathBuf::from).unwrap_or(defaults.archive),
        hashdb: file.hashdb.map(PathBuf::from).unwrap_or(defaults.hashdb),
        removed: file.removed.map(PathBuf::from).unwrap_or(defaults.removed),
    }
}

fn rate_limit(interval: Option<Duration>, burst: u32) -> RateLimit {
    match interval {
        None => RateLimit::Off,
        Some(interval) if burst > 1 => RateLimit::Bucket { interval, burst },
        Some(interval) => RateLimit::Interval(interval),
    }
}

fn resolve_file_rate(file: &RateConfig, burst: u32) -> Result<RateLimit> {
    if burst == 0 {
        bail!("[download.rate] burst must be at least 1");
    }
    let interval = match (&file.rate, &file.delay) {
        (Some(_), Some(_)) => bail!("[download.rate] accepts either `rate` or `delay`, not both"),
        (Some(rate), None) => rate_interval(rate).context("Invalid [download.rate] rate")?,
        (None, Some(delay)) => {
            optional_duration(delay).context("Invalid [download.rate] delay")?
        }
        (None, None) => Some(RateLimit::default().interval()),
    };
    Ok(rate_limit(interval, burst))
}

fn resolve_retry(file: RetryConfig, rate: &RateLimit) -> Result<RetryPolicy> {
    let max_attempts = file.max_attempts.unwrap_or(3);
    if max_attempts == 0 {
        bail!("[download.retry] max_attempts must be at least 1");
    }

    let configured_delay = match &file.delay {
        Some(value) => duration_value(value).context("Invalid [download.retry] delay")?,
        None => Duration::from_secs(2),
    };
    let delay = if file.rate_control.unwrap_or(false) && !rate.interval().is_zero() {
        rate.interval()
    } else {
        configured_delay
    };

    let schedule = match file.backoff.unwrap_or(BackoffKind::Fixed) {
        BackoffKind::Fixed => BackoffSchedule::Fixed(delay),
        BackoffKind::Exponential => {
            let multiplier = file.multiplier.unwrap_or(2.0);
            if !multiplier.is_finite() || multiplier < 1.0 {
                bail!("[download.retry] multiplier must be >= 1.0");
            }
            let max = match &file.max_delay {
                Some(value) => {
                    duration_value(value).context("Invalid [download.retry] max_delay")?
                }
                None => Duration::from_secs(300),
            };
            BackoffSchedule::Exponential {
                initial: delay,
                multiplier,
                max: max.max(delay),
            }
        }
    };

    Ok(RetryPolicy::new(max_attempts, schedule))
}

fn resolve_instances(
    configured: Vec<InstanceConfig>,
    only: &[String],
    burst: u32,
) -> Result<Vec<InstanceSettings>> {
    if configured.is_empty() {
        bail!("At least one [[instances]] entry is required");
    }

    let mut seen = HashSet::new();
    let mut instances = Vec::with_capacity(configured.len());
    for (idx, inst) in configured.into_iter().enumerate() {
        if inst.name.trim().is_empty() {
            bail!("[[instances]] entry #{} is missing `name`", idx + 1);
        }
        if inst.base_url.trim().is_empty() {
            bail!("Instance {:?} is missing `base_url`", inst.name);
        }
        reqwest::Url::parse(&inst.base_url)
            .with_context(|| format!("Instance {:?} has an invalid base_url", inst.name))?;
        if inst.access_token.trim().is_empty() {
            bail!("Instance {:?} is missing `access_token`", inst.name);
        }
        if !seen.insert(inst.name.clone()) {
            bail!("Instance name {:?} is used twice", inst.name);
        }

        let rate = match &inst.rate {
            Some(value) => Some(rate_limit(
                rate_interval(value)
                    .with_context(|| format!("Instance {:?} has an invalid rate", inst.name))?,
                burst,
            )),
            None => None,
        };

        instances.push(InstanceSettings {
            name: inst.name,
            base_url: inst.base_url,
            access_token: inst.access_token,
            account_id: inst.account_id,
            account_handle: inst.account_handle,
            rate,
            unbookmark: inst.unbookmark,
        });
    }

    if !only.is_empty() {
        for name in only {
            if !instances.iter().any(|inst| &inst.name == name) {
                bail!("Unknown instance {:?}", name);
            }
        }
        instances.retain(|inst| only.contains(&inst.name));
    }

    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str) -> InstanceConfig {
        InstanceConfig {
            name: name.to_string(),
            base_url: "https://mastodon.social".to_string(),
            access_token: "token".to_string(),
            ..Default::default()
        }
    }

    fn file_with(toml_text: &str) -> FileConfig {
        let mut file: FileConfig = toml::from_str(toml_text).unwrap();
        if file.instances.is_empty() {
            file.instances.push(instance("home"));
        }
        file
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(&CliConfig::default(), Some(file_with(""))).unwrap();

        assert_eq!(config.paths.download, PathBuf::from("data"));
        assert_eq!(config.paths.tmp, PathBuf::from("data/.tmp"));
        assert_eq!(config.filename_template.source(), DEFAULT_FILENAME_PATTERN);
        assert_eq!(config.rate, RateLimit::Interval(Duration::from_secs(2)));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.responses, ResponseClassifier::default());
        assert_eq!(config.policy, ArchivePolicy::Skip);
        assert!(config.keep_replaced);
        assert_eq!(config.removed_window, None);
        assert!(config.journal.is_some());
        assert_eq!(config.filter, StatusFilter::default());
        assert!(!config.simulate);
        assert!(!config.unbookmark);
        assert_eq!(config.limit, None);
        assert_eq!(config.progress, ProgressLevel::Off);
    }

    #[test]
    fn test_resolve_missing_instances_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("At least one [[instances]]"));
    }

    #[test]
    fn test_resolve_instance_validation() {
        let mut file = FileConfig::default();
        file.instances.push(InstanceConfig {
            access_token: String::new(),
            ..instance("home")
        });
        let err = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap_err();
        assert!(err.to_string().contains("access_token"));

        let mut file = FileConfig::default();
        file.instances.push(instance("home"));
        file.instances.push(instance("home"));
        let err = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap_err();
        assert!(err.to_string().contains("used twice"));
    }

    #[test]
    fn test_unknown_placeholder_fails_fast() {
        let file = file_with("[download]\nfilename_pattern = \"{nope}.{ext}\"");
        let err = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap_err();
        assert!(format!("{:#}", err).contains("nope"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = file_with(
            "[runtime]\nlimit = 50\nunbookmark = true\n[download]\nconcurrency = 8\n[download.rate]\nrate = \"1/minute\"",
        );
        let cli = CliConfig {
            limit: Some(5),
            rate: Some("120/minute".to_string()),
            simulate: true,
            unbookmark: Some(false),
            concurrency: Some(2),
            progress: Some(ProgressLevel::Count),
            instances: Vec::new(),
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.limit, Some(5));
        assert_eq!(config.rate, RateLimit::Interval(Duration::from_millis(500)));
        assert!(config.simulate);
        assert!(!config.unbookmark);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.progress, ProgressLevel::Count);
    }

    #[test]
    fn test_progress_level_from_file() {
        let file = file_with("[download]\nprogress = \"filesize\"");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.progress, ProgressLevel::Filesize);

        assert!(toml::from_str::<FileConfig>("[download]\nprogress = \"bars\"").is_err());
    }

    #[test]
    fn test_file_values_used_without_cli() {
        let file = file_with(
            "[runtime]\nlimit = 50\nunbookmark = true\n[download.rate]\ndelay = \"30 seconds\"\nburst = 4",
        );
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.limit, Some(50));
        assert!(config.unbookmark);
        assert_eq!(
            config.rate,
            RateLimit::Bucket {
                interval: Duration::from_secs(30),
                burst: 4
            }
        );
    }

    #[test]
    fn test_rate_and_delay_are_exclusive() {
        let file = file_with("[download.rate]\nrate = \"2/minute\"\ndelay = 5");
        let err = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_rate_off() {
        let file = file_with("[download.rate]\nrate = \"off\"");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.rate, RateLimit::Off);
    }

    #[test]
    fn test_retry_settings() {
        let file = file_with(
            "[download.retry]\nmax_attempts = 5\nbackoff = \"exponential\"\ndelay = \"1 second\"\nmax_delay = \"1 min\"",
        );
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(config.retry.delay_for(3), Duration::from_secs(8));
        assert_eq!(config.retry.delay_for(10), Duration::from_secs(60));

        let file = file_with("[download.retry]\nmax_attempts = 0");
        assert!(AppConfig::resolve(&CliConfig::default(), Some(file)).is_err());
    }

    #[test]
    fn test_retry_rate_control_uses_rate_interval() {
        let file = file_with("[download.rate]\nrate = \"6/minute\"\n[download.retry]\nrate_control = true");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.retry.delay_for(0), Duration::from_secs(10));
    }

    #[test]
    fn test_removed_window() {
        let file = file_with("[removed]\nskip_for = \"2 hours\"");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.removed_window, Some(Duration::from_secs(7200)));

        let file = file_with("[removed]\nskip_for = \"off\"");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.removed_window, None);
    }

    #[test]
    fn test_invalid_response_codes() {
        let file = file_with("[download.responses]\nnot_found = [200]");
        assert!(AppConfig::resolve(&CliConfig::default(), Some(file)).is_err());
    }

    #[test]
    fn test_journal_rejects_digest_pattern() {
        let file = file_with("[journal]\nfilename_pattern = \"{sha256}.jsonl\"");
        assert!(AppConfig::resolve(&CliConfig::default(), Some(file)).is_err());

        let file = file_with("[journal]\nenabled = false\nfilename_pattern = \"{sha256}.jsonl\"");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert!(config.journal.is_none());
    }

    #[test]
    fn test_instance_selection_and_overrides() {
        let mut file = FileConfig::default();
        file.instances.push(InstanceConfig {
            rate: Some(HumanValue::Number(6.0)),
            unbookmark: Some(true),
            ..instance("home")
        });
        file.instances.push(instance("work"));

        let cli = CliConfig {
            instances: vec!["home".to_string()],
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.instances.len(), 1);
        let home = &config.instances[0];
        assert_eq!(home.rate, Some(RateLimit::Interval(Duration::from_secs(10))));
        assert!(config.unbookmark_for(home));

        let mut file = FileConfig::default();
        file.instances.push(instance("home"));
        let cli = CliConfig {
            instances: vec!["missing".to_string()],
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(file)).is_err());
    }

    #[test]
    fn test_download_settings_archive_dir() {
        let file = file_with("[paths]\narchive = \"old\"\n[archive]\npolicy = \"overwrite\"");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        let settings = config.download_settings();
        assert_eq!(settings.policy, ArchivePolicy::Overwrite);
        assert_eq!(settings.archive_dir, Some(PathBuf::from("old")));

        let file = file_with("[archive]\nkeep_replaced = false");
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.download_settings().archive_dir, None);
    }
}
