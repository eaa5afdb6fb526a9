use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use super::units::HumanValue;
use crate::download_manager::ArchivePolicy;
use crate::orchestrator::{JournalFrequency, ProgressLevel};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub paths: Option<PathsConfig>,
    pub download: Option<DownloadConfig>,
    pub archive: Option<ArchiveConfig>,
    pub removed: Option<RemovedConfig>,
    pub journal: Option<JournalConfig>,
    pub classify: Option<ClassifyConfig>,
    pub runtime: Option<RuntimeConfig>,
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub download: Option<String>,
    pub logs: Option<String>,
    /// Partial downloads; defaults to `<download>/.tmp`
    pub tmp: Option<String>,
    /// Where replaced files are moved
    pub archive: Option<String>,
    #[serde(alias = "hashdb_file")]
    pub hashdb: Option<String>,
    #[serde(alias = "removed_log_file")]
    pub removed: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    pub filename_pattern: Option<String>,
    pub user_agent: Option<String>,
    pub timeout: Option<HumanValue>,
    pub concurrency: Option<usize>,
    /// "off", "count" or "filesize"
    #[serde(alias = "progress_level")]
    pub progress: Option<ProgressLevel>,
    pub rate: Option<RateConfig>,
    pub retry: Option<RetryConfig>,
    pub responses: Option<ResponsesConfig>,
    pub filter: Option<FilterConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RateConfig {
    /// e.g. "2/minute"; "off" disables throttling
    pub rate: Option<HumanValue>,
    /// e.g. "30 seconds" between requests
    pub delay: Option<HumanValue>,
    pub burst: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub delay: Option<HumanValue>,
    pub backoff: Option<BackoffKind>,
    pub multiplier: Option<f64>,
    pub max_delay: Option<HumanValue>,
    /// Wait one rate-limit interval between attempts instead of `delay`
    pub rate_control: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ResponsesConfig {
    pub not_found: Option<Vec<u16>>,
    pub retryable: Option<Vec<u16>>,
    pub retry_server_errors: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub include_self: Option<bool>,
    pub include_gifv: Option<bool>,
    pub include_audio: Option<bool>,
    pub include_video: Option<bool>,
    pub include_thumbnail_only: Option<bool>,
    pub include_nsfw: Option<bool>,
    pub try_unknown_media: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ArchiveConfig {
    pub policy: Option<ArchivePolicy>,
    pub keep_replaced: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RemovedConfig {
    /// Skip window for media confirmed missing; "off" disables tracking
    #[serde(alias = "skip_media_not_found_for")]
    pub skip_for: Option<HumanValue>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: Option<bool>,
    pub frequency: Option<JournalFrequency>,
    pub filename_pattern: Option<String>,
    pub log_removed: Option<bool>,
    pub log_duplicate: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ClassifyConfig {
    pub rules: Vec<ClassifyRuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifyRuleConfig {
    pub pattern: String,
    pub group: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Statuses per instance
    pub limit: Option<usize>,
    pub unbookmark: Option<bool>,
    #[serde(alias = "dry_run")]
    pub simulate: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct InstanceConfig {
    pub name: String,
    pub base_url: String,
    pub access_token: String,
    pub account_id: Option<String>,
    pub account_handle: Option<String>,
    /// Overrides [download.rate] for this instance; bare numbers are per minute
    pub rate: Option<HumanValue>,
    pub unbookmark: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
