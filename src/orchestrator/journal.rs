//! Activity journal: one JSON line per resolved media item, grouped into
//! period files rendered from the status date.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download_manager::{DownloadOutcome, SkipReason};
use crate::error::ArchiverResult;
use crate::jsonl;
use crate::path_template::{PathTemplate, TemplateContext, TemplateError};

/// How much time one journal file covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalFrequency {
    #[serde(alias = "daily")]
    Day,
    #[serde(alias = "weekly")]
    Week,
    #[default]
    #[serde(alias = "monthly")]
    Month,
    #[serde(alias = "quarterly")]
    Quarter,
    #[serde(alias = "semester", alias = "semiannual")]
    Half,
    #[serde(alias = "annual", alias = "yearly")]
    Year,
}

impl JournalFrequency {
    pub fn default_pattern(&self) -> &'static str {
        match self {
            JournalFrequency::Day => "{origin_group}/{yearmonth}/{date}.jsonl",
            JournalFrequency::Week => "{origin_group}/{yearweek}.jsonl",
            JournalFrequency::Month => "{origin_group}/{yearmonth}.jsonl",
            JournalFrequency::Quarter => "{origin_group}/{yearquarter}.jsonl",
            JournalFrequency::Half => "{origin_group}/{yearhalf}.jsonl",
            JournalFrequency::Year => "{origin_group}/{year}.jsonl",
        }
    }
}

/// Kind of journal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    Stored,
    Duplicate,
    Removed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub time: DateTime<Utc>,
    pub event: JournalEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub statusid: String,
    #[serde(default)]
    pub status_url: Option<String>,
    pub media_url: String,
    pub created_at: DateTime<Utc>,
    pub origin_host: String,
    pub origin_group: String,
    pub account_host: String,
    pub account_group: String,
    pub instance_label: String,
}

/// Fields shared by every entry about one media item.
#[derive(Debug, Clone)]
pub struct EntrySource<'a> {
    pub context: &'a TemplateContext,
    pub status_url: Option<&'a str>,
    pub media_url: &'a str,
    pub instance_label: &'a str,
}

impl JournalEntry {
    /// Entry for `outcome`, or `None` for outcomes that are never journaled
    /// (simulated runs and tracker-cached skips).
    pub fn from_outcome(
        outcome: &DownloadOutcome,
        source: &EntrySource<'_>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let (event, reason, filepath, sha256, size) = match outcome {
            DownloadOutcome::Stored {
                path,
                digest,
                size,
                replaced,
            } => (
                JournalEvent::Stored,
                replaced.then(|| "replaced".to_string()),
                Some(path.clone()),
                Some(digest.clone()),
                Some(*size),
            ),
            DownloadOutcome::Duplicate { existing, digest } => (
                JournalEvent::Duplicate,
                Some("duplicate".to_string()),
                Some(existing.clone()),
                Some(digest.clone()),
                None,
            ),
            DownloadOutcome::Skipped(SkipReason::TrackedNotFound) => return None,
            DownloadOutcome::Skipped(reason) => {
                let path = match reason {
                    SkipReason::Conflict { path } => Some(path.clone()),
                    _ => None,
                };
                (
                    JournalEvent::Removed,
                    Some(reason.as_str().to_string()),
                    path,
                    None,
                    None,
                )
            }
            DownloadOutcome::Failed(err) => (
                JournalEvent::Failed,
                Some(err.to_string()),
                None,
                None,
                None,
            ),
            DownloadOutcome::Simulated { .. } => return None,
        };

        let ctx = source.context;
        Some(Self {
            time: now,
            event,
            reason,
            filepath,
            sha256,
            size,
            statusid: ctx.status_id.clone(),
            status_url: source.status_url.map(str::to_string),
            media_url: source.media_url.to_string(),
            created_at: ctx.created_at,
            origin_host: ctx.origin_host.clone(),
            origin_group: ctx.origin_group.clone(),
            account_host: ctx.account_host.clone(),
            account_group: ctx.account_group.clone(),
            instance_label: source.instance_label.to_string(),
        })
    }
}

/// Appends journal entries under a log directory.
#[derive(Debug, Clone)]
pub struct ActivityJournal {
    root: PathBuf,
    template: PathTemplate,
    log_removed: bool,
    log_duplicate: bool,
}

impl ActivityJournal {
    /// `pattern` overrides the frequency default. Journal paths are needed
    /// before any digest exists, so `{sha256}` is refused.
    pub fn new(
        root: impl Into<PathBuf>,
        frequency: JournalFrequency,
        pattern: Option<&str>,
    ) -> Result<Self, TemplateError> {
        let template = PathTemplate::parse(pattern.unwrap_or(frequency.default_pattern()))?;
        template.require_digest_free()?;
        Ok(Self {
            root: root.into(),
            template,
            log_removed: true,
            log_duplicate: true,
        })
    }

    pub fn with_toggles(mut self, log_removed: bool, log_duplicate: bool) -> Self {
        self.log_removed = log_removed;
        self.log_duplicate = log_duplicate;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, context: &TemplateContext) -> PathBuf {
        self.template.render(&self.root, context).preview()
    }

    /// Append `entry` unless its kind is switched off. Returns the file
    /// written to.
    pub fn append(
        &self,
        context: &TemplateContext,
        entry: &JournalEntry,
    ) -> ArchiverResult<Option<PathBuf>> {
        let wanted = match entry.event {
            JournalEvent::Stored | JournalEvent::Failed => true,
            JournalEvent::Duplicate => self.log_duplicate,
            JournalEvent::Removed => self.log_removed,
        };
        if !wanted {
            return Ok(None);
        }
        let path = self.path_for(context);
        jsonl::append_record(&path, entry)?;
        Ok(Some(path))
    }
}
