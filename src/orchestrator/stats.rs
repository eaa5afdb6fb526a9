//! Per-run counters reported at the end of a run.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::info;

use crate::bookmarks::FilterReason;
use crate::download_manager::DownloadOutcome;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Statuses pulled from the listing, filtered ones included
    pub statuses: usize,
    pub media: usize,
    pub stored: usize,
    pub replaced: usize,
    pub duplicate: usize,
    pub simulated: usize,
    pub stored_bytes: u64,
    pub unbookmarked: usize,
    /// Media requests let through the rate limiter, retries included
    pub requests: u64,
    /// Time those requests spent waiting on the rate limiter
    pub throttle_wait: Duration,
    /// Skipped media by reason
    pub skipped: BTreeMap<&'static str, usize>,
    /// Failed media by coarse error kind
    pub failed: BTreeMap<&'static str, usize>,
    /// Statuses skipped as a whole by the status filter
    pub filtered: BTreeMap<&'static str, usize>,
}

impl RunStats {
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        self.media += 1;
        match outcome {
            DownloadOutcome::Stored { size, replaced, .. } => {
                self.stored += 1;
                self.stored_bytes += size;
                if *replaced {
                    self.replaced += 1;
                }
            }
            DownloadOutcome::Duplicate { .. } => self.duplicate += 1,
            DownloadOutcome::Skipped(reason) => {
                *self.skipped.entry(reason.as_str()).or_default() += 1;
            }
            DownloadOutcome::Failed(err) => {
                *self.failed.entry(err.error_type.summary_kind()).or_default() += 1;
            }
            DownloadOutcome::Simulated { .. } => self.simulated += 1,
        }
    }

    pub fn record_filtered(&mut self, reason: FilterReason) {
        *self.filtered.entry(reason.as_str()).or_default() += 1;
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.statuses += other.statuses;
        self.media += other.media;
        self.stored += other.stored;
        self.replaced += other.replaced;
        self.duplicate += other.duplicate;
        self.simulated += other.simulated;
        self.stored_bytes += other.stored_bytes;
        self.unbookmarked += other.unbookmarked;
        self.requests += other.requests;
        self.throttle_wait += other.throttle_wait;
        for (map, theirs) in [
            (&mut self.skipped, &other.skipped),
            (&mut self.failed, &other.failed),
            (&mut self.filtered, &other.filtered),
        ] {
            for (key, count) in theirs {
                *map.entry(*key).or_default() += count;
            }
        }
    }

    pub fn log_summary(&self, label: &str) {
        info!(
            "[{}] {} statuses, {} media: {} stored ({:#}, {} replaced), {} duplicate, {} skipped, {} failed{}",
            label,
            self.statuses,
            self.media,
            self.stored,
            byte_unit::Byte::from(self.stored_bytes),
            self.replaced,
            self.duplicate,
            self.skipped_total(),
            self.failed_total(),
            if self.simulated > 0 {
                format!(", {} simulated", self.simulated)
            } else {
                String::new()
            }
        );
        for (reason, count) in &self.skipped {
            info!("[{}]   skipped {}: {}", label, reason, count);
        }
        for (kind, count) in &self.failed {
            info!("[{}]   failed {}: {}", label, kind, count);
        }
        for (reason, count) in &self.filtered {
            info!("[{}]   filtered {}: {}", label, reason, count);
        }
        if self.unbookmarked > 0 {
            info!("[{}]   unbookmarked: {}", label, self.unbookmarked);
        }
        if self.requests > 0 {
            info!(
                "[{}]   requests: {}, {:.1}s waiting on the rate limit",
                label,
                self.requests,
                self.throttle_wait.as_secs_f64()
            );
        }
    }
}
