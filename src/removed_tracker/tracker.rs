use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::models::RemovedRecord;
use crate::error::{ArchiverError, ArchiverResult};
use crate::jsonl;

/// Persistent set of media confirmed missing upstream.
///
/// When constructed without a window the tracker is disabled: nothing is read
/// or written and `is_skippable` always answers `false`.
#[derive(Debug)]
pub struct RemovedMediaTracker {
    path: PathBuf,
    window: Option<TimeDelta>,
    records: HashMap<String, RemovedRecord>,
}

impl RemovedMediaTracker {
    pub fn load(path: impl Into<PathBuf>, window: Option<Duration>) -> ArchiverResult<Self> {
        let path = path.into();
        let window = match window {
            None => None,
            Some(d) if d.is_zero() => None,
            Some(d) => Some(TimeDelta::from_std(d).map_err(|_| {
                ArchiverError::Config(format!("removed-media window {:?} is out of range", d))
            })?),
        };

        let mut records = HashMap::new();
        if window.is_some() {
            let loaded = jsonl::read_records::<RemovedRecord>(&path)?;
            // later lines are refreshes of earlier ones
            for record in loaded.records {
                records.insert(record.media_id.clone(), record);
            }
            if loaded.malformed > 0 {
                warn!(
                    "Removed-media log {:?}: skipped {} malformed line(s)",
                    path, loaded.malformed
                );
            }
            info!("Loaded {} removed-media entries from {:?}", records.len(), path);
        } else {
            debug!("Removed-media tracking disabled");
        }

        Ok(Self {
            path,
            window,
            records,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.window.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, media_id: &str) -> Option<&RemovedRecord> {
        self.records.get(media_id)
    }

    pub fn is_skippable(&self, media_id: &str, now: DateTime<Utc>) -> bool {
        if self.window.is_none() {
            return false;
        }
        self.records
            .get(media_id)
            .is_some_and(|record| record.is_active(now))
    }

    /// Create or refresh the entry for `media_id`, pushing its skip deadline to
    /// `now + window`. Returns the stored record, or `None` when disabled.
    pub fn mark_not_found(
        &mut self,
        media_id: &str,
        now: DateTime<Utc>,
    ) -> ArchiverResult<Option<RemovedRecord>> {
        let Some(window) = self.window else {
            return Ok(None);
        };

        let record = match self.records.get(media_id) {
            Some(existing) => RemovedRecord {
                media_id: existing.media_id.clone(),
                first_seen: existing.first_seen,
                retry_count: existing.retry_count.saturating_add(1),
                skip_until: now + window,
            },
            None => RemovedRecord {
                media_id: media_id.to_string(),
                first_seen: now,
                retry_count: 0,
                skip_until: now + window,
            },
        };

        jsonl::append_record(&self.path, &record)?;
        debug!(
            "Tracking {} as not found until {} (retry {})",
            media_id, record.skip_until, record.retry_count
        );
        self.records.insert(media_id.to_string(), record.clone());
        Ok(Some(record))
    }

    /// Forget `media_id` after it was fetched successfully. Returns whether an
    /// entry existed; the log is only rewritten in that case.
    pub fn clear(&mut self, media_id: &str) -> ArchiverResult<bool> {
        if self.window.is_none() || self.records.remove(media_id).is_none() {
            return Ok(false);
        }

        let mut remaining: Vec<&RemovedRecord> = self.records.values().collect();
        remaining.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.media_id.cmp(&b.media_id))
        });
        jsonl::rewrite_records(&self.path, remaining)?;
        info!("Media {} is reachable again, removed from tracker", media_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const WINDOW: Duration = Duration::from_secs(3600);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_skippable_exactly_within_window() {
        let dir = TempDir::new().unwrap();
        let mut tracker =
            RemovedMediaTracker::load(dir.path().join("removed.jsonl"), Some(WINDOW)).unwrap();

        tracker.mark_not_found("m1", t0()).unwrap();

        assert!(tracker.is_skippable("m1", t0()));
        assert!(tracker.is_skippable("m1", t0() + TimeDelta::seconds(3599)));
        assert!(!tracker.is_skippable("m1", t0() + TimeDelta::seconds(3600)));
        assert!(!tracker.is_skippable("m1", t0() + TimeDelta::days(2)));
        assert!(!tracker.is_skippable("m2", t0()));
    }

    #[test]
    fn test_refresh_increments_retry_count() {
        let dir = TempDir::new().unwrap();
        let mut tracker =
            RemovedMediaTracker::load(dir.path().join("removed.jsonl"), Some(WINDOW)).unwrap();

        tracker.mark_not_found("m1", t0()).unwrap();
        let later = t0() + TimeDelta::hours(2);
        let refreshed = tracker.mark_not_found("m1", later).unwrap().unwrap();

        assert_eq!(refreshed.retry_count, 1);
        assert_eq!(refreshed.first_seen, t0());
        assert_eq!(refreshed.skip_until, later + TimeDelta::hours(1));
        assert!(tracker.is_skippable("m1", later + TimeDelta::minutes(30)));
    }

    #[test]
    fn test_reload_keeps_latest_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("removed.jsonl");
        {
            let mut tracker = RemovedMediaTracker::load(&path, Some(WINDOW)).unwrap();
            tracker.mark_not_found("m1", t0()).unwrap();
            tracker
                .mark_not_found("m1", t0() + TimeDelta::hours(3))
                .unwrap();
        }

        let tracker = RemovedMediaTracker::load(&path, Some(WINDOW)).unwrap();
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get("m1").unwrap().retry_count, 1);
        assert!(tracker.is_skippable("m1", t0() + TimeDelta::hours(3)));
    }

    #[test]
    fn test_clear_compacts_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("removed.jsonl");
        let mut tracker = RemovedMediaTracker::load(&path, Some(WINDOW)).unwrap();
        tracker.mark_not_found("m1", t0()).unwrap();
        tracker.mark_not_found("m2", t0()).unwrap();
        tracker.mark_not_found("m1", t0()).unwrap();

        assert!(tracker.clear("m1").unwrap());
        assert!(!tracker.clear("m1").unwrap());
        assert!(!tracker.is_skippable("m1", t0()));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("\"m2\""));
    }

    #[test]
    fn test_disabled_tracker_never_skips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("removed.jsonl");
        let mut tracker = RemovedMediaTracker::load(&path, None).unwrap();

        assert!(!tracker.is_enabled());
        assert!(tracker.mark_not_found("m1", t0()).unwrap().is_none());
        assert!(!tracker.is_skippable("m1", t0()));
        assert!(!tracker.clear("m1").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_window_disables() {
        let dir = TempDir::new().unwrap();
        let tracker =
            RemovedMediaTracker::load(dir.path().join("r.jsonl"), Some(Duration::ZERO)).unwrap();
        assert!(!tracker.is_enabled());
    }
}
