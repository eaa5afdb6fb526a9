//! Terminal progress display.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Deserialize;

const STATUS_TEMPLATE: &str = "[{prefix}] {pos}/{len} statuses {wide_msg}";
const OPEN_STATUS_TEMPLATE: &str = "[{prefix}] {pos} statuses {wide_msg}";
const MEDIA_TEMPLATE: &str = "[{prefix}] {msg} {bytes} ({bytes_per_sec})";

/// How much progress to draw while archiving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    #[default]
    Off,
    /// One bar per instance counting statuses.
    Count,
    /// Status bar plus a byte counter per media download.
    Filesize,
}

/// Bars for one run. Clones draw into the same display.
#[derive(Debug, Clone)]
pub struct RunProgress {
    level: ProgressLevel,
    bars: MultiProgress,
}

impl RunProgress {
    pub fn new(level: ProgressLevel) -> Self {
        Self::with_draw_target(level, ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(level: ProgressLevel, target: ProgressDrawTarget) -> Self {
        Self {
            level,
            bars: MultiProgress::with_draw_target(target),
        }
    }

    pub fn off() -> Self {
        Self::with_draw_target(ProgressLevel::Off, ProgressDrawTarget::hidden())
    }

    pub fn level(&self) -> ProgressLevel {
        self.level
    }

    /// Status counter for one instance, sized to `limit` when there is one.
    pub fn statuses(&self, label: &str, limit: Option<usize>) -> ProgressBar {
        if self.level == ProgressLevel::Off {
            return ProgressBar::hidden();
        }
        let bar = match limit {
            Some(limit) => ProgressBar::new(limit as u64).with_style(style(STATUS_TEMPLATE)),
            None => ProgressBar::no_length().with_style(style(OPEN_STATUS_TEMPLATE)),
        };
        self.bars.add(bar.with_prefix(label.to_string()))
    }

    /// Byte counter for one media download; only drawn at `filesize`.
    pub fn media(&self, label: &str, status_id: &str, index: usize) -> Option<ProgressBar> {
        if self.level != ProgressLevel::Filesize {
            return None;
        }
        let bar = ProgressBar::no_length()
            .with_style(style(MEDIA_TEMPLATE))
            .with_prefix(label.to_string())
            .with_message(format!("{} #{}", status_id, index));
        Some(self.bars.add(bar))
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::off()
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden(level: ProgressLevel) -> RunProgress {
        RunProgress::with_draw_target(level, ProgressDrawTarget::hidden())
    }

    #[test]
    fn test_templates_parse() {
        for template in [STATUS_TEMPLATE, OPEN_STATUS_TEMPLATE, MEDIA_TEMPLATE] {
            assert!(ProgressStyle::with_template(template).is_ok(), "{}", template);
        }
    }

    #[test]
    fn test_off_draws_nothing() {
        let progress = RunProgress::off();
        assert!(progress.statuses("home", Some(10)).is_hidden());
        assert!(progress.media("home", "1", 0).is_none());
    }

    #[test]
    fn test_count_sizes_bar_to_limit() {
        let progress = hidden(ProgressLevel::Count);
        let bar = progress.statuses("home", Some(25));
        assert_eq!(bar.length(), Some(25));
        bar.inc(3);
        assert_eq!(bar.position(), 3);

        assert_eq!(progress.statuses("work", None).length(), None);
        assert!(progress.media("home", "1", 0).is_none());
    }

    #[test]
    fn test_filesize_adds_media_bars() {
        let progress = hidden(ProgressLevel::Filesize);
        let bar = progress.media("home", "109", 2).unwrap();
        assert_eq!(bar.message(), "109 #2");
        assert_eq!(bar.prefix(), "home");
    }

    #[test]
    fn test_level_parsing() {
        #[derive(Deserialize)]
        struct Holder {
            progress: ProgressLevel,
        }
        let parse = |s: &str| toml::from_str::<Holder>(&format!("progress = \"{}\"", s));
        assert_eq!(parse("count").unwrap().progress, ProgressLevel::Count);
        assert_eq!(parse("filesize").unwrap().progress, ProgressLevel::Filesize);
        assert_eq!(parse("off").unwrap().progress, ProgressLevel::Off);
        assert!(parse("verbose").is_err());
    }
}
