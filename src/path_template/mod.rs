//! Path Templater
//!
//! Turns status and media metadata into destination paths. Templates are
//! compiled once; host groups come from ordered glob rules.

mod classify;
mod date_vars;
mod template;

pub use classify::{
    account_host, host_of, ClassifyRule, HostClassifier, FALLBACK_GROUP, UNKNOWN_HOST,
};
pub use date_vars::{format_field, half_of, quarter_of, DateField, DATE_PLACEHOLDERS};
pub use template::{
    PathTemplate, Placeholder, RenderedPath, TemplateContext, TemplateError, MAX_PREFIX_LEN,
};

/// Filename pattern used when none is configured.
pub const DEFAULT_FILENAME_PATTERN: &str =
    "{origin_group}/{yearmonth}/{screenname}-{datetime}-{index}.{ext}";
