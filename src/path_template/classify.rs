//! Host -> group classification used by the `*_group` placeholders.

use glob::Pattern;
use reqwest::Url;

use super::template::TemplateError;

/// Group assigned when nothing matches or the host is missing.
pub const FALLBACK_GROUP: &str = "other";
/// Account host when a status carries no URL to derive it from.
pub const UNKNOWN_HOST: &str = "unknown";

const KNOWN_SOFTWARE_RULES: &[(&str, &str)] = &[
    ("*misskey*", "misskey"),
    ("*mastodon*", "mastodon"),
    ("*.mstdn.jp", "mastodon"),
    ("pawoo.net", "pawoo"),
];

#[derive(Debug, Clone)]
pub struct ClassifyRule {
    pattern: Pattern,
    group: String,
}

impl ClassifyRule {
    pub fn new(pattern: &str, group: &str) -> Result<Self, TemplateError> {
        let compiled =
            Pattern::new(&pattern.to_lowercase()).map_err(|e| TemplateError::InvalidRule {
                pattern: pattern.to_string(),
                reason: e.msg.to_string(),
            })?;
        if group.trim().is_empty() {
            return Err(TemplateError::InvalidRule {
                pattern: pattern.to_string(),
                reason: "group must not be empty".to_string(),
            });
        }
        Ok(Self {
            pattern: compiled,
            group: group.to_string(),
        })
    }

    pub fn matches(&self, host: &str) -> bool {
        self.pattern.matches(host)
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

/// Ordered rule list. Configured rules are tried first, then the built-in
/// known-software heuristics; the first match wins.
#[derive(Debug, Clone)]
pub struct HostClassifier {
    rules: Vec<ClassifyRule>,
    builtin: Vec<ClassifyRule>,
}

impl HostClassifier {
    pub fn new(configured: Vec<ClassifyRule>) -> Self {
        let builtin = KNOWN_SOFTWARE_RULES
            .iter()
            .filter_map(|(pattern, group)| ClassifyRule::new(pattern, group).ok())
            .collect();
        Self {
            rules: configured,
            builtin,
        }
    }

    /// Parse `(pattern, group)` pairs, failing on the first invalid pattern.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules = pairs
            .into_iter()
            .map(|(pattern, group)| ClassifyRule::new(pattern, group))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    pub fn classify(&self, host: &str) -> String {
        let host = host.trim().to_lowercase();
        if host.is_empty() {
            return FALLBACK_GROUP.to_string();
        }
        self.rules
            .iter()
            .chain(self.builtin.iter())
            .find(|rule| rule.matches(&host))
            .map(|rule| rule.group.clone())
            .unwrap_or_else(|| FALLBACK_GROUP.to_string())
    }
}

impl Default for HostClassifier {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Lowercase host of `url`, or an empty string when it has none.
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
}

/// Host of the account that posted a status, derived from the status URL.
pub fn account_host(status_url: Option<&str>) -> String {
    match status_url.map(host_of) {
        Some(host) if !host.is_empty() => host,
        _ => UNKNOWN_HOST.to_string(),
    }
}
