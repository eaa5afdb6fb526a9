//! Compiled path templates.
//!
//! A template is parsed once at startup into literal and placeholder segments.
//! Unknown names and malformed braces are rejected then, so rendering a single
//! item can never fail.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::date_vars::{format_field, DateField};

/// Longest prefix accepted by the `{name:N}` syntax.
pub const MAX_PREFIX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("unknown placeholder {{{name}}} in {template:?}")]
    UnknownPlaceholder { name: String, template: String },

    #[error("unterminated placeholder at byte {position} in {template:?}")]
    Unterminated { position: usize, template: String },

    #[error("invalid prefix length {value:?} for {{{name}}} (expected 1..=64)")]
    InvalidPrefix { name: String, value: String },

    #[error("{{{name}}} cannot take a prefix length")]
    PrefixNotAllowed { name: String },

    #[error("placeholder {{sha256}} is not available in {template:?}")]
    DigestNotAllowed { template: String },

    #[error("invalid classification rule {pattern:?}: {reason}")]
    InvalidRule { pattern: String, reason: String },
}

/// Every value a template can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    OriginHost,
    OriginGroup,
    AccountHost,
    AccountGroup,
    Screenname,
    StatusId,
    Index,
    Ext,
    Sha256,
    Date(DateField),
}

impl Placeholder {
    pub fn from_name(name: &str) -> Option<Self> {
        let placeholder = match name {
            "origin_host" => Placeholder::OriginHost,
            "origin_group" => Placeholder::OriginGroup,
            "account_host" => Placeholder::AccountHost,
            "account_group" => Placeholder::AccountGroup,
            "screenname" => Placeholder::Screenname,
            "status_id" => Placeholder::StatusId,
            "index" => Placeholder::Index,
            "ext" => Placeholder::Ext,
            "sha256" => Placeholder::Sha256,
            other => Placeholder::Date(DateField::from_name(other)?),
        };
        Some(placeholder)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::OriginHost => "origin_host",
            Placeholder::OriginGroup => "origin_group",
            Placeholder::AccountHost => "account_host",
            Placeholder::AccountGroup => "account_group",
            Placeholder::Screenname => "screenname",
            Placeholder::StatusId => "status_id",
            Placeholder::Index => "index",
            Placeholder::Ext => "ext",
            Placeholder::Sha256 => "sha256",
            Placeholder::Date(field) => field.as_str(),
        }
    }

    /// Numeric placeholders are not truncatable.
    fn accepts_prefix(&self) -> bool {
        !matches!(
            self,
            Placeholder::Index | Placeholder::Date(DateField::Quarter | DateField::Half)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value {
        placeholder: Placeholder,
        prefix: Option<usize>,
    },
}

/// Everything a template may need about one media item.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub origin_host: String,
    pub origin_group: String,
    pub account_host: String,
    pub account_group: String,
    pub screenname: String,
    pub status_id: String,
    pub index: usize,
    pub ext: String,
    pub created_at: DateTime<Utc>,
}

impl TemplateContext {
    fn value(&self, placeholder: Placeholder) -> Option<String> {
        let value = match placeholder {
            Placeholder::OriginHost => self.origin_host.clone(),
            Placeholder::OriginGroup => self.origin_group.clone(),
            Placeholder::AccountHost => self.account_host.clone(),
            Placeholder::AccountGroup => self.account_group.clone(),
            Placeholder::Screenname => self.screenname.clone(),
            Placeholder::StatusId => self.status_id.clone(),
            Placeholder::Index => self.index.to_string(),
            Placeholder::Ext => self.ext.clone(),
            Placeholder::Date(field) => format_field(field, &self.created_at),
            Placeholder::Sha256 => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Digest(Option<usize>),
}

/// A rendered path whose `{sha256}` parts are filled in once the content hash
/// is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPath {
    root: PathBuf,
    pieces: Vec<Piece>,
}

impl RenderedPath {
    pub fn needs_digest(&self) -> bool {
        self.pieces.iter().any(|p| matches!(p, Piece::Digest(_)))
    }

    /// Final location for content hashing to `digest`.
    pub fn resolve(&self, digest: &str) -> PathBuf {
        self.join(|prefix| truncate(&sanitize(digest), prefix))
    }

    /// Location shown before the digest is known, digest parts spelled as
    /// `{sha256}`.
    pub fn preview(&self) -> PathBuf {
        self.join(|prefix| match prefix {
            Some(n) => format!("{{sha256:{}}}", n),
            None => "{sha256}".to_string(),
        })
    }

    fn join(&self, digest: impl Fn(Option<usize>) -> String) -> PathBuf {
        let mut rel = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => rel.push_str(text),
                Piece::Digest(prefix) => rel.push_str(&digest(*prefix)),
            }
        }
        let rel = rel.trim_start_matches(['/', '\\']);
        self.root.join(rel)
    }
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        if template.trim().is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| TemplateError::Unterminated {
                position: offset + open,
                template: template.to_string(),
            })?;
            let body = &after[..close];
            if body.contains('{') {
                return Err(TemplateError::Unterminated {
                    position: offset + open,
                    template: template.to_string(),
                });
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(parse_placeholder(body, template)?);

            let consumed = open + 1 + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn uses_digest(&self) -> bool {
        self.placeholders().any(|p| p == Placeholder::Sha256)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Value { placeholder, .. } => Some(*placeholder),
            Segment::Literal(_) => None,
        })
    }

    /// Reject templates that need the content digest, for paths that must be
    /// known before anything is downloaded.
    pub fn require_digest_free(&self) -> Result<(), TemplateError> {
        if self.uses_digest() {
            return Err(TemplateError::DigestNotAllowed {
                template: self.source.clone(),
            });
        }
        Ok(())
    }

    /// Render under `root`. Substituted values never introduce path
    /// separators or parent references.
    pub fn render(&self, root: &Path, ctx: &TemplateContext) -> RenderedPath {
        let mut pieces: Vec<Piece> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => push_text(&mut pieces, text),
                Segment::Value {
                    placeholder,
                    prefix,
                } => match ctx.value(*placeholder) {
                    Some(value) => push_text(&mut pieces, &truncate(&sanitize(&value), *prefix)),
                    None => pieces.push(Piece::Digest(*prefix)),
                },
            }
        }
        RenderedPath {
            root: root.to_path_buf(),
            pieces,
        }
    }
}

impl FromStr for PathTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_placeholder(body: &str, template: &str) -> Result<Segment, TemplateError> {
    let (name, prefix) = match body.split_once(':') {
        Some((name, len)) => (name.trim(), Some(len.trim())),
        None => (body.trim(), None),
    };

    let placeholder =
        Placeholder::from_name(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
            name: name.to_string(),
            template: template.to_string(),
        })?;

    let prefix = match prefix {
        None => None,
        Some(raw) => {
            if !placeholder.accepts_prefix() {
                return Err(TemplateError::PrefixNotAllowed {
                    name: name.to_string(),
                });
            }
            match raw.parse::<usize>() {
                Ok(n) if (1..=MAX_PREFIX_LEN).contains(&n) => Some(n),
                _ => {
                    return Err(TemplateError::InvalidPrefix {
                        name: name.to_string(),
                        value: raw.to_string(),
                    })
                }
            }
        }
    };

    Ok(Segment::Value {
        placeholder,
        prefix,
    })
}

fn push_text(pieces: &mut Vec<Piece>, text: &str) {
    if let Some(Piece::Text(last)) = pieces.last_mut() {
        last.push_str(text);
    } else {
        pieces.push(Piece::Text(text.to_string()));
    }
}

fn truncate(value: &str, prefix: Option<usize>) -> String {
    match prefix {
        Some(n) => value.chars().take(n).collect(),
        None => value.to_string(),
    }
}

/// Make a substituted value safe to embed in a single path component.
fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" => "_".to_string(),
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> TemplateContext {
        TemplateContext {
            origin_host: "files.mastodon.social".to_string(),
            origin_group: "mastodon".to_string(),
            account_host: "mastodon.social".to_string(),
            account_group: "mastodon".to_string(),
            screenname: "alice".to_string(),
            status_id: "109876".to_string(),
            index: 0,
            ext: "png".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 12, 4, 0, 19, 59).unwrap(),
        }
    }

    #[test]
    fn test_default_pattern() {
        let template =
            PathTemplate::parse("{origin_group}/{yearmonth}/{screenname}-{datetime}-{index}.{ext}")
                .unwrap();
        let rendered = template.render(Path::new("/data"), &ctx());

        assert!(!rendered.needs_digest());
        assert_eq!(
            rendered.resolve("ignored"),
            PathBuf::from("/data/mastodon/202512/alice-20251204001959-0.png")
        );
    }

    #[test]
    fn test_digest_resolved_late() {
        let template = PathTemplate::parse("{origin_group}/{sha256:8}/{sha256}.{ext}").unwrap();
        assert!(template.uses_digest());
        assert!(template.require_digest_free().is_err());

        let rendered = template.render(Path::new("out"), &ctx());
        assert!(rendered.needs_digest());
        assert_eq!(
            rendered.preview(),
            PathBuf::from("out/mastodon/{sha256:8}/{sha256}.png")
        );
        assert_eq!(
            rendered.resolve("0123456789abcdef"),
            PathBuf::from("out/mastodon/01234567/0123456789abcdef.png")
        );
    }

    #[test]
    fn test_prefix_truncates_strings() {
        let template = PathTemplate::parse("{screenname:3}_{status_id:64}").unwrap();
        let rendered = template.render(Path::new(""), &ctx());
        assert_eq!(rendered.resolve(""), PathBuf::from("ali_109876"));
    }

    #[test]
    fn test_unknown_placeholder_fails_at_parse() {
        let err = PathTemplate::parse("{origin_group}/{nope}.{ext}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownPlaceholder {
                name: "nope".to_string(),
                template: "{origin_group}/{nope}.{ext}".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(
            PathTemplate::parse("{origin_group/x"),
            Err(TemplateError::Unterminated { position: 0, .. })
        ));
        assert!(matches!(
            PathTemplate::parse("a{b{ext}"),
            Err(TemplateError::Unterminated { position: 1, .. })
        ));
        assert!(matches!(
            PathTemplate::parse("{sha256:0}"),
            Err(TemplateError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            PathTemplate::parse("{sha256:65}"),
            Err(TemplateError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            PathTemplate::parse("{index:2}"),
            Err(TemplateError::PrefixNotAllowed { .. })
        ));
        assert_eq!(PathTemplate::parse("  "), Err(TemplateError::Empty));
    }

    #[test]
    fn test_values_cannot_escape_root() {
        let mut context = ctx();
        context.screenname = "../../etc".to_string();
        context.ext = "..".to_string();
        let template = PathTemplate::parse("/{screenname}.{ext}").unwrap();

        let path = template.render(Path::new("/data"), &context).resolve("");
        assert_eq!(path, PathBuf::from("/data/.._.._etc.__"));
        assert!(path.starts_with("/data"));
    }

    #[test]
    fn test_literal_only_template() {
        let template = PathTemplate::parse("fixed/name.bin").unwrap();
        assert_eq!(template.placeholders().count(), 0);
        assert_eq!(
            template.render(Path::new("/r"), &ctx()).resolve("x"),
            PathBuf::from("/r/fixed/name.bin")
        );
    }

    #[test]
    fn test_display_returns_source() {
        let source = "{year}/{date}.jsonl";
        let template: PathTemplate = source.parse().unwrap();
        assert_eq!(template.to_string(), source);
    }
}
