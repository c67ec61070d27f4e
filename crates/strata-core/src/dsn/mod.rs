//! DSN placeholder expansion.
//!
//! A DSN template is plain text with `${...}` placeholders of three kinds:
//!
//! - `${.field}` — reference to a finalized non-DSN field of the same
//!   structure (dotted paths descend into nested sections; the leading dot
//!   is optional)
//! - `${env:NAME}` — inline environment lookup, empty text when unset
//! - `${ref:scheme:///path#fragment}` — pluggable secret reference,
//!   dispatched through the [`ResolverRegistry`]
//!
//! Expansion is a single left-to-right pass over a non-nested scan (first
//! `${`, first `}`); resolved text is never re-scanned, so a secret that
//! itself contains `${...}` passes through verbatim.

mod resolver;

pub use resolver::{FileResolver, RefResolver, ResolverRegistry};

use crate::sources::env::EnvMap;
use std::collections::BTreeMap;
use thiserror::Error;

/// One scanned span of a template.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Literal(&'a str),
    Placeholder {
        /// The text between `${` and `}`, kept for error messages.
        raw: &'a str,
        kind: PlaceholderKind<'a>,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PlaceholderKind<'a> {
    Field(&'a str),
    Env(&'a str),
    Ref(&'a str),
}

#[derive(Debug, Clone, Error)]
pub(crate) enum DsnError {
    #[error("unterminated `${{` placeholder")]
    Unterminated,

    #[error("unknown field reference `{0}`")]
    UnknownField(String),

    #[error("no resolver registered for scheme `{0}`")]
    UnknownScheme(String),

    #[error("invalid ref URI `{uri}`: {detail}")]
    BadRef { uri: String, detail: String },

    #[error("resolver `{scheme}` failed: {reason}")]
    ResolverFailed { scheme: String, reason: String },
}

/// Expansion failure, carrying the placeholder that caused it.
#[derive(Debug)]
pub(crate) struct ExpandError {
    pub placeholder: String,
    pub error: DsnError,
}

/// Split a template into literal and placeholder spans.
pub(crate) fn scan(template: &str) -> Result<Vec<Segment<'_>>, DsnError> {
    let mut segments = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(DsnError::Unterminated);
        };
        let raw = &after[..end];
        let kind = if let Some(name) = raw.strip_prefix("env:") {
            PlaceholderKind::Env(name)
        } else if let Some(uri) = raw.strip_prefix("ref:") {
            PlaceholderKind::Ref(uri)
        } else {
            PlaceholderKind::Field(raw.strip_prefix('.').unwrap_or(raw))
        };
        segments.push(Segment::Placeholder { raw, kind });
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

/// Expand a template against the finalized fields of its own structure.
///
/// `fields` maps relative dotted field paths to their rendered values;
/// `env` is the same environment view the env loader used (dotenv overlay
/// included).
pub(crate) fn expand(
    template: &str,
    fields: &BTreeMap<String, String>,
    env: &EnvMap,
    resolvers: &ResolverRegistry,
) -> Result<String, ExpandError> {
    let segments = scan(template).map_err(|error| ExpandError {
        placeholder: template.to_string(),
        error,
    })?;

    let mut out = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder { raw, kind } => {
                let resolved = match kind {
                    PlaceholderKind::Field(name) => {
                        fields.get(name).cloned().ok_or_else(|| ExpandError {
                            placeholder: raw.to_string(),
                            error: DsnError::UnknownField(name.to_string()),
                        })?
                    }
                    // Unset is not an error; optional credentials expand to
                    // empty text.
                    PlaceholderKind::Env(name) => env.get(name).unwrap_or("").to_string(),
                    PlaceholderKind::Ref(uri) => {
                        resolve_ref(uri, resolvers).map_err(|error| ExpandError {
                            placeholder: raw.to_string(),
                            error,
                        })?
                    }
                };
                out.push_str(&resolved);
            }
        }
    }
    Ok(out)
}

fn resolve_ref(uri: &str, resolvers: &ResolverRegistry) -> Result<String, DsnError> {
    let parsed = url::Url::parse(uri).map_err(|e| DsnError::BadRef {
        uri: uri.to_string(),
        detail: e.to_string(),
    })?;
    let scheme = parsed.scheme();
    let resolver = resolvers
        .get(scheme)
        .ok_or_else(|| DsnError::UnknownScheme(scheme.to_string()))?;
    resolver
        .resolve(parsed.path(), parsed.fragment())
        .map_err(|e| DsnError::ResolverFailed {
            scheme: scheme.to_string(),
            reason: format!("{e:#}"),
        })
}
