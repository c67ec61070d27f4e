//! Error taxonomy for configuration resolution.
//!
//! Every failure mode maps to one variant of [`ConfigError`] so callers can
//! distinguish schema problems (caught before any I/O) from source, parse,
//! resolution and validation failures. Optional sources (a missing dotenv
//! overlay, a missing optional config file) recover locally and never
//! surface through this type.

use crate::validate::Violation;
use crate::value::CoerceError;
use std::path::PathBuf;
use thiserror::Error;

/// A declared field-descriptor table is internally inconsistent.
///
/// Schema errors are fatal and reported before any source is read.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// Two fields at the same nesting level share one source key.
    #[error("{type_name}: duplicate source key `{key}`")]
    DuplicateKey {
        type_name: &'static str,
        key: &'static str,
    },

    /// DSN fields are computed, never defaulted directly.
    #[error("{type_name}.{field}: a DSN field is computed and may not carry a default literal")]
    DefaultOnDsn {
        type_name: &'static str,
        field: &'static str,
    },

    /// DSN expansion produces text, so the target field must be a string.
    #[error("{type_name}.{field}: DSN templates require a string field")]
    DsnOnNonString {
        type_name: &'static str,
        field: &'static str,
    },

    /// Nested sections carry their own descriptors; scalar markers on the
    /// nesting field itself are meaningless.
    #[error("{type_name}.{field}: nested sections may not carry env, default or DSN markers")]
    MarkerOnNested {
        type_name: &'static str,
        field: &'static str,
    },

    #[error("{type_name}.{field}: DSN template references unknown field `{reference}`")]
    UnknownReference {
        type_name: &'static str,
        field: &'static str,
        reference: String,
    },

    /// Only non-DSN fields are final when DSN expansion runs, so a DSN field
    /// may not reference another one.
    #[error("{type_name}.{field}: DSN template references `{reference}`, itself a DSN field")]
    ReferenceToDsn {
        type_name: &'static str,
        field: &'static str,
        reference: String,
    },

    #[error("{type_name}.{field}: {detail}")]
    Placeholder {
        type_name: &'static str,
        field: &'static str,
        detail: String,
    },
}

/// Any failure of a full resolution run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// I/O error reading a source file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file the caller marked as required does not exist.
    #[error("required configuration file not found: {path}")]
    MissingFile { path: PathBuf },

    /// The structured-file parser rejected the file contents.
    #[error("malformed configuration file: {0}")]
    FileFormat(#[from] toml::de::Error),

    /// A dotenv overlay line without a `KEY=VALUE` shape.
    #[error("{file}:{line}: malformed dotenv line")]
    Dotenv { file: PathBuf, line: usize },

    /// The templating engine rejected the configuration template.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A default literal, file node or environment value could not convert
    /// to the field's semantic type.
    #[error("field `{field}`: {source}")]
    Parse {
        field: String,
        #[source]
        source: CoerceError,
    },

    /// A DSN placeholder could not be resolved.
    #[error("field `{field}`: cannot resolve `${{{placeholder}}}`: {reason}")]
    Resolution {
        field: String,
        placeholder: String,
        reason: String,
    },

    /// A populate-missing-values hook reported a failure.
    #[error("populate hook failed for {scope}: {cause}")]
    Populate { scope: String, cause: anyhow::Error },

    /// Every field violation found by the validation engine, not just the
    /// first.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<Violation>),

    /// The loader options record is self-contradictory.
    #[error("invalid loader options: {0}")]
    Options(String),
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
