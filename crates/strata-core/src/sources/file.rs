//! The structured configuration file.
//!
//! Reading and parsing are separate steps because templating (when
//! configured) operates on the raw text in between, never on the parsed
//! tree.

use crate::error::ConfigError;
use std::path::Path;
use tracing::debug;

/// Read the configuration file.
///
/// A missing file is an error only when the caller marked it required; an
/// optional missing file yields `None` and the resolution proceeds without
/// a file overlay.
pub fn read(path: &Path, required: bool) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if required {
                Err(ConfigError::MissingFile {
                    path: path.to_path_buf(),
                })
            } else {
                debug!("optional config file {} not present", path.display());
                Ok(None)
            }
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse configuration text into a tree of scalar/mapping/sequence nodes.
pub fn parse(text: &str) -> Result<toml::Table, ConfigError> {
    Ok(text.parse::<toml::Table>()?)
}
