//! Dotenv overlay files.
//!
//! Zero or more `KEY=VALUE` files applied to the environment view in caller
//! order: later files overwrite earlier ones. By default a key already
//! present in the live process environment is left untouched, so a
//! checked-in file can never clobber a real deployment variable; override
//! mode flips that. A missing overlay file is silently skipped, which is
//! what makes optional local-override files work.

use super::env::EnvMap;
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Apply dotenv overlay files to `env`.
///
/// `env` must still be the pristine process capture: the non-override
/// precedence check is "present in the live process environment", and this
/// is the only mutation the pipeline performs before it.
pub fn apply(env: &mut EnvMap, paths: &[PathBuf], override_env: bool) -> Result<(), ConfigError> {
    let mut overlay: BTreeMap<String, String> = BTreeMap::new();
    for path in paths {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("dotenv file {} not present, skipping", path.display());
                continue;
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };
        parse_into(&text, path, &mut overlay)?;
    }

    for (key, value) in overlay {
        if override_env || !env.contains(&key) {
            env.set(key, value);
        } else {
            debug!("dotenv key {key} shadowed by process environment");
        }
    }
    Ok(())
}

/// Parse one dotenv file into `overlay`, later keys overwriting earlier
/// ones. Handles `#` comment lines, an optional `export ` prefix and
/// single- or double-quoted values.
fn parse_into(
    text: &str,
    path: &Path,
    overlay: &mut BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Dotenv {
                file: path.to_path_buf(),
                line: index + 1,
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Dotenv {
                file: path.to_path_buf(),
                line: index + 1,
            });
        }
        overlay.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    Ok(())
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> BTreeMap<String, String> {
        let mut overlay = BTreeMap::new();
        parse_into(text, Path::new(".env"), &mut overlay).unwrap();
        overlay
    }

    #[test]
    fn parses_basic_pairs() {
        let overlay = parse("A=1\nB = two \n");
        assert_eq!(overlay["A"], "1");
        assert_eq!(overlay["B"], "two");
    }

    #[test]
    fn skips_comments_and_blanks() {
        let overlay = parse("# comment\n\nA=1\n");
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn handles_export_prefix_and_quotes() {
        let overlay = parse("export TOKEN=\"abc def\"\nNAME='single'\n");
        assert_eq!(overlay["TOKEN"], "abc def");
        assert_eq!(overlay["NAME"], "single");
    }

    #[test]
    fn malformed_line_is_an_error() {
        let mut overlay = BTreeMap::new();
        let err = parse_into("JUSTAKEY\n", Path::new(".env"), &mut overlay).unwrap_err();
        assert!(matches!(err, ConfigError::Dotenv { line: 1, .. }));
    }

    #[test]
    fn later_files_overwrite_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.env");
        let b = dir.path().join("b.env");
        std::fs::File::create(&a)
            .unwrap()
            .write_all(b"SHARED=from_a\nONLY_A=1\n")
            .unwrap();
        std::fs::File::create(&b)
            .unwrap()
            .write_all(b"SHARED=from_b\n")
            .unwrap();

        let mut env = EnvMap::default();
        apply(&mut env, &[a, b], false).unwrap();
        assert_eq!(env.get("SHARED"), Some("from_b"));
        assert_eq!(env.get("ONLY_A"), Some("1"));
    }

    #[test]
    fn process_environment_wins_unless_override() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        std::fs::write(&file, "PRESET=from_file\n").unwrap();

        let mut env = EnvMap::from_iter([("PRESET", "from_process")]);
        apply(&mut env, std::slice::from_ref(&file), false).unwrap();
        assert_eq!(env.get("PRESET"), Some("from_process"));

        let mut env = EnvMap::from_iter([("PRESET", "from_process")]);
        apply(&mut env, std::slice::from_ref(&file), true).unwrap();
        assert_eq!(env.get("PRESET"), Some("from_file"));
    }

    #[test]
    fn missing_file_is_skipped() {
        let mut env = EnvMap::default();
        apply(&mut env, &[PathBuf::from("/nonexistent/.env")], false).unwrap();
        assert_eq!(env.get("ANY"), None);
    }
}
