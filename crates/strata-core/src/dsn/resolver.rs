//! Pluggable `ref:` scheme resolvers.

use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;

/// A named capability turning a `ref:scheme:///path#fragment` placeholder
/// into its secret text.
///
/// Resolvers are stateless functions of path and fragment; a failure is
/// always recoverable at the call site and surfaces as a resolution error
/// naming the field and placeholder.
pub trait RefResolver: Send + Sync {
    fn resolve(&self, path: &str, fragment: Option<&str>) -> anyhow::Result<String>;
}

/// Scheme → resolver table consulted at DSN expansion time.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    schemes: HashMap<String, Arc<dyn RefResolver>>,
}

impl ResolverRegistry {
    /// Empty registry; every `ref:` placeholder fails with an
    /// unknown-scheme error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `file` scheme pre-registered.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("file", FileResolver);
        registry
    }

    pub fn register(&mut self, scheme: impl Into<String>, resolver: impl RefResolver + 'static) {
        self.schemes.insert(scheme.into(), Arc::new(resolver));
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn RefResolver>> {
        self.schemes.get(scheme).cloned()
    }
}

/// Built-in resolver for `ref:file:///path` placeholders.
///
/// Without a fragment the whole file is the secret, trailing newline
/// trimmed. With a fragment the file is read as `KEY=VALUE` lines and the
/// fragment selects one key.
pub struct FileResolver;

impl RefResolver for FileResolver {
    fn resolve(&self, path: &str, fragment: Option<&str>) -> anyhow::Result<String> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading secret file {path}"))?;
        match fragment {
            None => Ok(text.trim_end_matches(['\r', '\n']).to_string()),
            Some(key) => {
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=')
                        && k.trim() == key
                    {
                        return Ok(v.trim().to_string());
                    }
                }
                anyhow::bail!("no `{key}` entry in {path}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_resolver_reads_whole_file() {
        let mut secret = tempfile::NamedTempFile::new().unwrap();
        writeln!(secret, "s3cr3t").unwrap();
        let path = secret.path().to_string_lossy().to_string();
        assert_eq!(FileResolver.resolve(&path, None).unwrap(), "s3cr3t");
    }

    #[test]
    fn file_resolver_fragment_selects_key() {
        let mut secret = tempfile::NamedTempFile::new().unwrap();
        writeln!(secret, "# credentials").unwrap();
        writeln!(secret, "user = app").unwrap();
        writeln!(secret, "password = hunter2").unwrap();
        let path = secret.path().to_string_lossy().to_string();
        assert_eq!(
            FileResolver.resolve(&path, Some("password")).unwrap(),
            "hunter2"
        );
        assert!(FileResolver.resolve(&path, Some("token")).is_err());
    }

    #[test]
    fn missing_file_is_a_recoverable_error() {
        assert!(FileResolver.resolve("/nonexistent/secret", None).is_err());
    }
}
