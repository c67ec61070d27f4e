//! One-shot resolution pipeline.
//!
//! [`Loader::load`] runs the fixed stage order: schema check (before any
//! I/O), environment capture + dotenv overlay, file read, optional template
//! render, structured parse, then the per-field walks — defaults, file
//! tree, environment — followed by populate hooks (innermost first), DSN
//! expansion and validation. Each stage may short-circuit the whole run;
//! on failure no partially populated value ever reaches the caller.
//!
//! Merge precedence is defaults < file < environment, and a layer only
//! overwrites fields it explicitly sets: an unset (or empty) environment
//! variable never blanks a value the file layer provided.

use crate::dsn::{self, ResolverRegistry};
use crate::error::ConfigError;
use crate::schema::{Binding, Described, Schema};
use crate::sources::{dotenv, env::EnvMap, file};
use crate::template;
use crate::validate::{NoRules, RuleEngine, Violation};
use crate::value::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Explicit configuration record for a [`Loader`].
///
/// All fields are optional; the empty record resolves from defaults and the
/// process environment alone. Validated once by [`Loader::new`], not per
/// call.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Structured configuration file, if any.
    pub file: Option<PathBuf>,
    /// Fail resolution when `file` does not exist. Without this flag a
    /// missing file simply contributes no overlay.
    pub file_required: bool,
    /// Dotenv overlay files, applied in order; later files overwrite
    /// earlier ones. Missing files are skipped.
    pub dotenv: Vec<PathBuf>,
    /// Let dotenv values overwrite variables already present in the live
    /// process environment.
    pub dotenv_override: bool,
    /// Prefix prepended to every declared environment variable name.
    pub env_prefix: Option<String>,
    /// Data value rendered into the file text before parsing.
    pub template_data: Option<serde_json::Value>,
    /// `ref:` scheme resolvers consulted during DSN expansion.
    pub resolvers: ResolverRegistry,
    /// Validation collaborator; defaults to accepting everything.
    pub rules: Arc<dyn RuleEngine>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            file: None,
            file_required: false,
            dotenv: Vec::new(),
            dotenv_override: false,
            env_prefix: None,
            template_data: None,
            resolvers: ResolverRegistry::standard(),
            rules: Arc::new(NoRules),
        }
    }
}

/// One-shot configuration resolver.
#[derive(Clone)]
pub struct Loader {
    options: LoaderOptions,
}

impl Loader {
    /// Validate the options record once and build a loader.
    pub fn new(options: LoaderOptions) -> Result<Self, ConfigError> {
        if options.file_required && options.file.is_none() {
            return Err(ConfigError::Options(
                "file_required set without a file path".to_string(),
            ));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Resolve one fully populated, validated `T`.
    pub fn load<T: Described>(&self) -> Result<T, ConfigError> {
        // Schema problems fail fast, before any source is touched.
        Schema::<T>::of()?;

        let mut env = EnvMap::capture();
        dotenv::apply(&mut env, &self.options.dotenv, self.options.dotenv_override)?;

        let tree = match &self.options.file {
            Some(path) => match file::read(path, self.options.file_required)? {
                Some(text) => {
                    let text = match &self.options.template_data {
                        Some(data) => template::render(&text, data)?,
                        None => text,
                    };
                    debug!("loaded configuration file {}", path.display());
                    Some(file::parse(&text)?)
                }
                None => None,
            },
            None => None,
        };

        let env_prefix = self.options.env_prefix.as_deref().unwrap_or("");

        let mut target = T::default();
        let section: &mut dyn Section = &mut target;
        section.apply_defaults("")?;
        if let Some(tree) = &tree {
            section.apply_tree(tree, "")?;
        }
        section.apply_env(&env, env_prefix, "")?;
        section.run_populate("")?;
        section.expand_dsn(&env, &self.options.resolvers, "")?;

        let mut violations = Vec::new();
        section.check_rules(self.options.rules.as_ref(), "", &mut violations);
        if !violations.is_empty() {
            return Err(ConfigError::Validation(violations));
        }

        Ok(target)
    }
}

/// Object-safe walking facade over one configurable structure.
///
/// Blanket-implemented for every [`Described`] type; nested sections are
/// reached through descriptor projections, so each operation recurses with
/// the nested type's own schema. Not intended for manual implementation.
pub trait Section: Send + Sync {
    fn apply_defaults(&mut self, prefix: &str) -> Result<(), ConfigError>;

    fn apply_tree(&mut self, tree: &toml::Table, prefix: &str) -> Result<(), ConfigError>;

    fn apply_env(&mut self, env: &EnvMap, env_prefix: &str, prefix: &str)
    -> Result<(), ConfigError>;

    fn run_populate(&mut self, prefix: &str) -> Result<(), ConfigError>;

    fn expand_dsn(
        &mut self,
        env: &EnvMap,
        resolvers: &ResolverRegistry,
        prefix: &str,
    ) -> Result<(), ConfigError>;

    fn collect_fields(&self, prefix: &str, out: &mut BTreeMap<String, String>);

    fn check_rules(&self, engine: &dyn RuleEngine, prefix: &str, out: &mut Vec<Violation>);
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

impl<T: Described> Section for T {
    fn apply_defaults(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let schema = Schema::<T>::of()?;
        for field in &schema.fields {
            match &field.binding {
                Binding::Scalar { kind, store, .. } => {
                    let Some(literal) = field.default else {
                        continue;
                    };
                    let path = join(prefix, field.name);
                    let value = kind.parse(literal).map_err(|source| ConfigError::Parse {
                        field: path.clone(),
                        source,
                    })?;
                    store(&mut *self, value)
                        .map_err(|source| ConfigError::Parse { field: path, source })?;
                }
                Binding::Nested { project, .. } => {
                    project(&mut *self).apply_defaults(&join(prefix, field.name))?;
                }
            }
        }
        Ok(())
    }

    fn apply_tree(&mut self, tree: &toml::Table, prefix: &str) -> Result<(), ConfigError> {
        let schema = Schema::<T>::of()?;
        for field in &schema.fields {
            let Some(node) = tree.get(field.key) else {
                continue;
            };
            let path = join(prefix, field.name);
            match &field.binding {
                Binding::Scalar { kind, store, .. } => {
                    let value = kind.from_toml(node).map_err(|source| ConfigError::Parse {
                        field: path.clone(),
                        source,
                    })?;
                    store(&mut *self, value)
                        .map_err(|source| ConfigError::Parse { field: path, source })?;
                }
                Binding::Nested { project, .. } => {
                    let Some(table) = node.as_table() else {
                        return Err(ConfigError::Parse {
                            field: path,
                            source: crate::value::CoerceError {
                                expected: "table".to_string(),
                                found: node.type_str().to_string(),
                            },
                        });
                    };
                    project(&mut *self).apply_tree(table, &path)?;
                }
            }
        }
        Ok(())
    }

    fn apply_env(
        &mut self,
        env: &EnvMap,
        env_prefix: &str,
        prefix: &str,
    ) -> Result<(), ConfigError> {
        let schema = Schema::<T>::of()?;
        for field in &schema.fields {
            match &field.binding {
                Binding::Scalar { kind, store, .. } => {
                    let Some(name) = field.env else {
                        continue;
                    };
                    let var = format!("{env_prefix}{name}");
                    let Some(raw) = env.get(&var) else {
                        continue;
                    };
                    // An empty variable never counts as "set"; it must not
                    // blank a value an earlier layer provided.
                    if raw.is_empty() {
                        continue;
                    }
                    let path = join(prefix, field.name);
                    let value = kind.parse(raw).map_err(|source| ConfigError::Parse {
                        field: path.clone(),
                        source,
                    })?;
                    store(&mut *self, value)
                        .map_err(|source| ConfigError::Parse { field: path, source })?;
                }
                Binding::Nested { project, .. } => {
                    project(&mut *self).apply_env(env, env_prefix, &join(prefix, field.name))?;
                }
            }
        }
        Ok(())
    }

    fn run_populate(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let schema = Schema::<T>::of()?;
        // Innermost first: nested computed values must be visible to this
        // structure's own hook.
        for field in &schema.fields {
            if let Binding::Nested { project, .. } = &field.binding {
                project(&mut *self).run_populate(&join(prefix, field.name))?;
            }
        }
        self.populate().map_err(|cause| ConfigError::Populate {
            scope: if prefix.is_empty() {
                schema.type_name.to_string()
            } else {
                prefix.to_string()
            },
            cause,
        })
    }

    fn expand_dsn(
        &mut self,
        env: &EnvMap,
        resolvers: &ResolverRegistry,
        prefix: &str,
    ) -> Result<(), ConfigError> {
        let schema = Schema::<T>::of()?;
        for field in &schema.fields {
            if let Binding::Nested { project, .. } = &field.binding {
                project(&mut *self).expand_dsn(env, resolvers, &join(prefix, field.name))?;
            }
        }
        if !schema.fields.iter().any(|f| f.dsn.is_some()) {
            return Ok(());
        }

        // Field references resolve against this structure's own finalized
        // fields, addressed by relative dotted paths. DSN fields are
        // excluded: only non-DSN fields are guaranteed final here.
        let mut table = BTreeMap::new();
        self.collect_fields("", &mut table);

        for field in &schema.fields {
            let Binding::Scalar { store, .. } = &field.binding else {
                continue;
            };
            let Some(template) = field.dsn else {
                continue;
            };
            let path = join(prefix, field.name);
            let expanded = dsn::expand(template, &table, env, resolvers).map_err(|e| {
                ConfigError::Resolution {
                    field: path.clone(),
                    placeholder: e.placeholder,
                    reason: e.error.to_string(),
                }
            })?;
            store(&mut *self, Value::String(expanded))
                .map_err(|source| ConfigError::Parse { field: path, source })?;
        }
        Ok(())
    }

    fn collect_fields(&self, prefix: &str, out: &mut BTreeMap<String, String>) {
        let Ok(schema) = Schema::<T>::of() else {
            return;
        };
        for field in &schema.fields {
            match &field.binding {
                Binding::Scalar { load, .. } => {
                    if field.dsn.is_some() {
                        continue;
                    }
                    let rendered = load(self).map(|v| v.to_string()).unwrap_or_default();
                    out.insert(join(prefix, field.name), rendered);
                }
                Binding::Nested { view, .. } => {
                    view(self).collect_fields(&join(prefix, field.name), out);
                }
            }
        }
    }

    fn check_rules(&self, engine: &dyn RuleEngine, prefix: &str, out: &mut Vec<Violation>) {
        let Ok(schema) = Schema::<T>::of() else {
            return;
        };
        for field in &schema.fields {
            match &field.binding {
                Binding::Scalar { load, .. } => {
                    let Some(directive) = field.rule else {
                        continue;
                    };
                    let value = load(self);
                    out.extend(engine.check(&join(prefix, field.name), directive, value.as_ref()));
                }
                Binding::Nested { view, .. } => {
                    view(self).check_rules(engine, &join(prefix, field.name), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_paths_are_dotted() {
        assert_eq!(join("", "host"), "host");
        assert_eq!(join("database", "host"), "database.host");
        assert_eq!(join("database.pool", "size"), "database.pool.size");
    }

    #[test]
    fn required_file_demands_a_path() {
        let options = LoaderOptions {
            file_required: true,
            ..LoaderOptions::default()
        };
        assert!(matches!(
            Loader::new(options),
            Err(ConfigError::Options(_))
        ));
    }
}
