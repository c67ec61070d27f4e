//! Layered configuration resolution.
//!
//! This crate resolves one strongly typed configuration value from several
//! partially overlapping sources — schema defaults, a structured TOML file,
//! dotenv overlay files, the process environment — and composes DSN fields
//! from `${...}` placeholders that reference sibling fields, environment
//! variables or pluggable secret resolvers. Precedence is fixed
//! (defaults < file < environment) and additive: a layer only overwrites
//! fields it explicitly sets.
//!
//! Types opt in by declaring an explicit field-descriptor table:
//!
//! ```
//! use strata_core::{Described, Loader, LoaderOptions, SchemaBuilder};
//!
//! #[derive(Debug, Clone, Default)]
//! struct ServerConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! impl Described for ServerConfig {
//!     fn describe(s: &mut SchemaBuilder<Self>) {
//!         s.scalar("host", |c: &Self| &c.host, |c: &mut Self| &mut c.host)
//!             .default("127.0.0.1")
//!             .env("APP_SERVER_HOST");
//!         s.scalar("port", |c: &Self| &c.port, |c: &mut Self| &mut c.port)
//!             .default("8080");
//!     }
//! }
//!
//! # fn main() -> Result<(), strata_core::ConfigError> {
//! let loader = Loader::new(LoaderOptions::default())?;
//! let config: ServerConfig = loader.load()?;
//! assert_eq!(config.port, 8080);
//! # Ok(())
//! # }
//! ```
//!
//! Live reloading on top of this pipeline lives in the `strata-watch`
//! crate.

pub mod dsn;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod sources;
pub mod template;
pub mod validate;
pub mod value;

pub use dsn::{FileResolver, RefResolver, ResolverRegistry};
pub use error::{ConfigError, SchemaError};
pub use pipeline::{Loader, LoaderOptions, Section};
pub use schema::{Described, FieldRule, Schema, SchemaBuilder};
pub use sources::env::EnvMap;
pub use validate::{NoRules, RuleEngine, Violation};
pub use value::{FieldValue, Kind, Value};

// Re-export toml so collaborators can work with the parsed tree type
// without a separate dependency.
pub use toml;
