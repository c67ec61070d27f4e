//! Explicit per-type schemas.
//!
//! Instead of inspecting struct attributes at runtime, each configurable
//! type declares its field-descriptor table once through [`Described`]. The
//! table records, per field, the file source key, the optional default
//! literal, the optional environment variable name, the optional DSN
//! template and the optional validation directive, plus typed accessors
//! binding the descriptor to the concrete struct field.
//!
//! Built schemas are validated and then cached process-wide by type
//! identity; repeated [`Schema::of`] calls share one instance and never
//! re-walk the declaration.

mod builder;
mod registry;

pub use builder::{FieldRule, SchemaBuilder};

use crate::error::SchemaError;
use crate::pipeline::Section;
use crate::value::{CoerceError, Kind, Value};
use std::sync::Arc;

/// A type resolvable by the configuration pipeline.
pub trait Described: Default + Send + Sync + 'static {
    /// Declare the field-descriptor table for this type.
    fn describe(schema: &mut SchemaBuilder<Self>);

    /// Hook filling values no source provided, called after all overlays
    /// merge and before DSN expansion, innermost section first.
    ///
    /// Implementations are expected to be idempotent and to only touch
    /// fields still at their zero value. The default body does nothing;
    /// overriding it is how a type opts into the capability.
    fn populate(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) type StoreFn<T> = Box<dyn Fn(&mut T, Value) -> Result<(), CoerceError> + Send + Sync>;
pub(crate) type LoadFn<T> = Box<dyn Fn(&T) -> Option<Value> + Send + Sync>;
pub(crate) type ProjectFn<T> = Box<dyn Fn(&mut T) -> &mut (dyn Section) + Send + Sync>;
pub(crate) type ViewFn<T> = Box<dyn Fn(&T) -> &(dyn Section) + Send + Sync>;

/// How a descriptor attaches to the target struct.
pub(crate) enum Binding<T> {
    Scalar {
        kind: Kind,
        store: StoreFn<T>,
        load: LoadFn<T>,
    },
    Nested {
        project: ProjectFn<T>,
        view: ViewFn<T>,
    },
}

/// One declared field of a configurable type.
pub struct FieldDescriptor<T> {
    pub(crate) name: &'static str,
    pub(crate) key: &'static str,
    pub(crate) env: Option<&'static str>,
    pub(crate) default: Option<&'static str>,
    pub(crate) dsn: Option<&'static str>,
    pub(crate) rule: Option<&'static str>,
    pub(crate) binding: Binding<T>,
}

/// The immutable field-descriptor table of one type.
pub struct Schema<T> {
    pub(crate) type_name: &'static str,
    pub(crate) fields: Vec<FieldDescriptor<T>>,
}

impl<T: Described> Schema<T> {
    /// Fetch the cached schema for `T`, building and validating it on first
    /// use. Deterministic: repeated calls return an equivalent schema (the
    /// same shared instance) without re-walking the declaration.
    pub fn of() -> Result<Arc<Schema<T>>, SchemaError> {
        registry::schema_of::<T>()
    }

    pub(crate) fn build() -> Result<Schema<T>, SchemaError> {
        let mut builder = SchemaBuilder::new(std::any::type_name::<T>());
        T::describe(&mut builder);
        builder.finish()
    }

    /// Number of declared fields at this nesting level.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}
