//! Declaration-time construction and validation of schemas.

use super::{Binding, Described, FieldDescriptor, Schema};
use crate::dsn::{self, PlaceholderKind, Segment};
use crate::error::SchemaError;
use crate::pipeline::Section;
use crate::value::FieldValue;
use std::collections::BTreeSet;

/// Collects field declarations for one type.
///
/// Obtained inside [`Described::describe`]; each `scalar`/`nested` call adds
/// one descriptor and returns a [`FieldRule`] for chaining the optional
/// markers.
pub struct SchemaBuilder<T> {
    type_name: &'static str,
    fields: Vec<FieldDescriptor<T>>,
}

impl<T: Described> SchemaBuilder<T> {
    pub(crate) fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
        }
    }

    /// Declare a scalar field. The source key defaults to `name`; override
    /// it with [`FieldRule::key`].
    pub fn scalar<F: FieldValue>(
        &mut self,
        name: &'static str,
        load: fn(&T) -> &F,
        store: fn(&mut T) -> &mut F,
    ) -> FieldRule<'_, T> {
        let descriptor = FieldDescriptor {
            name,
            key: name,
            env: None,
            default: None,
            dsn: None,
            rule: None,
            binding: Binding::Scalar {
                kind: F::KIND,
                store: Box::new(move |target, value| {
                    *store(target) = F::store(value)?;
                    Ok(())
                }),
                load: Box::new(move |target| load(target).load()),
            },
        };
        self.push(descriptor)
    }

    /// Declare a nested section; its own descriptors come from the nested
    /// type's [`Described`] impl and are merged recursively.
    pub fn nested<N: Described>(
        &mut self,
        name: &'static str,
        view: fn(&T) -> &N,
        project: fn(&mut T) -> &mut N,
    ) -> FieldRule<'_, T> {
        let descriptor = FieldDescriptor {
            name,
            key: name,
            env: None,
            default: None,
            dsn: None,
            rule: None,
            binding: Binding::Nested {
                project: Box::new(move |target| project(target) as &mut dyn Section),
                view: Box::new(move |target| view(target) as &dyn Section),
            },
        };
        self.push(descriptor)
    }

    fn push(&mut self, descriptor: FieldDescriptor<T>) -> FieldRule<'_, T> {
        self.fields.push(descriptor);
        let last = self.fields.len() - 1;
        FieldRule {
            field: &mut self.fields[last],
        }
    }

    pub(crate) fn finish(self) -> Result<Schema<T>, SchemaError> {
        let type_name = self.type_name;
        let mut keys = BTreeSet::new();

        for field in &self.fields {
            if !keys.insert(field.key) {
                return Err(SchemaError::DuplicateKey {
                    type_name,
                    key: field.key,
                });
            }
            if field.default.is_some() && field.dsn.is_some() {
                return Err(SchemaError::DefaultOnDsn {
                    type_name,
                    field: field.name,
                });
            }
            match &field.binding {
                Binding::Nested { .. } => {
                    if field.env.is_some() || field.default.is_some() || field.dsn.is_some() {
                        return Err(SchemaError::MarkerOnNested {
                            type_name,
                            field: field.name,
                        });
                    }
                }
                Binding::Scalar { kind, .. } => {
                    if field.dsn.is_some() && *kind != crate::value::Kind::String {
                        return Err(SchemaError::DsnOnNonString {
                            type_name,
                            field: field.name,
                        });
                    }
                }
            }
            if let Some(template) = field.dsn {
                self.check_template(field.name, template)?;
            }
        }

        Ok(Schema {
            type_name,
            fields: self.fields,
        })
    }

    /// Validate a DSN template against this structure's own fields: the
    /// first path segment of every field reference must name a sibling, and
    /// that sibling may not itself be a DSN field.
    fn check_template(&self, field: &'static str, template: &str) -> Result<(), SchemaError> {
        let segments = dsn::scan(template).map_err(|e| SchemaError::Placeholder {
            type_name: self.type_name,
            field,
            detail: e.to_string(),
        })?;
        for segment in segments {
            let Segment::Placeholder { kind, .. } = segment else {
                continue;
            };
            let PlaceholderKind::Field(reference) = kind else {
                continue;
            };
            let head = reference.split('.').next().unwrap_or(reference);
            match self.fields.iter().find(|f| f.name == head) {
                None => {
                    return Err(SchemaError::UnknownReference {
                        type_name: self.type_name,
                        field,
                        reference: reference.to_string(),
                    });
                }
                Some(target) if target.dsn.is_some() => {
                    return Err(SchemaError::ReferenceToDsn {
                        type_name: self.type_name,
                        field,
                        reference: reference.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Chainable markers for the field just declared.
pub struct FieldRule<'a, T> {
    field: &'a mut FieldDescriptor<T>,
}

impl<'a, T> FieldRule<'a, T> {
    /// Override the structured-file source key (defaults to the field name).
    pub fn key(self, key: &'static str) -> Self {
        self.field.key = key;
        self
    }

    /// Environment variable read for this field. An optional loader-wide
    /// prefix is prepended before lookup.
    pub fn env(self, var: &'static str) -> Self {
        self.field.env = Some(var);
        self
    }

    /// Default literal, parsed into the field's semantic type.
    pub fn default(self, literal: &'static str) -> Self {
        self.field.default = Some(literal);
        self
    }

    /// DSN template expanded after merge and populate hooks.
    pub fn dsn(self, template: &'static str) -> Self {
        self.field.dsn = Some(template);
        self
    }

    /// Opaque validation directive handed to the rule engine.
    pub fn rule(self, directive: &'static str) -> Self {
        self.field.rule = Some(directive);
        self
    }
}
