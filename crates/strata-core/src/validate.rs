//! Validation contract.
//!
//! The rule grammar belongs to the engine, not to this crate: descriptors
//! carry an opaque directive string and the pipeline hands each
//! directive-carrying field to the engine after the object is fully
//! populated. All violations are collected before the resolution fails, so
//! callers can render the complete list.

use crate::value::Value;
use std::fmt;

/// One field-level rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Field-level validation collaborator.
pub trait RuleEngine: Send + Sync {
    /// Check one finalized field against its directive. `value` is `None`
    /// for unset optional fields.
    fn check(&self, field: &str, directive: &str, value: Option<&Value>) -> Vec<Violation>;
}

/// Engine that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

impl RuleEngine for NoRules {
    fn check(&self, _field: &str, _directive: &str, _value: Option<&Value>) -> Vec<Violation> {
        Vec::new()
    }
}
