//! Semantic scalar model shared by every source loader.
//!
//! Each declared field has a [`Kind`] describing how raw text (default
//! literals, environment variables) and file-tree nodes convert into its
//! typed [`Value`]. The [`FieldValue`] trait binds concrete Rust field types
//! to a kind with checked conversions in both directions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Semantic type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Int,
    Float,
    Bool,
    Duration,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::String => "string",
            Kind::Int => "integer",
            Kind::Float => "float",
            Kind::Bool => "boolean",
            Kind::Duration => "duration",
        };
        f.write_str(name)
    }
}

/// A typed scalar produced by one of the source loaders.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Duration(Duration),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Duration(d) => f.write_str(&format_duration(*d)),
        }
    }
}

/// A raw value could not be converted to a field's semantic type.
#[derive(Debug, Clone, Error)]
#[error("expected {expected}, got `{found}`")]
pub struct CoerceError {
    /// Human-readable description of the expected type.
    pub expected: String,
    /// The offending input, rendered for the error message.
    pub found: String,
}

impl Kind {
    /// Parse raw text (a default literal or an environment value) into a
    /// typed [`Value`].
    pub fn parse(self, raw: &str) -> Result<Value, CoerceError> {
        let mismatch = || CoerceError {
            expected: self.to_string(),
            found: raw.to_string(),
        };
        match self {
            Kind::String => Ok(Value::String(raw.to_string())),
            Kind::Int => raw.trim().parse::<i64>().map(Value::Int).map_err(|_| mismatch()),
            Kind::Float => raw.trim().parse::<f64>().map(Value::Float).map_err(|_| mismatch()),
            Kind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            Kind::Duration => parse_duration(raw).map(Value::Duration),
        }
    }

    /// Convert a structured-file node into a typed [`Value`].
    pub fn from_toml(self, node: &toml::Value) -> Result<Value, CoerceError> {
        let mismatch = || CoerceError {
            expected: self.to_string(),
            found: format!("{} `{node}`", node.type_str()),
        };
        match (self, node) {
            (Kind::String, toml::Value::String(s)) => Ok(Value::String(s.clone())),
            (Kind::Duration, toml::Value::String(s)) => parse_duration(s).map(Value::Duration),
            (Kind::Int, toml::Value::Integer(i)) => Ok(Value::Int(*i)),
            (Kind::Float, toml::Value::Float(x)) => Ok(Value::Float(*x)),
            (Kind::Float, toml::Value::Integer(i)) => Ok(Value::Float(*i as f64)),
            (Kind::Bool, toml::Value::Boolean(b)) => Ok(Value::Bool(*b)),
            _ => Err(mismatch()),
        }
    }
}

/// Parse a duration literal.
///
/// Supports formats like:
/// - "250ms" -> 250 milliseconds
/// - "30s"   -> 30 seconds
/// - "5m"    -> 5 minutes
/// - "12h"   -> 12 hours
/// - "7d"    -> 7 days
pub fn parse_duration(s: &str) -> Result<Duration, CoerceError> {
    let s = s.trim();
    let err = || CoerceError {
        expected: "duration (e.g. `250ms`, `30s`, `5m`, `12h`, `7d`)".to_string(),
        found: s.to_string(),
    };

    let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(err)?;
    let (num, unit) = s.split_at(split);
    let num: u64 = num.parse().map_err(|_| err())?;

    // Literals come straight from env vars and defaults; an absurdly large
    // count must fail like any other bad literal, not overflow.
    let secs = |per_unit: u64| {
        num.checked_mul(per_unit)
            .map(Duration::from_secs)
            .ok_or_else(err)
    };
    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "m" => secs(60),
        "h" => secs(3_600),
        "d" => secs(86_400),
        _ => Err(err()),
    }
}

/// Render a duration with the largest unit that divides it evenly.
pub(crate) fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }
    if ms % 1_000 != 0 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs();
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Binds a concrete Rust field type to its semantic [`Kind`].
///
/// `store` converts a loader-produced [`Value`] into the field type with
/// range checks; `load` reads the current field back out. `Option` fields
/// load as `None` while unset, which DSN expansion renders as empty text.
pub trait FieldValue: Send + Sync + Sized + 'static {
    const KIND: Kind;

    fn store(value: Value) -> Result<Self, CoerceError>;

    fn load(&self) -> Option<Value>;
}

impl FieldValue for String {
    const KIND: Kind = Kind::String;

    fn store(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(CoerceError {
                expected: "string".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn load(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }
}

impl FieldValue for PathBuf {
    const KIND: Kind = Kind::String;

    fn store(value: Value) -> Result<Self, CoerceError> {
        String::store(value).map(PathBuf::from)
    }

    fn load(&self) -> Option<Value> {
        Some(Value::String(self.display().to_string()))
    }
}

macro_rules! int_field {
    ($($ty:ty),* $(,)?) => {$(
        impl FieldValue for $ty {
            const KIND: Kind = Kind::Int;

            fn store(value: Value) -> Result<Self, CoerceError> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).map_err(|_| CoerceError {
                        expected: stringify!($ty).to_string(),
                        found: i.to_string(),
                    }),
                    other => Err(CoerceError {
                        expected: "integer".to_string(),
                        found: other.to_string(),
                    }),
                }
            }

            fn load(&self) -> Option<Value> {
                i64::try_from(*self).ok().map(Value::Int)
            }
        }
    )*};
}

int_field!(i64, i32, i16, u64, u32, u16, u8, usize);

impl FieldValue for f64 {
    const KIND: Kind = Kind::Float;

    fn store(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Float(x) => Ok(x),
            Value::Int(i) => Ok(i as f64),
            other => Err(CoerceError {
                expected: "float".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn load(&self) -> Option<Value> {
        Some(Value::Float(*self))
    }
}

impl FieldValue for bool {
    const KIND: Kind = Kind::Bool;

    fn store(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(CoerceError {
                expected: "boolean".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn load(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

impl FieldValue for Duration {
    const KIND: Kind = Kind::Duration;

    fn store(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Duration(d) => Ok(d),
            other => Err(CoerceError {
                expected: "duration".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn load(&self) -> Option<Value> {
        Some(Value::Duration(*self))
    }
}

impl<F: FieldValue> FieldValue for Option<F> {
    const KIND: Kind = F::KIND;

    fn store(value: Value) -> Result<Self, CoerceError> {
        F::store(value).map(Some)
    }

    fn load(&self) -> Option<Value> {
        self.as_ref().and_then(F::load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_literals() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn duration_literal_rejects_missing_or_unknown_unit() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("30w").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn duration_literal_rejects_overflowing_counts() {
        assert!(parse_duration("500000000000000000m").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
    }

    #[test]
    fn duration_display_round_trips() {
        for raw in ["250ms", "30s", "5m", "12h", "7d"] {
            let d = parse_duration(raw).unwrap();
            assert_eq!(format_duration(d), raw);
        }
    }

    #[test]
    fn kind_parses_scalars() {
        assert_eq!(Kind::Int.parse("42").unwrap(), Value::Int(42));
        assert_eq!(Kind::Bool.parse("yes").unwrap(), Value::Bool(true));
        assert_eq!(Kind::Bool.parse("0").unwrap(), Value::Bool(false));
        assert_eq!(
            Kind::String.parse("hello").unwrap(),
            Value::String("hello".to_string())
        );
        assert!(Kind::Int.parse("forty-two").is_err());
        assert!(Kind::Bool.parse("maybe").is_err());
    }

    #[test]
    fn toml_nodes_convert_by_kind() {
        let node = toml::Value::Integer(9);
        assert_eq!(Kind::Int.from_toml(&node).unwrap(), Value::Int(9));
        assert_eq!(Kind::Float.from_toml(&node).unwrap(), Value::Float(9.0));

        let node = toml::Value::String("90s".to_string());
        assert_eq!(
            Kind::Duration.from_toml(&node).unwrap(),
            Value::Duration(Duration::from_secs(90))
        );

        let err = Kind::Int.from_toml(&toml::Value::Boolean(true)).unwrap_err();
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn int_fields_range_check() {
        assert!(u16::store(Value::Int(70_000)).is_err());
        assert!(u64::store(Value::Int(-1)).is_err());
        assert_eq!(u16::store(Value::Int(8080)).unwrap(), 8080);
    }

    #[test]
    fn option_fields_load_as_unset() {
        let unset: Option<String> = None;
        assert_eq!(unset.load(), None);
        let set = Some("x".to_string());
        assert_eq!(set.load(), Some(Value::String("x".to_string())));
    }
}
