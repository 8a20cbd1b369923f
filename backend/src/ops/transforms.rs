//! Record transform factories.
//!
//! A transform consumes an owned record and returns the new record. Transforms
//! that only apply to one value type leave the record unchanged when the field
//! is missing or has another type, and report why in [`Transformed::diagnostic`].

use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::models::{Record, Value};

/// Output of a transform applied to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub record: Record,
    /// Set when the transform was a no-op on this record.
    pub diagnostic: Option<String>,
}

impl Transformed {
    pub fn applied(record: Record) -> Self {
        Self { record, diagnostic: None }
    }

    pub fn skipped(record: Record, reason: impl Into<String>) -> Self {
        Self { record, diagnostic: Some(reason.into()) }
    }
}

/// A compiled record transform.
pub type RecordTransform = Arc<dyn Fn(Record) -> Transformed + Send + Sync>;

fn transform<F>(f: F) -> RecordTransform
where
    F: Fn(Record) -> Transformed + Send + Sync + 'static,
{
    Arc::new(f)
}

fn missing(field: &str) -> String {
    format!("field '{}' is missing", field)
}

fn wrong_type(field: &str, value: &Value, expected: &str) -> String {
    format!("field '{}' is {}, expected {}", field, value.type_name(), expected)
}

// =============================================================================
// Field structure
// =============================================================================

pub fn add_field(field: impl Into<String>, value: Value) -> RecordTransform {
    let field = field.into();
    transform(move |record| Transformed::applied(record.with(field.clone(), value.clone())))
}

pub fn remove_field(field: impl Into<String>) -> RecordTransform {
    let field = field.into();
    transform(move |mut record| {
        record.remove(&field);
        Transformed::applied(record)
    })
}

pub fn rename_field(old_name: impl Into<String>, new_name: impl Into<String>) -> RecordTransform {
    let (old_name, new_name) = (old_name.into(), new_name.into());
    transform(move |mut record| match record.remove(&old_name) {
        Some(value) => {
            record.insert(new_name.clone(), value);
            Transformed::applied(record)
        }
        None => Transformed::skipped(record, missing(&old_name)),
    })
}

/// Keep only the listed fields, in record order.
pub fn select_fields(fields: Vec<String>) -> RecordTransform {
    let keep: HashSet<String> = fields.into_iter().collect();
    transform(move |mut record| {
        record.retain(|k| keep.contains(k));
        Transformed::applied(record)
    })
}

pub fn exclude_fields(fields: Vec<String>) -> RecordTransform {
    let drop: HashSet<String> = fields.into_iter().collect();
    transform(move |mut record| {
        record.retain(|k| !drop.contains(k));
        Transformed::applied(record)
    })
}

// =============================================================================
// String transforms
// =============================================================================

/// Rewrite a string field; anything else is reported and left as is.
fn map_string<F>(field: String, f: F) -> RecordTransform
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    transform(move |mut record| {
        let reason = match record.get_mut(&field) {
            Some(Value::String(s)) => {
                *s = f(s);
                None
            }
            Some(other) => Some(wrong_type(&field, other, "string")),
            None => Some(missing(&field)),
        };
        match reason {
            None => Transformed::applied(record),
            Some(reason) => Transformed::skipped(record, reason),
        }
    })
}

pub fn upper_field(field: impl Into<String>) -> RecordTransform {
    map_string(field.into(), str::to_uppercase)
}

pub fn lower_field(field: impl Into<String>) -> RecordTransform {
    map_string(field.into(), str::to_lowercase)
}

pub fn strip_field(field: impl Into<String>) -> RecordTransform {
    map_string(field.into(), |s| s.trim().to_string())
}

/// First character upper case, the rest lower case.
pub fn capitalize_field(field: impl Into<String>) -> RecordTransform {
    map_string(field.into(), |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
            None => String::new(),
        }
    })
}

pub fn replace_in_field(
    field: impl Into<String>,
    old: &str,
    new: impl Into<String>,
    case_sensitive: bool,
) -> Result<RecordTransform, ConfigurationError> {
    let new = new.into();
    if case_sensitive {
        let old = old.to_string();
        return Ok(map_string(field.into(), move |s| s.replace(&old, &new)));
    }
    let re = RegexBuilder::new(&regex::escape(old))
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigurationError::InvalidArgument(e.to_string()))?;
    Ok(map_string(field.into(), move |s| {
        re.replace_all(s, regex::NoExpand(&new)).into_owned()
    }))
}

/// Copy a regex match (or one of its groups) into `target_field`.
pub fn extract_regex_field(
    source_field: impl Into<String>,
    target_field: impl Into<String>,
    pattern: &str,
    group: usize,
) -> Result<RecordTransform, ConfigurationError> {
    let re = Regex::new(pattern)
        .map_err(|e| ConfigurationError::InvalidArgument(format!("Invalid regex '{}': {}", pattern, e)))?;
    if group >= re.captures_len() {
        return Err(ConfigurationError::InvalidArgument(format!(
            "Pattern '{}' has no group {}",
            pattern, group
        )));
    }
    let (source, target) = (source_field.into(), target_field.into());
    Ok(transform(move |mut record| {
        let extracted = match record.get(&source) {
            Some(Value::String(s)) => re
                .captures(s)
                .and_then(|caps| caps.get(group))
                .map(|m| m.as_str().to_string()),
            Some(other) => {
                let reason = wrong_type(&source, other, "string");
                return Transformed::skipped(record, reason);
            }
            None => return Transformed::skipped(record, missing(&source)),
        };
        if let Some(value) = extracted {
            record.insert(target.clone(), value);
        }
        Transformed::applied(record)
    }))
}

/// Split a string field into several fields; missing parts become "".
pub fn split_field(
    source_field: impl Into<String>,
    target_fields: Vec<String>,
    separator: impl Into<String>,
) -> Result<RecordTransform, ConfigurationError> {
    let separator = separator.into();
    if separator.is_empty() {
        return Err(ConfigurationError::InvalidArgument("separator must not be empty".to_string()));
    }
    let source = source_field.into();
    Ok(transform(move |mut record| {
        let parts: Vec<String> = match record.get(&source) {
            Some(Value::String(s)) => s.split(separator.as_str()).map(str::to_string).collect(),
            Some(other) => {
                let reason = wrong_type(&source, other, "string");
                return Transformed::skipped(record, reason);
            }
            None => return Transformed::skipped(record, missing(&source)),
        };
        for (i, target) in target_fields.iter().enumerate() {
            record.insert(target.clone(), parts.get(i).cloned().unwrap_or_default());
        }
        Transformed::applied(record)
    }))
}

// =============================================================================
// Numeric transforms
// =============================================================================

/// Rewrite a numeric field; anything else is reported and left as is.
fn map_number<F>(field: String, f: F) -> RecordTransform
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    transform(move |mut record| {
        let reason = match record.get_mut(&field) {
            Some(v) if v.is_numeric() => {
                *v = f(v);
                None
            }
            Some(other) => Some(wrong_type(&field, other, "a number")),
            None => Some(missing(&field)),
        };
        match reason {
            None => Transformed::applied(record),
            Some(reason) => Transformed::skipped(record, reason),
        }
    })
}

/// Integer arithmetic stays integer unless it overflows.
fn arithmetic(a: &Value, b: &Value, int_op: fn(i64, i64) -> Option<i64>, real_op: fn(f64, f64) -> f64) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => int_op(*x, *y)
            .map(Value::Integer)
            .unwrap_or_else(|| Value::Real(real_op(*x as f64, *y as f64))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Value::Real(real_op(x, y)),
            _ => a.clone(),
        },
    }
}

pub fn multiply_field(field: impl Into<String>, factor: Value) -> RecordTransform {
    map_number(field.into(), move |v| arithmetic(v, &factor, i64::checked_mul, |x, y| x * y))
}

pub fn add_to_field(field: impl Into<String>, amount: Value) -> RecordTransform {
    map_number(field.into(), move |v| arithmetic(v, &amount, i64::checked_add, |x, y| x + y))
}

/// Digits past this many decimals are below f64 precision.
const MAX_ROUND_DECIMALS: u32 = 17;

/// Round reals half-to-even; integers are already round. Values whose
/// scaled form would overflow are kept as they are.
pub fn round_field(field: impl Into<String>, decimals: u32) -> RecordTransform {
    let scale = 10f64.powi(decimals.min(MAX_ROUND_DECIMALS) as i32);
    map_number(field.into(), move |v| match v {
        Value::Real(r) if decimals < MAX_ROUND_DECIMALS && (r * scale).is_finite() => {
            Value::Real((r * scale).round_ties_even() / scale)
        }
        other => other.clone(),
    })
}

// =============================================================================
// Casting
// =============================================================================

/// Target type of [`cast_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    Int,
    Float,
    Str,
    Bool,
}

impl FromStr for CastTarget {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(CastTarget::Int),
            "float" => Ok(CastTarget::Float),
            "str" => Ok(CastTarget::Str),
            "bool" => Ok(CastTarget::Bool),
            other => Err(ConfigurationError::InvalidArgument(format!(
                "Unknown cast target '{}' (expected int, float, str or bool)",
                other
            ))),
        }
    }
}

impl CastTarget {
    pub fn name(self) -> &'static str {
        match self {
            CastTarget::Int => "int",
            CastTarget::Float => "float",
            CastTarget::Str => "str",
            CastTarget::Bool => "bool",
        }
    }

    /// Convert a value, `None` when the conversion is not possible.
    pub fn convert(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => None,
            (CastTarget::Int, Value::Integer(i)) => Some(Value::Integer(*i)),
            (CastTarget::Int, Value::Real(r)) => {
                let t = r.trunc();
                (t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64).then(|| Value::Integer(t as i64))
            }
            (CastTarget::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),
            (CastTarget::Int, Value::Boolean(b)) => Some(Value::Integer(i64::from(*b))),
            (CastTarget::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::Real),
            (CastTarget::Float, Value::Boolean(b)) => Some(Value::Real(if *b { 1.0 } else { 0.0 })),
            (CastTarget::Float, v) => v.as_f64().map(Value::Real),
            (CastTarget::Str, v) => Some(Value::String(v.to_string())),
            (CastTarget::Bool, Value::Boolean(b)) => Some(Value::Boolean(*b)),
            (CastTarget::Bool, Value::Integer(i)) => Some(Value::Boolean(*i != 0)),
            (CastTarget::Bool, Value::Real(r)) => Some(Value::Boolean(*r != 0.0)),
            (CastTarget::Bool, Value::String(s)) => parse_bool(s).map(Value::Boolean),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "f" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Convert a field; a failed conversion keeps the original value.
pub fn cast_field(field: impl Into<String>, target: CastTarget) -> RecordTransform {
    let field = field.into();
    transform(move |mut record| {
        let reason = match record.get_mut(&field) {
            Some(v) => match target.convert(v) {
                Some(converted) => {
                    *v = converted;
                    None
                }
                None => Some(format!("cannot cast field '{}' ({}) to {}", field, v.type_name(), target.name())),
            },
            None => Some(missing(&field)),
        };
        match reason {
            None => Transformed::applied(record),
            Some(reason) => Transformed::skipped(record, reason),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new()
            .with("name", "  alice SMITH ")
            .with("age", 30)
            .with("salary", 50000)
            .with("score", 2.675)
    }

    #[test]
    fn test_field_structure_transforms() {
        let out = add_field("status", Value::from("active"))(sample()).record;
        assert_eq!(out.value("status"), &Value::from("active"));

        let out = remove_field("age")(sample()).record;
        assert!(!out.contains("age"));

        let out = rename_field("age", "years")(sample());
        assert!(out.diagnostic.is_none());
        assert_eq!(out.record.value("years"), &Value::from(30));
        assert!(!out.record.contains("age"));

        let out = rename_field("missing", "x")(sample());
        assert_eq!(out.diagnostic.as_deref(), Some("field 'missing' is missing"));
    }

    #[test]
    fn test_select_and_exclude_keep_record_order() {
        let out = select_fields(vec!["salary".into(), "name".into()])(sample()).record;
        assert_eq!(out.fields().collect::<Vec<_>>(), vec!["name", "salary"]);
        let out = exclude_fields(vec!["name".into(), "score".into()])(sample()).record;
        assert_eq!(out.fields().collect::<Vec<_>>(), vec!["age", "salary"]);
    }

    #[test]
    fn test_string_transforms() {
        let out = strip_field("name")(sample()).record;
        assert_eq!(out.value("name"), &Value::from("alice SMITH"));
        let out = capitalize_field("name")(strip_field("name")(sample()).record).record;
        assert_eq!(out.value("name"), &Value::from("Alice smith"));
        let out = upper_field("name")(sample()).record;
        assert_eq!(out.value("name"), &Value::from("  ALICE SMITH "));
    }

    #[test]
    fn test_upper_is_idempotent() {
        let once = upper_field("name")(sample()).record;
        let twice = upper_field("name")(once.clone()).record;
        assert_eq!(once, twice);
    }

    #[test]
    fn test_string_transform_on_number_is_reported_noop() {
        let out = upper_field("age")(sample());
        assert_eq!(out.record, sample());
        assert_eq!(out.diagnostic.as_deref(), Some("field 'age' is integer, expected string"));
    }

    #[test]
    fn test_replace_case_insensitive() {
        let t = replace_in_field("name", "SMITH", "Jones", false).unwrap();
        assert_eq!(t(sample()).record.value("name"), &Value::from("  alice Jones "));
        let t = replace_in_field("name", "SMITH", "$1", false).unwrap();
        assert_eq!(t(sample()).record.value("name"), &Value::from("  alice $1 "));
    }

    #[test]
    fn test_numeric_transforms_keep_integer_typing() {
        let out = multiply_field("salary", Value::from(2))(sample()).record;
        assert_eq!(out.value("salary"), &Value::Integer(100000));
        let out = multiply_field("salary", Value::from(1.1))(sample()).record;
        let scaled = out.value("salary").as_f64().unwrap();
        assert!((scaled - 55000.0).abs() < 1e-6);
        let out = add_to_field("age", Value::from(1))(sample()).record;
        assert_eq!(out.value("age"), &Value::Integer(31));
        let out = multiply_field("name", Value::from(2))(sample());
        assert!(out.diagnostic.is_some());
    }

    #[test]
    fn test_round_field() {
        let out = round_field("score", 1)(Record::new().with("score", 2.25)).record;
        assert_eq!(out.value("score"), &Value::Real(2.2));
        let out = round_field("age", 2)(sample()).record;
        assert_eq!(out.value("age"), &Value::Integer(30));
    }

    #[test]
    fn test_round_field_with_huge_precision_keeps_value() {
        for decimals in [17, 400, u32::MAX] {
            let out = round_field("x", decimals)(Record::new().with("x", 2.5)).record;
            assert_eq!(out.value("x"), &Value::Real(2.5));
        }
        let out = round_field("x", 10)(Record::new().with("x", 1e300)).record;
        assert_eq!(out.value("x"), &Value::Real(1e300));
        let json = serde_json::to_string(&round_field("x", 400)(Record::new().with("x", 0.1)).record).unwrap();
        assert_eq!(json, r#"{"x":0.1}"#);
    }

    #[test]
    fn test_cast_field_preserves_value_on_failure() {
        let record = Record::new().with("n", "42").with("bad", "forty");
        let out = cast_field("n", CastTarget::Int)(record.clone());
        assert_eq!(out.record.value("n"), &Value::Integer(42));
        let out = cast_field("bad", CastTarget::Int)(record.clone());
        assert_eq!(out.record, record);
        assert!(out.diagnostic.unwrap().contains("cannot cast"));
        let out = cast_field("n", CastTarget::Bool)(Record::new().with("n", "yes"));
        assert_eq!(out.record.value("n"), &Value::Boolean(true));
        assert!("decimal".parse::<CastTarget>().is_err());
    }

    #[test]
    fn test_extract_and_split() {
        let record = Record::new().with("email", "bob@example.com").with("full", "Ada Lovelace");
        let t = extract_regex_field("email", "domain", r"@(.+)$", 1).unwrap();
        assert_eq!(t(record.clone()).record.value("domain"), &Value::from("example.com"));
        assert!(extract_regex_field("email", "x", r"@", 1).is_err());

        let t = split_field("full", vec!["first".into(), "last".into(), "middle".into()], " ").unwrap();
        let out = t(record).record;
        assert_eq!(out.value("first"), &Value::from("Ada"));
        assert_eq!(out.value("last"), &Value::from("Lovelace"));
        assert_eq!(out.value("middle"), &Value::from(""));
        assert!(split_field("full", vec![], "").is_err());
    }
}
