//! Predicate factories.
//!
//! Every factory takes its configuration and returns a [`Predicate`]; the
//! factories that can reject their arguments return a `Result`.

use regex::RegexBuilder;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{ConfigurationError, EvalError};
use crate::models::{Record, Value};

/// A compiled record predicate.
pub type Predicate = Arc<dyn Fn(&Record) -> Result<bool, EvalError> + Send + Sync>;

fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&Record) -> Result<bool, EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

// =============================================================================
// Comparison
// =============================================================================

/// Field value equals `value`. A missing field reads as null.
pub fn equals(field: impl Into<String>, value: Value) -> Predicate {
    let field = field.into();
    predicate(move |record| Ok(record.value(&field).loose_eq(&value)))
}

pub fn greater_than(field: impl Into<String>, value: Value) -> Predicate {
    ordering(field.into(), value, ">", |o| o == Ordering::Greater)
}

pub fn greater_than_or_equal(field: impl Into<String>, value: Value) -> Predicate {
    ordering(field.into(), value, ">=", |o| o != Ordering::Less)
}

pub fn less_than(field: impl Into<String>, value: Value) -> Predicate {
    ordering(field.into(), value, "<", |o| o == Ordering::Less)
}

pub fn less_than_or_equal(field: impl Into<String>, value: Value) -> Predicate {
    ordering(field.into(), value, "<=", |o| o != Ordering::Greater)
}

/// Missing or null fields never satisfy an ordering comparison; values of
/// different classes are an evaluation error.
fn ordering(
    field: String,
    value: Value,
    symbol: &'static str,
    accept: fn(Ordering) -> bool,
) -> Predicate {
    predicate(move |record| {
        let actual = record.value(&field);
        if actual.is_null() {
            return Ok(false);
        }
        actual
            .compare(&value)
            .map(accept)
            .ok_or_else(|| incomparable(&field, actual, symbol, &value))
    })
}

fn incomparable(field: &str, actual: &Value, symbol: &str, expected: &Value) -> EvalError {
    EvalError::new(format!(
        "cannot evaluate {} {} {} on field '{}' ({} vs {})",
        actual,
        symbol,
        expected,
        field,
        actual.type_name(),
        expected.type_name()
    ))
}

// =============================================================================
// String matching
// =============================================================================

pub fn contains(field: impl Into<String>, substring: impl Into<String>, case_sensitive: bool) -> Predicate {
    string_match(field.into(), substring.into(), case_sensitive, |s, p| s.contains(p))
}

pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>, case_sensitive: bool) -> Predicate {
    string_match(field.into(), prefix.into(), case_sensitive, |s, p| s.starts_with(p))
}

pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>, case_sensitive: bool) -> Predicate {
    string_match(field.into(), suffix.into(), case_sensitive, |s, p| s.ends_with(p))
}

/// Absent or non-string fields do not match.
fn string_match(
    field: String,
    needle: String,
    case_sensitive: bool,
    test: fn(&str, &str) -> bool,
) -> Predicate {
    let needle = if case_sensitive { needle } else { needle.to_lowercase() };
    predicate(move |record| {
        Ok(match record.value(&field).as_str() {
            Some(s) if case_sensitive => test(s, &needle),
            Some(s) => test(&s.to_lowercase(), &needle),
            None => false,
        })
    })
}

/// Regex search against a string field.
pub fn matches_regex(
    field: impl Into<String>,
    pattern: &str,
    case_sensitive: bool,
) -> Result<Predicate, ConfigurationError> {
    let field = field.into();
    let re = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| ConfigurationError::InvalidArgument(format!("Invalid regex '{}': {}", pattern, e)))?;
    Ok(predicate(move |record| {
        Ok(record.value(&field).as_str().is_some_and(|s| re.is_match(s)))
    }))
}

// =============================================================================
// Null checks and membership
// =============================================================================

pub fn is_null(field: impl Into<String>) -> Predicate {
    let field = field.into();
    predicate(move |record| Ok(record.value(&field).is_null()))
}

pub fn is_not_null(field: impl Into<String>) -> Predicate {
    let field = field.into();
    predicate(move |record| Ok(!record.value(&field).is_null()))
}

pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Predicate {
    let field = field.into();
    let set = dedup(values);
    predicate(move |record| {
        let actual = record.value(&field);
        Ok(set.iter().any(|v| v.loose_eq(actual)))
    })
}

pub fn not_in_list(field: impl Into<String>, values: Vec<Value>) -> Predicate {
    negate(in_list(field, values))
}

fn dedup(values: Vec<Value>) -> Vec<Value> {
    let mut set: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !set.iter().any(|v| v.loose_eq(&value)) {
            set.push(value);
        }
    }
    set
}

// =============================================================================
// Range
// =============================================================================

/// Numeric range check. Requires `min < max`.
pub fn between(
    field: impl Into<String>,
    min: f64,
    max: f64,
    inclusive: bool,
) -> Result<Predicate, ConfigurationError> {
    if !(min < max) {
        return Err(ConfigurationError::InvalidArgument(
            "min_val must be less than max_val".to_string(),
        ));
    }
    let field = field.into();
    Ok(predicate(move |record| {
        let actual = record.value(&field);
        if actual.is_null() {
            return Ok(false);
        }
        let x = actual.as_f64().ok_or_else(|| {
            EvalError::new(format!(
                "cannot evaluate range on field '{}': {} is {}, expected a number",
                field,
                actual,
                actual.type_name()
            ))
        })?;
        Ok(if inclusive {
            min <= x && x <= max
        } else {
            min < x && x < max
        })
    }))
}

// =============================================================================
// Logical combinators
// =============================================================================

/// True when every predicate holds. All members are evaluated.
pub fn and_all(predicates: Vec<Predicate>) -> Predicate {
    predicate(move |record| {
        let mut result = true;
        for p in &predicates {
            result &= p(record)?;
        }
        Ok(result)
    })
}

/// True when any predicate holds. All members are evaluated.
pub fn or_any(predicates: Vec<Predicate>) -> Predicate {
    predicate(move |record| {
        let mut result = false;
        for p in &predicates {
            result |= p(record)?;
        }
        Ok(result)
    })
}

pub fn negate(inner: Predicate) -> Predicate {
    predicate(move |record| Ok(!inner(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str, age: i64) -> Record {
        Record::new().with("name", name).with("age", age)
    }

    #[test]
    fn test_ordering_treats_missing_as_unsatisfied() {
        let p = greater_than("age", Value::from(27));
        assert!(p(&person("Alice", 30)).unwrap());
        assert!(!p(&person("Bob", 25)).unwrap());
        assert!(!p(&Record::new().with("name", "Nobody")).unwrap());
        assert!(!p(&Record::new().with("age", Value::Null)).unwrap());
    }

    #[test]
    fn test_ordering_on_mismatched_types_is_an_error() {
        let p = less_than("age", Value::from(30));
        let err = p(&Record::new().with("age", "old")).unwrap_err();
        assert!(err.to_string().contains("string vs integer"));
    }

    #[test]
    fn test_equals_matches_null_for_missing_fields() {
        let p = equals("status", Value::Null);
        assert!(p(&Record::new()).unwrap());
        let p = equals("age", Value::Real(30.0));
        assert!(p(&person("Alice", 30)).unwrap());
    }

    #[test]
    fn test_string_predicates_case_folding() {
        let record = person("Alice Smith", 30);
        assert!(contains("name", "smith", false)(&record).unwrap());
        assert!(!contains("name", "smith", true)(&record).unwrap());
        assert!(starts_with("name", "ALI", false)(&record).unwrap());
        assert!(ends_with("name", "Smith", true)(&record).unwrap());
        // Non-string fields never match
        assert!(!contains("age", "3", true)(&record).unwrap());
    }

    #[test]
    fn test_regex_predicate() {
        let p = matches_regex("email", r"^admin@", false).unwrap();
        assert!(p(&Record::new().with("email", "ADMIN@example.com")).unwrap());
        assert!(!p(&Record::new().with("email", 42)).unwrap());
        assert!(matches_regex("email", "(unclosed", true).is_err());
    }

    #[test]
    fn test_in_list_collapses_duplicates() {
        let p = in_list("age", vec![Value::from(30), Value::from(30), Value::Real(25.0)]);
        assert!(p(&person("Alice", 30)).unwrap());
        assert!(p(&person("Bob", 25)).unwrap());
        assert!(!p(&person("Carol", 40)).unwrap());
        assert!(not_in_list("age", vec![Value::from(40)])(&person("Carol", 30)).unwrap());
    }

    #[test]
    fn test_between_requires_ordered_bounds() {
        assert!(between("age", 10.0, 10.0, true).is_err());
        let inclusive = between("age", 25.0, 30.0, true).unwrap();
        let exclusive = between("age", 25.0, 30.0, false).unwrap();
        assert!(inclusive(&person("Alice", 30)).unwrap());
        assert!(!exclusive(&person("Alice", 30)).unwrap());
        assert!(exclusive(&person("Diana", 28)).unwrap());
    }

    #[test]
    fn test_logical_combinators_are_commutative() {
        let a = greater_than("age", Value::from(20));
        let b = contains("name", "a", false);
        let record = person("Bob", 25);
        let ab = and_all(vec![a.clone(), b.clone()]);
        let ba = and_all(vec![b.clone(), a.clone()]);
        assert_eq!(ab(&record).unwrap(), ba(&record).unwrap());
        let ab = or_any(vec![a.clone(), b.clone()]);
        let ba = or_any(vec![b, a.clone()]);
        assert_eq!(ab(&record).unwrap(), ba(&record).unwrap());
        assert!(!negate(a)(&record).unwrap());
    }
}
