//! Built-in operation catalog.

use serde_json::{json, Value as JsonValue};

use super::{Executor, FieldEffect, OperationDefinition, OperationKind, OperationRegistry, ParamSpec, ParamType, Params};
use crate::error::ConfigurationError;
use crate::models::Value;
use crate::ops::{filters, transforms, CastTarget};

/// Every built-in operation, in catalog order.
pub(super) fn builtins() -> Vec<OperationDefinition> {
    let mut all = comparison_filters();
    all.extend(string_filters());
    all.extend(membership_filters());
    all.extend(logical_filters());
    all.extend(structure_transforms());
    all.extend(string_transforms());
    all.extend(numeric_transforms());
    all.extend(utilities());
    all
}

// =============================================================================
// Parameter access
// =============================================================================

fn get<'a>(p: &'a Params, key: &str) -> Result<&'a JsonValue, ConfigurationError> {
    p.get(key)
        .ok_or_else(|| ConfigurationError::InvalidArgument(format!("missing parameter '{}'", key)))
}

fn invalid(key: &str, expected: &str) -> ConfigurationError {
    ConfigurationError::InvalidArgument(format!("parameter '{}' must be {}", key, expected))
}

fn text(p: &Params, key: &str) -> Result<String, ConfigurationError> {
    get(p, key)?.as_str().map(str::to_string).ok_or_else(|| invalid(key, "a string"))
}

fn flag(p: &Params, key: &str) -> Result<bool, ConfigurationError> {
    get(p, key)?.as_bool().ok_or_else(|| invalid(key, "a boolean"))
}

fn scalar(p: &Params, key: &str) -> Result<Value, ConfigurationError> {
    get(p, key).map(Value::from_json)
}

fn number(p: &Params, key: &str) -> Result<f64, ConfigurationError> {
    get(p, key)?.as_f64().ok_or_else(|| invalid(key, "a number"))
}

fn count(p: &Params, key: &str) -> Result<usize, ConfigurationError> {
    let value = get(p, key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(key, "a non-negative integer"))
}

fn strings(p: &Params, key: &str) -> Result<Vec<String>, ConfigurationError> {
    get(p, key)?
        .as_array()
        .ok_or_else(|| invalid(key, "a list of strings"))?
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| invalid(key, "a list of strings")))
        .collect()
}

fn scalars(p: &Params, key: &str) -> Result<Vec<Value>, ConfigurationError> {
    Ok(get(p, key)?
        .as_array()
        .ok_or_else(|| invalid(key, "a list"))?
        .iter()
        .map(Value::from_json)
        .collect())
}

// =============================================================================
// Shared parameter specs
// =============================================================================

fn field(description: &'static str) -> ParamSpec {
    ParamSpec::required("field", ParamType::Field, description)
}

fn case_sensitive() -> ParamSpec {
    ParamSpec::optional("case_sensitive", ParamType::Boolean, json!(true), "Match case exactly")
}

fn filter(name: &'static str, display: &'static str, description: &'static str) -> OperationDefinition {
    OperationDefinition::new(name, OperationKind::Filter, display, description)
}

fn transform(name: &'static str, display: &'static str, description: &'static str) -> OperationDefinition {
    OperationDefinition::new(name, OperationKind::Transform, display, description)
}

// =============================================================================
// Filters
// =============================================================================

fn comparison(name: &'static str, display: &'static str, description: &'static str) -> OperationDefinition {
    filter(name, display, description)
        .param(field("Field name to compare"))
        .param(ParamSpec::required("value", ParamType::Scalar, "Value to compare against"))
}

fn comparison_filters() -> Vec<OperationDefinition> {
    vec![
        comparison("equals", "Equals", "Keep records where the field equals a value")
            .example(json!({"field": "status", "value": "active"}))
            .factory(|_, p| Ok(Executor::Filter(filters::equals(text(p, "field")?, scalar(p, "value")?)))),
        comparison("greater_than", "Greater Than", "Keep records where the field is greater than a value")
            .example(json!({"field": "age", "value": 18}))
            .factory(|_, p| Ok(Executor::Filter(filters::greater_than(text(p, "field")?, scalar(p, "value")?)))),
        comparison("greater_than_or_equal", "Greater Than or Equal", "Keep records where the field is >= a value")
            .example(json!({"field": "age", "value": 18}))
            .factory(|_, p| {
                Ok(Executor::Filter(filters::greater_than_or_equal(text(p, "field")?, scalar(p, "value")?)))
            }),
        comparison("less_than", "Less Than", "Keep records where the field is less than a value")
            .example(json!({"field": "price", "value": 100.0}))
            .factory(|_, p| Ok(Executor::Filter(filters::less_than(text(p, "field")?, scalar(p, "value")?)))),
        comparison("less_than_or_equal", "Less Than or Equal", "Keep records where the field is <= a value")
            .example(json!({"field": "quantity", "value": 10}))
            .factory(|_, p| {
                Ok(Executor::Filter(filters::less_than_or_equal(text(p, "field")?, scalar(p, "value")?)))
            }),
    ]
}

fn string_filters() -> Vec<OperationDefinition> {
    vec![
        filter("contains", "Contains", "Keep records where a string field contains a substring")
            .param(field("Field name to search"))
            .param(ParamSpec::required("substring", ParamType::String, "Substring to look for"))
            .param(case_sensitive())
            .example(json!({"field": "name", "substring": "john", "case_sensitive": false}))
            .factory(|_, p| {
                Ok(Executor::Filter(filters::contains(text(p, "field")?, text(p, "substring")?, flag(p, "case_sensitive")?)))
            }),
        filter("starts_with", "Starts With", "Keep records where a string field starts with a prefix")
            .param(field("Field name to check"))
            .param(ParamSpec::required("prefix", ParamType::String, "Expected prefix"))
            .param(case_sensitive())
            .example(json!({"field": "email", "prefix": "admin@"}))
            .factory(|_, p| {
                Ok(Executor::Filter(filters::starts_with(text(p, "field")?, text(p, "prefix")?, flag(p, "case_sensitive")?)))
            }),
        filter("ends_with", "Ends With", "Keep records where a string field ends with a suffix")
            .param(field("Field name to check"))
            .param(ParamSpec::required("suffix", ParamType::String, "Expected suffix"))
            .param(case_sensitive())
            .example(json!({"field": "filename", "suffix": ".csv"}))
            .factory(|_, p| {
                Ok(Executor::Filter(filters::ends_with(text(p, "field")?, text(p, "suffix")?, flag(p, "case_sensitive")?)))
            }),
        filter("matches_regex", "Matches Regex", "Keep records where a string field matches a regular expression")
            .param(field("Field name to match"))
            .param(ParamSpec::required("pattern", ParamType::String, "Regular expression"))
            .param(case_sensitive())
            .example(json!({"field": "email", "pattern": r"^[\w.-]+@[\w.-]+\.\w+$"}))
            .factory(|_, p| {
                let predicate = filters::matches_regex(text(p, "field")?, &text(p, "pattern")?, flag(p, "case_sensitive")?)?;
                Ok(Executor::Filter(predicate))
            }),
    ]
}

fn membership_filters() -> Vec<OperationDefinition> {
    vec![
        filter("is_null", "Is Null", "Keep records where the field is null or missing")
            .param(field("Field name to check"))
            .example(json!({"field": "middle_name"}))
            .factory(|_, p| Ok(Executor::Filter(filters::is_null(text(p, "field")?)))),
        filter("is_not_null", "Is Not Null", "Keep records where the field has a value")
            .param(field("Field name to check"))
            .example(json!({"field": "email"}))
            .factory(|_, p| Ok(Executor::Filter(filters::is_not_null(text(p, "field")?)))),
        filter("in_list", "In List", "Keep records where the field value is in a list")
            .param(field("Field name to check"))
            .param(ParamSpec::required("values", ParamType::Scalars, "Accepted values"))
            .example(json!({"field": "country", "values": ["FR", "BE", "CH"]}))
            .factory(|_, p| Ok(Executor::Filter(filters::in_list(text(p, "field")?, scalars(p, "values")?)))),
        filter("not_in_list", "Not In List", "Keep records where the field value is not in a list")
            .param(field("Field name to check"))
            .param(ParamSpec::required("values", ParamType::Scalars, "Rejected values"))
            .example(json!({"field": "status", "values": ["deleted", "banned"]}))
            .factory(|_, p| Ok(Executor::Filter(filters::not_in_list(text(p, "field")?, scalars(p, "values")?)))),
        filter("between", "Between", "Keep records where a numeric field lies between two bounds")
            .param(field("Field name to check"))
            .param(ParamSpec::required("min_val", ParamType::Number, "Lower bound"))
            .param(ParamSpec::required("max_val", ParamType::Number, "Upper bound"))
            .param(ParamSpec::optional("inclusive", ParamType::Boolean, json!(true), "Include the bounds"))
            .example(json!({"field": "age", "min_val": 18, "max_val": 65}))
            .example(json!({"field": "score", "min_val": 0.5, "max_val": 1.0, "inclusive": false}))
            .factory(|_, p| {
                let predicate =
                    filters::between(text(p, "field")?, number(p, "min_val")?, number(p, "max_val")?, flag(p, "inclusive")?)?;
                Ok(Executor::Filter(predicate))
            }),
    ]
}

fn nested(registry: &OperationRegistry, p: &Params) -> Result<Vec<filters::Predicate>, ConfigurationError> {
    get(p, "predicates")?
        .as_array()
        .ok_or_else(|| invalid("predicates", "a list"))?
        .iter()
        .map(|reference| registry.nested_predicate(reference))
        .collect()
}

fn logical_filters() -> Vec<OperationDefinition> {
    let predicates = || ParamSpec::required("predicates", ParamType::Predicates, "Filters as {name, parameters}");
    vec![
        filter("and", "And", "Keep records matching every nested filter")
            .param(predicates())
            .example(json!({"predicates": [
                {"name": "greater_than", "parameters": {"field": "age", "value": 18}},
                {"name": "equals", "parameters": {"field": "status", "value": "active"}}
            ]}))
            .factory(|r, p| Ok(Executor::Filter(filters::and_all(nested(r, p)?)))),
        filter("or", "Or", "Keep records matching at least one nested filter")
            .param(predicates())
            .example(json!({"predicates": [
                {"name": "equals", "parameters": {"field": "role", "value": "admin"}},
                {"name": "equals", "parameters": {"field": "role", "value": "owner"}}
            ]}))
            .factory(|r, p| Ok(Executor::Filter(filters::or_any(nested(r, p)?)))),
        filter("not", "Not", "Keep records that do not match the nested filter")
            .param(ParamSpec::required("predicate", ParamType::Predicate, "Filter as {name, parameters}"))
            .example(json!({"predicate": {"name": "is_null", "parameters": {"field": "email"}}}))
            .factory(|r, p| Ok(Executor::Filter(filters::negate(r.nested_predicate(get(p, "predicate")?)?)))),
    ]
}

// =============================================================================
// Transforms
// =============================================================================

fn structure_transforms() -> Vec<OperationDefinition> {
    vec![
        transform("add_field", "Add Field", "Set a field to a constant value")
            .param(ParamSpec::required("field", ParamType::Target, "Field to set"))
            .param(ParamSpec::required("value", ParamType::Scalar, "Value to store"))
            .example(json!({"field": "source", "value": "import"}))
            .factory(|_, p| Ok(Executor::Transform(transforms::add_field(text(p, "field")?, scalar(p, "value")?)))),
        transform("remove_field", "Remove Field", "Drop a field from every record")
            .field_effect(FieldEffect::Drop)
            .param(field("Field to drop"))
            .example(json!({"field": "internal_id"}))
            .factory(|_, p| Ok(Executor::Transform(transforms::remove_field(text(p, "field")?)))),
        transform("rename_field", "Rename Field", "Move a field's value under a new name")
            .field_effect(FieldEffect::Drop)
            .param(ParamSpec::required("old_name", ParamType::Field, "Current field name"))
            .param(ParamSpec::required("new_name", ParamType::Target, "New field name"))
            .example(json!({"old_name": "fname", "new_name": "first_name"}))
            .factory(|_, p| {
                Ok(Executor::Transform(transforms::rename_field(text(p, "old_name")?, text(p, "new_name")?)))
            }),
        transform("select_fields", "Select Fields", "Keep only the listed fields")
            .field_effect(FieldEffect::KeepOnly)
            .param(ParamSpec::required("fields", ParamType::Fields, "Fields to keep"))
            .example(json!({"fields": ["id", "name", "email"]}))
            .factory(|_, p| Ok(Executor::Transform(transforms::select_fields(strings(p, "fields")?)))),
        transform("exclude_fields", "Exclude Fields", "Drop the listed fields")
            .field_effect(FieldEffect::Drop)
            .param(ParamSpec::required("fields", ParamType::Fields, "Fields to drop"))
            .example(json!({"fields": ["password", "token"]}))
            .factory(|_, p| Ok(Executor::Transform(transforms::exclude_fields(strings(p, "fields")?)))),
    ]
}

fn string_transforms() -> Vec<OperationDefinition> {
    vec![
        transform("capitalize_field", "Capitalize Field", "Upper-case the first letter of a string field")
            .param(field("String field"))
            .example(json!({"field": "name"}))
            .factory(|_, p| Ok(Executor::Transform(transforms::capitalize_field(text(p, "field")?)))),
        transform("upper_field", "Uppercase Field", "Convert a string field to upper case")
            .param(field("String field"))
            .example(json!({"field": "country_code"}))
            .factory(|_, p| Ok(Executor::Transform(transforms::upper_field(text(p, "field")?)))),
        transform("lower_field", "Lowercase Field", "Convert a string field to lower case")
            .param(field("String field"))
            .example(json!({"field": "email"}))
            .factory(|_, p| Ok(Executor::Transform(transforms::lower_field(text(p, "field")?)))),
        transform("strip_field", "Strip Field", "Trim surrounding whitespace from a string field")
            .param(field("String field"))
            .example(json!({"field": "name"}))
            .factory(|_, p| Ok(Executor::Transform(transforms::strip_field(text(p, "field")?)))),
        transform("replace_in_field", "Replace In Field", "Replace every occurrence of a substring")
            .param(field("String field"))
            .param(ParamSpec::required("old", ParamType::String, "Text to replace"))
            .param(ParamSpec::required("new", ParamType::String, "Replacement text"))
            .param(case_sensitive())
            .example(json!({"field": "phone", "old": "-", "new": ""}))
            .factory(|_, p| {
                let t = transforms::replace_in_field(
                    text(p, "field")?,
                    &text(p, "old")?,
                    text(p, "new")?,
                    flag(p, "case_sensitive")?,
                )?;
                Ok(Executor::Transform(t))
            }),
        transform("extract_regex_field", "Extract Regex", "Store a regex match group in another field")
            .param(ParamSpec::required("source_field", ParamType::Field, "String field to search"))
            .param(ParamSpec::required("target_field", ParamType::Target, "Field receiving the match"))
            .param(ParamSpec::required("pattern", ParamType::String, "Regular expression"))
            .param(ParamSpec::optional("group", ParamType::Integer, json!(0), "Capture group, 0 for the whole match").at_least(0))
            .example(json!({"source_field": "email", "target_field": "domain", "pattern": "@(.+)$", "group": 1}))
            .factory(|_, p| {
                let t = transforms::extract_regex_field(
                    text(p, "source_field")?,
                    text(p, "target_field")?,
                    &text(p, "pattern")?,
                    count(p, "group")?,
                )?;
                Ok(Executor::Transform(t))
            }),
        transform("split_field", "Split Field", "Split a string field into several fields")
            .param(ParamSpec::required("source_field", ParamType::Field, "String field to split"))
            .param(ParamSpec::required("target_fields", ParamType::Targets, "Fields receiving the parts"))
            .param(ParamSpec::optional("separator", ParamType::String, json!(" "), "Separator"))
            .example(json!({"source_field": "full_name", "target_fields": ["first_name", "last_name"]}))
            .factory(|_, p| {
                let t = transforms::split_field(text(p, "source_field")?, strings(p, "target_fields")?, text(p, "separator")?)?;
                Ok(Executor::Transform(t))
            }),
    ]
}

fn numeric_transforms() -> Vec<OperationDefinition> {
    vec![
        transform("multiply_field", "Multiply Field", "Multiply a numeric field by a factor")
            .param(field("Numeric field"))
            .param(ParamSpec::required("factor", ParamType::Number, "Multiplier"))
            .example(json!({"field": "salary", "factor": 1.1}))
            .factory(|_, p| Ok(Executor::Transform(transforms::multiply_field(text(p, "field")?, scalar(p, "factor")?)))),
        transform("add_to_field", "Add To Field", "Add a constant to a numeric field")
            .param(field("Numeric field"))
            .param(ParamSpec::required("value", ParamType::Number, "Amount to add"))
            .example(json!({"field": "age", "value": 1}))
            .factory(|_, p| Ok(Executor::Transform(transforms::add_to_field(text(p, "field")?, scalar(p, "value")?)))),
        transform("round_field", "Round Field", "Round a numeric field to a number of decimals")
            .param(field("Numeric field"))
            .param(ParamSpec::optional("decimals", ParamType::Integer, json!(0), "Decimal places").at_least(0))
            .example(json!({"field": "price", "decimals": 2}))
            .factory(|_, p| {
                let decimals = u32::try_from(count(p, "decimals")?).map_err(|_| invalid("decimals", "a small integer"))?;
                Ok(Executor::Transform(transforms::round_field(text(p, "field")?, decimals)))
            }),
        transform("cast_field", "Cast Field", "Convert a field to another type")
            .param(field("Field to convert"))
            .param(ParamSpec::required(
                "target_type",
                ParamType::Choice(vec!["int", "float", "str", "bool"]),
                "Target type",
            ))
            .example(json!({"field": "age", "target_type": "int"}))
            .factory(|_, p| {
                let target: CastTarget = text(p, "target_type")?.parse()?;
                Ok(Executor::Transform(transforms::cast_field(text(p, "field")?, target)))
            }),
    ]
}

// =============================================================================
// Utilities
// =============================================================================

/// Sort/take/skip have parameters and metadata but are built by the
/// pipeline itself, so they carry no factory.
fn utilities() -> Vec<OperationDefinition> {
    vec![
        OperationDefinition::new("sort", OperationKind::Sort, "Sort", "Order records by a field")
            .param(field("Field to sort by"))
            .param(ParamSpec::optional("reverse", ParamType::Boolean, json!(false), "Sort descending"))
            .example(json!({"field": "salary", "reverse": true})),
        OperationDefinition::new("take", OperationKind::Take, "Take", "Keep the first n records")
            .param(ParamSpec::required("n", ParamType::Integer, "Number of records to keep").at_least(1))
            .example(json!({"n": 10})),
        OperationDefinition::new("skip", OperationKind::Skip, "Skip", "Drop the first n records")
            .param(ParamSpec::required("n", ParamType::Integer, "Number of records to drop").at_least(0))
            .example(json!({"n": 5})),
    ]
}
