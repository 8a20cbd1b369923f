//! Operation registry.
//!
//! Maps operation names to their definitions: kind, parameter metadata, a
//! compiled JSON Schema for the parameters and the factory that turns
//! validated parameters into an [`Executor`].
//!
//! The registry is built once with [`OperationRegistry::with_builtins`] and
//! then only read, so it can be shared as `Arc<OperationRegistry>`.

mod catalog;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigurationError, OperationExecutionError, ParameterError, RegistryError, RegistryResult};
use crate::ops::{Predicate, RecordTransform};

/// Validated operation parameters, defaults filled in.
pub type Params = Map<String, JsonValue>;

/// Builds an executor from validated parameters. Receives the registry so
/// logical combinators can compile nested predicates.
pub type Factory = fn(&OperationRegistry, &Params) -> Result<Executor, ConfigurationError>;

// =============================================================================
// Operation kinds
// =============================================================================

/// Closed set of operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Filter,
    Transform,
    Sort,
    Take,
    Skip,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Filter,
        OperationKind::Transform,
        OperationKind::Sort,
        OperationKind::Take,
        OperationKind::Skip,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Filter => "filter",
            OperationKind::Transform => "transform",
            OperationKind::Sort => "sort",
            OperationKind::Take => "take",
            OperationKind::Skip => "skip",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown operation type '{}'", s))
    }
}

// =============================================================================
// Parameter metadata
// =============================================================================

/// Parameter type, used both for introspection and to derive the schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "options")]
pub enum ParamType {
    /// Name of a record field.
    Field,
    /// List of record field names.
    Fields,
    /// Name of a field the operation creates.
    Target,
    /// Names of fields the operation creates.
    Targets,
    String,
    Number,
    Integer,
    Boolean,
    /// Any scalar value.
    Scalar,
    /// Non-empty list of scalar values.
    Scalars,
    /// One of a fixed set of strings.
    Choice(Vec<&'static str>),
    /// A nested filter `{name, parameters}`.
    Predicate,
    /// Non-empty list of nested filters.
    Predicates,
}

impl ParamType {
    fn schema(&self) -> JsonValue {
        let scalar = json!({"type": ["string", "number", "integer", "boolean", "null"]});
        let predicate = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "parameters": {"type": "object"}
            },
            "required": ["name"],
            "additionalProperties": false
        });
        match self {
            ParamType::Field | ParamType::Target => json!({"type": "string", "minLength": 1}),
            ParamType::Fields | ParamType::Targets => {
                json!({"type": "array", "items": {"type": "string", "minLength": 1}, "minItems": 1})
            }
            ParamType::String => json!({"type": "string"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::Scalar => scalar,
            ParamType::Scalars => json!({"type": "array", "items": scalar, "minItems": 1}),
            ParamType::Choice(options) => json!({"type": "string", "enum": options}),
            ParamType::Predicate => predicate,
            ParamType::Predicates => json!({"type": "array", "items": predicate, "minItems": 1}),
        }
    }
}

/// One parameter of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Lower bound for integer parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self { name, param_type, required: true, default: None, minimum: None, description }
    }

    pub fn optional(
        name: &'static str,
        param_type: ParamType,
        default: JsonValue,
        description: &'static str,
    ) -> Self {
        Self { name, param_type, required: false, default: Some(default), minimum: None, description }
    }

    pub fn at_least(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    fn constraint_violation(&self, value: &JsonValue) -> Option<String> {
        let minimum = self.minimum?;
        let n = value.as_f64()?;
        if n >= minimum as f64 {
            return None;
        }
        Some(match minimum {
            1 => format!("{} must be a positive integer", self.name),
            0 => format!("{} must be a non-negative integer", self.name),
            m => format!("{} must be at least {}", self.name, m),
        })
    }
}

// =============================================================================
// Operation definitions
// =============================================================================

/// A compiled record-level operation.
#[derive(Clone)]
pub enum Executor {
    Filter(Predicate),
    Transform(RecordTransform),
}

impl Executor {
    pub fn kind(&self) -> OperationKind {
        match self {
            Executor::Filter(_) => OperationKind::Filter,
            Executor::Transform(_) => OperationKind::Transform,
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executor::{:?}", self.kind())
    }
}

/// What a transform does to the set of fields on a record, beyond the
/// fields it creates through `Target`/`Targets` parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEffect {
    #[default]
    Preserve,
    /// Its `Field`/`Fields` parameters no longer exist afterwards.
    Drop,
    /// Only its `Fields` parameter survives.
    KeepOnly,
}

/// Catalog entry for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDefinition {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub display_name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
    pub schema: JsonValue,
    pub examples: Vec<JsonValue>,
    pub field_effect: FieldEffect,
    #[serde(skip)]
    pub factory: Option<Factory>,
}

impl OperationDefinition {
    pub fn new(
        name: &'static str,
        kind: OperationKind,
        display_name: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            display_name,
            description,
            parameters: Vec::new(),
            schema: object_schema(&[]),
            examples: Vec::new(),
            field_effect: FieldEffect::Preserve,
            factory: None,
        }
    }

    /// Add a parameter; the schema is regenerated from the parameter list.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.parameters.push(spec);
        self.schema = object_schema(&self.parameters);
        self
    }

    /// Replace the generated schema.
    pub fn with_schema(mut self, schema: JsonValue) -> Self {
        self.schema = schema;
        self
    }

    pub fn example(mut self, parameters: JsonValue) -> Self {
        self.examples.push(parameters);
        self
    }

    pub fn field_effect(mut self, effect: FieldEffect) -> Self {
        self.field_effect = effect;
        self
    }

    pub fn factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn is_executable(&self) -> bool {
        self.factory.is_some()
    }
}

fn object_schema(params: &[ParamSpec]) -> JsonValue {
    let properties: Map<String, JsonValue> = params
        .iter()
        .map(|p| (p.name.to_string(), p.param_type.schema()))
        .collect();
    let required: Vec<&str> = params.iter().filter(|p| p.required).map(|p| p.name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

// =============================================================================
// Registry
// =============================================================================

struct Entry {
    definition: OperationDefinition,
    validator: jsonschema::Validator,
}

/// Name-keyed catalog of operations, in registration order.
pub struct OperationRegistry {
    entries: IndexMap<&'static str, Entry>,
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }

    /// Registry holding the full built-in catalog.
    pub fn with_builtins() -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        for definition in catalog::builtins() {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// Add a definition, compiling its parameter schema.
    pub fn register(&mut self, definition: OperationDefinition) -> Result<(), ConfigurationError> {
        if self.entries.contains_key(definition.name) {
            return Err(ConfigurationError::DuplicateOperation(definition.name.to_string()));
        }
        let validator = jsonschema::draft7::new(&definition.schema).map_err(|e| {
            ConfigurationError::InvalidSchema {
                operation: definition.name.to_string(),
                message: e.to_string(),
            }
        })?;
        self.entries.insert(definition.name, Entry { definition, validator });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&OperationDefinition> {
        self.entries.get(name).map(|e| &e.definition)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.entries.values().map(|e| &e.definition)
    }

    pub fn by_kind(&self, kind: OperationKind) -> impl Iterator<Item = &OperationDefinition> {
        self.all().filter(move |d| d.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate raw parameters, listing every violation.
    ///
    /// A `null` parameter value counts as an empty object. Returns the
    /// parameters with defaults filled in.
    pub fn validate_params(&self, name: &str, raw: &JsonValue) -> Result<Params, ParameterError> {
        let fail = |violations: Vec<String>| ParameterError { operation: name.to_string(), violations };

        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| fail(vec![format!("Unknown operation '{}'", name)]))?;

        let mut params = match raw {
            JsonValue::Null => Params::new(),
            JsonValue::Object(map) => map.clone(),
            other => return Err(fail(vec![format!("parameters must be an object, got {}", json_type(other))])),
        };
        for spec in &entry.definition.parameters {
            if let Some(default) = &spec.default {
                params.entry(spec.name).or_insert_with(|| default.clone());
            }
        }

        let mut violations: Vec<String> = entry
            .validator
            .iter_errors(&JsonValue::Object(params.clone()))
            .map(|e| e.to_string())
            .collect();

        for spec in &entry.definition.parameters {
            let Some(value) = params.get_mut(spec.name) else { continue };
            if let Some(violation) = spec.constraint_violation(value) {
                violations.push(violation);
            }
            match spec.param_type {
                ParamType::Predicate => self.normalize_predicate(spec.name, value, &mut violations),
                ParamType::Predicates => {
                    if let JsonValue::Array(items) = value {
                        for (i, item) in items.iter_mut().enumerate() {
                            self.normalize_predicate(&format!("{}[{}]", spec.name, i), item, &mut violations);
                        }
                    }
                }
                _ => {}
            }
        }

        if violations.is_empty() {
            Ok(params)
        } else {
            Err(fail(violations))
        }
    }

    /// Check a nested `{name, parameters}` filter reference and fill in its
    /// defaults in place.
    fn normalize_predicate(&self, path: &str, value: &mut JsonValue, violations: &mut Vec<String>) {
        let Some(object) = value.as_object_mut() else { return };
        let Some(name) = object.get("name").and_then(JsonValue::as_str).map(str::to_string) else {
            return;
        };
        match self.get(&name) {
            None => violations.push(format!("{}: Unknown operation '{}'", path, name)),
            Some(definition) if definition.kind != OperationKind::Filter => violations.push(format!(
                "{}: '{}' is a {}, not a filter",
                path, name, definition.kind
            )),
            Some(_) => {
                let raw = object.get("parameters").cloned().unwrap_or(JsonValue::Null);
                match self.validate_params(&name, &raw) {
                    Ok(nested) => {
                        object.insert("parameters".to_string(), JsonValue::Object(nested));
                    }
                    Err(e) => violations.extend(e.violations.into_iter().map(|v| format!("{}: {}", path, v))),
                }
            }
        }
    }

    /// Validate parameters and build the executor.
    pub fn execute(&self, name: &str, raw: &JsonValue) -> RegistryResult<Executor> {
        let definition = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownOperation(name.to_string()))?;
        let params = self.validate_params(name, raw)?;
        self.instantiate(definition, &params)
    }

    /// Build the executor from parameters that already passed
    /// [`validate_params`](Self::validate_params).
    pub fn instantiate(&self, definition: &OperationDefinition, params: &Params) -> RegistryResult<Executor> {
        let factory = definition.factory.ok_or_else(|| RegistryError::NotExecutable {
            operation: definition.name.to_string(),
            kind: definition.kind,
        })?;
        factory(self, params).map_err(|source| {
            OperationExecutionError { operation: definition.name.to_string(), source }.into()
        })
    }

    /// Compile a nested filter reference of a logical combinator.
    pub(crate) fn nested_predicate(&self, reference: &JsonValue) -> Result<Predicate, ConfigurationError> {
        let name = reference
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ConfigurationError::InvalidArgument("nested predicate has no name".to_string()))?;
        let raw = reference.get("parameters").cloned().unwrap_or(JsonValue::Null);
        match self.execute(name, &raw) {
            Ok(Executor::Filter(predicate)) => Ok(predicate),
            Ok(other) => Err(ConfigurationError::InvalidArgument(format!(
                "'{}' is a {}, not a filter",
                name,
                other.kind()
            ))),
            Err(e) => Err(ConfigurationError::InvalidArgument(e.to_string())),
        }
    }

    /// Record fields an operation reads or rewrites, including those of
    /// nested predicates. Unknown operations reference nothing.
    pub fn referenced_fields(&self, name: &str, params: &JsonValue) -> Vec<String> {
        let Some(definition) = self.get(name) else { return Vec::new() };
        let mut fields = direct_fields(definition, params);
        for spec in &definition.parameters {
            let Some(value) = params.get(spec.name) else { continue };
            match spec.param_type {
                ParamType::Predicate => fields.extend(self.nested_fields(value)),
                ParamType::Predicates => {
                    for item in value.as_array().into_iter().flatten() {
                        fields.extend(self.nested_fields(item));
                    }
                }
                _ => {}
            }
        }
        fields
    }

    /// Fields an operation creates on every record it touches.
    pub fn produced_fields(&self, name: &str, params: &JsonValue) -> Vec<String> {
        let Some(definition) = self.get(name) else { return Vec::new() };
        let mut fields = Vec::new();
        for spec in &definition.parameters {
            let Some(value) = params.get(spec.name) else { continue };
            match spec.param_type {
                ParamType::Target => fields.extend(value.as_str().map(str::to_string)),
                ParamType::Targets => fields.extend(
                    value.as_array().into_iter().flatten().filter_map(|v| v.as_str()).map(str::to_string),
                ),
                _ => {}
            }
        }
        fields
    }

    /// Update the fields present on records after this operation runs:
    /// dropped or unselected fields go away, created fields are added.
    pub fn apply_field_effects(&self, name: &str, params: &JsonValue, fields: &mut Vec<String>) {
        let Some(definition) = self.get(name) else { return };
        match definition.field_effect {
            FieldEffect::Preserve => {}
            FieldEffect::Drop => {
                let dropped = direct_fields(definition, params);
                fields.retain(|f| !dropped.contains(f));
            }
            FieldEffect::KeepOnly => {
                let kept = direct_fields(definition, params);
                fields.retain(|f| kept.contains(f));
            }
        }
        for field in self.produced_fields(name, params) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }

    fn nested_fields(&self, reference: &JsonValue) -> Vec<String> {
        match reference.get("name").and_then(JsonValue::as_str) {
            Some(name) => self.referenced_fields(name, reference.get("parameters").unwrap_or(&JsonValue::Null)),
            None => Vec::new(),
        }
    }
}

/// `Field` and `Fields` parameters, ignoring nested predicates.
fn direct_fields(definition: &OperationDefinition, params: &JsonValue) -> Vec<String> {
    let mut fields = Vec::new();
    for spec in &definition.parameters {
        let Some(value) = params.get(spec.name) else { continue };
        match spec.param_type {
            ParamType::Field => fields.extend(value.as_str().map(str::to_string)),
            ParamType::Fields => fields.extend(
                value.as_array().into_iter().flatten().filter_map(|v| v.as_str()).map(str::to_string),
            ),
            _ => {}
        }
    }
    fields
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    fn registry() -> OperationRegistry {
        OperationRegistry::with_builtins().unwrap()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = registry();
        let dup = OperationDefinition::new("equals", OperationKind::Filter, "Equals", "dup");
        assert_eq!(
            registry.register(dup),
            Err(ConfigurationError::DuplicateOperation("equals".into()))
        );
    }

    #[test]
    fn test_malformed_schema_is_rejected() {
        let mut registry = OperationRegistry::new();
        let bad = OperationDefinition::new("bad", OperationKind::Filter, "Bad", "bad schema")
            .with_schema(json!({"type": 12}));
        assert!(matches!(
            registry.register(bad),
            Err(ConfigurationError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>(), Ok(kind));
        }
        assert!("group".parse::<OperationKind>().is_err());
        assert_eq!(serde_json::to_value(OperationKind::Take).unwrap(), json!("take"));
    }

    #[test]
    fn test_validate_lists_every_violation() {
        let err = registry()
            .validate_params("contains", &json!({"substring": 5, "colour": "red"}))
            .unwrap_err();
        // missing field, wrong substring type, unknown key
        assert_eq!(err.violations.len(), 3, "{:?}", err.violations);
    }

    #[test]
    fn test_validate_fills_defaults() {
        let params = registry()
            .validate_params("contains", &json!({"field": "name", "substring": "a"}))
            .unwrap();
        assert_eq!(params.get("case_sensitive"), Some(&json!(true)));
        let params = registry().validate_params("sort", &json!({"field": "age"})).unwrap();
        assert_eq!(params.get("reverse"), Some(&json!(false)));
    }

    #[test]
    fn test_take_and_skip_bounds() {
        let r = registry();
        let err = r.validate_params("take", &json!({"n": 0})).unwrap_err();
        assert!(err.violations.iter().any(|v| v.contains("must be a positive integer")));
        let err = r.validate_params("skip", &json!({"n": -1})).unwrap_err();
        assert!(err.violations.iter().any(|v| v.contains("must be a non-negative integer")));
        assert!(r.validate_params("skip", &json!({"n": 0})).is_ok());
        assert!(r.validate_params("take", &json!({"n": "3"})).is_err());
    }

    #[test]
    fn test_nested_predicates_are_validated() {
        let r = registry();
        let err = r
            .validate_params(
                "and",
                &json!({"predicates": [
                    {"name": "greater_than", "parameters": {"field": "age"}},
                    {"name": "nope"},
                    {"name": "upper_field", "parameters": {"field": "x"}}
                ]}),
            )
            .unwrap_err();
        assert_eq!(err.violations.len(), 3, "{:?}", err.violations);
        assert!(err.violations[0].starts_with("predicates[0]:"));

        let params = r
            .validate_params("not", &json!({"predicate": {"name": "contains", "parameters": {"field": "a", "substring": "b"}}}))
            .unwrap();
        assert_eq!(params["predicate"]["parameters"]["case_sensitive"], json!(true));
    }

    #[test]
    fn test_execute_builds_working_executors() {
        let r = registry();
        let Executor::Filter(p) = r.execute("greater_than", &json!({"field": "age", "value": 27})).unwrap() else {
            panic!("expected a filter")
        };
        assert!(p(&Record::new().with("age", 30)).unwrap());

        let Executor::Transform(t) = r.execute("upper_field", &json!({"field": "name"})).unwrap() else {
            panic!("expected a transform")
        };
        assert_eq!(t(Record::new().with("name", "bob")).record.value("name").as_str(), Some("BOB"));
    }

    #[test]
    fn test_execute_error_variants() {
        let r = registry();
        assert!(matches!(r.execute("nonexistent_op", &json!({})), Err(RegistryError::UnknownOperation(_))));
        assert!(matches!(r.execute("equals", &json!({})), Err(RegistryError::Parameters(_))));
        assert!(matches!(
            r.execute("take", &json!({"n": 2})),
            Err(RegistryError::NotExecutable { kind: OperationKind::Take, .. })
        ));
        let err = r
            .execute("between", &json!({"field": "age", "min_val": 10, "max_val": 5}))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Execution(_)));
        assert!(err.to_string().starts_with("Failed to execute between"));
    }

    #[test]
    fn test_referenced_fields_follow_nested_predicates() {
        let fields = registry().referenced_fields(
            "or",
            &json!({"predicates": [
                {"name": "is_null", "parameters": {"field": "email"}},
                {"name": "not", "parameters": {"predicate": {"name": "equals", "parameters": {"field": "status", "value": 1}}}}
            ]}),
        );
        assert_eq!(fields, vec!["email", "status"]);
    }

    #[test]
    fn test_produced_fields() {
        let r = registry();
        assert_eq!(
            r.produced_fields("rename_field", &json!({"old_name": "fname", "new_name": "first_name"})),
            vec!["first_name"]
        );
        assert_eq!(
            r.produced_fields("split_field", &json!({"source_field": "full", "target_fields": ["a", "b"]})),
            vec!["a", "b"]
        );
        assert!(r.produced_fields("upper_field", &json!({"field": "name"})).is_empty());
    }

    #[test]
    fn test_field_effects_track_dropped_fields() {
        let r = registry();
        let mut fields: Vec<String> = ["id", "fname", "email", "token"].iter().map(|f| f.to_string()).collect();
        r.apply_field_effects("rename_field", &json!({"old_name": "fname", "new_name": "first_name"}), &mut fields);
        assert_eq!(fields, vec!["id", "email", "token", "first_name"]);
        r.apply_field_effects("exclude_fields", &json!({"fields": ["token"]}), &mut fields);
        r.apply_field_effects("remove_field", &json!({"field": "email"}), &mut fields);
        assert_eq!(fields, vec!["id", "first_name"]);
        r.apply_field_effects("select_fields", &json!({"fields": ["first_name", "missing"]}), &mut fields);
        assert_eq!(fields, vec!["first_name"]);
        r.apply_field_effects("upper_field", &json!({"field": "first_name"}), &mut fields);
        assert_eq!(fields, vec!["first_name"]);
        assert_eq!(r.get("select_fields").map(|d| d.field_effect), Some(FieldEffect::KeepOnly));
    }
}
