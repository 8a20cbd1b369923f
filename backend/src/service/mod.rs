//! Pipeline validation and execution service.
//!
//! Turns a list of [`OperationDescriptor`]s into a [`ValidationReport`], a
//! [`Pipeline`], or a complete [`ExecutionResult`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::error::{ExecutionError, ValidationError};
use crate::models::{Record, Table};
use crate::pipeline::{Diagnostic, Pipeline, PipelineOutput};
use crate::registry::{Executor, OperationKind, OperationRegistry, Params};

/// Default `n` above which take/skip produce a warning.
pub const DEFAULT_LARGE_VALUE_THRESHOLD: u64 = 10_000;

// =============================================================================
// Descriptors and reports
// =============================================================================

/// One declarative pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    #[serde(rename = "type", alias = "kind")]
    pub kind: OperationKind,
    /// Registry name. May be omitted for sort/take/skip.
    #[serde(rename = "operation", alias = "name", default)]
    pub name: String,
    #[serde(rename = "config", alias = "parameters", default)]
    pub parameters: JsonValue,
}

impl OperationDescriptor {
    pub fn new(kind: OperationKind, name: impl Into<String>, parameters: JsonValue) -> Self {
        Self { kind, name: name.into(), parameters }
    }

    pub fn filter(name: impl Into<String>, parameters: JsonValue) -> Self {
        Self::new(OperationKind::Filter, name, parameters)
    }

    pub fn transform(name: impl Into<String>, parameters: JsonValue) -> Self {
        Self::new(OperationKind::Transform, name, parameters)
    }

    pub fn sort(field: &str, reverse: bool) -> Self {
        Self::new(OperationKind::Sort, "sort", serde_json::json!({"field": field, "reverse": reverse}))
    }

    pub fn take(n: i64) -> Self {
        Self::new(OperationKind::Take, "take", serde_json::json!({ "n": n }))
    }

    pub fn skip(n: i64) -> Self {
        Self::new(OperationKind::Skip, "skip", serde_json::json!({ "n": n }))
    }

    /// Registry name, falling back to the kind for utility steps.
    pub fn operation(&self) -> &str {
        match self.kind {
            OperationKind::Sort | OperationKind::Take | OperationKind::Skip if self.name.is_empty() => {
                self.kind.as_str()
            }
            _ => self.name.as_str(),
        }
    }
}

/// Outcome of [`PipelineService::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Options for [`PipelineService::run_with`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fields of the input table; enables the unknown-field check.
    pub known_fields: Option<Vec<String>>,
    /// Return at most this many records in `data`.
    pub preview_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// Everything a caller needs to know about one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub data: Option<Table>,
    /// Records produced, before any preview truncation.
    pub record_count: Option<usize>,
    pub execution_time_ms: f64,
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Records left unchanged by a type-mismatched transform.
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

// =============================================================================
// Service
// =============================================================================

/// Validates, builds and runs descriptor lists against a shared registry.
#[derive(Debug, Clone)]
pub struct PipelineService {
    registry: Arc<OperationRegistry>,
    large_value_threshold: u64,
}

impl PipelineService {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry, large_value_threshold: DEFAULT_LARGE_VALUE_THRESHOLD }
    }

    pub fn with_large_value_threshold(mut self, threshold: u64) -> Self {
        self.large_value_threshold = threshold;
        self
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Check every descriptor and collect all problems.
    ///
    /// With a non-empty `known_fields`, field references are checked against
    /// the fields present at each stage: the input fields, minus those
    /// dropped by earlier transforms, plus those they create.
    pub fn validate(&self, descriptors: &[OperationDescriptor], known_fields: Option<&[String]>) -> ValidationReport {
        self.check(descriptors, known_fields).0
    }

    /// Validation that also keeps each passing descriptor's compiled form.
    fn check(&self, descriptors: &[OperationDescriptor], known_fields: Option<&[String]>) -> (ValidationReport, Vec<Step>) {
        let mut report = ValidationReport::default();
        if descriptors.is_empty() {
            report.errors.push("Pipeline must have at least one operation".to_string());
        }
        // A table without columns has nothing to check against.
        let mut available: Option<Vec<String>> =
            known_fields.filter(|fields| !fields.is_empty()).map(<[String]>::to_vec);
        let mut steps = Vec::with_capacity(descriptors.len());

        for (i, descriptor) in descriptors.iter().enumerate() {
            let prefix = format!("Operation {}:", i + 1);
            let name = descriptor.operation();
            let Some(step) = self.check_descriptor(descriptor, &prefix, &mut report) else {
                // A failing stage still creates its target fields.
                if let Some(fields) = available.as_mut() {
                    for field in self.registry.produced_fields(name, &descriptor.parameters) {
                        if !fields.contains(&field) {
                            fields.push(field);
                        }
                    }
                }
                continue;
            };
            let params = JsonValue::Object(step.params.clone());

            if let Some(fields) = available.as_mut() {
                let mut unknown: Vec<String> = self
                    .registry
                    .referenced_fields(name, &params)
                    .into_iter()
                    .filter(|f| !fields.contains(f))
                    .collect();
                unknown.sort();
                unknown.dedup();
                for field in unknown {
                    report.errors.push(format!("{} Unknown field '{}'", prefix, field));
                }
                self.registry.apply_field_effects(name, &params, fields);
            }

            if matches!(descriptor.kind, OperationKind::Take | OperationKind::Skip) {
                let n = params.get("n").and_then(JsonValue::as_f64).unwrap_or(0.0);
                if n > self.large_value_threshold as f64 {
                    report.warnings.push(format!(
                        "{} {} n={} exceeds {} and may be slow",
                        prefix, descriptor.kind, n, self.large_value_threshold
                    ));
                }
            }
            steps.push(step);
        }

        report.valid = report.errors.is_empty();
        (report, steps)
    }

    /// Name, kind, parameters and construction checks for one descriptor.
    /// Returns the compiled step when all of them pass.
    fn check_descriptor(
        &self,
        descriptor: &OperationDescriptor,
        prefix: &str,
        report: &mut ValidationReport,
    ) -> Option<Step> {
        let name = descriptor.operation();
        if name.is_empty() {
            report.errors.push(format!("{} Missing operation name", prefix));
            return None;
        }
        let Some(definition) = self.registry.get(name) else {
            report.errors.push(format!("{} Unknown operation '{}'", prefix, name));
            return None;
        };
        if definition.kind != descriptor.kind {
            report.errors.push(format!(
                "{} Type mismatch - '{}' is a {}, not {}",
                prefix, name, definition.kind, descriptor.kind
            ));
            return None;
        }
        let params = match self.registry.validate_params(name, &descriptor.parameters) {
            Ok(params) => params,
            Err(e) => {
                report.errors.extend(e.violations.into_iter().map(|v| format!("{} {}", prefix, v)));
                return None;
            }
        };
        let executor = if definition.is_executable() {
            match self.registry.instantiate(definition, &params) {
                Ok(executor) => Some(executor),
                Err(e) => {
                    report.errors.push(format!("{} {}", prefix, e));
                    return None;
                }
            }
        } else {
            None
        };
        Some(Step { kind: descriptor.kind, name: name.to_string(), params, executor })
    }

    /// Compile descriptors into a pipeline.
    pub fn build(&self, descriptors: &[OperationDescriptor]) -> Result<Pipeline, ValidationError> {
        let (report, steps) = self.check(descriptors, None);
        if !report.valid {
            return Err(ValidationError { errors: report.errors });
        }
        assemble(steps)
    }

    pub fn run(&self, table: &[Record], descriptors: &[OperationDescriptor]) -> ExecutionResult {
        self.run_with(table, descriptors, &RunOptions::default())
    }

    /// Validate, build and run. Never fails: problems end up in the result.
    pub fn run_with(&self, table: &[Record], descriptors: &[OperationDescriptor], options: &RunOptions) -> ExecutionResult {
        let started = Instant::now();
        let execution_id = Uuid::new_v4();
        log_info(format!(
            "▶️  Execution {}: {} operations on {} records",
            execution_id,
            descriptors.len(),
            table.len()
        ));

        let (report, steps) = self.check(descriptors, options.known_fields.as_deref());
        let outcome = if report.valid {
            execute(table, steps)
        } else {
            Err(ValidationError { errors: report.errors }.into())
        };
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;

        for warning in &report.warnings {
            log_warning(warning.as_str());
        }

        match outcome {
            Ok(PipelineOutput { mut records, diagnostics }) => {
                let record_count = records.len();
                if let Some(limit) = options.preview_limit {
                    records.truncate(limit);
                }
                if !diagnostics.is_empty() {
                    log_warning(format!("{} records left unchanged by a transform", diagnostics.len()));
                    for d in diagnostics.iter().take(5) {
                        log_info_indent(format!("stage {} ({}) row {}: {}", d.stage, d.operation, d.row, d.reason), 1);
                    }
                }
                log_success(format!("Execution {} produced {} records in {:.1} ms", execution_id, record_count, elapsed));
                ExecutionResult {
                    execution_id,
                    status: ExecutionStatus::Completed,
                    data: Some(records),
                    record_count: Some(record_count),
                    execution_time_ms: elapsed,
                    error: None,
                    warnings: report.warnings,
                    skipped: diagnostics.len(),
                    diagnostics,
                    created_at: Utc::now(),
                }
            }
            Err(e) => {
                let message = match e {
                    ExecutionError::Validation(v) => format!("Validation error: {}", v.errors.join("; ")),
                    other => other.to_string(),
                };
                log_error(format!("Execution {} failed: {}", execution_id, message));
                ExecutionResult {
                    execution_id,
                    status: ExecutionStatus::Failed,
                    data: None,
                    record_count: None,
                    execution_time_ms: elapsed,
                    error: Some(message),
                    warnings: report.warnings,
                    skipped: 0,
                    diagnostics: Vec::new(),
                    created_at: Utc::now(),
                }
            }
        }
    }
}

/// A descriptor that passed validation, with its executor when it has one.
struct Step {
    kind: OperationKind,
    name: String,
    params: Params,
    executor: Option<Executor>,
}

/// Turn validated steps into a pipeline without recompiling them.
fn assemble(steps: Vec<Step>) -> Result<Pipeline, ValidationError> {
    let mut pipeline = Pipeline::new();
    for (i, step) in steps.into_iter().enumerate() {
        let fail = |message: &str| ValidationError { errors: vec![format!("Operation {}: {}", i + 1, message)] };
        pipeline = match step.kind {
            OperationKind::Filter | OperationKind::Transform => match step.executor {
                Some(Executor::Filter(predicate)) => pipeline.filter(step.name, predicate),
                Some(Executor::Transform(transform)) => pipeline.map(step.name, transform),
                None => return Err(fail("operation has no executor")),
            },
            OperationKind::Sort => {
                let field = step.params.get("field").and_then(JsonValue::as_str).unwrap_or_default();
                let reverse = step.params.get("reverse").and_then(JsonValue::as_bool).unwrap_or(false);
                pipeline.sort_by_field(field, reverse)
            }
            OperationKind::Take => {
                let n = NonZeroUsize::new(count(&step.params)).ok_or_else(|| fail("n must be a positive integer"))?;
                pipeline.take(n)
            }
            OperationKind::Skip => pipeline.skip(count(&step.params)),
        };
    }
    Ok(pipeline)
}

fn execute(table: &[Record], steps: Vec<Step>) -> Result<PipelineOutput, ExecutionError> {
    let pipeline = assemble(steps)?;
    log_info_indent(format!("Pipeline: {}", pipeline.describe()), 1);
    pipeline.run(table)
}

/// `n` of a validated take/skip.
fn count(params: &Params) -> usize {
    params
        .get("n")
        .and_then(JsonValue::as_f64)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OperationDefinition;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn service() -> PipelineService {
        PipelineService::new(Arc::new(OperationRegistry::with_builtins().unwrap()))
    }

    fn people() -> Table {
        vec![
            Record::new().with("name", "Alice").with("age", 30).with("salary", 50000),
            Record::new().with("name", "Bob").with("age", 25).with("salary", 40000),
            Record::new().with("name", "Charlie").with("age", 35).with("salary", 60000),
        ]
    }

    #[test]
    fn test_descriptor_json_accepts_both_spellings() {
        let a: OperationDescriptor =
            serde_json::from_value(json!({"type": "filter", "operation": "equals", "config": {"field": "x", "value": 1}}))
                .unwrap();
        let b: OperationDescriptor =
            serde_json::from_value(json!({"kind": "filter", "name": "equals", "parameters": {"field": "x", "value": 1}}))
                .unwrap();
        assert_eq!(a, b);
        let take: OperationDescriptor = serde_json::from_value(json!({"type": "take", "config": {"n": 2}})).unwrap();
        assert_eq!(take.operation(), "take");
    }

    #[test]
    fn test_empty_pipeline_is_invalid() {
        let report = service().validate(&[], None);
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Pipeline must have at least one operation"]);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let report = service().validate(
            &[
                OperationDescriptor::filter("nonexistent_op", json!({})),
                OperationDescriptor::transform("greater_than", json!({"field": "age", "value": 1})),
                OperationDescriptor::take(0),
                OperationDescriptor::filter("matches_regex", json!({"field": "name", "pattern": "(["})),
            ],
            None,
        );
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 4, "{:?}", report.errors);
        assert_eq!(report.errors[0], "Operation 1: Unknown operation 'nonexistent_op'");
        assert_eq!(report.errors[1], "Operation 2: Type mismatch - 'greater_than' is a filter, not transform");
        assert!(report.errors[2].starts_with("Operation 3:") && report.errors[2].contains("must be a positive integer"));
        assert!(report.errors[3].contains("Invalid regex"));
    }

    #[test]
    fn test_known_fields_follow_created_fields() {
        let known = vec!["name".to_string(), "age".to_string()];
        let report = service().validate(
            &[
                OperationDescriptor::transform("rename_field", json!({"old_name": "name", "new_name": "full_name"})),
                OperationDescriptor::filter("contains", json!({"field": "full_name", "substring": "A"})),
                OperationDescriptor::filter("equals", json!({"field": "email", "value": null})),
            ],
            Some(&known),
        );
        assert_eq!(report.errors, vec!["Operation 3: Unknown field 'email'"]);
    }

    #[test]
    fn test_known_fields_forget_dropped_fields() {
        let known: Vec<String> = ["name", "age", "token", "email"].iter().map(|f| f.to_string()).collect();
        let report = service().validate(
            &[
                OperationDescriptor::transform("rename_field", json!({"old_name": "name", "new_name": "full_name"})),
                OperationDescriptor::transform("remove_field", json!({"field": "token"})),
                OperationDescriptor::transform("select_fields", json!({"fields": ["full_name", "age"]})),
                OperationDescriptor::filter("is_null", json!({"field": "name"})),
                OperationDescriptor::filter("is_null", json!({"field": "token"})),
                OperationDescriptor::filter("is_null", json!({"field": "email"})),
                OperationDescriptor::sort("age", false),
            ],
            Some(&known),
        );
        assert_eq!(
            report.errors,
            vec![
                "Operation 4: Unknown field 'name'",
                "Operation 5: Unknown field 'token'",
                "Operation 6: Unknown field 'email'",
            ]
        );
    }

    #[test]
    fn test_failing_stage_still_creates_its_targets() {
        let known = vec!["email".to_string()];
        let report = service().validate(
            &[
                OperationDescriptor::transform(
                    "extract_regex_field",
                    json!({"source_field": "email", "target_field": "domain", "pattern": "(["}),
                ),
                OperationDescriptor::filter("is_not_null", json!({"field": "domain"})),
            ],
            Some(&known),
        );
        assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
        assert!(report.errors[0].starts_with("Operation 1:"));
    }

    #[test]
    fn test_empty_known_fields_skip_the_field_check() {
        let ops = [OperationDescriptor::filter("greater_than", json!({"field": "age", "value": 27}))];
        assert!(service().validate(&ops, Some(&[])).valid);
        let result = service().run_with(&[], &ops, &RunOptions { known_fields: Some(Vec::new()), preview_limit: None });
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.data, Some(Vec::new()));
    }

    static COMPILED: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn test_run_compiles_each_operation_once() {
        let mut registry = OperationRegistry::with_builtins().unwrap();
        registry
            .register(
                OperationDefinition::new("counted", OperationKind::Filter, "Counted", "Keeps everything")
                    .factory(|_, _| {
                        COMPILED.fetch_add(1, AtomicOrdering::SeqCst);
                        Ok(Executor::Filter(Arc::new(|_: &Record| Ok::<bool, crate::error::EvalError>(true))))
                    }),
            )
            .unwrap();
        let service = PipelineService::new(Arc::new(registry));
        let result = service.run(&people(), &[OperationDescriptor::filter("counted", json!({}))]);
        assert!(result.is_completed());
        assert_eq!(COMPILED.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_large_values_warn() {
        let report = service().with_large_value_threshold(100).validate(&[OperationDescriptor::skip(500)], None);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("n=500"));
    }

    #[test]
    fn test_build_maps_every_kind() {
        let pipeline = service()
            .build(&[
                OperationDescriptor::filter("greater_than", json!({"field": "age", "value": 26})),
                OperationDescriptor::transform("upper_field", json!({"field": "name"})),
                OperationDescriptor::sort("age", true),
                OperationDescriptor::skip(0),
                OperationDescriptor::take(1),
            ])
            .unwrap();
        assert_eq!(pipeline.describe(), "greater_than → upper_field → sort → skip → take");
        let out = pipeline.run(&people()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].value("name").as_str(), Some("CHARLIE"));
    }

    #[test]
    fn test_run_reports_failures_without_data() {
        let result = service().run(&people(), &[OperationDescriptor::take(0)]);
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.data.is_none());
        assert!(result.error.unwrap().starts_with("Validation error: Operation 1:"));

        let mut table = people();
        table.push(Record::new().with("name", "Eve").with("age", "n/a"));
        let result = service().run(&table, &[OperationDescriptor::filter("less_than", json!({"field": "age", "value": 40}))]);
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("record 3"));
    }

    #[test]
    fn test_run_with_preview_and_diagnostics() {
        let mut table = people();
        table[0].insert("name", 1);
        let result = service().run_with(
            &table,
            &[OperationDescriptor::transform("lower_field", json!({"field": "name"}))],
            &RunOptions { known_fields: None, preview_limit: Some(2) },
        );
        assert!(result.is_completed());
        assert_eq!(result.record_count, Some(3));
        assert_eq!(result.data.as_ref().map(Vec::len), Some(2));
        assert_eq!(result.skipped, 1);
        assert_eq!(result.diagnostics[0].stage, 1);
    }
}
