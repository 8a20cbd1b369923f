//! Executable pipelines.
//!
//! A [`Pipeline`] is an immutable, ordered list of compiled stages. Builder
//! methods return a new pipeline with one more stage; stages are shared
//! through `Arc`, so branching off a partially built pipeline is cheap.
//!
//! # Example
//!
//! ```rust
//! use tablepipe::models::{Record, Value};
//! use tablepipe::ops::filters;
//! use tablepipe::pipeline::Pipeline;
//!
//! let table = vec![
//!     Record::new().with("name", "Alice").with("age", 30),
//!     Record::new().with("name", "Bob").with("age", 25),
//! ];
//! let adults = Pipeline::new()
//!     .filter("greater_than", filters::greater_than("age", Value::from(27)))
//!     .sort_by_field("age", true);
//! let output = adults.run(&table).unwrap();
//! assert_eq!(output.records.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::ExecutionError;
use crate::models::{Record, Table, Value};
use crate::ops::{Predicate, RecordTransform};

/// Computes the sort key of a record. Called once per record per run.
pub type SortKey = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

enum StageOp {
    Filter(Predicate),
    Map(RecordTransform),
    Sort { key: SortKey, reverse: bool },
    Take(NonZeroUsize),
    Skip(usize),
}

struct Stage {
    label: String,
    op: StageOp,
}

/// A transform that left a record unchanged, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 1-based stage index.
    pub stage: usize,
    pub operation: String,
    /// Position of the record in the table entering the stage.
    pub row: usize,
    pub reason: String,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub records: Table,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineOutput {
    /// Number of records a transform skipped.
    pub fn skipped(&self) -> usize {
        self.diagnostics.len()
    }
}

#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, label: impl Into<String>, op: StageOp) -> Self {
        let mut stages = self.stages.clone();
        stages.push(Arc::new(Stage { label: label.into(), op }));
        Self { stages }
    }

    pub fn filter(&self, label: impl Into<String>, predicate: Predicate) -> Self {
        self.append(label, StageOp::Filter(predicate))
    }

    pub fn map(&self, label: impl Into<String>, transform: RecordTransform) -> Self {
        self.append(label, StageOp::Map(transform))
    }

    /// Stable sort by a computed key, ascending unless `reverse`.
    pub fn sort(&self, label: impl Into<String>, key: SortKey, reverse: bool) -> Self {
        self.append(label, StageOp::Sort { key, reverse })
    }

    /// Stable sort on one field; missing fields sort as null.
    pub fn sort_by_field(&self, field: impl Into<String>, reverse: bool) -> Self {
        let field = field.into();
        self.sort("sort", Arc::new(move |record: &Record| record.value(&field).clone()), reverse)
    }

    /// First `n` records. `n` is at least one; use [`Pipeline::skip`] with
    /// the table length to drop everything.
    pub fn take(&self, n: NonZeroUsize) -> Self {
        self.append("take", StageOp::Take(n))
    }

    pub fn skip(&self, n: usize) -> Self {
        self.append("skip", StageOp::Skip(n))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.label.as_str())
    }

    /// Stage labels joined with arrows.
    pub fn describe(&self) -> String {
        self.labels().collect::<Vec<_>>().join(" → ")
    }

    /// Run against a borrowed table. The input is cloned once.
    pub fn run(&self, table: &[Record]) -> Result<PipelineOutput, ExecutionError> {
        self.run_owned(table.to_vec())
    }

    /// Run, consuming the table.
    pub fn run_owned(&self, table: Table) -> Result<PipelineOutput, ExecutionError> {
        let mut diagnostics = Vec::new();
        let records = self
            .stages
            .iter()
            .enumerate()
            .try_fold(table, |records, (i, stage)| stage.apply(i + 1, records, &mut diagnostics))?;
        Ok(PipelineOutput { records, diagnostics })
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.labels().collect::<Vec<_>>()).finish()
    }
}

impl Stage {
    fn apply(&self, index: usize, records: Table, diagnostics: &mut Vec<Diagnostic>) -> Result<Table, ExecutionError> {
        match &self.op {
            StageOp::Filter(predicate) => {
                let mut kept = Vec::with_capacity(records.len());
                for (row, record) in records.into_iter().enumerate() {
                    let keep = predicate(&record).map_err(|source| ExecutionError::Predicate {
                        stage: index,
                        operation: self.label.clone(),
                        row,
                        source,
                    })?;
                    if keep {
                        kept.push(record);
                    }
                }
                Ok(kept)
            }
            StageOp::Map(transform) => Ok(records
                .into_iter()
                .enumerate()
                .map(|(row, record)| {
                    let out = transform(record);
                    if let Some(reason) = out.diagnostic {
                        diagnostics.push(Diagnostic { stage: index, operation: self.label.clone(), row, reason });
                    }
                    out.record
                })
                .collect()),
            StageOp::Sort { key, reverse } => self.sort(index, records, key, *reverse),
            StageOp::Take(n) => {
                let mut records = records;
                records.truncate(n.get());
                Ok(records)
            }
            StageOp::Skip(n) => Ok(records.into_iter().skip(*n).collect()),
        }
    }

    fn sort(&self, index: usize, records: Table, key: &SortKey, reverse: bool) -> Result<Table, ExecutionError> {
        let mut keyed: Vec<(Value, Record)> = records.into_iter().map(|r| (key(&r), r)).collect();
        if let Some((first, _)) = keyed.first() {
            if let Some((other, _)) = keyed.iter().find(|(k, _)| k.class() != first.class()) {
                return Err(ExecutionError::IncomparableSortKeys {
                    stage: index,
                    operation: self.label.clone(),
                    first: first.type_name(),
                    second: other.type_name(),
                });
            }
        }
        keyed.sort_by(|(a, _), (b, _)| {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(keyed.into_iter().map(|(_, r)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::ops::{filters, transforms};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn n(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).unwrap()
    }

    fn people() -> Table {
        vec![
            Record::new().with("name", "Alice").with("age", 30).with("team", "a"),
            Record::new().with("name", "Bob").with("age", 25).with("team", "b"),
            Record::new().with("name", "Charlie").with("age", 35).with("team", "a"),
            Record::new().with("name", "Diana").with("age", 28).with("team", "b"),
        ]
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records.iter().filter_map(|r| r.value("name").as_str()).collect()
    }

    #[test]
    fn test_builders_never_mutate_the_original() {
        let base = Pipeline::new().filter("gt", filters::greater_than("age", Value::from(26)));
        let taken = base.take(n(1));
        let sorted = base.sort_by_field("age", false);
        assert_eq!(base.len(), 1);
        assert_eq!(taken.len(), 2);
        assert_eq!(sorted.describe(), "gt → sort");
        assert_eq!(base.run(&people()).unwrap().records.len(), 3);
    }

    #[test]
    fn test_stage_order_matters() {
        let gt = filters::greater_than("age", Value::from(26));
        let filter_then_take = Pipeline::new().filter("gt", gt.clone()).take(n(2));
        let take_then_filter = Pipeline::new().take(n(2)).filter("gt", gt);
        assert_eq!(names(&filter_then_take.run(&people()).unwrap().records), vec!["Alice", "Charlie"]);
        assert_eq!(names(&take_then_filter.run(&people()).unwrap().records), vec!["Alice"]);
    }

    #[test]
    fn test_sort_is_stable_in_both_directions() {
        let asc = Pipeline::new().sort_by_field("team", false).run(&people()).unwrap();
        assert_eq!(names(&asc.records), vec!["Alice", "Charlie", "Bob", "Diana"]);
        let desc = Pipeline::new().sort_by_field("team", true).run(&people()).unwrap();
        assert_eq!(names(&desc.records), vec!["Bob", "Diana", "Alice", "Charlie"]);
    }

    #[test]
    fn test_sort_key_runs_once_per_record() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let key: SortKey = Arc::new(move |r: &Record| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            r.value("age").clone()
        });
        let out = Pipeline::new().sort("by_age", key, false).run(&people()).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 4);
        assert_eq!(names(&out.records), vec!["Bob", "Diana", "Alice", "Charlie"]);
    }

    #[test]
    fn test_mixed_sort_keys_fail() {
        let mut table = people();
        table.push(Record::new().with("name", "Eve").with("age", "unknown"));
        let err = Pipeline::new().sort_by_field("age", false).run(&table).unwrap_err();
        assert!(matches!(err, ExecutionError::IncomparableSortKeys { stage: 1, .. }));
    }

    #[test]
    fn test_take_and_skip_slicing() {
        let table = people();
        let out = Pipeline::new().take(n(3)).skip(0).run(&table).unwrap();
        assert_eq!(out.records, table[..3].to_vec());
        assert!(Pipeline::new().skip(table.len()).run(&table).unwrap().records.is_empty());
        assert_eq!(Pipeline::new().take(n(10)).run(&table).unwrap().records.len(), 4);
        assert_eq!(Pipeline::new().take(NonZeroUsize::MIN).run(&table).unwrap().records, table[..1].to_vec());
        assert!(NonZeroUsize::new(0).is_none());
    }

    #[test]
    fn test_predicate_error_stops_the_run() {
        let failing: Predicate = Arc::new(|_: &Record| Err::<bool, _>(EvalError::new("boom")));
        let err = Pipeline::new().take(n(4)).filter("bad", failing).run(&people()).unwrap_err();
        match err {
            ExecutionError::Predicate { stage, operation, row, .. } => {
                assert_eq!((stage, operation.as_str(), row), (2, "bad", 0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_map_collects_diagnostics() {
        let mut table = people();
        table[1].insert("name", 7);
        let out = Pipeline::new().map("upper_field", transforms::upper_field("name")).run(&table).unwrap();
        assert_eq!(out.skipped(), 1);
        assert_eq!(out.diagnostics[0].row, 1);
        assert_eq!(out.records[0].value("name"), &Value::from("ALICE"));
        assert_eq!(out.records[1].value("name"), &Value::from(7));
    }

    #[test]
    fn test_empty_pipeline_and_table() {
        let out = Pipeline::new().run(&people()).unwrap();
        assert_eq!(out.records, people());
        let out = Pipeline::new().filter("gt", filters::greater_than("age", Value::from(1))).run(&[]).unwrap();
        assert!(out.records.is_empty());
    }
}
