//! Error types for the tablepipe pipeline.
//!
//! This module defines the error hierarchy:
//!
//! - [`ConfigurationError`] - Registry setup and primitive construction errors
//! - [`ParameterError`] - A descriptor's parameters fail the operation schema
//! - [`OperationExecutionError`] - An executor factory rejected validated parameters
//! - [`RegistryError`] - Everything that can go wrong resolving an operation
//! - [`ValidationError`] - Aggregate of every problem found in a descriptor list
//! - [`EvalError`] - A predicate or sort key failed on a record
//! - [`ExecutionError`] - Running a pipeline failed
//! - [`ReadError`] - Table ingestion errors
//! - [`WriteError`] - Table output errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::registry::OperationKind;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Malformed registry setup or primitive arguments.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    /// An operation with this name is already registered.
    #[error("Operation '{0}' already registered")]
    DuplicateOperation(String),

    /// The parameter schema of an operation does not compile.
    #[error("Invalid parameter schema for '{operation}': {message}")]
    InvalidSchema { operation: String, message: String },

    /// A primitive rejected its arguments.
    #[error("{0}")]
    InvalidArgument(String),
}

// =============================================================================
// Parameter Errors
// =============================================================================

/// Every schema violation found in one descriptor's parameters.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid parameters for {operation}: {}", .violations.join("; "))]
pub struct ParameterError {
    pub operation: String,
    pub violations: Vec<String>,
}

/// A factory failed after its parameters validated.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Failed to execute {operation}: {source}")]
pub struct OperationExecutionError {
    pub operation: String,
    #[source]
    pub source: ConfigurationError,
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors resolving an operation name into an executor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// No operation with this name.
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    /// Parameters failed the schema.
    #[error(transparent)]
    Parameters(#[from] ParameterError),

    /// The factory failed.
    #[error(transparent)]
    Execution(#[from] OperationExecutionError),

    /// Sort/take/skip are pipeline builder calls, not record executors.
    #[error("Operation '{operation}' is a {kind} utility and has no executor")]
    NotExecutable { operation: String, kind: OperationKind },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Aggregate of all problems in a descriptor list.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Pipeline validation failed: {}", .errors.join(", "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

// =============================================================================
// Execution Errors
// =============================================================================

/// A predicate or key function failed on one record.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct EvalError(pub String);

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Runtime failure of a pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// The descriptor list did not validate.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A filter predicate failed.
    #[error("Stage {stage} ({operation}) failed on record {row}: {source}")]
    Predicate {
        stage: usize,
        operation: String,
        row: usize,
        #[source]
        source: EvalError,
    },

    /// Sort keys mix values that cannot be ordered against each other.
    #[error("Stage {stage} ({operation}): sort keys are not mutually comparable ({first} vs {second})")]
    IncomparableSortKeys {
        stage: usize,
        operation: String,
        first: &'static str,
        second: &'static str,
    },
}

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while reading a table from bytes or a file.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported file extension or format name.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Malformed CSV/TSV content.
    #[error("Line {line}: {message}")]
    Csv { line: usize, message: String },

    /// Malformed JSON content.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON that is not an object or an array of objects.
    #[error("JSON must contain an object or an array of objects")]
    NotRecords,

    /// Empty file.
    #[error("File is empty")]
    EmptyFile,
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing a table.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to write file.
    #[error("Failed to write file: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output format that cannot be written.
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Uploaded file could not be read.
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payload larger than the configured limit.
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for ingestion.
pub type ReadResult<T> = Result<T, ReadError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ParameterError -> RegistryError
        let param_err = ParameterError {
            operation: "take".into(),
            violations: vec!["n must be a positive integer".into()],
        };
        let registry_err: RegistryError = param_err.into();
        assert!(registry_err.to_string().contains("positive integer"));

        // ValidationError -> ExecutionError
        let validation = ValidationError { errors: vec!["Operation 1: Unknown operation 'x'".into()] };
        let exec_err: ExecutionError = validation.into();
        assert!(exec_err.to_string().starts_with("Pipeline validation failed"));
    }

    #[test]
    fn test_parameter_error_lists_every_violation() {
        let err = ParameterError {
            operation: "contains".into(),
            violations: vec!["missing field".into(), "unknown key".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("missing field"));
        assert!(msg.contains("unknown key"));
    }

    #[test]
    fn test_operation_execution_error_keeps_cause() {
        let err = OperationExecutionError {
            operation: "between".into(),
            source: ConfigurationError::InvalidArgument("min_val must be less than max_val".into()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to execute between: min_val must be less than max_val"
        );
    }
}
