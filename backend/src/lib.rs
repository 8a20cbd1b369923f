//! # tablepipe - declarative pipelines over in-memory tables
//!
//! A caller describes a pipeline as a list of operation descriptors (JSON).
//! The service validates every descriptor against the operation registry,
//! compiles them into an immutable [`Pipeline`] and runs it on a table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Descriptors │────▶│  Validate   │────▶│    Build    │────▶│     Run     │
//! │   (JSON)    │     │ (registry)  │     │ (Pipeline)  │     │  (Table)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tablepipe::{OperationDescriptor, OperationRegistry, PipelineService, Record};
//!
//! let registry = Arc::new(OperationRegistry::with_builtins().unwrap());
//! let service = PipelineService::new(registry);
//! let table = vec![
//!     Record::new().with("name", "Alice").with("age", 30),
//!     Record::new().with("name", "Bob").with("age", 25),
//! ];
//! let result = service.run(&table, &[
//!     OperationDescriptor::filter("greater_than", json!({"field": "age", "value": 27})),
//!     OperationDescriptor::transform("upper_field", json!({"field": "name"})),
//! ]);
//! assert!(result.is_completed());
//! assert_eq!(result.record_count, Some(1));
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types
//! - [`models`] - Values, records and tables
//! - [`ops`] - Predicate and transform primitives
//! - [`registry`] - Operation catalog and parameter validation
//! - [`pipeline`] - Immutable executable pipelines
//! - [`service`] - Validation and execution service
//! - [`parser`] / [`writer`] - Table ingestion and output
//! - [`config`] - Environment settings
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Operations
pub mod ops;
pub mod registry;
pub mod pipeline;
pub mod service;

// I/O
pub mod parser;
pub mod writer;

// Runtime
pub mod config;
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigurationError,
    EvalError,
    ExecutionError,
    OperationExecutionError,
    ParameterError,
    ReadError,
    RegistryError,
    ServerError,
    ValidationError,
    WriteError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{field_names, Record, Table, Value};

// =============================================================================
// Re-exports - Registry and pipeline
// =============================================================================

pub use registry::{Executor, FieldEffect, OperationDefinition, OperationKind, OperationRegistry, ParamSpec, ParamType};
pub use pipeline::{Diagnostic, Pipeline, PipelineOutput};

// =============================================================================
// Re-exports - Service
// =============================================================================

pub use service::{
    ExecutionResult,
    ExecutionStatus,
    OperationDescriptor,
    PipelineService,
    RunOptions,
    ValidationReport,
};

// =============================================================================
// Re-exports - I/O
// =============================================================================

pub use parser::{parse_bytes, parse_file_auto, FileFormat, ParsedTable};
pub use writer::{render, write_file};

pub use config::Settings;
