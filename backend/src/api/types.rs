//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::Table;
use crate::parser::{FileFormat, ParsedTable};
use crate::service::OperationDescriptor;

// =============================================================================
// Files
// =============================================================================

/// Metadata of an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: Uuid,
    pub filename: String,
    pub format: FileFormat,
    pub encoding: String,
    pub delimiter: Option<String>,
    pub columns: Vec<String>,
    pub record_count: usize,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
}

impl FileInfo {
    pub fn from_parsed(filename: impl Into<String>, size_bytes: usize, parsed: &ParsedTable) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            format: parsed.format,
            encoding: parsed.encoding.clone(),
            delimiter: parsed.delimiter.map(String::from),
            columns: parsed.headers.clone(),
            record_count: parsed.records.len(),
            size_bytes,
            uploaded_at: Utc::now(),
        }
    }
}

/// Query of `GET /api/files/{id}/preview`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub file_id: Uuid,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub records: Table,
}

// =============================================================================
// Pipelines
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    pub operations: Vec<OperationDescriptor>,
    /// When set, field references are checked against this file's columns.
    #[serde(default)]
    pub file_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub file_id: Uuid,
    pub operations: Vec<OperationDescriptor>,
    /// Return only the first `preview_limit` records.
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub preview_limit: Option<usize>,
}

/// Body of create and update on saved pipelines.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub operations: Vec<OperationDescriptor>,
}

/// A named, validated operation list kept by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPipeline {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub operations: Vec<OperationDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedPipeline {
    pub fn create(request: PipelineRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            tags: request.tags,
            operations: request.operations,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the contents, keeping id and creation time.
    pub fn update(&mut self, request: PipelineRequest) {
        self.name = request.name;
        self.description = request.description;
        self.tags = request.tags;
        self.operations = request.operations;
        self.updated_at = Utc::now();
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Query of `GET /api/pipelines`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagQuery {
    pub tag: Option<String>,
}

/// Error body shared by every endpoint.
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OperationKind;

    #[test]
    fn test_execute_request_defaults() {
        let request: ExecuteRequest = serde_json::from_value(json!({
            "file_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "operations": [{"type": "take", "config": {"n": 2}}]
        }))
        .unwrap();
        assert!(!request.preview);
        assert_eq!(request.preview_limit, None);
        assert_eq!(request.operations[0].kind, OperationKind::Take);
    }

    #[test]
    fn test_saved_pipeline_update_keeps_identity() {
        let request = || PipelineRequest {
            name: "adults".into(),
            description: None,
            tags: vec!["HR".into()],
            operations: vec![OperationDescriptor::take(1)],
        };
        let mut saved = SavedPipeline::create(request());
        let (id, created) = (saved.id, saved.created_at);
        saved.update(PipelineRequest { name: "seniors".into(), ..request() });
        assert_eq!((saved.id, saved.created_at), (id, created));
        assert_eq!(saved.name, "seniors");
        assert!(saved.has_tag("hr"));
        assert!(!saved.has_tag("finance"));
    }
}
