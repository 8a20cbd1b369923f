//! HTTP server for the pipeline API.
//!
//! Uploaded files, execution results and saved pipelines live in memory for
//! the lifetime of the process.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                    |
//! |--------|------------------------------------|--------------------------------|
//! | GET    | `/health`                          | Health check                   |
//! | GET    | `/api/operations`                  | Operation catalog              |
//! | GET    | `/api/operations/{name}`           | One operation                  |
//! | POST   | `/api/files`                       | Upload a table (multipart)     |
//! | GET    | `/api/files`                       | Uploaded files                 |
//! | GET    | `/api/files/{id}/preview`          | Page through a file            |
//! | DELETE | `/api/files/{id}`                  | Forget a file                  |
//! | POST   | `/api/pipelines/validate`          | Validate an operation list     |
//! | POST   | `/api/pipelines/execute`           | Run an operation list on a file|
//! | GET    | `/api/pipelines/executions/{id}`   | A past execution result        |
//! | POST   | `/api/pipelines`                   | Save a pipeline                |
//! | GET    | `/api/pipelines`                   | Saved pipelines, `?tag=`       |
//! | GET    | `/api/pipelines/{id}`              | One saved pipeline             |
//! | PUT    | `/api/pipelines/{id}`              | Replace a saved pipeline       |
//! | DELETE | `/api/pipelines/{id}`              | Delete a saved pipeline        |
//! | GET    | `/api/logs`                        | SSE stream of execution logs   |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::{convert::Infallible, path::Path as FsPath, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use super::logs::{log_info, log_success, log_warning, LOG_BROADCASTER};
use super::types::{
    error_response, ExecuteRequest, FileInfo, PipelineRequest, PreviewQuery, PreviewResponse, SavedPipeline,
    TagQuery, ValidateRequest,
};
use crate::config::Settings;
use crate::error::{ServerError, ServerResult};
use crate::models::Table;
use crate::parser::{parse_bytes, FileFormat};
use crate::registry::OperationDefinition;
use crate::service::{ExecutionResult, PipelineService, RunOptions, ValidationReport};

// =============================================================================
// State
// =============================================================================

struct StoredFile {
    info: FileInfo,
    records: Arc<Table>,
}

/// Shared server state.
pub struct AppState {
    pub service: PipelineService,
    pub settings: Settings,
    files: RwLock<IndexMap<Uuid, StoredFile>>,
    executions: RwLock<IndexMap<Uuid, ExecutionResult>>,
    pipelines: RwLock<IndexMap<Uuid, SavedPipeline>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(service: PipelineService, settings: Settings) -> Self {
        Self {
            service,
            settings,
            files: RwLock::new(IndexMap::new()),
            executions: RwLock::new(IndexMap::new()),
            pipelines: RwLock::new(IndexMap::new()),
        }
    }

    /// Parse an upload and keep it. The format comes from the file name.
    pub async fn store_file(&self, filename: &str, bytes: Vec<u8>) -> ServerResult<FileInfo> {
        let limit = self.settings.max_upload_bytes();
        if bytes.len() > limit {
            return Err(ServerError::PayloadTooLarge { size: bytes.len(), limit });
        }
        let format = FileFormat::from_path(FsPath::new(filename))?;
        let parsed = tokio::task::spawn_blocking(move || parse_bytes(&bytes, format).map(|p| (p, bytes.len())))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let (parsed, size) = parsed?;

        let info = FileInfo::from_parsed(filename, size, &parsed);
        log_success(format!(
            "Stored {} ({}, {} records, {} columns)",
            filename,
            info.format,
            info.record_count,
            info.columns.len()
        ));
        self.files
            .write()
            .await
            .insert(info.id, StoredFile { info: info.clone(), records: Arc::new(parsed.records) });
        Ok(info)
    }

    async fn file_columns(&self, id: Uuid) -> ServerResult<Vec<String>> {
        let files = self.files.read().await;
        let file = files.get(&id).ok_or_else(|| file_not_found(id))?;
        Ok(file.info.columns.clone())
    }

    /// Validate, then run on a stored file. The result is kept for lookup.
    pub async fn execute(&self, request: ExecuteRequest) -> ServerResult<ExecutionResult> {
        let (records, columns) = {
            let files = self.files.read().await;
            let file = files.get(&request.file_id).ok_or_else(|| file_not_found(request.file_id))?;
            (file.records.clone(), file.info.columns.clone())
        };
        let options = RunOptions {
            known_fields: Some(columns),
            preview_limit: request
                .preview
                .then(|| request.preview_limit.unwrap_or(self.settings.preview_limit)),
        };
        let service = self.service.clone();
        let operations = request.operations;
        let result = tokio::task::spawn_blocking(move || service.run_with(&records, &operations, &options))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        self.executions.write().await.insert(result.execution_id, result.clone());
        Ok(result)
    }

    /// Validate and save. Invalid operation lists are rejected.
    pub async fn save_pipeline(&self, id: Option<Uuid>, request: PipelineRequest) -> ServerResult<SavedPipeline> {
        if request.name.trim().is_empty() {
            return Err(ServerError::BadRequest("Pipeline name must not be empty".into()));
        }
        let report = self.service.validate(&request.operations, None);
        if !report.valid {
            return Err(ServerError::BadRequest(report.errors.join("; ")));
        }

        let mut pipelines = self.pipelines.write().await;
        let saved = match id {
            Some(id) => {
                let existing = pipelines.get_mut(&id).ok_or_else(|| pipeline_not_found(id))?;
                existing.update(request);
                existing.clone()
            }
            None => {
                let saved = SavedPipeline::create(request);
                pipelines.insert(saved.id, saved.clone());
                saved
            }
        };
        log_info(format!("Saved pipeline '{}' ({} operations)", saved.name, saved.operations.len()));
        Ok(saved)
    }
}

fn file_not_found(id: Uuid) -> ServerError {
    ServerError::NotFound(format!("file {}", id))
}

fn pipeline_not_found(id: Uuid) -> ServerError {
    ServerError::NotFound(format!("pipeline {}", id))
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Read(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

// =============================================================================
// Router
// =============================================================================

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };
    cors.allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE])
}

pub fn router(state: SharedState) -> Router {
    // Multipart framing adds a little on top of the file itself.
    let body_limit = state.settings.max_upload_bytes().saturating_add(64 * 1024);
    let cors = cors_layer(&state.settings);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/operations", get(list_operations))
        .route("/api/operations/{name}", get(get_operation))
        .route("/api/files", post(upload_file).get(list_files))
        .route("/api/files/{id}", delete(delete_file))
        .route("/api/files/{id}/preview", get(preview_file))
        .route("/api/pipelines/validate", post(validate_pipeline))
        .route("/api/pipelines/execute", post(execute_pipeline))
        .route("/api/pipelines/executions/{id}", get(get_execution))
        .route("/api/pipelines", post(create_pipeline).get(list_pipelines))
        .route(
            "/api/pipelines/{id}",
            get(get_pipeline).put(update_pipeline).delete(delete_pipeline),
        )
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(service: PipelineService, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = settings.bind_address();
    let state = Arc::new(AppState::new(service, settings));
    let operations = state.service.registry().len();
    let app = router(state);

    println!("🚀 tablepipe server running on http://{}", addr);
    println!("   {} operations registered", operations);
    println!("   GET  /api/operations           - Operation catalog");
    println!("   POST /api/files                - Upload a table");
    println!("   POST /api/pipelines/validate   - Validate operations");
    println!("   POST /api/pipelines/execute    - Run operations on a file");
    println!("   GET  /api/logs                 - SSE log stream");
    println!("   GET  /health                   - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tablepipe",
        "version": env!("CARGO_PKG_VERSION"),
        "operations": state.service.registry().len(),
    }))
}

async fn list_operations(State(state): State<SharedState>) -> Json<Vec<OperationDefinition>> {
    Json(state.service.registry().all().cloned().collect())
}

async fn get_operation(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ServerResult<Json<OperationDefinition>> {
    state
        .service
        .registry()
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("operation '{}'", name)))
}

async fn upload_file(State(state): State<SharedState>, mut multipart: Multipart) -> ServerResult<Json<FileInfo>> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
            upload = Some((name, bytes.to_vec()));
        }
    }

    let (name, bytes) = upload.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    log_info(format!("📄 Upload: {} ({} bytes)", name, bytes.len()));
    Ok(Json(state.store_file(&name, bytes).await?))
}

async fn list_files(State(state): State<SharedState>) -> Json<Vec<FileInfo>> {
    let files = state.files.read().await;
    Json(files.values().map(|f| f.info.clone()).collect())
}

async fn preview_file(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> ServerResult<Json<PreviewResponse>> {
    let files = state.files.read().await;
    let file = files.get(&id).ok_or_else(|| file_not_found(id))?;
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(state.settings.preview_limit).min(state.settings.preview_limit);
    let records = file.records.iter().skip(offset).take(limit).cloned().collect();
    Ok(Json(PreviewResponse { file_id: id, offset, limit, total: file.records.len(), records }))
}

async fn delete_file(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ServerResult<Json<Value>> {
    let removed = state.files.write().await.shift_remove(&id);
    let file = removed.ok_or_else(|| file_not_found(id))?;
    log_info(format!("Deleted file {}", file.info.filename));
    Ok(Json(json!({ "deleted": id })))
}

async fn validate_pipeline(
    State(state): State<SharedState>,
    Json(request): Json<ValidateRequest>,
) -> ServerResult<Json<ValidationReport>> {
    let columns = match request.file_id {
        Some(id) => Some(state.file_columns(id).await?),
        None => None,
    };
    let report = state.service.validate(&request.operations, columns.as_deref());
    if !report.valid {
        log_warning(format!("Validation failed with {} errors", report.errors.len()));
    }
    Ok(Json(report))
}

async fn execute_pipeline(
    State(state): State<SharedState>,
    Json(request): Json<ExecuteRequest>,
) -> ServerResult<Json<ExecutionResult>> {
    Ok(Json(state.execute(request).await?))
}

async fn get_execution(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<ExecutionResult>> {
    let executions = state.executions.read().await;
    executions
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("execution {}", id)))
}

async fn create_pipeline(
    State(state): State<SharedState>,
    Json(request): Json<PipelineRequest>,
) -> ServerResult<(StatusCode, Json<SavedPipeline>)> {
    let saved = state.save_pipeline(None, request).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list_pipelines(
    State(state): State<SharedState>,
    Query(query): Query<TagQuery>,
) -> Json<Vec<SavedPipeline>> {
    let pipelines = state.pipelines.read().await;
    Json(
        pipelines
            .values()
            .filter(|p| query.tag.as_deref().map_or(true, |tag| p.has_tag(tag)))
            .cloned()
            .collect(),
    )
}

async fn get_pipeline(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ServerResult<Json<SavedPipeline>> {
    let pipelines = state.pipelines.read().await;
    pipelines.get(&id).cloned().map(Json).ok_or_else(|| pipeline_not_found(id))
}

async fn update_pipeline(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PipelineRequest>,
) -> ServerResult<Json<SavedPipeline>> {
    Ok(Json(state.save_pipeline(Some(id), request).await?))
}

async fn delete_pipeline(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ServerResult<Json<Value>> {
    let removed = state.pipelines.write().await.shift_remove(&id);
    removed.ok_or_else(|| pipeline_not_found(id))?;
    Ok(Json(json!({ "deleted": id })))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(LOG_BROADCASTER.subscribe()).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
