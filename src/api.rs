//! HTTP surface: routing, request validation and the response envelope.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::schema::{ApiResponse, CreateNodeRequest, Depth, NodeTree};
use crate::service::{NodeService, ServiceError};

/// Application context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NodeService>,
    pub source_path: Option<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/nodes", get(find_by_name).post(create_node))
        .route("/api/v1/nodes/orgs/all", get(get_all_orgs))
        .route("/api/v1/nodes/orgs/download", get(download_source))
        .route("/api/v1/nodes/:id", get(get_by_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Validation(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m.as_str()),
            ApiError::Validation(m) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", m.as_str()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, "CONFLICT", m.as_str()),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", m.as_str()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ApiResponse::<()>::error(code, message);
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(m) => ApiError::NotFound(m),
            ServiceError::Validation(m) => ApiError::Validation(m),
            ServiceError::Conflict(m) => ApiError::Conflict(m),
            ServiceError::Store(e) => {
                error!("Store failure: {}", e);
                ApiError::Internal("storage failure".to_string())
            }
        }
    }
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::ok(data))))
}

/// Run blocking store work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| {
            error!("Blocking task failed: {}", e);
            ApiError::Internal("request aborted".to_string())
        })?
        .map_err(ApiError::from)
}

// ============================================================================
// Request parsing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub depth: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
    pub depth: Option<i64>,
}

fn parse_depth(raw: Option<i64>) -> Result<Depth, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::Validation("depth is required".to_string()))?;
    Depth::new(raw).map_err(|e| ApiError::Validation(e.to_string()))
}

fn rejected(e: impl std::fmt::Display) -> ApiError {
    ApiError::Validation(e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// `GET /api/v1/nodes?name=&depth=`
pub async fn find_by_name(
    State(state): State<AppState>,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> ApiResult<NodeTree> {
    let Query(query) = query.map_err(rejected)?;
    let name = query
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("name is required".to_string()))?;
    let depth = parse_depth(query.depth)?;

    let service = state.service.clone();
    let lookup = name.clone();
    let node = blocking(move || service.find_by_name(&lookup, depth)).await?;

    match node {
        Some(node) => ok(node),
        None => Err(ApiError::NotFound(format!("node '{}' not found", name))),
    }
}

/// `GET /api/v1/nodes/:id?depth=`
pub async fn get_by_id(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    query: Result<Query<DepthQuery>, QueryRejection>,
) -> ApiResult<NodeTree> {
    let Path(raw_id) = id.map_err(rejected)?;
    let id = Uuid::parse_str(&raw_id)
        .map_err(|_| ApiError::Validation(format!("invalid node id '{}'", raw_id)))?;
    let Query(query) = query.map_err(rejected)?;
    let depth = parse_depth(query.depth)?;

    let service = state.service.clone();
    let node = blocking(move || service.get_by_id(id, depth)).await?;

    match node {
        Some(node) => ok(node),
        None => Err(ApiError::NotFound(format!("node {} not found", id))),
    }
}

/// `POST /api/v1/nodes`
pub async fn create_node(
    State(state): State<AppState>,
    body: Result<Json<CreateNodeRequest>, JsonRejection>,
) -> ApiResult<NodeTree> {
    let Json(req) = body.map_err(rejected)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let service = state.service.clone();
    let node = blocking(move || service.create_node(&req.name, req.parent_id)).await?;
    ok(node)
}

/// `GET /api/v1/nodes/orgs/all`
pub async fn get_all_orgs(State(state): State<AppState>) -> ApiResult<Vec<NodeTree>> {
    let service = state.service.clone();
    let roots = blocking(move || service.get_roots()).await?;
    ok(roots)
}

/// `GET /api/v1/nodes/orgs/download`: the configured source spreadsheet.
pub async fn download_source(State(state): State<AppState>) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound("File not found".to_string());
    let path = state.source_path.as_ref().ok_or_else(not_found)?;

    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return Err(ApiError::Internal("failed to read source file".to_string()));
        }
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "orgs.xlsx".to_string());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&filename).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ),
        ],
        data,
    )
        .into_response())
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsm" => "application/vnd.ms-excel.sheet.macroEnabled.12",
        "xlsb" => "application/vnd.ms-excel.sheet.binary.macroEnabled.12",
        "xls" => "application/vnd.ms-excel",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
