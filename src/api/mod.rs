//! HTTP CRUD surface over the memory repository.
//!
//! All routes live under `/api/v1` except `/health`. Responses never carry
//! embeddings. Errors are JSON bodies of the form
//! `{"error_code": ..., "message": ...}`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::XMemoryConfig;
use crate::error::Error;
use crate::memory::{
    dates, MemoryDocument, MemoryFilters, MemoryPatch, MemoryRepository, MemoryType, SortBy,
};
use crate::store::query::SortOrder;

#[derive(Clone)]
pub struct AppState {
    pub repo: MemoryRepository,
    pub config: Arc<XMemoryConfig>,
}

impl AppState {
    pub fn new(repo: MemoryRepository, config: Arc<XMemoryConfig>) -> Self {
        Self { repo, config }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/memories", get(list_memories).post(create_memory))
        .route("/api/v1/memories/search", get(search_memories))
        .route(
            "/api/v1/memories/{id}",
            get(get_memory).put(update_memory).delete(delete_memory),
        )
        .route("/api/v1/projects", get(list_projects))
        .route("/api/v1/projects/{id}/tasks", get(list_tasks))
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_code: String,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("memory {id} not found"))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_validation() {
            return Self::bad_request(err.to_string());
        }
        tracing::error!(error = %err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error_code: self.error_code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Bodies ──────────────────────────────────────────────────────────────

/// A memory as the API returns it: the stored document plus its id, minus the vector.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryResponse {
    pub id: String,
    #[serde(flatten)]
    pub memory: MemoryDocument,
}

impl From<MemoryDocument> for MemoryResponse {
    fn from(doc: MemoryDocument) -> Self {
        let mut memory = doc.without_embedding();
        Self {
            id: memory.id.take().unwrap_or_default(),
            memory,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemoryListResponse {
    pub memories: Vec<MemoryResponse>,
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct MemoryIdResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMemoryRequest {
    pub content: String,
    pub user_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub related_ids: Vec<String>,
    /// Any of the loose timestamp formats; defaults to now.
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub memory_type: Option<MemoryType>,
    pub user_id: Option<String>,
    pub parent_id: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub size: Option<usize>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerParams {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskParams {
    pub user_id: String,
}

const DEFAULT_PAGE_SIZE: usize = 10;

// ── Handlers ────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Response {
    match state.repo.repository().client().ping().await {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn create_memory(
    State(state): State<AppState>,
    Json(req): Json<CreateMemoryRequest>,
) -> Result<(StatusCode, Json<MemoryIdResponse>), ApiError> {
    if req.user_id.is_empty() {
        return Err(ApiError::bad_request("user_id must not be empty"));
    }
    let created_at = match req.created_at.as_deref() {
        Some(raw) => dates::parse_loose(raw, state.repo.utc_offset())?,
        None => state.repo.now(),
    };

    let mut doc = MemoryDocument::new(req.content, MemoryType::Raw, req.user_id)
        .with_tags(req.tags)
        .with_created_at(created_at);
    doc.title = req.title;
    doc.summary = req.summary;
    doc.parent_id = req.parent_id;
    doc.related_ids = req.related_ids;

    let id = state.repo.create_memory(doc).await?;
    Ok((StatusCode::CREATED, Json(MemoryIdResponse { id })))
}

async fn list_memories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<MemoryListResponse> {
    let page = params.page.unwrap_or(1);
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let max = state.config.retrieval.max_page_size;
    if page == 0 {
        return Err(ApiError::bad_request("page must be at least 1"));
    }
    if page_size == 0 || page_size > max {
        return Err(ApiError::bad_request(format!(
            "page_size must be between 1 and {max}"
        )));
    }

    let filters = MemoryFilters {
        user_id: params.user_id,
        memory_type: params.memory_type,
        parent_id: params.parent_id,
        tags: Vec::new(),
    };
    let result = state
        .repo
        .list_memories(
            &filters,
            page,
            page_size,
            params.sort_by.unwrap_or_default(),
            params.sort_order.unwrap_or_default(),
        )
        .await?;

    let total_pages = result.total_pages();
    Ok(Json(MemoryListResponse {
        memories: result.items.into_iter().map(MemoryResponse::from).collect(),
        total: result.total,
        page: result.page,
        page_size: result.page_size,
        total_pages,
    }))
}

async fn search_memories(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<MemoryListResponse> {
    if params.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let size = params.size.unwrap_or(state.config.retrieval.default_k);
    let max = state.config.retrieval.max_page_size;
    if size == 0 || size > max {
        return Err(ApiError::bad_request(format!("size must be between 1 and {max}")));
    }

    let mut filters = MemoryFilters::new();
    filters.user_id = params.user_id;
    let hits = state
        .repo
        .search_by_similarity(&params.query, &filters, size)
        .await?;

    let memories: Vec<MemoryResponse> = hits
        .into_iter()
        .map(|hit| MemoryResponse::from(hit.source))
        .collect();
    Ok(Json(MemoryListResponse {
        total: memories.len() as u64,
        memories,
        page: 1,
        page_size: size,
        total_pages: 1,
    }))
}

async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MemoryResponse> {
    state
        .repo
        .get_memory(&id)
        .await
        .map(|doc| Json(MemoryResponse::from(doc)))
        .ok_or_else(|| ApiError::not_found(&id))
}

async fn update_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<MemoryPatch>,
) -> ApiResult<MemoryResponse> {
    if patch.is_empty() {
        return Err(ApiError::bad_request("nothing to update"));
    }
    if !state.repo.edit_memory(&id, patch).await? {
        return Err(ApiError::not_found(&id));
    }
    get_memory(State(state), Path(id)).await
}

async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.repo.delete_memory(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(&id))
    }
}

async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> ApiResult<Vec<MemoryResponse>> {
    let projects = state.repo.get_projects(params.user_id.as_deref()).await?;
    Ok(Json(projects.into_iter().map(MemoryResponse::from).collect()))
}

async fn list_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<TaskParams>,
) -> ApiResult<Vec<MemoryResponse>> {
    let tasks = state.repo.get_tasks(&params.user_id, &project_id).await?;
    Ok(Json(tasks.into_iter().map(MemoryResponse::from).collect()))
}
