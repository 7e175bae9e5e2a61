//! Webhook management endpoints.
//!
//! Every call names a documentation folder by `doc_id`; the caller must own
//! it. The GitHub credential is passed per call and never stored.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use docsync_core::errors::LifecycleError;
use docsync_core::lifecycle::HookHealth;
use docsync_core::models::{
    DocFolder, FileSyncRecord, Pagination, RepositoryStatus, TrackedRepository, WebhookEvent,
};

use crate::api::identity::Caller;
use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SetupRequest {
    pub doc_id: Option<i64>,
    pub github_token: Option<String>,
}

#[derive(Deserialize)]
pub struct RemoveRequest {
    pub doc_id: Option<i64>,
    pub github_token: Option<String>,
}

#[derive(Deserialize)]
pub struct TestRequest {
    pub github_token: Option<String>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize)]
struct SetupResponse {
    success: bool,
    message: String,
    webhook_url: String,
}

#[derive(Serialize)]
struct ActionResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct TestResponse {
    success: bool,
    message: String,
    state: HookHealth,
}

#[derive(Serialize)]
struct EventListItem {
    id: i64,
    event_type: String,
    delivery_id: String,
    commit_sha: Option<String>,
    status: String,
    error_message: Option<String>,
    files_processed: i64,
    created_at: String,
    processed_at: Option<String>,
    files: Vec<FileSyncItem>,
}

#[derive(Serialize)]
struct FileSyncItem {
    file_path: String,
    action: String,
    success: bool,
    error_message: Option<String>,
}

#[derive(Serialize)]
struct EventListResponse {
    items: Vec<EventListItem>,
    total: u64,
    page: u32,
    per_page: u32,
    total_pages: u32,
}

impl EventListItem {
    fn new(event: WebhookEvent, files: Vec<FileSyncRecord>) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type.as_str().to_string(),
            delivery_id: event.delivery_id,
            commit_sha: event.commit_sha,
            status: event.status.as_str().to_string(),
            error_message: event.error_message,
            files_processed: event.files_processed,
            created_at: event.created_at.to_rfc3339(),
            processed_at: event.processed_at.map(|t| t.to_rfc3339()),
            files: files
                .into_iter()
                .map(|f| FileSyncItem {
                    file_path: f.file_path,
                    action: f.action.as_str().to_string(),
                    success: f.success,
                    error_message: f.error_message,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/webhooks/setup", post(setup_webhook))
        .route("/api/webhooks/remove", delete(remove_webhook))
        .route("/api/webhooks/status/:doc_id", get(webhook_status))
        .route("/api/webhooks/test/:doc_id", post(test_webhook))
        .route("/api/webhooks/events/:doc_id", get(list_events))
}

async fn setup_webhook(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, AppError> {
    let (Some(doc_id), Some(token)) = (req.doc_id, non_blank(req.github_token)) else {
        return Err(AppError::BadRequest(
            "doc_id and github_token are required".into(),
        ));
    };

    let folder = owned_folder(&state, &caller, doc_id)?;
    let repo = tracked_repository(&state, &folder)?;

    let provisioned = state
        .lifecycle
        .provision(&repo, &token)
        .await
        .map_err(lifecycle_error)?;

    info!(doc_id, repo_id = repo.id, user = %caller.0, "webhook set up");
    Ok(Json(SetupResponse {
        success: true,
        message: provisioned.message().to_string(),
        webhook_url: provisioned.webhook_url,
    }))
}

async fn remove_webhook(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let doc_id = req
        .doc_id
        .ok_or_else(|| AppError::BadRequest("doc_id is required".into()))?;

    let folder = owned_folder(&state, &caller, doc_id)?;
    let repo = tracked_repository(&state, &folder)?;

    let token = non_blank(req.github_token);
    let outcome = state
        .lifecycle
        .deprovision(&repo, token.as_deref())
        .await
        .map_err(lifecycle_error)?;

    info!(doc_id, repo_id = repo.id, user = %caller.0, outcome = ?outcome, "webhook removed");
    Ok(Json(ActionResponse {
        success: true,
        message: outcome.message().to_string(),
    }))
}

async fn webhook_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(doc_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let folder = owned_folder(&state, &caller, doc_id)?;

    let Some(repo) = state.db.get_repository_for_folder(folder.id)? else {
        return Ok(Json(serde_json::json!({ "is_github_repo": false })));
    };

    let status = RepositoryStatus::from(&repo);
    let body = serde_json::to_value(&status)
        .map_err(|e| AppError::Internal(format!("failed to encode status: {}", e)))?;
    Ok(Json(body))
}

async fn test_webhook(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(doc_id): Path<i64>,
    Json(req): Json<TestRequest>,
) -> Result<Json<TestResponse>, AppError> {
    let token = non_blank(req.github_token)
        .ok_or_else(|| AppError::BadRequest("github_token is required".into()))?;

    let folder = owned_folder(&state, &caller, doc_id)?;
    let repo = tracked_repository(&state, &folder)?;

    let health = state
        .lifecycle
        .test(&repo, &token)
        .await
        .map_err(lifecycle_error)?;

    Ok(Json(TestResponse {
        success: health.is_healthy(),
        message: health.message().to_string(),
        state: health,
    }))
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(doc_id): Path<i64>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventListResponse>, AppError> {
    let folder = owned_folder(&state, &caller, doc_id)?;
    let repo = tracked_repository(&state, &folder)?;

    let defaults = Pagination::default();
    let pagination = Pagination {
        page: query.page.unwrap_or(defaults.page).max(1),
        per_page: query.per_page.unwrap_or(defaults.per_page).clamp(1, 100),
    };

    let page = state.db.list_events_for_repository(repo.id, &pagination)?;
    let mut items = Vec::with_capacity(page.items.len());
    for event in page.items {
        let files = state.db.list_file_syncs(event.id)?;
        items.push(EventListItem::new(event, files));
    }

    Ok(Json(EventListResponse {
        items,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
        total_pages: page.total_pages,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn owned_folder(state: &AppState, caller: &Caller, doc_id: i64) -> Result<DocFolder, AppError> {
    let folder = state
        .db
        .get_doc_folder(doc_id)?
        .ok_or_else(|| AppError::NotFound(format!("document {} not found", doc_id)))?;
    if folder.owner != caller.0 {
        warn!(doc_id, user = %caller.0, "rejected webhook management call for another user's folder");
        return Err(AppError::Forbidden("Permission denied".into()));
    }
    Ok(folder)
}

fn tracked_repository(state: &AppState, folder: &DocFolder) -> Result<TrackedRepository, AppError> {
    state
        .db
        .get_repository_for_folder(folder.id)?
        .ok_or_else(|| {
            AppError::BadRequest("This document was not created from a GitHub repository".into())
        })
}

fn lifecycle_error(e: LifecycleError) -> AppError {
    match e {
        LifecycleError::DatabaseError(db) => AppError::from(db),
        other => AppError::BadRequest(other.to_string()),
    }
}
