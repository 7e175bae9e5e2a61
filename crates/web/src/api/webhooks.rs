//! GitHub webhook receiver.
//!
//! `POST /webhook/github/{repository_id}/` accepts deliveries for one tracked
//! repository. Processing runs on its own task tied to a cancellation token;
//! if the request is dropped mid-flight the token fires and no further files
//! are started.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use docsync_core::errors::SyncError;
use docsync_core::github::signature::{SIGNATURE_256_HEADER, SIGNATURE_HEADER};
use docsync_core::sync::{Delivery, Ingested};

use crate::api::status::AppError;
use crate::AppState;

const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook/github/:repository_id", post(github_webhook))
        .route("/webhook/github/:repository_id/", post(github_webhook))
}

async fn github_webhook(
    State(state): State<Arc<AppState>>,
    Path(repository_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = header_value(&headers, EVENT_HEADER);
    let delivery_id = header_value(&headers, DELIVERY_HEADER);
    let signature = header_value(&headers, SIGNATURE_256_HEADER)
        .or_else(|| header_value(&headers, SIGNATURE_HEADER));

    info!(
        repo_id = repository_id,
        event = event.as_deref().unwrap_or("-"),
        delivery_id = delivery_id.as_deref().unwrap_or("-"),
        bytes = body.len(),
        "received GitHub webhook"
    );

    let cancel = CancellationToken::new();
    // Cancels the processing task if this handler is dropped.
    let _guard = cancel.clone().drop_guard();

    let ingestor = state.ingestor.clone();
    let task = tokio::spawn(async move {
        let delivery = Delivery {
            event: event.as_deref(),
            delivery_id: delivery_id.as_deref(),
            signature: signature.as_deref(),
            body: &body,
        };
        ingestor.ingest(repository_id, delivery, cancel).await
    });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            error!(repo_id = repository_id, error = %e, "webhook processing task failed");
            return AppError::Internal(format!("webhook processing failed: {}", e)).into_response();
        }
    };

    match result {
        Ok(ingested) => {
            broadcast_outcome(&state, &ingested);
            (StatusCode::OK, Json(ingested.outcome.response_body())).into_response()
        }
        Err(e) => {
            broadcast_failure(&state, repository_id, &e);
            sync_error_response(e).into_response()
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn sync_error_response(e: SyncError) -> AppError {
    match e {
        SyncError::SignatureInvalid => AppError::Forbidden("Invalid signature".into()),
        SyncError::UnknownRepository(_) => AppError::NotFound(e.to_string()),
        SyncError::MissingHeader(_) | SyncError::PayloadMalformed(_) => {
            AppError::BadRequest(e.to_string())
        }
        other => {
            error!(error = %other, "webhook processing failed");
            AppError::Internal(other.to_string())
        }
    }
}

fn broadcast_outcome(state: &AppState, ingested: &Ingested) {
    let Some(status) = ingested.outcome.event_status() else {
        return;
    };
    let update = serde_json::json!({
        "type": "webhook_event",
        "repository_id": ingested.repository.id,
        "repository": ingested.repository.full_name(),
        "event_id": ingested.event_id,
        "status": status.as_str(),
        "result": ingested.outcome.response_body(),
    });
    // No subscribers is fine.
    let _ = state.ws_broadcast.send(update.to_string());
}

fn broadcast_failure(state: &AppState, repository_id: i64, e: &SyncError) {
    // Rejected before an event row was written.
    if matches!(
        e,
        SyncError::SignatureInvalid | SyncError::UnknownRepository(_) | SyncError::MissingHeader(_)
    ) {
        return;
    }
    warn!(repo_id = repository_id, error = %e, "webhook event failed");
    let update = serde_json::json!({
        "type": "webhook_event",
        "repository_id": repository_id,
        "status": "failed",
        "error": e.to_string(),
    });
    let _ = state.ws_broadcast.send(update.to_string());
}
