//! Entry point for one inbound webhook delivery.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::processor::{PushOutcome, PushProcessor};
use crate::db::Database;
use crate::errors::SyncError;
use crate::github::signature::verify_signature;
use crate::models::{EventStatus, EventType, TrackedRepository};
use crate::recorder::{EventRecorder, Recorded};

/// The parts of an HTTP delivery the ingestor needs.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// `X-GitHub-Event`.
    pub event: Option<&'a str>,
    /// `X-GitHub-Delivery`.
    pub delivery_id: Option<&'a str>,
    /// `X-Hub-Signature-256`, or the legacy `X-Hub-Signature` when absent.
    pub signature: Option<&'a str>,
    /// Raw request body, exactly as received.
    pub body: &'a [u8],
}

/// What happened to a delivery that was accepted.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Pong,
    Duplicate,
    Unsupported(String),
    Push(PushOutcome),
}

impl IngestOutcome {
    /// JSON body returned to GitHub.
    pub fn response_body(&self) -> serde_json::Value {
        match self {
            Self::Pong => serde_json::json!({ "status": "pong" }),
            Self::Duplicate => serde_json::json!({ "status": "duplicate, ignored" }),
            Self::Unsupported(event) => serde_json::json!({ "status": "ignored", "event": event }),
            Self::Push(outcome) => outcome.response_body(),
        }
    }

    /// Terminal status the event ended in, if one was written.
    pub fn event_status(&self) -> Option<EventStatus> {
        match self {
            Self::Pong => Some(EventStatus::Success),
            Self::Duplicate => None,
            Self::Unsupported(_) => Some(EventStatus::Ignored),
            Self::Push(PushOutcome::Synced { .. }) => Some(EventStatus::Success),
            Self::Push(PushOutcome::Ignored(_)) => Some(EventStatus::Ignored),
        }
    }
}

/// An accepted delivery.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub repository: TrackedRepository,
    pub event_id: i64,
    pub outcome: IngestOutcome,
}

/// Verifies, records and dispatches inbound deliveries.
pub struct WebhookIngestor {
    db: Arc<Database>,
    recorder: EventRecorder,
    processor: Arc<PushProcessor>,
}

impl WebhookIngestor {
    pub fn new(db: Arc<Database>, processor: Arc<PushProcessor>) -> Self {
        Self {
            recorder: EventRecorder::new(db.clone()),
            db,
            processor,
        }
    }

    /// Handle one delivery addressed to `repository_id`.
    ///
    /// Nothing is recorded for unknown repositories, bad signatures or
    /// missing headers. Every other delivery leaves a durable event row.
    pub async fn ingest(
        &self,
        repository_id: i64,
        delivery: Delivery<'_>,
        cancel: CancellationToken,
    ) -> Result<Ingested, SyncError> {
        let repo = self
            .db
            .get_tracked_repository(repository_id)?
            .ok_or(SyncError::UnknownRepository(repository_id))?;

        if !verify_signature(delivery.body, delivery.signature, &repo.webhook_secret) {
            warn!(repo_id = repo.id, "rejected webhook with invalid signature");
            return Err(SyncError::SignatureInvalid);
        }

        let event_name = delivery
            .event
            .ok_or(SyncError::MissingHeader("X-GitHub-Event"))?;
        let delivery_id = delivery
            .delivery_id
            .filter(|d| !d.trim().is_empty())
            .ok_or(SyncError::MissingHeader("X-GitHub-Delivery"))?;
        let event_type = EventType::from_header(event_name);

        let event = match self
            .recorder
            .record(&repo, event_type, delivery_id, delivery.body)?
        {
            Recorded::New(event) => event,
            Recorded::Duplicate(existing) => {
                return Ok(Ingested {
                    repository: repo,
                    event_id: existing.id,
                    outcome: IngestOutcome::Duplicate,
                })
            }
        };

        let payload: serde_json::Value = match serde_json::from_slice(delivery.body) {
            Ok(v) => v,
            Err(e) => {
                let err = SyncError::PayloadMalformed(e.to_string());
                self.db.fail_event(event.id, repo.id, &err.to_string())?;
                warn!(repo_id = repo.id, event_id = event.id, error = %e, "webhook body is not valid JSON");
                return Err(err);
            }
        };

        let outcome = match event_type {
            EventType::Ping => {
                event.status.transition(EventStatus::Success)?;
                self.db
                    .update_event_status(event.id, EventStatus::Success, None)?;
                info!(repo_id = repo.id, event_id = event.id, "webhook ping received");
                IngestOutcome::Pong
            }
            EventType::Push => {
                let outcome = self
                    .processor
                    .process(&event, &repo, payload, &cancel)
                    .await?;
                IngestOutcome::Push(outcome)
            }
            EventType::PullRequest | EventType::Other => {
                event.status.transition(EventStatus::Ignored)?;
                self.db.update_event_status(
                    event.id,
                    EventStatus::Ignored,
                    Some(&format!("Unsupported event type: {event_name}")),
                )?;
                info!(repo_id = repo.id, event_id = event.id, event = event_name, "unsupported event ignored");
                IngestOutcome::Unsupported(event_name.to_string())
            }
        };

        Ok(Ingested {
            repository: repo,
            event_id: event.id,
            outcome,
        })
    }
}
