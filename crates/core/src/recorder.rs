//! Durable audit trail of inbound deliveries.
//!
//! Every delivery that passes signature verification is stored as a
//! `pending` [`WebhookEvent`] before anything else happens. The unique
//! delivery id makes recording idempotent: a re-delivered notification
//! yields the existing row instead of a second one.

use std::sync::Arc;

use tracing::info;

use crate::db::Database;
use crate::errors::{DatabaseError, SyncError};
use crate::models::{EventType, TrackedRepository, WebhookEvent};

/// Result of recording a delivery.
#[derive(Debug, Clone)]
pub enum Recorded {
    /// First time this delivery id was seen; process it.
    New(WebhookEvent),
    /// Delivery id already recorded; the caller should short-circuit.
    Duplicate(WebhookEvent),
}

#[derive(Clone)]
pub struct EventRecorder {
    db: Arc<Database>,
}

impl EventRecorder {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a `pending` event holding the raw payload.
    pub fn record(
        &self,
        repo: &TrackedRepository,
        event_type: EventType,
        delivery_id: &str,
        payload: &[u8],
    ) -> Result<Recorded, SyncError> {
        let payload = String::from_utf8_lossy(payload);
        match self
            .db
            .insert_webhook_event(repo.id, event_type, delivery_id, &payload)
        {
            Ok(event) => {
                info!(
                    repo_id = repo.id,
                    event_id = event.id,
                    delivery_id,
                    event_type = %event_type,
                    "recorded webhook event"
                );
                Ok(Recorded::New(event))
            }
            Err(DatabaseError::AlreadyExists { .. }) => {
                let existing = self.db.get_event_by_delivery(delivery_id)?.ok_or_else(|| {
                    DatabaseError::NotFound {
                        entity: "webhook event".into(),
                        id: delivery_id.to_string(),
                    }
                })?;
                info!(
                    repo_id = repo.id,
                    event_id = existing.id,
                    delivery_id,
                    "duplicate delivery ignored"
                );
                Ok(Recorded::Duplicate(existing))
            }
            Err(e) => Err(e.into()),
        }
    }
}
