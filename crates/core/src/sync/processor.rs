//! Push event state machine.
//!
//! ```text
//! pending ──► processing ──► success
//!                  │    └──► ignored   (no commits, replayed commit,
//!                  │                    auto-sync off, untracked branch)
//!                  └───────► failed    (malformed payload, missing folder,
//!                                       database error, cancellation)
//! ```
//!
//! File-level failures never fail the event. A successful event and the
//! repository's last-processed commit are written in one transaction after
//! every file has settled.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::changes::{resolve_changes, FileChange};
use super::worker::{FileOutcome, FileSyncWorker};
use crate::artifacts::ArtifactStore;
use crate::db::Database;
use crate::errors::SyncError;
use crate::github::payload::short_sha;
use crate::github::PushPayload;
use crate::models::{EventStatus, TrackedRepository, WebhookEvent};

/// Why a push was acknowledged without touching any files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NoCommits,
    AlreadyProcessed,
    AutoSyncDisabled,
    UntrackedRef(String),
}

impl IgnoreReason {
    /// Value of the `status` field in the webhook response.
    pub fn status(&self) -> &'static str {
        match self {
            Self::NoCommits => "no commits",
            Self::AlreadyProcessed => "already processed",
            Self::AutoSyncDisabled | Self::UntrackedRef(_) => "ignored",
        }
    }

    /// Text stored on the event.
    pub fn message(&self) -> String {
        match self {
            Self::NoCommits => "No commits found in push event".into(),
            Self::AlreadyProcessed => "Commit already processed".into(),
            Self::AutoSyncDisabled => "Auto sync is disabled for this repository".into(),
            Self::UntrackedRef(r) => format!("Push to {r} is not on the tracked branch"),
        }
    }
}

/// Result of processing a push.
#[derive(Debug, Clone)]
pub enum PushOutcome {
    Synced {
        commit: String,
        files_processed: usize,
        files_failed: usize,
    },
    Ignored(IgnoreReason),
}

impl PushOutcome {
    /// JSON body returned to GitHub.
    pub fn response_body(&self) -> serde_json::Value {
        match self {
            Self::Synced {
                commit,
                files_processed,
                ..
            } => serde_json::json!({
                "status": "success",
                "files_processed": files_processed,
                "commit": short_sha(commit),
            }),
            Self::Ignored(reason) => serde_json::json!({ "status": reason.status() }),
        }
    }
}

/// Drives one push event from `pending` to a terminal status.
pub struct PushProcessor {
    db: Arc<Database>,
    worker: Arc<FileSyncWorker>,
    doc_extension: String,
    max_concurrent_files: usize,
}

impl PushProcessor {
    pub fn new(
        db: Arc<Database>,
        worker: Arc<FileSyncWorker>,
        doc_extension: impl Into<String>,
        max_concurrent_files: usize,
    ) -> Self {
        Self {
            db,
            worker,
            doc_extension: doc_extension.into(),
            max_concurrent_files: max_concurrent_files.max(1),
        }
    }

    /// Process a recorded push event.
    ///
    /// On error the event is marked `failed` and the repository's failure
    /// counter incremented before the error is returned.
    pub async fn process(
        &self,
        event: &WebhookEvent,
        repo: &TrackedRepository,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<PushOutcome, SyncError> {
        match self.run(event, repo, payload, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let message = e.to_string();
                error!(repo_id = repo.id, event_id = event.id, error = %message, "push processing failed");
                if let Err(db_err) = self.db.fail_event(event.id, repo.id, &message) {
                    error!(event_id = event.id, error = %db_err, "failed to record event failure");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        event: &WebhookEvent,
        repo: &TrackedRepository,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<PushOutcome, SyncError> {
        event.status.transition(EventStatus::Processing)?;
        self.db
            .update_event_status(event.id, EventStatus::Processing, None)?;

        let push = PushPayload::from_value(payload)?;

        if !repo.auto_sync_enabled {
            return self.ignore(event, repo, IgnoreReason::AutoSyncDisabled);
        }
        if let Some(git_ref) = push.git_ref.as_deref() {
            if git_ref != repo.tracked_ref() {
                return self.ignore(event, repo, IgnoreReason::UntrackedRef(git_ref.to_string()));
            }
        }
        let Some(commit) = push.terminal_commit().map(str::to_string) else {
            return self.ignore(event, repo, IgnoreReason::NoCommits);
        };
        self.db.set_event_commit(event.id, &commit)?;
        if repo.last_commit_sha.as_deref() == Some(commit.as_str()) {
            return self.ignore(event, repo, IgnoreReason::AlreadyProcessed);
        }

        let folder = self
            .db
            .get_doc_folder(repo.doc_folder_id)?
            .ok_or_else(|| {
                SyncError::RepositoryLookupFailed(format!(
                    "documentation folder {} no longer exists",
                    repo.doc_folder_id
                ))
            })?;
        let store = ArtifactStore::new(&folder.folder_path, self.doc_extension.as_str());

        let policy = self.worker.policy();
        let changes: Vec<FileChange> = resolve_changes(&push.commits)
            .into_iter()
            .filter(|c| {
                let decision = policy.evaluate(&c.path);
                if !decision.should_sync() {
                    debug!(
                        event_id = event.id,
                        path = %c.path,
                        decision = decision.label(),
                        "path skipped"
                    );
                }
                decision.should_sync()
            })
            .collect();
        info!(
            repo_id = repo.id,
            event_id = event.id,
            commit = short_sha(&commit),
            files = changes.len(),
            "processing push"
        );

        let outcomes = self
            .sync_files(event.id, &repo.full_name(), &commit, &store, &changes, cancel)
            .await;

        // Files already written stay written. A run that finished every file
        // before the cancel landed still completes.
        if outcomes.len() < changes.len() {
            warn!(
                event_id = event.id,
                completed = outcomes.len(),
                total = changes.len(),
                "push processing cancelled"
            );
            return Err(SyncError::Cancelled);
        }

        let files_failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        self.db
            .complete_push_event(event.id, repo.id, &commit, changes.len() as i64)?;
        info!(
            repo_id = repo.id,
            event_id = event.id,
            commit = short_sha(&commit),
            files_processed = changes.len(),
            files_failed,
            "push processed"
        );

        Ok(PushOutcome::Synced {
            commit,
            files_processed: changes.len(),
            files_failed,
        })
    }

    /// Run the worker for every change with bounded concurrency and wait for
    /// all of them. Once `cancel` fires, files not yet started are skipped.
    async fn sync_files(
        &self,
        event_id: i64,
        repo: &str,
        commit: &str,
        store: &ArtifactStore,
        changes: &[FileChange],
        cancel: &CancellationToken,
    ) -> Vec<FileOutcome> {
        let worker = self.worker.as_ref();
        stream::iter(changes)
            .map(|change| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(worker.run(event_id, repo, commit, store, change).await)
            })
            .buffer_unordered(self.max_concurrent_files)
            .boxed()
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await
    }

    fn ignore(
        &self,
        event: &WebhookEvent,
        repo: &TrackedRepository,
        reason: IgnoreReason,
    ) -> Result<PushOutcome, SyncError> {
        info!(
            repo_id = repo.id,
            event_id = event.id,
            reason = %reason.message(),
            "push ignored"
        );
        self.db
            .update_event_status(event.id, EventStatus::Ignored, Some(&reason.message()))?;
        Ok(PushOutcome::Ignored(reason))
    }
}
