//! Per-file synchronization.
//!
//! A worker handles one [`FileChange`] of one event and always records a
//! [`FileSyncRecord`](crate::models::FileSyncRecord). Failures are captured
//! in that record and never returned to the caller, so one bad file cannot
//! abort the rest of the push.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::changes::FileChange;
use super::ContentSource;
use crate::artifacts::ArtifactStore;
use crate::db::Database;
use crate::docgen::DocGenerator;
use crate::errors::{DocGenError, FileSyncError};
use crate::file_policy::FilePolicy;

/// Result of one file, as recorded.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub change: FileChange,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Fetches, generates and writes (or removes) the artifact of one file.
pub struct FileSyncWorker {
    db: Arc<Database>,
    source: Arc<dyn ContentSource>,
    generator: Arc<dyn DocGenerator>,
    policy: FilePolicy,
    generation_timeout: Duration,
}

impl FileSyncWorker {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn ContentSource>,
        generator: Arc<dyn DocGenerator>,
        policy: FilePolicy,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            db,
            source,
            generator,
            policy,
            generation_timeout,
        }
    }

    pub fn policy(&self) -> &FilePolicy {
        &self.policy
    }

    /// Apply `change` for event `event_id` and record the outcome.
    pub async fn run(
        &self,
        event_id: i64,
        repo: &str,
        commit: &str,
        store: &ArtifactStore,
        change: &FileChange,
    ) -> FileOutcome {
        let result = if change.is_removal() {
            self.remove(store, &change.path).await
        } else {
            self.upsert(repo, commit, store, &change.path).await
        };

        let error = match result {
            Ok(()) => {
                debug!(event_id, path = %change.path, action = %change.action, "file synced");
                None
            }
            Err(e) => {
                warn!(event_id, path = %change.path, action = %change.action, error = %e, "file sync failed");
                Some(e.to_string())
            }
        };

        if let Err(e) = self.db.insert_file_sync(
            event_id,
            &change.path,
            change.action,
            error.is_none(),
            error.as_deref(),
        ) {
            error!(event_id, path = %change.path, error = %e, "failed to record file sync outcome");
        }

        FileOutcome {
            change: change.clone(),
            error,
        }
    }

    async fn upsert(
        &self,
        repo: &str,
        commit: &str,
        store: &ArtifactStore,
        path: &str,
    ) -> Result<(), FileSyncError> {
        // Reject unsafe paths before any network traffic.
        store.artifact_path(path)?;

        let bytes = self
            .source
            .fetch_file(repo, path, commit)
            .await
            .map_err(|e| FileSyncError::FetchFailed(e.to_string()))?;

        self.policy
            .check_size(bytes.len() as u64)
            .map_err(|(size, limit)| FileSyncError::TooLarge { size, limit })?;

        let text = String::from_utf8_lossy(&bytes);
        if text.trim().is_empty() {
            return Err(FileSyncError::EmptyContent);
        }

        let documentation =
            match tokio::time::timeout(self.generation_timeout, self.generator.generate(path, &text))
                .await
            {
                Ok(Ok(doc)) if doc.trim().is_empty() => {
                    return Err(FileSyncError::GenerationFailed(DocGenError::Empty.to_string()));
                }
                Ok(Ok(doc)) => doc,
                Ok(Err(e)) => return Err(FileSyncError::GenerationFailed(e.to_string())),
                Err(_) => {
                    let e = DocGenError::Timeout(self.generation_timeout.as_secs());
                    return Err(FileSyncError::GenerationFailed(e.to_string()));
                }
            };

        let written = store.write(path, &documentation).await?;
        info!(path, artifact = %written.display(), "documentation updated");
        Ok(())
    }

    async fn remove(&self, store: &ArtifactStore, path: &str) -> Result<(), FileSyncError> {
        let removed = store.remove(path).await?;
        info!(path, removed, "documentation removed");
        Ok(())
    }
}
