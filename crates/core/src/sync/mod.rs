//! Push-driven documentation sync.
//!
//! Control flow for one inbound delivery:
//!
//! 1. [`ingest::WebhookIngestor`] looks up the repository, verifies the
//!    signature and records the event.
//! 2. Pings and unsupported event types are finalized immediately.
//! 3. Pushes go to [`processor::PushProcessor`], which resolves the changed
//!    files, runs a [`worker::FileSyncWorker`] per file with bounded
//!    concurrency, and finalizes the event and repository in one write.

pub mod changes;
pub mod ingest;
pub mod processor;
pub mod worker;

use async_trait::async_trait;

use crate::errors::GitHubError;
use crate::github::GitHubClient;

pub use changes::{resolve_changes, FileChange};
pub use ingest::{Delivery, IngestOutcome, Ingested, WebhookIngestor};
pub use processor::{IgnoreReason, PushOutcome, PushProcessor};
pub use worker::FileSyncWorker;

/// Where source file contents come from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Raw bytes of `path` in `repo` (`owner/name`) at `commit`.
    async fn fetch_file(&self, repo: &str, path: &str, commit: &str)
        -> Result<Vec<u8>, GitHubError>;
}

#[async_trait]
impl ContentSource for GitHubClient {
    async fn fetch_file(
        &self,
        repo: &str,
        path: &str,
        commit: &str,
    ) -> Result<Vec<u8>, GitHubError> {
        self.get_file_contents(repo, path, commit).await
    }
}
