//! Typed views of GitHub webhook payloads.
//!
//! Only the fields the push processor reads are modelled; unknown fields are
//! ignored by serde.

use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// A `push` event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    /// Full ref that was pushed, e.g. `refs/heads/main`.
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    /// Commits in chronological order, oldest first.
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushCommit {
    pub id: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl PushPayload {
    /// Parse a push body that is already known to be valid JSON.
    ///
    /// Structural problems (e.g. `commits` that is not an array) are
    /// reported as [`SyncError::PayloadMalformed`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, SyncError> {
        serde_json::from_value(value).map_err(|e| SyncError::PayloadMalformed(e.to_string()))
    }

    /// The commit the push ends at: the last listed commit.
    pub fn terminal_commit(&self) -> Option<&str> {
        self.commits.last().map(|c| c.id.as_str())
    }
}

/// Abbreviated commit id as shown in responses.
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(7) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}
