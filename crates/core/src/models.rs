//! Domain model types used throughout docsync.
//!
//! These types bridge the push processor, database layer, and web API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

// ---------------------------------------------------------------------------
// Documentation folder
// ---------------------------------------------------------------------------

/// A documentation folder: the on-disk root that derived artifacts of one
/// tracked repository are written under, owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocFolder {
    pub id: i64,
    pub owner: String,
    pub folder_path: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tracked repository
// ---------------------------------------------------------------------------

/// A GitHub repository whose pushes regenerate one documentation folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRepository {
    pub id: i64,
    pub doc_folder_id: i64,
    pub github_url: String,
    pub owner: String,
    pub repo_name: String,
    pub branch: String,
    pub webhook_id: Option<i64>,
    pub webhook_secret: String,
    pub is_webhook_active: bool,
    pub auto_sync_enabled: bool,
    pub last_commit_sha: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_failures: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedRepository {
    /// `owner/name` slug used in API paths.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo_name)
    }

    /// The `ref` value of pushes to the tracked branch.
    pub fn tracked_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}

impl std::fmt::Display for TrackedRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo_name)
    }
}

/// Owner and name parsed from a GitHub repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse `https://github.com/{owner}/{repo}` (optionally with `.git`, a
    /// trailing slash, or extra path such as `/tree/main`).
    pub fn parse_github_url(url: &str) -> Option<Self> {
        let rest = url
            .trim()
            .strip_prefix("https://")
            .or_else(|| url.trim().strip_prefix("http://"))?;
        let rest = rest.strip_prefix("www.").unwrap_or(rest);
        let rest = rest.strip_prefix("github.com/")?;

        let mut parts = rest.split('/').filter(|p| !p.is_empty());
        let owner = parts.next()?;
        let name = parts.next()?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

/// What the status endpoint reports for a documentation folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub is_github_repo: bool,
    pub webhook_active: bool,
    pub auto_sync_enabled: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_failures: i64,
    pub last_error: Option<String>,
    pub repo_url: String,
}

impl From<&TrackedRepository> for RepositoryStatus {
    fn from(repo: &TrackedRepository) -> Self {
        Self {
            is_github_repo: true,
            webhook_active: repo.is_webhook_active,
            auto_sync_enabled: repo.auto_sync_enabled,
            last_sync_at: repo.last_sync_at,
            sync_failures: repo.sync_failures,
            last_error: repo.last_error.clone(),
            repo_url: repo.github_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook event
// ---------------------------------------------------------------------------

/// Kind of inbound notification, from the `X-GitHub-Event` header.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Ping,
    Push,
    PullRequest,
    Other,
}

impl EventType {
    pub fn from_header(value: &str) -> Self {
        match value.trim() {
            "ping" => Self::Ping,
            "push" => Self::Push,
            "pull_request" => Self::PullRequest,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a webhook event.
///
/// `pending → processing → success | failed | ignored`. Pings and
/// unsupported event types go straight from `pending` to a terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Ignored,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Ignored => "ignored",
        }
    }

    /// Parse a stored status string. Unknown values read as `Failed` so a
    /// corrupt row is never treated as resumable.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "success" => Self::Success,
            "ignored" => Self::Ignored,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Ignored)
    }

    /// Validate a transition to `next`.
    pub fn transition(self, next: EventStatus) -> Result<EventStatus, SyncError> {
        let allowed = match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Pending, n) if n.is_terminal() => true,
            (Self::Processing, n) if n.is_terminal() => true,
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(SyncError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub repository_id: i64,
    pub event_type: EventType,
    pub delivery_id: String,
    pub commit_sha: Option<String>,
    pub status: EventStatus,
    pub error_message: Option<String>,
    pub files_processed: i64,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// File sync record
// ---------------------------------------------------------------------------

/// What happened to a file in the pushed commits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Added,
    Modified,
    Removed,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }

    pub fn from_str_val(s: &str) -> Self {
        match s {
            "added" => Self::Added,
            "removed" => Self::Removed,
            _ => Self::Modified,
        }
    }
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one file within one event. Written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSyncRecord {
    pub id: i64,
    pub event_id: i64,
    pub file_path: String,
    pub action: FileAction,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 25,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}
