//! Error types, one `thiserror` enum per concern.
//!
//! Event-level failures ([`SyncError`]) fail a webhook event; per-file
//! failures ([`FileSyncError`]) only mark that file's sync record.

use thiserror::Error;

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, timeout, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid (HTTP 401).
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The token is valid but lacks access to the resource (HTTP 403).
    #[error("GitHub access forbidden: {0}")]
    Forbidden(String),

    /// The resource does not exist or is invisible to the token (HTTP 404).
    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    /// The request was semantically rejected (HTTP 422).
    #[error("GitHub rejected the request: {message}")]
    Unprocessable {
        message: String,
        errors: Vec<String>,
    },

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    /// JSON deserialization or content decoding failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

impl GitHubError {
    /// `true` if a 422 response says the hook already exists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Unprocessable { message, errors } => {
                message.contains("already exists")
                    || errors.iter().any(|e| e.contains("already exists"))
            }
            _ => false,
        }
    }
}

/// Errors from the documentation-generation collaborator.
#[derive(Debug, Error)]
pub enum DocGenError {
    #[error("doc generation HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("doc generation service returned HTTP {status}")]
    Status { status: u16 },

    #[error("no documentation generated")]
    Empty,

    #[error("doc generation timed out after {0}s")]
    Timeout(u64),
}

/// Failures of a single file within a push event.
///
/// These are recorded on the file's sync record and never fail the event.
#[derive(Debug, Error)]
pub enum FileSyncError {
    #[error("failed to fetch file: {0}")]
    FetchFailed(String),

    #[error("empty file content")]
    EmptyContent,

    #[error("file too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("documentation generation failed: {0}")]
    GenerationFailed(String),

    #[error("failed to write documentation: {0}")]
    WriteFailed(String),

    #[error("failed to remove documentation: {0}")]
    RemoveFailed(String),

    #[error("invalid file path '{0}'")]
    InvalidPath(String),
}

/// Errors that fail a whole webhook event.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error("no tracked repository with id {0}")]
    UnknownRepository(i64),

    #[error("missing required header {0}")]
    MissingHeader(&'static str),

    #[error("malformed webhook payload: {0}")]
    PayloadMalformed(String),

    #[error("repository lookup failed: {0}")]
    RepositoryLookupFailed(String),

    #[error("processing cancelled")]
    Cancelled,

    /// A state-machine transition was invalid.
    #[error("invalid event status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("sync database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

/// Errors from provisioning, removing or testing a webhook registration.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("GitHub token is required")]
    MissingCredential,

    #[error("Invalid GitHub token. Please check your token has proper permissions.")]
    InvalidCredential,

    #[error("Repository not found. Check if the token has access to this repository.")]
    RepositoryNotFound,

    #[error("Access forbidden. The token needs admin access to this repository to manage webhooks.")]
    InsufficientPermissions,

    #[error("GitHub API error: {0}")]
    Api(#[from] GitHubError),

    #[error("lifecycle database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

/// Loading or validating `docsync.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid TOML: {0}")]
    ParseError(String),

    #[error("{field}: {detail}")]
    InvalidValue { field: String, detail: String },

    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),
}

/// Store failures. `NotFound` and `AlreadyExists` are raised by query
/// helpers; everything else comes straight from SQLite.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: String, key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitHubError::RateLimited {
            reset_at: "2025-01-01T00:00:00Z".into(),
        };
        assert!(err.to_string().contains("rate limit"));

        let err = FileSyncError::FetchFailed("HTTP 404".into());
        assert_eq!(err.to_string(), "failed to fetch file: HTTP 404");

        let err = DatabaseError::NotFound {
            entity: "tracked repository".into(),
            id: "7".into(),
        };
        assert_eq!(err.to_string(), "tracked repository not found: 7");
    }

    #[test]
    fn test_already_exists_detection() {
        let err = GitHubError::Unprocessable {
            message: "Validation Failed".into(),
            errors: vec!["Hook already exists on this repository".into()],
        };
        assert!(err.is_already_exists());

        let err = GitHubError::Unprocessable {
            message: "Validation Failed".into(),
            errors: vec!["config.url is invalid".into()],
        };
        assert!(!err.is_already_exists());

        assert!(!GitHubError::NotFound("x".into()).is_already_exists());
    }
}
