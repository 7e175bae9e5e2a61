//! Typed query helpers for every table in the docsync database.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::{
    DocFolder, EventStatus, EventType, FileAction, FileSyncRecord, PaginatedResult, Pagination,
    TrackedRepository, WebhookEvent,
};

// ---------------------------------------------------------------------------
// Insert parameters
// ---------------------------------------------------------------------------

/// Fields needed to start tracking a repository for a documentation folder.
#[derive(Debug, Clone)]
pub struct NewTrackedRepository<'a> {
    pub doc_folder_id: i64,
    pub github_url: &'a str,
    pub owner: &'a str,
    pub repo_name: &'a str,
    pub branch: &'a str,
    pub webhook_secret: &'a str,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const REPOSITORY_COLUMNS: &str = "id, doc_folder_id, github_url, owner, repo_name, branch,
     webhook_id, webhook_secret, is_webhook_active, auto_sync_enabled, last_commit_sha,
     last_sync_at, sync_failures, last_error, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, repository_id, event_type, delivery_id, commit_sha, status,
     error_message, files_processed, payload, created_at, processed_at";

const FILE_SYNC_COLUMNS: &str =
    "id, event_id, file_path, action, success, error_message, created_at";

fn row_to_doc_folder(row: &Row<'_>) -> rusqlite::Result<DocFolder> {
    let created_at: String = row.get(3)?;
    Ok(DocFolder {
        id: row.get(0)?,
        owner: row.get(1)?,
        folder_path: row.get(2)?,
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_repository(row: &Row<'_>) -> rusqlite::Result<TrackedRepository> {
    let last_sync_at: Option<String> = row.get(11)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;
    Ok(TrackedRepository {
        id: row.get(0)?,
        doc_folder_id: row.get(1)?,
        github_url: row.get(2)?,
        owner: row.get(3)?,
        repo_name: row.get(4)?,
        branch: row.get(5)?,
        webhook_id: row.get(6)?,
        webhook_secret: row.get(7)?,
        is_webhook_active: row.get(8)?,
        auto_sync_enabled: row.get(9)?,
        last_commit_sha: row.get(10)?,
        last_sync_at: last_sync_at.as_deref().map(parse_datetime),
        sync_failures: row.get(12)?,
        last_error: row.get(13)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<WebhookEvent> {
    let event_type: String = row.get(2)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(9)?;
    let processed_at: Option<String> = row.get(10)?;
    Ok(WebhookEvent {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        event_type: EventType::from_header(&event_type),
        delivery_id: row.get(3)?,
        commit_sha: row.get(4)?,
        status: EventStatus::from_str_val(&status),
        error_message: row.get(6)?,
        files_processed: row.get(7)?,
        payload: row.get(8)?,
        created_at: parse_datetime(&created_at),
        processed_at: processed_at.as_deref().map(parse_datetime),
    })
}

fn row_to_file_sync(row: &Row<'_>) -> rusqlite::Result<FileSyncRecord> {
    let action: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(FileSyncRecord {
        id: row.get(0)?,
        event_id: row.get(1)?,
        file_path: row.get(2)?,
        action: FileAction::from_str_val(&action),
        success: row.get(4)?,
        error_message: row.get(5)?,
        created_at: parse_datetime(&created_at),
    })
}

/// `true` if `err` is a UNIQUE constraint violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- doc_folders --------------------------------------------------------

    /// Register a documentation folder owned by `owner`.
    pub fn create_doc_folder(
        &self,
        owner: &str,
        folder_path: &str,
    ) -> Result<DocFolder, DatabaseError> {
        insert_doc_folder_on(&self.conn(), owner, folder_path)
    }

    /// Register a folder and start tracking `repo` for it in one
    /// transaction, so a rejected repository leaves no folder behind.
    /// `repo.doc_folder_id` is replaced by the new folder's id.
    pub fn create_tracked_folder(
        &self,
        owner: &str,
        folder_path: &str,
        repo: &NewTrackedRepository<'_>,
    ) -> Result<(DocFolder, TrackedRepository), DatabaseError> {
        let (folder, repo_id) = self.transaction(|conn| {
            let folder = insert_doc_folder_on(conn, owner, folder_path)?;
            let repo_id = insert_tracked_repository_on(
                conn,
                &NewTrackedRepository {
                    doc_folder_id: folder.id,
                    ..repo.clone()
                },
            )?;
            Ok((folder, repo_id))
        })?;
        Ok((folder, self.require_tracked_repository(repo_id)?))
    }

    pub fn get_doc_folder(&self, id: i64) -> Result<Option<DocFolder>, DatabaseError> {
        let conn = self.conn();
        let folder = conn
            .query_row(
                "SELECT id, owner, folder_path, created_at FROM doc_folders WHERE id = ?1",
                params![id],
                row_to_doc_folder,
            )
            .optional()?;
        Ok(folder)
    }

    /// Delete a documentation folder, cascading to its tracked repository,
    /// events and file records.
    pub fn delete_doc_folder(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM doc_folders WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "doc folder".into(),
                id: id.to_string(),
            });
        }
        debug!(id, "deleted doc folder");
        Ok(())
    }

    // -- tracked_repositories -----------------------------------------------

    /// Start tracking a repository. Fails with `AlreadyExists` if the folder
    /// already has one.
    pub fn create_tracked_repository(
        &self,
        new: &NewTrackedRepository<'_>,
    ) -> Result<TrackedRepository, DatabaseError> {
        let id = insert_tracked_repository_on(&self.conn(), new)?;
        self.require_tracked_repository(id)
    }

    pub fn get_tracked_repository(
        &self,
        id: i64,
    ) -> Result<Option<TrackedRepository>, DatabaseError> {
        let conn = self.conn();
        let repo = conn
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM tracked_repositories WHERE id = ?1"),
                params![id],
                row_to_repository,
            )
            .optional()?;
        Ok(repo)
    }

    /// Like [`get_tracked_repository`](Self::get_tracked_repository) but a
    /// missing row is an error.
    pub fn require_tracked_repository(&self, id: i64) -> Result<TrackedRepository, DatabaseError> {
        self.get_tracked_repository(id)?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "tracked repository".into(),
                id: id.to_string(),
            })
    }

    /// The repository tracked for a documentation folder, if any.
    pub fn get_repository_for_folder(
        &self,
        doc_folder_id: i64,
    ) -> Result<Option<TrackedRepository>, DatabaseError> {
        let conn = self.conn();
        let repo = conn
            .query_row(
                &format!(
                    "SELECT {REPOSITORY_COLUMNS} FROM tracked_repositories WHERE doc_folder_id = ?1"
                ),
                params![doc_folder_id],
                row_to_repository,
            )
            .optional()?;
        Ok(repo)
    }

    pub fn list_tracked_repositories(&self) -> Result<Vec<TrackedRepository>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM tracked_repositories ORDER BY id"
        ))?;
        let repos = stmt
            .query_map([], row_to_repository)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    /// Store a provisioned (or adopted) webhook registration and enable sync.
    pub fn set_webhook_registration(
        &self,
        repository_id: i64,
        webhook_id: i64,
        webhook_secret: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE tracked_repositories
             SET webhook_id = ?1, webhook_secret = ?2, is_webhook_active = 1,
                 auto_sync_enabled = 1, updated_at = ?3
             WHERE id = ?4",
            params![webhook_id, webhook_secret, now, repository_id],
        )?;
        ensure_changed(changed, "tracked repository", repository_id)?;
        debug!(repository_id, webhook_id, "stored webhook registration");
        Ok(())
    }

    /// Forget the webhook registration and disable sync.
    pub fn clear_webhook_registration(&self, repository_id: i64) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE tracked_repositories
             SET webhook_id = NULL, is_webhook_active = 0, auto_sync_enabled = 0, updated_at = ?1
             WHERE id = ?2",
            params![now, repository_id],
        )?;
        ensure_changed(changed, "tracked repository", repository_id)?;
        debug!(repository_id, "cleared webhook registration");
        Ok(())
    }

    pub fn set_auto_sync(&self, repository_id: i64, enabled: bool) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE tracked_repositories SET auto_sync_enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled, now, repository_id],
        )?;
        ensure_changed(changed, "tracked repository", repository_id)
    }

    // -- webhook_events -----------------------------------------------------

    /// Insert a `pending` event. A repeated delivery id fails with
    /// `AlreadyExists`.
    pub fn insert_webhook_event(
        &self,
        repository_id: i64,
        event_type: EventType,
        delivery_id: &str,
        payload: &str,
    ) -> Result<WebhookEvent, DatabaseError> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO webhook_events (repository_id, event_type, delivery_id, status,
             payload, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
            params![
                repository_id,
                event_type.as_str(),
                delivery_id,
                payload,
                now.to_rfc3339()
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                DatabaseError::AlreadyExists {
                    entity: "webhook event".into(),
                    key: delivery_id.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        let id = conn.last_insert_rowid();
        debug!(id, repository_id, delivery_id, event_type = %event_type, "inserted webhook event");
        Ok(WebhookEvent {
            id,
            repository_id,
            event_type,
            delivery_id: delivery_id.to_string(),
            commit_sha: None,
            status: EventStatus::Pending,
            error_message: None,
            files_processed: 0,
            payload: payload.to_string(),
            created_at: now,
            processed_at: None,
        })
    }

    pub fn get_webhook_event(&self, id: i64) -> Result<Option<WebhookEvent>, DatabaseError> {
        let conn = self.conn();
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = ?1"),
                params![id],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    pub fn get_event_by_delivery(
        &self,
        delivery_id: &str,
    ) -> Result<Option<WebhookEvent>, DatabaseError> {
        let conn = self.conn();
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM webhook_events WHERE delivery_id = ?1"),
                params![delivery_id],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    /// Move a non-terminal event to `status`. Terminal events are immutable:
    /// updating one fails with `NotFound`.
    pub fn update_event_status(
        &self,
        event_id: i64,
        status: EventStatus,
        error_message: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        update_event_status_on(&conn, event_id, status, error_message)
    }

    /// Attach the commit a push event resolved to.
    pub fn set_event_commit(&self, event_id: i64, commit_sha: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE webhook_events SET commit_sha = ?1
             WHERE id = ?2 AND status NOT IN ('success', 'failed', 'ignored')",
            params![commit_sha, event_id],
        )?;
        ensure_changed(changed, "non-terminal webhook event", event_id)
    }

    /// Finalize a processed push: mark the event `success` with its file
    /// count and advance the repository's last processed commit, in one
    /// transaction.
    pub fn complete_push_event(
        &self,
        event_id: i64,
        repository_id: i64,
        commit_sha: &str,
        files_processed: i64,
    ) -> Result<(), DatabaseError> {
        self.transaction(|conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE webhook_events
                 SET status = 'success', files_processed = ?1, commit_sha = ?2,
                     processed_at = ?3, error_message = NULL
                 WHERE id = ?4 AND status = 'processing'",
                params![files_processed, commit_sha, now, event_id],
            )?;
            ensure_changed(changed, "processing webhook event", event_id)?;

            let changed = conn.execute(
                "UPDATE tracked_repositories
                 SET last_commit_sha = ?1, last_sync_at = ?2, sync_failures = 0,
                     last_error = NULL, updated_at = ?2
                 WHERE id = ?3",
                params![commit_sha, now, repository_id],
            )?;
            ensure_changed(changed, "tracked repository", repository_id)?;
            Ok(())
        })?;
        debug!(event_id, repository_id, commit_sha, files_processed, "completed push event");
        Ok(())
    }

    /// Mark an event `failed` and bump the repository's failure counter in
    /// one transaction.
    pub fn fail_event(
        &self,
        event_id: i64,
        repository_id: i64,
        error: &str,
    ) -> Result<(), DatabaseError> {
        self.transaction(|conn| {
            update_event_status_on(conn, event_id, EventStatus::Failed, Some(error))?;
            // last_commit_sha is left alone so the commit is retried.
            let changed = conn.execute(
                "UPDATE tracked_repositories
                 SET sync_failures = sync_failures + 1, last_error = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![error, Utc::now().to_rfc3339(), repository_id],
            )?;
            ensure_changed(changed, "tracked repository", repository_id)
        })?;
        debug!(event_id, repository_id, error, "failed webhook event");
        Ok(())
    }

    /// Events of one repository, newest first.
    pub fn list_events_for_repository(
        &self,
        repository_id: i64,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<WebhookEvent>, DatabaseError> {
        let conn = self.conn();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM webhook_events WHERE repository_id = ?1",
            params![repository_id],
            |row| row.get(0),
        )?;

        let per_page = pagination.per_page.max(1);
        let total_pages = ((total as u64).saturating_add(per_page as u64 - 1)) / per_page as u64;
        let offset = ((pagination.page.max(1) - 1) as i64) * per_page as i64;

        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE repository_id = ?1
             ORDER BY id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let items = stmt
            .query_map(params![repository_id, per_page as i64, offset], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PaginatedResult {
            items,
            total: total as u64,
            page: pagination.page.max(1),
            per_page,
            total_pages: total_pages as u32,
        })
    }

    // -- file_syncs ---------------------------------------------------------

    /// Record the outcome of one file. Records are never updated afterwards.
    pub fn insert_file_sync(
        &self,
        event_id: i64,
        file_path: &str,
        action: FileAction,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO file_syncs (event_id, file_path, action, success, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![event_id, file_path, action.as_str(), success, error_message, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, event_id, file_path, action = %action, success, "inserted file sync record");
        Ok(id)
    }

    pub fn list_file_syncs(&self, event_id: i64) -> Result<Vec<FileSyncRecord>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_SYNC_COLUMNS} FROM file_syncs WHERE event_id = ?1 ORDER BY id"
        ))?;
        let records = stmt
            .query_map(params![event_id], row_to_file_sync)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn insert_doc_folder_on(
    conn: &Connection,
    owner: &str,
    folder_path: &str,
) -> Result<DocFolder, DatabaseError> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO doc_folders (owner, folder_path, created_at) VALUES (?1, ?2, ?3)",
        params![owner, folder_path, now.to_rfc3339()],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, owner, folder_path, "inserted doc folder");
    Ok(DocFolder {
        id,
        owner: owner.to_string(),
        folder_path: folder_path.to_string(),
        created_at: now,
    })
}

fn insert_tracked_repository_on(
    conn: &Connection,
    new: &NewTrackedRepository<'_>,
) -> Result<i64, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO tracked_repositories (doc_folder_id, github_url, owner, repo_name,
         branch, webhook_secret, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            new.doc_folder_id,
            new.github_url,
            new.owner,
            new.repo_name,
            new.branch,
            new.webhook_secret,
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            DatabaseError::AlreadyExists {
                entity: "tracked repository".into(),
                key: format!("doc folder {}", new.doc_folder_id),
            }
        } else {
            e.into()
        }
    })?;
    let id = conn.last_insert_rowid();
    debug!(id, owner = new.owner, repo = new.repo_name, "inserted tracked repository");
    Ok(id)
}

fn update_event_status_on(
    conn: &Connection,
    event_id: i64,
    status: EventStatus,
    error_message: Option<&str>,
) -> Result<(), DatabaseError> {
    let processed_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
    let changed = conn.execute(
        "UPDATE webhook_events
         SET status = ?1, error_message = COALESCE(?2, error_message), processed_at = ?3
         WHERE id = ?4 AND status NOT IN ('success', 'failed', 'ignored')",
        params![status.as_str(), error_message, processed_at, event_id],
    )?;
    ensure_changed(changed, "non-terminal webhook event", event_id)?;
    debug!(event_id, status = %status, "updated webhook event status");
    Ok(())
}

fn ensure_changed(changed: usize, entity: &str, id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn setup_repo(db: &Database) -> TrackedRepository {
        let folder = db.create_doc_folder("alice", "/docs/widgets").unwrap();
        db.create_tracked_repository(&NewTrackedRepository {
            doc_folder_id: folder.id,
            github_url: "https://github.com/acme/widgets",
            owner: "acme",
            repo_name: "widgets",
            branch: "main",
            webhook_secret: "s3cret",
        })
        .unwrap()
    }

    #[test]
    fn test_tracked_repository_defaults() {
        let db = setup_db();
        let repo = setup_repo(&db);
        assert_eq!(repo.full_name(), "acme/widgets");
        assert_eq!(repo.webhook_id, None);
        assert!(!repo.is_webhook_active);
        assert!(!repo.auto_sync_enabled);
        assert_eq!(repo.sync_failures, 0);
        assert!(db.get_repository_for_folder(repo.doc_folder_id).unwrap().is_some());
    }

    #[test]
    fn test_one_repository_per_folder() {
        let db = setup_db();
        let repo = setup_repo(&db);
        let err = db
            .create_tracked_repository(&NewTrackedRepository {
                doc_folder_id: repo.doc_folder_id,
                github_url: "https://github.com/acme/other",
                owner: "acme",
                repo_name: "other",
                branch: "main",
                webhook_secret: "x",
            })
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
    }

    #[test]
    fn test_webhook_registration_round_trip() {
        let db = setup_db();
        let repo = setup_repo(&db);

        db.set_webhook_registration(repo.id, 991, "new-secret").unwrap();
        let repo = db.require_tracked_repository(repo.id).unwrap();
        assert_eq!(repo.webhook_id, Some(991));
        assert_eq!(repo.webhook_secret, "new-secret");
        assert!(repo.is_webhook_active);
        assert!(repo.auto_sync_enabled);

        db.clear_webhook_registration(repo.id).unwrap();
        let repo = db.require_tracked_repository(repo.id).unwrap();
        assert_eq!(repo.webhook_id, None);
        assert!(!repo.is_webhook_active);
        assert!(!repo.auto_sync_enabled);
    }

    #[test]
    fn test_duplicate_delivery_rejected() {
        let db = setup_db();
        let repo = setup_repo(&db);
        db.insert_webhook_event(repo.id, EventType::Push, "delivery-1", "{}")
            .unwrap();
        let err = db
            .insert_webhook_event(repo.id, EventType::Push, "delivery-1", "{}")
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
    }

    #[test]
    fn test_terminal_events_are_immutable() {
        let db = setup_db();
        let repo = setup_repo(&db);
        let event = db
            .insert_webhook_event(repo.id, EventType::Ping, "delivery-2", "{}")
            .unwrap();
        db.update_event_status(event.id, EventStatus::Success, None).unwrap();

        let err = db
            .update_event_status(event.id, EventStatus::Failed, Some("late"))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));

        let event = db.get_webhook_event(event.id).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Success);
        assert!(event.processed_at.is_some());
        assert!(event.error_message.is_none());
    }

    #[test]
    fn test_complete_push_event_updates_repository() {
        let db = setup_db();
        let repo = setup_repo(&db);
        let failed = db
            .insert_webhook_event(repo.id, EventType::Push, "delivery-2b", "{}")
            .unwrap();
        db.fail_event(failed.id, repo.id, "earlier failure").unwrap();
        assert_eq!(db.require_tracked_repository(repo.id).unwrap().sync_failures, 1);

        let event = db
            .insert_webhook_event(repo.id, EventType::Push, "delivery-3", "{}")
            .unwrap();
        db.update_event_status(event.id, EventStatus::Processing, None).unwrap();
        db.complete_push_event(event.id, repo.id, "abc123", 3).unwrap();

        let event = db.get_webhook_event(event.id).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Success);
        assert_eq!(event.files_processed, 3);
        assert_eq!(event.commit_sha.as_deref(), Some("abc123"));

        let repo = db.require_tracked_repository(repo.id).unwrap();
        assert_eq!(repo.last_commit_sha.as_deref(), Some("abc123"));
        assert!(repo.last_sync_at.is_some());
        assert_eq!(repo.sync_failures, 0);
        assert!(repo.last_error.is_none());
    }

    #[test]
    fn test_fail_event_keeps_last_commit() {
        let db = setup_db();
        let repo = setup_repo(&db);
        let event = db
            .insert_webhook_event(repo.id, EventType::Push, "delivery-4", "{}")
            .unwrap();
        db.update_event_status(event.id, EventStatus::Processing, None).unwrap();
        db.fail_event(event.id, repo.id, "boom").unwrap();

        let event = db.get_webhook_event(event.id).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Failed);
        assert_eq!(event.error_message.as_deref(), Some("boom"));

        let repo = db.require_tracked_repository(repo.id).unwrap();
        assert_eq!(repo.sync_failures, 1);
        assert_eq!(repo.last_error.as_deref(), Some("boom"));
        assert!(repo.last_commit_sha.is_none());
    }

    #[test]
    fn test_list_events_paginated() {
        let db = setup_db();
        let repo = setup_repo(&db);
        for i in 0..5 {
            db.insert_webhook_event(repo.id, EventType::Push, &format!("d-{i}"), "{}")
                .unwrap();
        }
        let page = db
            .list_events_for_repository(repo.id, &Pagination { page: 2, per_page: 2 })
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].delivery_id, "d-2");
    }

    #[test]
    fn test_create_tracked_folder_is_atomic() {
        let db = setup_db();
        let new = NewTrackedRepository {
            doc_folder_id: 0,
            github_url: "https://github.com/acme/widgets",
            owner: "acme",
            repo_name: "widgets",
            branch: "main",
            webhook_secret: "s",
        };

        let (folder, repo) = db.create_tracked_folder("bob", "/docs/widgets", &new).unwrap();
        assert_eq!(repo.doc_folder_id, folder.id);
        assert_eq!(db.get_repository_for_folder(folder.id).unwrap().unwrap().id, repo.id);

        // A repository insert that fails must not leave its folder behind.
        db.conn()
            .execute_batch(
                "CREATE TRIGGER reject_repos BEFORE INSERT ON tracked_repositories
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        assert!(db.create_tracked_folder("bob", "/docs/other", &new).is_err());
        let folders: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM doc_folders", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folders, 1);
    }

    #[test]
    fn test_delete_folder_cascades() {
        let db = setup_db();
        let repo = setup_repo(&db);
        let event = db
            .insert_webhook_event(repo.id, EventType::Push, "delivery-5", "{}")
            .unwrap();
        db.insert_file_sync(event.id, "src/a.py", FileAction::Added, true, None)
            .unwrap();

        db.delete_doc_folder(repo.doc_folder_id).unwrap();

        assert!(db.get_tracked_repository(repo.id).unwrap().is_none());
        assert!(db.get_webhook_event(event.id).unwrap().is_none());
        assert!(db.list_file_syncs(event.id).unwrap().is_empty());
    }

    #[test]
    fn test_file_sync_records() {
        let db = setup_db();
        let repo = setup_repo(&db);
        let event = db
            .insert_webhook_event(repo.id, EventType::Push, "delivery-6", "{}")
            .unwrap();
        db.insert_file_sync(event.id, "a.py", FileAction::Added, true, None)
            .unwrap();
        db.insert_file_sync(event.id, "b.py", FileAction::Removed, false, Some("disk full"))
            .unwrap();

        let records = db.list_file_syncs(event.id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, FileAction::Added);
        assert!(records[0].success);
        assert_eq!(records[1].error_message.as_deref(), Some("disk full"));
    }
}
