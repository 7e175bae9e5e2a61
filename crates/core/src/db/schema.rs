//! Versioned schema for the docsync store.
//!
//! Each migration bumps SQLite's `user_version`; a store opened by an older
//! build is brought forward step by step inside one transaction per step.

use rusqlite::Connection;
use tracing::info;

use crate::errors::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// Schema version a fully migrated store reports.
pub const CURRENT_VERSION: u32 = 1;

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "folders, repositories, events and file syncs",
        sql: r#"
        CREATE TABLE IF NOT EXISTS doc_folders (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            owner        TEXT    NOT NULL,
            folder_path  TEXT    NOT NULL,
            created_at   TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_doc_folders_owner ON doc_folders (owner);

        CREATE TABLE IF NOT EXISTS tracked_repositories (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_folder_id      INTEGER NOT NULL UNIQUE
                               REFERENCES doc_folders (id) ON DELETE CASCADE,
            github_url         TEXT    NOT NULL,
            owner              TEXT    NOT NULL,
            repo_name          TEXT    NOT NULL,
            branch             TEXT    NOT NULL DEFAULT 'main',
            webhook_id         INTEGER,
            webhook_secret     TEXT    NOT NULL,
            is_webhook_active  INTEGER NOT NULL DEFAULT 0,
            auto_sync_enabled  INTEGER NOT NULL DEFAULT 0,
            last_commit_sha    TEXT,
            last_sync_at       TEXT,
            sync_failures      INTEGER NOT NULL DEFAULT 0,
            last_error         TEXT,
            created_at         TEXT    NOT NULL,
            updated_at         TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS webhook_events (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id    INTEGER NOT NULL
                             REFERENCES tracked_repositories (id) ON DELETE CASCADE,
            event_type       TEXT    NOT NULL
                             CHECK (event_type IN ('ping', 'push', 'pull_request', 'other')),
            delivery_id      TEXT    NOT NULL UNIQUE,
            commit_sha       TEXT,
            status           TEXT    NOT NULL DEFAULT 'pending'
                             CHECK (status IN ('pending', 'processing', 'success', 'failed', 'ignored')),
            error_message    TEXT,
            files_processed  INTEGER NOT NULL DEFAULT 0,
            payload          TEXT    NOT NULL,
            created_at       TEXT    NOT NULL,
            processed_at     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_webhook_events_repository
            ON webhook_events (repository_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_webhook_events_status ON webhook_events (status);

        CREATE TABLE IF NOT EXISTS file_syncs (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id       INTEGER NOT NULL
                           REFERENCES webhook_events (id) ON DELETE CASCADE,
            file_path      TEXT    NOT NULL,
            action         TEXT    NOT NULL CHECK (action IN ('added', 'modified', 'removed')),
            success        INTEGER NOT NULL,
            error_message  TEXT,
            created_at     TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_file_syncs_event ON file_syncs (event_id);
        "#,
    },
];

/// Bring `conn` up to [`CURRENT_VERSION`].
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = user_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        info!(
            version = migration.version,
            name = migration.name,
            "migrating docsync store"
        );
        let fail = |e: rusqlite::Error| DatabaseError::MigrationFailed {
            version: migration.version,
            detail: e.to_string(),
        };
        conn.execute_batch("BEGIN").map_err(fail)?;
        let step = conn
            .execute_batch(migration.sql)
            .and_then(|_| conn.pragma_update(None, "user_version", migration.version));
        match step {
            Ok(()) => conn.execute_batch("COMMIT").map_err(fail)?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(fail(e));
            }
        }
    }

    Ok(())
}

fn user_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
