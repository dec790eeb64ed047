//! Schema migrations for the local SQLite store.
//!
//! Uses a `schema_version` table to track which migrations have been applied.
//! Each migration runs exactly once and is recorded with a timestamp.
//!
//! The schema mirrors the constraints of the hosted database (`sql/schema.sql`):
//! per-owner URL uniqueness, global share token uniqueness, null-out on folder
//! delete, one protected default folder per owner.

use rusqlite::Connection;

/// Current schema version. Bump this when adding a new migration.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Returns the current schema version from the database (0 if table doesn't exist).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// Runs all pending schema migrations against the provided connection.
///
/// # Errors
/// Returns `rusqlite::Error` if any SQL statement fails.
pub fn run_all(conn: &Connection) -> Result<(), rusqlite::Error> {
    // Foreign keys must be on for ON DELETE SET NULL to apply.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at INTEGER NOT NULL,
             description TEXT NOT NULL
         );",
    )?;

    let current = get_schema_version(conn);

    if current < 1 {
        migration_v1(conn)?;
        record_version(conn, 1, "Initial schema: users, sessions, folders, bookmarks")?;
    }

    if current < 2 {
        migration_v2(conn)?;
        record_version(conn, 2, "Protect default folders and immutable share tokens")?;
    }

    Ok(())
}

fn record_version(conn: &Connection, version: i32, description: &str) -> Result<(), rusqlite::Error> {
    let now = chrono::Utc::now().timestamp_millis();
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        rusqlite::params![version, now, description],
    )?;
    Ok(())
}

/// V1: core tables. Timestamps are UNIX milliseconds, tags a JSON array.
fn migration_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash BLOB NOT NULL,
            salt BLOB NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS auth_sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL CHECK (length(trim(name)) > 0),
            is_default INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_folders_owner ON folders(owner_id, created_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_one_default
            ON folders(owner_id) WHERE is_default = 1;

        CREATE TABLE IF NOT EXISTS bookmarks (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            folder_id TEXT,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            thumbnail TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            is_private INTEGER NOT NULL DEFAULT 0,
            share_id TEXT UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (owner_id, url),
            FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_bookmarks_owner ON bookmarks(owner_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_bookmarks_folder ON bookmarks(folder_id);
        ",
    )
}

/// V2: triggers for rules the hosted database enforces with policies.
fn migration_v2(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TRIGGER IF NOT EXISTS trg_folders_protect_default
        BEFORE DELETE ON folders
        WHEN OLD.is_default = 1
        BEGIN
            SELECT RAISE(ABORT, 'default folder cannot be deleted');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_bookmarks_share_id_immutable
        BEFORE UPDATE OF share_id ON bookmarks
        WHEN OLD.share_id IS NOT NULL
             AND (NEW.share_id IS NULL OR NEW.share_id <> OLD.share_id)
        BEGIN
            SELECT RAISE(ABORT, 'share_id cannot be changed once assigned');
        END;
        ",
    )
}
