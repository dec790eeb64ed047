use thiserror::Error;

use crate::remote::BOOKMARK_URL_KEY;

// === StoreError ===

/// Errors raised by a store backend (local SQLite or hosted).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Credentials were rejected or the session is missing/expired.
    #[error("Store authentication failed: {0}")]
    Auth(String),
    /// The request never produced a response (network, timeout).
    #[error("Store transport error: {0}")]
    Transport(String),
    /// A uniqueness constraint rejected the write. Carries the canonical constraint name.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
    /// A reference points at a row the owner does not have.
    #[error("Foreign key violated: {0}")]
    ForeignKey(String),
    /// The addressed row does not exist (or is not visible to the owner).
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Any other policy or check rejection.
    #[error("Write rejected: {0}")]
    Rejected(String),
    /// Local database failure.
    #[error("Store database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("no matching row".to_string()),
            rusqlite::Error::SqliteFailure(code, message) => {
                let message = message.clone().unwrap_or_else(|| err.to_string());
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StoreError::UniqueViolation {
                            constraint: canonical_sqlite_constraint(&message),
                        }
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => StoreError::ForeignKey(message),
                    ffi::SQLITE_CONSTRAINT_TRIGGER | ffi::SQLITE_CONSTRAINT_CHECK
                    | ffi::SQLITE_CONSTRAINT_NOTNULL => StoreError::Rejected(message),
                    _ => StoreError::Database(message),
                }
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Maps SQLite's "UNIQUE constraint failed: t.a, t.b" text onto the
/// constraint names the hosted schema uses, so callers see one vocabulary.
fn canonical_sqlite_constraint(message: &str) -> String {
    let columns = message
        .split_once(": ")
        .map(|(_, cols)| cols.trim())
        .unwrap_or(message);
    match columns {
        "bookmarks.owner_id, bookmarks.url" => BOOKMARK_URL_KEY.to_string(),
        "bookmarks.share_id" => crate::remote::SHARE_ID_KEY.to_string(),
        "folders.owner_id" => crate::remote::DEFAULT_FOLDER_KEY.to_string(),
        "users.email" => "users_email_key".to_string(),
        other => other.replace(", ", "_").replace('.', "_"),
    }
}

// === SyncError ===

/// Errors surfaced by the bookmark core to its callers.
///
/// Every remote failure is translated into one of these at the call site that
/// issued it. None of them is fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The submitted URL could not be normalized into an http(s) URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The owner already has a bookmark for this URL. Raised by the local
    /// guard and by the store's uniqueness rejection alike.
    #[error("A bookmark for {0} already exists")]
    DuplicateBookmark(String),
    /// Invalid credentials or an expired session.
    #[error("Authentication error: {0}")]
    Auth(String),
    /// The initial fetch failed; nothing is shown until a reload succeeds.
    #[error("Failed to load bookmarks: {0}")]
    Load(String),
    /// Any other store-side rejection of a write.
    #[error("Change rejected: {0}")]
    Constraint(String),
    /// The addressed entity or share link does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The default folder can never be deleted.
    #[error("The default folder cannot be deleted: {0}")]
    DefaultFolderProtected(String),
    /// Local input validation failed.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// The store or a remote page could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl SyncError {
    /// Stable machine-readable identifier for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidUrl(_) => "invalid_url",
            SyncError::DuplicateBookmark(_) => "duplicate_bookmark",
            SyncError::Auth(_) => "auth",
            SyncError::Load(_) => "load",
            SyncError::Constraint(_) => "constraint",
            SyncError::NotFound(_) => "not_found",
            SyncError::DefaultFolderProtected(_) => "default_folder_protected",
            SyncError::Validation(_) => "validation",
            SyncError::Unavailable(_) => "unavailable",
        }
    }

    /// Translates a failed write. `url` is the normalized URL being written,
    /// if any; a uniqueness rejection on it becomes `DuplicateBookmark`
    /// without leaking the store's constraint detail.
    pub fn from_write(err: StoreError, url: Option<&str>) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } if constraint == BOOKMARK_URL_KEY => {
                tracing::debug!(%constraint, "store rejected duplicate bookmark url");
                SyncError::DuplicateBookmark(url.unwrap_or("this URL").to_string())
            }
            StoreError::UniqueViolation { constraint } => {
                SyncError::Constraint(format!("unique constraint {}", constraint))
            }
            StoreError::Auth(msg) => SyncError::Auth(msg),
            StoreError::Transport(msg) => SyncError::Unavailable(msg),
            StoreError::NotFound(msg) => SyncError::NotFound(msg),
            StoreError::ForeignKey(msg) | StoreError::Rejected(msg) | StoreError::Database(msg) => {
                SyncError::Constraint(msg)
            }
        }
    }

    /// Translates a failed read of the owner's data. Transport and auth
    /// failures alike become `Load`; the caller offers a reload.
    pub fn from_load(err: StoreError) -> Self {
        SyncError::Load(err.to_string())
    }
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    #[error("Settings I/O error: {0}")]
    IoError(String),
    /// Failed to serialize or deserialize settings.
    #[error("Settings serialization error: {0}")]
    SerializationError(String),
    /// The provided settings key is invalid.
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),
    /// The provided settings value is invalid.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}
