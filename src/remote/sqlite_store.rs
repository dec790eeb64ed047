//! Local store backend.
//!
//! An embedded SQLite database that enforces the same rules as the hosted
//! schema (URL uniqueness per owner, unique share tokens, null-out on folder
//! delete, protected default folder) and scopes every query to the owner of
//! the presented session. Successful writes are published on an in-process
//! change feed.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{AuthClient, ChangeSubscription, RemoteStore};
use crate::database::Database;
use crate::services::crypto_service::{CryptoService, CryptoServiceTrait};
use crate::types::bookmark::{Bookmark, BookmarkPatch, Folder, FolderPatch, NewBookmark, NewFolder};
use crate::types::change::{ChangeEvent, ChangeKind, ChangeRecord, Relation};
use crate::types::errors::StoreError;
use crate::types::session::Session;

const CHANGE_FEED_CAPACITY: usize = 256;
const SESSION_TOKEN_BYTES: usize = 32;
const MIN_PASSWORD_LEN: usize = 6;

const FOLDER_COLUMNS: &str = "id, owner_id, name, is_default, created_at, updated_at";
const BOOKMARK_COLUMNS: &str = "id, owner_id, folder_id, url, title, description, thumbnail, \
                                tags, is_private, share_id, created_at, updated_at";

/// Store backed by a single SQLite connection.
///
/// Statements and password hashing run on tokio's blocking pool, never on an
/// async worker thread.
pub struct SqliteStore {
    shared: Arc<Shared>,
    session_ttl: Duration,
}

/// State reachable from blocking tasks.
struct Shared {
    db: Mutex<Database>,
    crypto: CryptoService,
    changes: broadcast::Sender<ChangeEvent>,
    auth_state: watch::Sender<Option<Session>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let (auth_state, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                db: Mutex::new(db),
                crypto: CryptoService::new(),
                changes,
                auth_state,
            }),
            session_ttl: Duration::days(7),
        }
    }

    /// Opens (or creates) the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Sets the lifetime of sessions issued from now on.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Runs `f` on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Shared) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || f(&shared))
            .await
            .map_err(|e| StoreError::Database(format!("store task failed: {}", e)))?
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn from_millis(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<Folder> {
        Ok(Folder {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            is_default: row.get(3)?,
            created_at: Self::from_millis(row.get(4)?),
            updated_at: Self::from_millis(row.get(5)?),
        })
    }

    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
        let tags: String = row.get(7)?;
        Ok(Bookmark {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            folder_id: row.get(2)?,
            url: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            thumbnail: row.get(6)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            is_private: row.get(8)?,
            share_id: row.get(9)?,
            created_at: Self::from_millis(row.get(10)?),
            updated_at: Self::from_millis(row.get(11)?),
        })
    }

    fn encode_tags(tags: &[String]) -> Result<String, StoreError> {
        serde_json::to_string(tags).map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Resolves the session to its owner. Plays the role of row-level security:
    /// every owner-scoped statement filters on the id returned here.
    fn authorize(conn: &Connection, session: &Session) -> Result<String, StoreError> {
        let owner: Option<String> = conn
            .query_row(
                "SELECT user_id FROM auth_sessions WHERE token = ?1 AND expires_at > ?2",
                params![session.access_token, Self::now_millis()],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            Some(owner) if owner == session.user_id => Ok(owner),
            _ => Err(StoreError::Auth("session is invalid or has expired".to_string())),
        }
    }

    fn fetch_folder(conn: &Connection, owner: &str, id: &str) -> Result<Folder, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM folders WHERE id = ?1 AND owner_id = ?2", FOLDER_COLUMNS),
            params![id, owner],
            Self::row_to_folder,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("folder {}", id)))
    }

    fn fetch_bookmark(conn: &Connection, owner: &str, id: &str) -> Result<Bookmark, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM bookmarks WHERE id = ?1 AND owner_id = ?2", BOOKMARK_COLUMNS),
            params![id, owner],
            Self::row_to_bookmark,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("bookmark {}", id)))
    }

    /// Folder references must point at a folder of the same owner.
    fn ensure_folder_owned(conn: &Connection, owner: &str, folder_id: &str) -> Result<(), StoreError> {
        match Self::fetch_folder(conn, owner, folder_id) {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(StoreError::ForeignKey(format!(
                "folder {} does not belong to the owner",
                folder_id
            ))),
            Err(e) => Err(e),
        }
    }

    fn publish(&self, kind: ChangeKind, record: ChangeRecord) {
        // No receivers is the normal case when nothing subscribed.
        let _ = self.changes.send(ChangeEvent::new(kind, record));
    }

    fn issue_session(&self, conn: &Connection, user_id: &str, email: &str, ttl: Duration) -> Result<Session, StoreError> {
        let token = self.crypto.generate_token(SESSION_TOKEN_BYTES)?;
        let now = Utc::now();
        let expires_at = now + ttl;
        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, now.timestamp_millis(), expires_at.timestamp_millis()],
        )?;
        Ok(Session {
            user_id: user_id.to_string(),
            email: email.to_string(),
            access_token: token,
            expires_at: Some(expires_at),
        })
    }

    fn normalize_email(email: &str) -> Result<String, StoreError> {
        let email = email.trim().to_lowercase();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
            _ => Err(StoreError::Auth("Unable to validate email address: invalid format".to_string())),
        }
    }

    fn sign_up_blocking(&self, email: &str, password: &str, ttl: Duration) -> Result<Session, StoreError> {
        let email = Self::normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(StoreError::Auth(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let salt = self.crypto.generate_salt()?;
        let hash = self.crypto.hash_password(password, &salt);
        let user_id = Uuid::new_v4().to_string();

        let db = self.lock();
        let conn = db.connection();
        match conn.execute(
            "INSERT INTO users (id, email, password_hash, salt, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, email, hash, salt, Self::now_millis()],
        ) {
            Ok(_) => {}
            Err(e) => {
                return Err(match StoreError::from(e) {
                    StoreError::UniqueViolation { .. } => {
                        StoreError::Auth("User already registered".to_string())
                    }
                    other => other,
                })
            }
        }

        let session = self.issue_session(conn, &user_id, &email, ttl)?;
        self.auth_state.send_replace(Some(session.clone()));
        Ok(session)
    }

    fn sign_in_blocking(&self, email: &str, password: &str, ttl: Duration) -> Result<Session, StoreError> {
        let email = Self::normalize_email(email)?;
        let db = self.lock();
        let conn = db.connection();

        let user: Option<(String, Vec<u8>, Vec<u8>)> = conn
            .query_row(
                "SELECT id, password_hash, salt FROM users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (user_id, hash, salt) = match user {
            Some(user) => user,
            None => return Err(StoreError::Auth("Invalid login credentials".to_string())),
        };
        if !self.crypto.verify_password(password, &salt, &hash) {
            return Err(StoreError::Auth("Invalid login credentials".to_string()));
        }

        let session = self.issue_session(conn, &user_id, &email, ttl)?;
        self.auth_state.send_replace(Some(session.clone()));
        Ok(session)
    }

    fn sign_out_blocking(&self, session: &Session) -> Result<(), StoreError> {
        let db = self.lock();
        db.connection().execute(
            "DELETE FROM auth_sessions WHERE token = ?1",
            params![session.access_token],
        )?;
        self.auth_state.send_replace(None);
        Ok(())
    }

    fn list_folders_blocking(&self, session: &Session) -> Result<Vec<Folder>, StoreError> {
        let db = self.lock();
        let conn = db.connection();
        let owner = Self::authorize(conn, session)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM folders WHERE owner_id = ?1 ORDER BY created_at, rowid",
            FOLDER_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner], Self::row_to_folder)?;
        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }
        Ok(folders)
    }

    fn list_bookmarks_blocking(&self, session: &Session) -> Result<Vec<Bookmark>, StoreError> {
        let db = self.lock();
        let conn = db.connection();
        let owner = Self::authorize(conn, session)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bookmarks WHERE owner_id = ?1 ORDER BY created_at, rowid",
            BOOKMARK_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner], Self::row_to_bookmark)?;
        let mut bookmarks = Vec::new();
        for row in rows {
            bookmarks.push(row?);
        }
        Ok(bookmarks)
    }

    fn create_folder_blocking(&self, session: &Session, folder: &NewFolder) -> Result<Folder, StoreError> {
        let created = {
            let db = self.lock();
            let conn = db.connection();
            let owner = Self::authorize(conn, session)?;
            let id = Uuid::new_v4().to_string();
            let now = Self::now_millis();
            conn.execute(
                "INSERT INTO folders (id, owner_id, name, is_default, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, owner, folder.name.trim(), folder.is_default, now],
            )?;
            Self::fetch_folder(conn, &owner, &id)?
        };
        self.publish(ChangeKind::Created, ChangeRecord::Folder(created.clone()));
        Ok(created)
    }

    fn update_folder_blocking(&self, session: &Session, id: &str, patch: &FolderPatch) -> Result<Folder, StoreError> {
        let updated = {
            let db = self.lock();
            let conn = db.connection();
            let owner = Self::authorize(conn, session)?;
            let affected = conn.execute(
                "UPDATE folders SET name = COALESCE(?1, name), updated_at = MAX(?2, updated_at + 1) \
                 WHERE id = ?3 AND owner_id = ?4",
                params![patch.name.as_deref().map(str::trim), Self::now_millis(), id, owner],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("folder {}", id)));
            }
            Self::fetch_folder(conn, &owner, id)?
        };
        self.publish(ChangeKind::Updated, ChangeRecord::Folder(updated.clone()));
        Ok(updated)
    }

    fn delete_folder_blocking(&self, session: &Session, id: &str) -> Result<(), StoreError> {
        let (folder, orphaned) = self.lock().transaction(|tx| {
            let owner = Self::authorize(tx, session)?;
            let folder = Self::fetch_folder(tx, &owner, id)?;
            let referencing: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM bookmarks WHERE folder_id = ?1 AND owner_id = ?2")?;
                let rows = stmt.query_map(params![id, owner], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            // The trigger rejects default folders; ON DELETE SET NULL unfiles bookmarks.
            tx.execute("DELETE FROM folders WHERE id = ?1 AND owner_id = ?2", params![id, owner])?;

            let mut orphaned = Vec::with_capacity(referencing.len());
            for bookmark_id in referencing {
                orphaned.push(Self::fetch_bookmark(tx, &owner, &bookmark_id)?);
            }
            Ok::<_, StoreError>((folder, orphaned))
        })?;

        self.publish(ChangeKind::Deleted, ChangeRecord::Folder(folder));
        for bookmark in orphaned {
            self.publish(ChangeKind::Updated, ChangeRecord::Bookmark(bookmark));
        }
        Ok(())
    }

    fn create_bookmark_blocking(&self, session: &Session, bookmark: &NewBookmark) -> Result<Bookmark, StoreError> {
        let created = {
            let db = self.lock();
            let conn = db.connection();
            let owner = Self::authorize(conn, session)?;
            if let Some(folder_id) = &bookmark.folder_id {
                Self::ensure_folder_owned(conn, &owner, folder_id)?;
            }
            let id = Uuid::new_v4().to_string();
            let now = Self::now_millis();
            conn.execute(
                "INSERT INTO bookmarks (id, owner_id, folder_id, url, title, description, thumbnail, \
                 tags, is_private, share_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?10)",
                params![
                    id,
                    owner,
                    bookmark.folder_id,
                    bookmark.url,
                    bookmark.title,
                    bookmark.description,
                    bookmark.thumbnail,
                    Self::encode_tags(&bookmark.tags)?,
                    bookmark.is_private,
                    now
                ],
            )?;
            Self::fetch_bookmark(conn, &owner, &id)?
        };
        self.publish(ChangeKind::Created, ChangeRecord::Bookmark(created.clone()));
        Ok(created)
    }

    fn update_bookmark_blocking(&self, session: &Session, id: &str, patch: &BookmarkPatch) -> Result<Bookmark, StoreError> {
        fn text(value: &Option<String>) -> Value {
            value.clone().map(Value::Text).unwrap_or(Value::Null)
        }

        let updated = {
            let db = self.lock();
            let conn = db.connection();
            let owner = Self::authorize(conn, session)?;

            let mut assignments: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            let mut assign = |column: &str, value: Value| {
                values.push(value);
                assignments.push(format!("{} = ?{}", column, values.len()));
            };

            if let Some(folder_id) = &patch.folder_id {
                if let Some(fid) = folder_id {
                    Self::ensure_folder_owned(conn, &owner, fid)?;
                }
                assign("folder_id", text(folder_id));
            }
            if let Some(url) = &patch.url {
                assign("url", Value::Text(url.clone()));
            }
            if let Some(title) = &patch.title {
                assign("title", Value::Text(title.clone()));
            }
            if let Some(description) = &patch.description {
                assign("description", text(description));
            }
            if let Some(thumbnail) = &patch.thumbnail {
                assign("thumbnail", text(thumbnail));
            }
            if let Some(tags) = &patch.tags {
                assign("tags", Value::Text(Self::encode_tags(tags)?));
            }
            if let Some(is_private) = patch.is_private {
                assign("is_private", Value::Integer(i64::from(is_private)));
            }
            if let Some(share_id) = &patch.share_id {
                assign("share_id", Value::Text(share_id.clone()));
            }
            // Strictly increasing per row, so readers can order two versions.
            values.push(Value::Integer(Self::now_millis()));
            assignments.push(format!("updated_at = MAX(?{0}, updated_at + 1)", values.len()));

            let sql = format!(
                "UPDATE bookmarks SET {} WHERE id = ?{} AND owner_id = ?{}",
                assignments.join(", "),
                values.len() + 1,
                values.len() + 2
            );
            values.push(Value::Text(id.to_string()));
            values.push(Value::Text(owner.clone()));

            let affected = conn.execute(&sql, params_from_iter(values))?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("bookmark {}", id)));
            }
            Self::fetch_bookmark(conn, &owner, id)?
        };
        self.publish(ChangeKind::Updated, ChangeRecord::Bookmark(updated.clone()));
        Ok(updated)
    }

    fn delete_bookmark_blocking(&self, session: &Session, id: &str) -> Result<(), StoreError> {
        let deleted = {
            let db = self.lock();
            let conn = db.connection();
            let owner = Self::authorize(conn, session)?;
            let bookmark = Self::fetch_bookmark(conn, &owner, id)?;
            conn.execute("DELETE FROM bookmarks WHERE id = ?1 AND owner_id = ?2", params![id, owner])?;
            bookmark
        };
        self.publish(ChangeKind::Deleted, ChangeRecord::Bookmark(deleted));
        Ok(())
    }

    fn find_by_share_id_blocking(&self, share_id: &str) -> Result<Bookmark, StoreError> {
        let db = self.lock();
        db.connection()
            .query_row(
                &format!("SELECT {} FROM bookmarks WHERE share_id = ?1", BOOKMARK_COLUMNS),
                params![share_id],
                Self::row_to_bookmark,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound("shared bookmark".to_string()))
    }
}

#[async_trait]
impl AuthClient for SqliteStore {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let (email, ttl) = (email.to_string(), self.session_ttl);
        let password = Zeroizing::new(password.to_string());
        self.run(move |store| store.sign_up_blocking(&email, &password, ttl)).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let (email, ttl) = (email.to_string(), self.session_ttl);
        let password = Zeroizing::new(password.to_string());
        self.run(move |store| store.sign_in_blocking(&email, &password, ttl)).await
    }

    async fn sign_out(&self, session: &Session) -> Result<(), StoreError> {
        let session = session.clone();
        self.run(move |store| store.sign_out_blocking(&session)).await
    }

    fn current_session(&self) -> Option<Session> {
        self.shared.auth_state.borrow().clone()
    }

    fn subscribe_auth(&self) -> watch::Receiver<Option<Session>> {
        self.shared.auth_state.subscribe()
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn list_folders(&self, session: &Session) -> Result<Vec<Folder>, StoreError> {
        let session = session.clone();
        self.run(move |store| store.list_folders_blocking(&session)).await
    }

    async fn list_bookmarks(&self, session: &Session) -> Result<Vec<Bookmark>, StoreError> {
        let session = session.clone();
        self.run(move |store| store.list_bookmarks_blocking(&session)).await
    }

    async fn create_folder(&self, session: &Session, folder: &NewFolder) -> Result<Folder, StoreError> {
        let (session, folder) = (session.clone(), folder.clone());
        self.run(move |store| store.create_folder_blocking(&session, &folder)).await
    }

    async fn update_folder(&self, session: &Session, id: &str, patch: &FolderPatch) -> Result<Folder, StoreError> {
        let (session, id, patch) = (session.clone(), id.to_string(), patch.clone());
        self.run(move |store| store.update_folder_blocking(&session, &id, &patch)).await
    }

    async fn delete_folder(&self, session: &Session, id: &str) -> Result<(), StoreError> {
        let (session, id) = (session.clone(), id.to_string());
        self.run(move |store| store.delete_folder_blocking(&session, &id)).await
    }

    async fn create_bookmark(&self, session: &Session, bookmark: &NewBookmark) -> Result<Bookmark, StoreError> {
        let (session, bookmark) = (session.clone(), bookmark.clone());
        self.run(move |store| store.create_bookmark_blocking(&session, &bookmark)).await
    }

    async fn update_bookmark(&self, session: &Session, id: &str, patch: &BookmarkPatch) -> Result<Bookmark, StoreError> {
        let (session, id, patch) = (session.clone(), id.to_string(), patch.clone());
        self.run(move |store| store.update_bookmark_blocking(&session, &id, &patch)).await
    }

    async fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), StoreError> {
        let (session, id) = (session.clone(), id.to_string());
        self.run(move |store| store.delete_bookmark_blocking(&session, &id)).await
    }

    async fn find_by_share_id(&self, share_id: &str) -> Result<Bookmark, StoreError> {
        let share_id = share_id.to_string();
        self.run(move |store| store.find_by_share_id_blocking(&share_id)).await
    }

    fn subscribe(&self, session: &Session, relation: Relation) -> Option<ChangeSubscription> {
        let db = self.shared.lock();
        match Shared::authorize(db.connection(), session) {
            Ok(owner) => Some(ChangeSubscription::new(self.shared.changes.subscribe(), owner, relation)),
            Err(e) => {
                tracing::warn!(error = %e, "refusing change subscription");
                None
            }
        }
    }
}
