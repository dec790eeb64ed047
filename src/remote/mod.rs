//! Store backends.
//!
//! The bookmark core never talks to a database directly; it goes through
//! [`RemoteStore`] for owner data and [`AuthClient`] for sessions. Two
//! implementations exist: [`sqlite_store::SqliteStore`] (local, embedded) and
//! `supabase::SupabaseClient` (hosted, behind the `hosted` feature).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::types::bookmark::{Bookmark, BookmarkPatch, Folder, FolderPatch, NewBookmark, NewFolder};
use crate::types::change::{ChangeEvent, Relation};
use crate::types::errors::StoreError;
use crate::types::session::Session;

pub mod sqlite_store;
#[cfg(feature = "hosted")]
pub mod supabase;

/// Canonical name of the per-owner URL uniqueness constraint.
pub const BOOKMARK_URL_KEY: &str = "bookmarks_owner_id_url_key";

/// Canonical name of the global share token uniqueness constraint.
pub const SHARE_ID_KEY: &str = "bookmarks_share_id_key";

/// Canonical name of the one-default-folder-per-owner index.
pub const DEFAULT_FOLDER_KEY: &str = "folders_one_default_per_owner";

/// Authentication operations of a backend.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, StoreError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError>;
    async fn sign_out(&self, session: &Session) -> Result<(), StoreError>;
    fn current_session(&self) -> Option<Session>;
    /// Stream of auth transitions; `None` means signed out.
    fn subscribe_auth(&self) -> watch::Receiver<Option<Session>>;
}

/// Owner-scoped CRUD over `folders` and `bookmarks`.
///
/// Every list is ordered by creation time, oldest first. Every write returns
/// the canonical record as stored, including store-computed fields.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_folders(&self, session: &Session) -> Result<Vec<Folder>, StoreError>;
    async fn list_bookmarks(&self, session: &Session) -> Result<Vec<Bookmark>, StoreError>;

    async fn create_folder(&self, session: &Session, folder: &NewFolder) -> Result<Folder, StoreError>;
    async fn update_folder(&self, session: &Session, id: &str, patch: &FolderPatch) -> Result<Folder, StoreError>;
    async fn delete_folder(&self, session: &Session, id: &str) -> Result<(), StoreError>;

    async fn create_bookmark(&self, session: &Session, bookmark: &NewBookmark) -> Result<Bookmark, StoreError>;
    async fn update_bookmark(&self, session: &Session, id: &str, patch: &BookmarkPatch) -> Result<Bookmark, StoreError>;
    async fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), StoreError>;

    /// Unauthenticated lookup of a shared bookmark.
    async fn find_by_share_id(&self, share_id: &str) -> Result<Bookmark, StoreError>;

    /// Change notifications for one relation of the session's owner.
    /// `None` when the backend has no push channel.
    fn subscribe(&self, session: &Session, relation: Relation) -> Option<ChangeSubscription>;
}

pub type RemoteStoreRef = Arc<dyn RemoteStore>;
pub type AuthClientRef = Arc<dyn AuthClient>;

/// A filtered view over a backend's change feed.
pub struct ChangeSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    owner_id: String,
    relation: Relation,
}

impl ChangeSubscription {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>, owner_id: impl Into<String>, relation: Relation) -> Self {
        Self {
            rx,
            owner_id: owner_id.into(),
            relation,
        }
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    /// Waits for the next event for this owner and relation.
    /// Returns `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event)
                    if event.record.owner_id() == self.owner_id
                        && event.record.relation() == self.relation =>
                {
                    return Some(event)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, relation = ?self.relation, "change feed lagged; reload to resync");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
