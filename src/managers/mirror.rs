//! Local mirror of the signed-in owner's folders and bookmarks.
//!
//! Every mutation follows the same path: validate locally, call the store,
//! then reconcile from the store's canonical response. Nothing is applied
//! before the store answers, so a failed call leaves the mirror exactly as it
//! was. The state lock is only taken after a call resolves; mutations of
//! different ids may be in flight at once and each lands in resolution order.
//!
//! Push notifications from a [`ChangeSubscription`] merge with the same
//! replace-by-id rule as locally driven writes. The feed also echoes this
//! mirror's own writes, possibly after a later write to the same id already
//! landed, so a copy older than the mirrored one is dropped and ids deleted
//! here are never brought back.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::remote::{ChangeSubscription, RemoteStoreRef};
use crate::services::{tags, url_guard};
use crate::types::bookmark::{Bookmark, BookmarkPatch, Folder, FolderPatch, NewBookmark, NewFolder};
use crate::types::change::{ChangeEvent, ChangeKind, ChangeRecord};
use crate::types::errors::SyncError;
use crate::types::session::Session;

/// Name given to the automatically created default folder.
pub const DEFAULT_FOLDER_NAME: &str = "All Bookmarks";

#[derive(Debug, Default)]
struct MirrorState {
    owner_id: Option<String>,
    /// Creation order.
    folders: Vec<Folder>,
    /// Most recent first.
    bookmarks: Vec<Bookmark>,
    /// Ids of folders and bookmarks deleted while this owner was signed in.
    deleted: HashSet<String>,
}

impl MirrorState {
    /// Replaces or appends a folder. Returns false when the copy is stale.
    fn upsert_folder(&mut self, folder: Folder) -> bool {
        if self.deleted.contains(&folder.id) {
            return false;
        }
        match self.folders.iter_mut().find(|f| f.id == folder.id) {
            Some(slot) if slot.updated_at > folder.updated_at => false,
            Some(slot) => {
                *slot = folder;
                true
            }
            None => {
                self.folders.push(folder);
                true
            }
        }
    }

    /// Replaces or prepends a bookmark. Returns false when the copy is stale.
    fn upsert_bookmark(&mut self, bookmark: Bookmark) -> bool {
        if self.deleted.contains(&bookmark.id) {
            return false;
        }
        match self.bookmarks.iter_mut().find(|b| b.id == bookmark.id) {
            Some(slot) if slot.updated_at > bookmark.updated_at => false,
            Some(slot) => {
                *slot = bookmark;
                true
            }
            None => {
                self.bookmarks.insert(0, bookmark);
                true
            }
        }
    }

    /// Removes a folder and unfiles its bookmarks in one step, matching the
    /// store's ON DELETE SET NULL.
    fn remove_folder(&mut self, id: &str) {
        self.deleted.insert(id.to_string());
        self.folders.retain(|f| f.id != id);
        for bookmark in self.bookmarks.iter_mut() {
            if bookmark.folder_id.as_deref() == Some(id) {
                bookmark.folder_id = None;
            }
        }
    }

    fn remove_bookmark(&mut self, id: &str) {
        self.deleted.insert(id.to_string());
        self.bookmarks.retain(|b| b.id != id);
    }
}

/// In-memory copy of one owner's data, reconciled from authoritative responses.
pub struct LocalMirror {
    store: RemoteStoreRef,
    state: RwLock<MirrorState>,
}

impl LocalMirror {
    pub fn new(store: RemoteStoreRef) -> Self {
        Self {
            store,
            state: RwLock::new(MirrorState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MirrorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MirrorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Snapshots ───

    pub fn owner_id(&self) -> Option<String> {
        self.read().owner_id.clone()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.read().folders.clone()
    }

    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.read().bookmarks.clone()
    }

    pub fn folder(&self, id: &str) -> Option<Folder> {
        self.read().folders.iter().find(|f| f.id == id).cloned()
    }

    pub fn bookmark(&self, id: &str) -> Option<Bookmark> {
        self.read().bookmarks.iter().find(|b| b.id == id).cloned()
    }

    pub fn default_folder(&self) -> Option<Folder> {
        self.read().folders.iter().find(|f| f.is_default).cloned()
    }

    /// Drops everything, e.g. on sign-out.
    pub fn clear(&self) {
        *self.write() = MirrorState::default();
    }

    // ─── Load ───

    /// Replaces the mirror with the owner's full data set.
    ///
    /// On failure the mirror is left empty and `SyncError::Load` is returned;
    /// the caller offers a reload.
    pub async fn load(&self, session: &Session) -> Result<(), SyncError> {
        let fetched = tokio::try_join!(
            self.store.list_folders(session),
            self.store.list_bookmarks(session)
        );
        match fetched {
            Ok((folders, mut bookmarks)) => {
                bookmarks.reverse();
                info!(folders = folders.len(), bookmarks = bookmarks.len(), "mirror loaded");
                let mut state = self.write();
                let deleted = if state.owner_id.as_deref() == Some(session.user_id.as_str()) {
                    std::mem::take(&mut state.deleted)
                } else {
                    HashSet::new()
                };
                *state = MirrorState {
                    owner_id: Some(session.user_id.clone()),
                    folders,
                    bookmarks,
                    deleted,
                };
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "mirror load failed");
                self.clear();
                Err(SyncError::from_load(e))
            }
        }
    }

    /// Returns the owner's default folder, creating it when absent.
    ///
    /// If another client created it first the store rejects the second one;
    /// the mirror then reloads and uses the existing folder.
    pub async fn ensure_default_folder(&self, session: &Session) -> Result<Folder, SyncError> {
        if let Some(folder) = self.default_folder() {
            return Ok(folder);
        }
        let draft = NewFolder {
            name: DEFAULT_FOLDER_NAME.to_string(),
            is_default: true,
        };
        match self.store.create_folder(session, &draft).await {
            Ok(folder) => {
                info!(folder_id = %folder.id, "default folder created");
                self.write().upsert_folder(folder.clone());
                Ok(folder)
            }
            Err(e) => {
                debug!(error = %e, "default folder create rejected, reloading");
                self.load(session).await?;
                self.default_folder()
                    .ok_or_else(|| SyncError::from_write(e, None))
            }
        }
    }

    // ─── Folders ───

    /// Creates a folder and appends it in creation order.
    pub async fn create_folder(&self, session: &Session, name: &str) -> Result<Folder, SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::Validation("folder name cannot be empty".to_string()));
        }
        let draft = NewFolder {
            name: name.to_string(),
            is_default: false,
        };
        let folder = self
            .store
            .create_folder(session, &draft)
            .await
            .map_err(|e| SyncError::from_write(e, None))?;
        debug!(folder_id = %folder.id, "folder created");
        self.write().upsert_folder(folder.clone());
        Ok(folder)
    }

    /// Applies a partial update and replaces the folder with the store's version.
    pub async fn update_folder(&self, session: &Session, id: &str, patch: FolderPatch) -> Result<Folder, SyncError> {
        if self.folder(id).is_none() {
            return Err(SyncError::NotFound(format!("folder {}", id)));
        }
        let mut patch = patch;
        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(SyncError::Validation("folder name cannot be empty".to_string()));
            }
        }
        let folder = self
            .store
            .update_folder(session, id, &patch)
            .await
            .map_err(|e| SyncError::from_write(e, None))?;
        self.write().upsert_folder(folder.clone());
        Ok(folder)
    }

    /// Deletes a non-default folder; its bookmarks become unfiled.
    pub async fn delete_folder(&self, session: &Session, id: &str) -> Result<(), SyncError> {
        let folder = self
            .folder(id)
            .ok_or_else(|| SyncError::NotFound(format!("folder {}", id)))?;
        if folder.is_default {
            return Err(SyncError::DefaultFolderProtected(folder.name));
        }
        self.store
            .delete_folder(session, id)
            .await
            .map_err(|e| SyncError::from_write(e, None))?;
        debug!(folder_id = %id, "folder deleted");
        self.write().remove_folder(id);
        Ok(())
    }

    // ─── Bookmarks ───

    /// Creates a bookmark and puts it at the head of the list.
    ///
    /// The URL is normalized and checked against the mirror first; a store
    /// uniqueness rejection surfaces as the same `DuplicateBookmark`.
    pub async fn create_bookmark(&self, session: &Session, draft: NewBookmark) -> Result<Bookmark, SyncError> {
        let url = {
            let state = self.read();
            if let Some(folder_id) = &draft.folder_id {
                if !state.folders.iter().any(|f| &f.id == folder_id) {
                    return Err(SyncError::NotFound(format!("folder {}", folder_id)));
                }
            }
            url_guard::guard_new_url(&state.bookmarks, &session.user_id, &draft.url, None)?
        };

        let title = match draft.title.trim() {
            "" => url.clone(),
            t => t.to_string(),
        };
        let draft = NewBookmark {
            title,
            url: url.clone(),
            description: draft.description.filter(|d| !d.trim().is_empty()),
            thumbnail: draft.thumbnail.filter(|t| !t.trim().is_empty()),
            tags: tags::normalize_tags(&draft.tags),
            ..draft
        };

        let bookmark = self
            .store
            .create_bookmark(session, &draft)
            .await
            .map_err(|e| SyncError::from_write(e, Some(&url)))?;
        debug!(bookmark_id = %bookmark.id, "bookmark created");
        self.write().upsert_bookmark(bookmark.clone());
        Ok(bookmark)
    }

    /// Applies a partial update and replaces the bookmark with the store's version.
    pub async fn update_bookmark(&self, session: &Session, id: &str, patch: BookmarkPatch) -> Result<Bookmark, SyncError> {
        let mut patch = patch;
        {
            let state = self.read();
            if !state.bookmarks.iter().any(|b| b.id == id) {
                return Err(SyncError::NotFound(format!("bookmark {}", id)));
            }
            if let Some(raw) = &patch.url {
                patch.url = Some(url_guard::guard_new_url(&state.bookmarks, &session.user_id, raw, Some(id))?);
            }
            if let Some(Some(folder_id)) = &patch.folder_id {
                if !state.folders.iter().any(|f| &f.id == folder_id) {
                    return Err(SyncError::NotFound(format!("folder {}", folder_id)));
                }
            }
        }
        if let Some(tag_list) = &patch.tags {
            patch.tags = Some(tags::normalize_tags(tag_list));
        }
        if patch.is_empty() {
            return Err(SyncError::Validation("nothing to update".to_string()));
        }

        let bookmark = self
            .store
            .update_bookmark(session, id, &patch)
            .await
            .map_err(|e| SyncError::from_write(e, patch.url.as_deref()))?;
        debug!(bookmark_id = %id, "bookmark updated");
        self.write().upsert_bookmark(bookmark.clone());
        Ok(bookmark)
    }

    pub async fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), SyncError> {
        if self.bookmark(id).is_none() {
            return Err(SyncError::NotFound(format!("bookmark {}", id)));
        }
        self.store
            .delete_bookmark(session, id)
            .await
            .map_err(|e| SyncError::from_write(e, None))?;
        debug!(bookmark_id = %id, "bookmark deleted");
        self.write().remove_bookmark(id);
        Ok(())
    }

    // ─── Push changes ───

    /// Merges a change notification using the replace-by-id rule.
    /// Events for another owner, or arriving while signed out, are ignored.
    pub fn apply_change(&self, event: ChangeEvent) {
        let mut state = self.write();
        if state.owner_id.as_deref() != Some(event.record.owner_id()) {
            return;
        }
        let kind = event.kind;
        let id = event.record.id().to_string();
        let applied = match (kind, event.record) {
            (ChangeKind::Created | ChangeKind::Updated, ChangeRecord::Folder(folder)) => {
                state.upsert_folder(folder)
            }
            (ChangeKind::Created | ChangeKind::Updated, ChangeRecord::Bookmark(bookmark)) => {
                state.upsert_bookmark(bookmark)
            }
            (ChangeKind::Deleted, ChangeRecord::Folder(folder)) => {
                state.remove_folder(&folder.id);
                true
            }
            (ChangeKind::Deleted, ChangeRecord::Bookmark(bookmark)) => {
                state.remove_bookmark(&bookmark.id);
                true
            }
        };
        if applied {
            debug!(?kind, %id, "applied pushed change");
        } else {
            debug!(?kind, %id, "dropped stale pushed change");
        }
    }
}

/// Feeds a subscription into the mirror until the feed closes.
pub fn spawn_change_listener(mirror: Arc<LocalMirror>, mut subscription: ChangeSubscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        let relation = subscription.relation();
        while let Some(event) = subscription.next().await {
            mirror.apply_change(event);
        }
        debug!(?relation, "change feed closed");
    })
}
