//! Sharing token issuer and public shared-view lookup.

use tracing::{debug, info};

use crate::managers::mirror::LocalMirror;
use crate::remote::RemoteStore;
use crate::services::crypto_service::{CryptoService, CryptoServiceTrait};
use crate::types::bookmark::{Bookmark, BookmarkPatch};
use crate::types::errors::{StoreError, SyncError};
use crate::types::session::Session;

/// Random bytes per share token (192 bits, 32 base64url characters).
pub const SHARE_TOKEN_BYTES: usize = 24;

/// Issues share tokens and builds public links.
pub struct ShareService {
    crypto: CryptoService,
    base_url: String,
}

impl ShareService {
    /// `base_url` is where the public shared view is served.
    pub fn new(base_url: &str) -> Self {
        Self {
            crypto: CryptoService::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// A fresh token, independent of the bookmark's id, owner and URL.
    pub fn generate_token(&self) -> Result<String, SyncError> {
        self.crypto
            .generate_token(SHARE_TOKEN_BYTES)
            .map_err(|e| SyncError::Unavailable(e.to_string()))
    }

    /// Returns the bookmark's share token, issuing and persisting one on the
    /// first request. Sharing again never changes the link. If persisting
    /// fails no token is returned and the bookmark stays unshared.
    pub async fn issue_or_reuse(&self, mirror: &LocalMirror, session: &Session, bookmark_id: &str) -> Result<String, SyncError> {
        let bookmark = mirror
            .bookmark(bookmark_id)
            .ok_or_else(|| SyncError::NotFound(format!("bookmark {}", bookmark_id)))?;
        if let Some(existing) = bookmark.share_id {
            debug!(%bookmark_id, "reusing share token");
            return Ok(existing);
        }

        let token = self.generate_token()?;
        let updated = mirror
            .update_bookmark(session, bookmark_id, BookmarkPatch::share(token))
            .await?;
        info!(%bookmark_id, "bookmark shared");
        updated
            .share_id
            .ok_or_else(|| SyncError::Constraint("store did not persist the share token".to_string()))
    }

    /// Public link for a token.
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/share/{}", self.base_url, token)
    }

    /// Unauthenticated lookup for the shared view. Only a miss is `NotFound`,
    /// which the caller shows as an invalid or removed link; any other backend
    /// failure is `Unavailable`.
    pub async fn open_shared(&self, store: &dyn RemoteStore, token: &str) -> Result<Bookmark, SyncError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SyncError::NotFound("share link".to_string()));
        }
        match store.find_by_share_id(token).await {
            Ok(bookmark) => Ok(bookmark),
            Err(StoreError::NotFound(_)) => Err(SyncError::NotFound("share link".to_string())),
            Err(StoreError::Transport(msg)) => Err(SyncError::Unavailable(msg)),
            Err(other) => {
                tracing::warn!(error = %other, "shared lookup failed");
                Err(SyncError::Unavailable(other.to_string()))
            }
        }
    }
}
