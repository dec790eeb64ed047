//! RPC method handler for the Linkshelf JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be tested without stdio.
//! `handle_method` dispatches one call to the `App`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::app::App;
use crate::managers::session_manager::SessionManagerTrait;
use crate::services::search::{filter_bookmarks, FolderFilter};
use crate::services::{tags, url_guard};
use crate::types::bookmark::{BookmarkPatch, FolderPatch, NewBookmark};
use crate::types::errors::SyncError;
use crate::types::session::Session;

const DEFAULT_SUGGESTION_LIMIT: usize = 10;

/// An error response body: `{"kind": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub kind: String,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new("invalid_params", message)
    }
}

impl From<SyncError> for RpcError {
    fn from(err: SyncError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(format!("missing {}", key)))
}

fn opt_str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn from_params<T: DeserializeOwned>(value: &Value) -> Result<T, RpcError> {
    serde_json::from_value(value.clone()).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new("internal", e.to_string()))
}

fn session_json(session: &Session) -> Value {
    json!({
        "user_id": session.user_id,
        "email": session.email,
        "expires_at": session.expires_at,
    })
}

/// Dispatch a JSON-RPC method call.
pub async fn handle_method(app: &Mutex<App>, method: &str, params: &Value) -> Result<Value, RpcError> {
    match method {
        "ping" => Ok(json!({"pong": true, "version": env!("CARGO_PKG_VERSION")})),

        // ─── Auth ───
        "auth.sign_up" | "auth.sign_in" => {
            let email = str_param(params, "email")?;
            let password = str_param(params, "password")?;
            let mut a = app.lock().await;
            let session = if method == "auth.sign_up" {
                a.sign_up(email, password).await?
            } else {
                a.sign_in(email, password).await?
            };
            Ok(session_json(&session))
        }
        "auth.sign_out" => {
            let mut a = app.lock().await;
            a.sign_out().await?;
            Ok(json!({"ok": true}))
        }
        "auth.session" => {
            let a = app.lock().await;
            Ok(a.sessions.current().map(|s| session_json(&s)).unwrap_or(Value::Null))
        }
        "mirror.reload" => {
            let mut a = app.lock().await;
            a.reload().await?;
            Ok(json!({
                "folders": a.mirror.folders().len(),
                "bookmarks": a.mirror.bookmarks().len(),
            }))
        }

        // ─── Folders ───
        "folder.list" => {
            let a = app.lock().await;
            a.sessions.require()?;
            to_json(&a.mirror.folders())
        }
        "folder.create" => {
            let name = str_param(params, "name")?;
            let a = app.lock().await;
            let session = a.sessions.require()?;
            let folder = a.mirror.create_folder(&session, name).await?;
            to_json(&folder)
        }
        "folder.rename" => {
            let id = str_param(params, "id")?;
            let name = str_param(params, "name")?;
            let a = app.lock().await;
            let session = a.sessions.require()?;
            let patch = FolderPatch {
                name: Some(name.to_string()),
            };
            let folder = a.mirror.update_folder(&session, id, patch).await?;
            to_json(&folder)
        }
        "folder.delete" => {
            let id = str_param(params, "id")?;
            let a = app.lock().await;
            let session = a.sessions.require()?;
            a.mirror.delete_folder(&session, id).await?;
            Ok(json!({"ok": true}))
        }

        // ─── Bookmarks ───
        "bookmark.list" => {
            let a = app.lock().await;
            a.sessions.require()?;
            let folders = a.mirror.folders();
            let filter = FolderFilter::for_selection(opt_str_param(params, "folder_id"), &folders);
            let query = opt_str_param(params, "query").unwrap_or("");
            to_json(&filter_bookmarks(&a.mirror.bookmarks(), &filter, query))
        }
        "bookmark.add" => {
            let draft: NewBookmark = from_params(params)?;
            let a = app.lock().await;
            let session = a.sessions.require()?;
            let bookmark = a.mirror.create_bookmark(&session, draft).await?;
            to_json(&bookmark)
        }
        "bookmark.update" => {
            let id = str_param(params, "id")?;
            let changes = params
                .get("changes")
                .ok_or_else(|| RpcError::invalid_params("missing changes"))?;
            let patch: BookmarkPatch = from_params(changes)?;
            if patch.share_id.is_some() {
                return Err(RpcError::invalid_params("share_id is assigned by bookmark.share"));
            }
            let a = app.lock().await;
            let session = a.sessions.require()?;
            let bookmark = a.mirror.update_bookmark(&session, id, patch).await?;
            to_json(&bookmark)
        }
        "bookmark.delete" => {
            let id = str_param(params, "id")?;
            let a = app.lock().await;
            let session = a.sessions.require()?;
            a.mirror.delete_bookmark(&session, id).await?;
            Ok(json!({"ok": true}))
        }
        "bookmark.share" => {
            let id = str_param(params, "id")?;
            let a = app.lock().await;
            let session = a.sessions.require()?;
            let token = a.share.issue_or_reuse(&a.mirror, &session, id).await?;
            Ok(json!({"share_id": token, "url": a.share.share_url(&token)}))
        }

        // ─── Public ───
        "share.open" => {
            let token = str_param(params, "token")?;
            let a = app.lock().await;
            match a.share.open_shared(a.store.as_ref(), token).await {
                Ok(bookmark) => Ok(json!({"state": "found", "bookmark": to_json(&bookmark)?})),
                Err(SyncError::NotFound(_)) => Ok(json!({"state": "invalid"})),
                Err(e) => Err(e.into()),
            }
        }

        // ─── Helpers ───
        "tags.suggest" => {
            let partial = opt_str_param(params, "partial").unwrap_or("");
            let limit = params
                .get("limit")
                .and_then(|v| v.as_u64())
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_SUGGESTION_LIMIT);
            let a = app.lock().await;
            a.sessions.require()?;
            Ok(json!(tags::suggest_tags(&a.mirror.bookmarks(), partial, limit)))
        }
        "metadata.fetch" => {
            let url = url_guard::normalize(str_param(params, "url")?)?;
            let a = app.lock().await;
            let fetcher = a
                .metadata
                .as_ref()
                .ok_or_else(|| SyncError::Unavailable("metadata prefetch is disabled".to_string()))?;
            let metadata = fetcher.fetch(&url).await?;
            to_json(&metadata)
        }
        "url.normalize" => {
            let url = url_guard::normalize(str_param(params, "url")?)?;
            Ok(json!({"url": url}))
        }

        _ => Err(RpcError::new("unknown_method", format!("unknown method: {}", method))),
    }
}
