//! Hosted store backend.
//!
//! Talks to a Supabase project: GoTrue under `/auth/v1` for sessions and
//! PostgREST under `/rest/v1` for the `folders` and `bookmarks` tables. Row
//! level security on the server scopes every request to the bearer's owner;
//! the schema lives in `sql/schema.sql`.
//!
//! Realtime is not wired up, so [`RemoteStore::subscribe`] returns `None` and
//! callers reload manually.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use super::{AuthClient, ChangeSubscription, RemoteStore, BOOKMARK_URL_KEY, DEFAULT_FOLDER_KEY, SHARE_ID_KEY};
use crate::types::bookmark::{Bookmark, BookmarkPatch, Folder, FolderPatch, NewBookmark, NewFolder};
use crate::types::change::Relation;
use crate::types::errors::StoreError;
use crate::types::session::Session;

/// Client for a Supabase project.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    auth_state: watch::Sender<Option<Session>>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// GoTrue token/sign-up response. Sign-up without a session (email
/// confirmation pending) only carries the user.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl SupabaseClient {
    /// Creates a client for the project at `base_url` using its public anon key.
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let (auth_state, _) = watch::channel(None);
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            auth_state,
        })
    }

    fn rest_url(&self, relation: Relation) -> String {
        format!("{}/rest/v1/{}", self.base_url, relation.table())
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Builds a request carrying the project key and, when given, the user's token.
    fn request(&self, method: Method, url: &str, session: Option<&Session>) -> RequestBuilder {
        let bearer = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(self.anon_key.as_str());
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn transport(err: reqwest::Error) -> StoreError {
        StoreError::Transport(err.to_string())
    }

    /// Maps a failed PostgREST response onto the store taxonomy.
    fn rest_error(status: StatusCode, body: &str) -> StoreError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return StoreError::Auth(format!("request rejected with {}", status));
        }
        let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
        let (code, message, details) = match parsed {
            Some(err) => {
                let message = err
                    .message
                    .or_else(|| err.details.clone())
                    .unwrap_or_else(|| status.to_string());
                (err.code.unwrap_or_default(), message, err.details.unwrap_or_default())
            }
            None => (String::new(), status.to_string(), String::new()),
        };
        match code.as_str() {
            "23505" => match quoted_name(&message).or_else(|| constraint_for_key(&details)) {
                Some(constraint) => StoreError::UniqueViolation { constraint },
                None => StoreError::Rejected(message),
            },
            "23503" => StoreError::ForeignKey(message),
            // RLS denial on insert/update.
            "42501" => StoreError::Auth(message),
            "PGRST301" | "PGRST302" => StoreError::Auth(message),
            _ if status.is_server_error() => StoreError::Transport(message),
            _ => StoreError::Rejected(message),
        }
    }

    fn auth_error(status: StatusCode, body: &str) -> StoreError {
        let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
        let message = ["error_description", "msg", "message", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());
        if status.is_server_error() {
            StoreError::Transport(message)
        } else {
            StoreError::Auth(message)
        }
    }

    async fn send_rest<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request.send().await.map_err(Self::transport)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::transport)?;
        if !status.is_success() {
            return Err(Self::rest_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Database(format!("unexpected response: {}", e)))
    }

    /// PostgREST returns representations as arrays; writes address one row.
    async fn single<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, StoreError> {
        let mut rows: Vec<T> = self
            .send_rest(request.header("Prefer", "return=representation"))
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(what.to_string()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn authenticate(&self, path: &str, email: &str, password: &str) -> Result<Session, StoreError> {
        let response = self
            .request(Method::POST, &self.auth_url(path), None)
            .json(&json!({ "email": email.trim(), "password": password }))
            .send()
            .await
            .map_err(Self::transport)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::transport)?;
        if !status.is_success() {
            return Err(Self::auth_error(status, &body));
        }

        let parsed: AuthResponse =
            serde_json::from_str(&body).map_err(|e| StoreError::Auth(format!("unexpected auth response: {}", e)))?;
        let (token, user) = match (parsed.access_token, parsed.user) {
            (Some(token), Some(user)) => (token, user),
            _ => {
                return Err(StoreError::Auth(
                    "Check your email to confirm the account before signing in".to_string(),
                ))
            }
        };
        let expires_at = match (parsed.expires_at, parsed.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(secs)) => Some(Utc::now() + chrono::Duration::seconds(secs)),
            (None, None) => None,
        };

        let session = Session {
            user_id: user.id,
            email: user.email.unwrap_or_else(|| email.trim().to_string()),
            access_token: token,
            expires_at,
        };
        self.auth_state.send_replace(Some(session.clone()));
        Ok(session)
    }

    fn by_id(id: &str) -> [(&'static str, String); 1] {
        [("id", format!("eq.{}", id))]
    }
}

/// Names the constraint from a `Key (cols)=(..) already exists.` detail line.
fn constraint_for_key(details: &str) -> Option<String> {
    let start = details.find("Key (")? + 5;
    let len = details[start..].find(')')?;
    let name = match &details[start..start + len] {
        "owner_id, url" => BOOKMARK_URL_KEY,
        "share_id" => SHARE_ID_KEY,
        "owner_id" => DEFAULT_FOLDER_KEY,
        _ => return None,
    };
    Some(name.to_string())
}

/// Extracts `name` from `... constraint "name"`.
fn quoted_name(message: &str) -> Option<String> {
    let start = message.find('"')? + 1;
    let len = message[start..].find('"')?;
    Some(message[start..start + len].to_string())
}

#[async_trait]
impl AuthClient for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        self.authenticate("signup", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        self.authenticate("token?grant_type=password", email, password).await
    }

    async fn sign_out(&self, session: &Session) -> Result<(), StoreError> {
        let result = self
            .request(Method::POST, &self.auth_url("logout"), Some(session))
            .send()
            .await;
        // The local session is dropped whether or not the server heard about it.
        self.auth_state.send_replace(None);
        let response = result.map_err(Self::transport)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Self::auth_error(status, &body))
        }
    }

    fn current_session(&self) -> Option<Session> {
        self.auth_state.borrow().clone()
    }

    fn subscribe_auth(&self) -> watch::Receiver<Option<Session>> {
        self.auth_state.subscribe()
    }
}

#[async_trait]
impl RemoteStore for SupabaseClient {
    async fn list_folders(&self, session: &Session) -> Result<Vec<Folder>, StoreError> {
        let request = self
            .request(Method::GET, &self.rest_url(Relation::Folders), Some(session))
            .query(&[
                ("select", "*".to_string()),
                ("owner_id", format!("eq.{}", session.user_id)),
                ("order", "created_at.asc".to_string()),
            ]);
        self.send_rest(request).await
    }

    async fn list_bookmarks(&self, session: &Session) -> Result<Vec<Bookmark>, StoreError> {
        let request = self
            .request(Method::GET, &self.rest_url(Relation::Bookmarks), Some(session))
            .query(&[
                ("select", "*".to_string()),
                ("owner_id", format!("eq.{}", session.user_id)),
                ("order", "created_at.asc".to_string()),
            ]);
        self.send_rest(request).await
    }

    async fn create_folder(&self, session: &Session, folder: &NewFolder) -> Result<Folder, StoreError> {
        let request = self
            .request(Method::POST, &self.rest_url(Relation::Folders), Some(session))
            .json(&json!({
                "owner_id": session.user_id,
                "name": folder.name.trim(),
                "is_default": folder.is_default,
            }));
        self.single(request, "created folder").await
    }

    async fn update_folder(&self, session: &Session, id: &str, patch: &FolderPatch) -> Result<Folder, StoreError> {
        let request = self
            .request(Method::PATCH, &self.rest_url(Relation::Folders), Some(session))
            .query(&Self::by_id(id))
            .json(patch);
        self.single(request, &format!("folder {}", id)).await
    }

    async fn delete_folder(&self, session: &Session, id: &str) -> Result<(), StoreError> {
        let request = self
            .request(Method::DELETE, &self.rest_url(Relation::Folders), Some(session))
            .query(&Self::by_id(id));
        let _: Folder = self.single(request, &format!("folder {}", id)).await?;
        Ok(())
    }

    async fn create_bookmark(&self, session: &Session, bookmark: &NewBookmark) -> Result<Bookmark, StoreError> {
        let request = self
            .request(Method::POST, &self.rest_url(Relation::Bookmarks), Some(session))
            .json(&json!({
                "owner_id": session.user_id,
                "folder_id": bookmark.folder_id,
                "url": bookmark.url,
                "title": bookmark.title,
                "description": bookmark.description,
                "thumbnail": bookmark.thumbnail,
                "tags": bookmark.tags,
                "is_private": bookmark.is_private,
            }));
        self.single(request, "created bookmark").await
    }

    async fn update_bookmark(&self, session: &Session, id: &str, patch: &BookmarkPatch) -> Result<Bookmark, StoreError> {
        let request = self
            .request(Method::PATCH, &self.rest_url(Relation::Bookmarks), Some(session))
            .query(&Self::by_id(id))
            .json(patch);
        self.single(request, &format!("bookmark {}", id)).await
    }

    async fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), StoreError> {
        let request = self
            .request(Method::DELETE, &self.rest_url(Relation::Bookmarks), Some(session))
            .query(&Self::by_id(id));
        let _: Bookmark = self.single(request, &format!("bookmark {}", id)).await?;
        Ok(())
    }

    async fn find_by_share_id(&self, share_id: &str) -> Result<Bookmark, StoreError> {
        let request = self
            .request(Method::GET, &self.rest_url(Relation::Bookmarks), None)
            .query(&[
                ("select", "*".to_string()),
                ("share_id", format!("eq.{}", share_id)),
                ("limit", "1".to_string()),
            ]);
        let mut rows: Vec<Bookmark> = self.send_rest(request).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound("shared bookmark".to_string()));
        }
        Ok(rows.swap_remove(0))
    }

    fn subscribe(&self, _session: &Session, _relation: Relation) -> Option<ChangeSubscription> {
        None
    }
}
