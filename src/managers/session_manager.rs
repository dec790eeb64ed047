//! Session Manager for Linkshelf.
//!
//! Drives the backend's [`AuthClient`] and hands out the explicit [`Session`]
//! value every owner-scoped call needs. The backend owns the auth state
//! channel; this manager only reads and validates it.

use tokio::sync::watch;
use tracing::{info, warn};

use crate::remote::AuthClientRef;
use crate::types::errors::{StoreError, SyncError};
use crate::types::session::Session;

/// Trait defining session management operations.
#[async_trait::async_trait]
pub trait SessionManagerTrait {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, SyncError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SyncError>;
    async fn sign_out(&self) -> Result<(), SyncError>;
    fn current(&self) -> Option<Session>;
    fn require(&self) -> Result<Session, SyncError>;
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// Session manager backed by a store's auth client.
pub struct SessionManager {
    auth: AuthClientRef,
}

impl SessionManager {
    pub fn new(auth: AuthClientRef) -> Self {
        Self { auth }
    }

    fn validate_credentials(email: &str, password: &str) -> Result<(), SyncError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(SyncError::Validation("a valid email address is required".to_string()));
        }
        if password.is_empty() {
            return Err(SyncError::Validation("password is required".to_string()));
        }
        Ok(())
    }

    fn map_auth_error(err: StoreError) -> SyncError {
        match err {
            StoreError::Transport(msg) => SyncError::Unavailable(msg),
            other => SyncError::Auth(match other {
                StoreError::Auth(msg) => msg,
                other => other.to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl SessionManagerTrait for SessionManager {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, SyncError> {
        Self::validate_credentials(email, password)?;
        let session = self
            .auth
            .sign_up(email, password)
            .await
            .map_err(Self::map_auth_error)?;
        info!(user_id = %session.user_id, "signed up");
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SyncError> {
        Self::validate_credentials(email, password)?;
        let session = self
            .auth
            .sign_in(email, password)
            .await
            .map_err(Self::map_auth_error)?;
        info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    /// Signing out while signed out is a no-op.
    async fn sign_out(&self) -> Result<(), SyncError> {
        let Some(session) = self.auth.current_session() else {
            return Ok(());
        };
        if let Err(e) = self.auth.sign_out(&session).await {
            warn!(error = %e, "sign-out was not acknowledged by the store");
            return Err(Self::map_auth_error(e));
        }
        info!(user_id = %session.user_id, "signed out");
        Ok(())
    }

    fn current(&self) -> Option<Session> {
        self.auth.current_session()
    }

    /// The current session, or `Auth` when signed out or expired.
    fn require(&self) -> Result<Session, SyncError> {
        match self.auth.current_session() {
            Some(session) if session.is_expired() => {
                Err(SyncError::Auth("session expired, sign in again".to_string()))
            }
            Some(session) => Ok(session),
            None => Err(SyncError::Auth("not signed in".to_string())),
        }
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.auth.subscribe_auth()
    }
}
