//! App Core for Linkshelf.
//!
//! Central struct wiring settings, the selected backend, the session and the
//! local mirror together, and owning the sign-in/sign-out lifecycle.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::managers::mirror::{spawn_change_listener, LocalMirror};
use crate::managers::session_manager::{SessionManager, SessionManagerTrait};
use crate::remote::sqlite_store::SqliteStore;
use crate::remote::{AuthClientRef, RemoteStoreRef};
use crate::services::page_metadata::MetadataFetcher;
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::share_service::ShareService;
use crate::types::change::Relation;
use crate::types::errors::SyncError;
use crate::types::session::Session;
use crate::types::settings::{BackendKind, Settings};

/// Central application struct.
pub struct App {
    pub settings_engine: SettingsEngine,
    pub store: RemoteStoreRef,
    pub sessions: SessionManager,
    pub mirror: Arc<LocalMirror>,
    pub share: ShareService,
    pub metadata: Option<MetadataFetcher>,
    listeners: Vec<JoinHandle<()>>,
}

impl App {
    /// Loads `config.json`, applies environment overrides and opens the
    /// configured backend.
    pub fn from_env(config_path: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings_engine = SettingsEngine::new(config_path);
        settings_engine.load()?;
        settings_engine.apply_env_overrides()?;
        Self::new(settings_engine)
    }

    /// Opens the backend named by the engine's current settings.
    pub fn new(settings_engine: SettingsEngine) -> Result<Self, Box<dyn std::error::Error>> {
        let (store, auth) = Self::open_backend(&settings_engine)?;
        Ok(Self::with_backend(settings_engine, store, auth))
    }

    /// Wires an already-built backend. Tests use this with the local store.
    pub fn with_backend(settings_engine: SettingsEngine, store: RemoteStoreRef, auth: AuthClientRef) -> Self {
        let settings = settings_engine.get_settings().clone();
        let metadata = if settings.metadata.enabled {
            match MetadataFetcher::new(&settings.metadata) {
                Ok(fetcher) => Some(fetcher),
                Err(e) => {
                    warn!(error = %e, "metadata prefetch disabled");
                    None
                }
            }
        } else {
            None
        };

        Self {
            mirror: Arc::new(LocalMirror::new(store.clone())),
            sessions: SessionManager::new(auth),
            share: ShareService::new(&settings.sharing.base_url),
            store,
            metadata,
            settings_engine,
            listeners: Vec::new(),
        }
    }

    fn open_backend(engine: &SettingsEngine) -> Result<(RemoteStoreRef, AuthClientRef), Box<dyn std::error::Error>> {
        let settings: &Settings = engine.get_settings();
        match settings.backend.kind {
            BackendKind::Local => {
                let path = engine.database_path();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let store = SqliteStore::open(&path)?
                    .with_session_ttl(chrono::Duration::hours(settings.backend.session_ttl_hours));
                info!(path = %path.display(), "opened local store");
                let store = Arc::new(store);
                Ok((store.clone(), store))
            }
            #[cfg(feature = "hosted")]
            BackendKind::Supabase => {
                let url = settings
                    .backend
                    .supabase_url
                    .as_deref()
                    .ok_or("backend.supabase_url is required for the supabase backend")?;
                let key = settings
                    .backend
                    .supabase_anon_key
                    .as_deref()
                    .ok_or("backend.supabase_anon_key is required for the supabase backend")?;
                let client = crate::remote::supabase::SupabaseClient::new(
                    url,
                    key,
                    std::time::Duration::from_secs(settings.backend.request_timeout_secs),
                )?;
                info!(%url, "using hosted store");
                let client = Arc::new(client);
                Ok((client.clone(), client))
            }
            #[cfg(not(feature = "hosted"))]
            BackendKind::Supabase => Err("this build does not include the hosted backend".into()),
        }
    }

    // ─── Lifecycle ───

    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<Session, SyncError> {
        let session = self.sessions.sign_up(email, password).await?;
        self.start_session(&session).await?;
        Ok(session)
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, SyncError> {
        let session = self.sessions.sign_in(email, password).await?;
        self.start_session(&session).await?;
        Ok(session)
    }

    /// Always leaves the app signed out locally, even if the store call fails.
    pub async fn sign_out(&mut self) -> Result<(), SyncError> {
        self.stop_listeners();
        let result = self.sessions.sign_out().await;
        self.mirror.clear();
        result
    }

    /// Reloads the mirror from the store, e.g. after a failed load.
    pub async fn reload(&mut self) -> Result<(), SyncError> {
        let session = self.sessions.require()?;
        self.start_session(&session).await
    }

    async fn start_session(&mut self, session: &Session) -> Result<(), SyncError> {
        self.stop_listeners();
        self.mirror.load(session).await?;
        self.mirror.ensure_default_folder(session).await?;
        for relation in [Relation::Folders, Relation::Bookmarks] {
            if let Some(subscription) = self.store.subscribe(session, relation) {
                self.listeners.push(spawn_change_listener(self.mirror.clone(), subscription));
            }
        }
        info!(
            user_id = %session.user_id,
            folders = self.mirror.folders().len(),
            bookmarks = self.mirror.bookmarks().len(),
            live = !self.listeners.is_empty(),
            "mirror ready"
        );
        Ok(())
    }

    fn stop_listeners(&mut self) {
        for handle in self.listeners.drain(..) {
            handle.abort();
        }
    }

    /// Number of live change listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop_listeners();
    }
}
