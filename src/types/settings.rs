use serde::{Deserialize, Serialize};

/// Top-level application settings container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub sharing: SharingSettings,
    #[serde(default)]
    pub metadata: MetadataSettings,
}

/// Which store holds the authoritative copy of the data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Supabase,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// SQLite file for the local backend. `None` uses the platform data dir.
    pub sqlite_path: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Lifetime of sessions issued by the local backend.
    pub session_ttl_hours: i64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            sqlite_path: None,
            supabase_url: None,
            supabase_anon_key: None,
            request_timeout_secs: 15,
            session_ttl_hours: 24 * 7,
        }
    }
}

/// Public share link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharingSettings {
    /// Base URL the public shared view is served from.
    pub base_url: String,
}

impl Default for SharingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".to_string(),
        }
    }
}

/// Page metadata prefetch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataSettings {
    pub enabled: bool,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
            user_agent: format!("linkshelf/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
