//! Integration-level unit tests for the SettingsEngine public API.
//!
//! Exercises default loading, dot-path updates persisted to disk, reset and
//! environment overrides.

use std::fs;

use linkshelf::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use linkshelf::types::errors::SettingsError;
use linkshelf::types::settings::{BackendKind, Settings};
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

/// The caller holds the `TempDir` so the file outlives the engine.
fn engine_in_temp(dir: &TempDir) -> SettingsEngine {
    let path = dir.path().join("config.json").to_string_lossy().to_string();
    SettingsEngine::new(Some(path))
}

#[test]
fn test_load_defaults_when_no_config_file_exists() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    let settings = engine.load().unwrap();

    assert_eq!(settings, Settings::default());
    assert_eq!(settings.backend.kind, BackendKind::Local);
    assert_eq!(settings.backend.request_timeout_secs, 15);
    assert_eq!(settings.sharing.base_url, "http://localhost:5173");
    assert!(settings.metadata.enabled);
    assert!(settings.metadata.user_agent.starts_with("linkshelf/"));
}

#[test]
fn test_set_value_persists_changes() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();

    engine.set_value("backend.kind", json!("supabase")).unwrap();
    engine.set_value("sharing.base_url", json!("https://links.example.com")).unwrap();
    engine.set_value("metadata.timeout_secs", json!(3)).unwrap();

    let mut reloaded = engine_in_temp(&dir);
    let settings = reloaded.load().unwrap();
    assert_eq!(settings.backend.kind, BackendKind::Supabase);
    assert_eq!(settings.sharing.base_url, "https://links.example.com");
    assert_eq!(settings.metadata.timeout_secs, 3);
}

#[rstest]
#[case("", json!(true))]
#[case("nonexistent.key", json!(true))]
#[case("backend.kind.deeper", json!("local"))]
fn test_set_value_invalid_key(#[case] key: &str, #[case] value: serde_json::Value) {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    assert!(matches!(engine.set_value(key, value), Err(SettingsError::InvalidKey(_))));
}

#[rstest]
#[case("backend.kind", json!("mysql"))]
#[case("metadata.enabled", json!("yes"))]
#[case("backend.request_timeout_secs", json!(-5))]
fn test_set_value_invalid_value(#[case] key: &str, #[case] value: serde_json::Value) {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    assert!(matches!(engine.set_value(key, value), Err(SettingsError::InvalidValue(_))));
    assert_eq!(*engine.get_settings(), Settings::default());
}

#[test]
fn test_reset_restores_defaults() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    engine.set_value("metadata.enabled", json!(false)).unwrap();

    engine.reset().unwrap();
    assert_eq!(*engine.get_settings(), Settings::default());

    let mut reloaded = engine_in_temp(&dir);
    assert_eq!(reloaded.load().unwrap(), Settings::default());
}

#[test]
fn test_partial_config_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.json"), r#"{"sharing":{"base_url":"https://s.example"}}"#).unwrap();
    let mut engine = engine_in_temp(&dir);
    let settings = engine.load().unwrap();
    assert_eq!(settings.sharing.base_url, "https://s.example");
    assert_eq!(settings.backend, Settings::default().backend);
}

#[test]
fn test_load_malformed_json() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.json"), "{ invalid json }").unwrap();
    let mut engine = engine_in_temp(&dir);
    assert!(matches!(engine.load(), Err(SettingsError::SerializationError(_))));
}

#[test]
fn test_overrides_do_not_touch_the_file_until_saved() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    engine
        .apply_overrides_from(|k| (k == "LINKSHELF_SHARE_BASE_URL").then(|| "https://env.example".to_string()))
        .unwrap();
    assert_eq!(engine.get_settings().sharing.base_url, "https://env.example");
    assert!(!dir.path().join("config.json").exists());
}

#[test]
fn test_database_path_follows_sqlite_path() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    let db = dir.path().join("store.db").to_string_lossy().to_string();
    engine.set_value("backend.sqlite_path", json!(db.clone())).unwrap();
    assert_eq!(engine.database_path().to_string_lossy(), db);
}
