//! Unit tests for the RPC handler: every JSON-RPC method dispatched by
//! `handle_method`, through the same code path the `linkshelf-rpc` binary uses,
//! with an in-memory local store.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;

use linkshelf::app::App;
use linkshelf::remote::sqlite_store::SqliteStore;
use linkshelf::rpc_handler::handle_method;
use linkshelf::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// A fresh App over an in-memory store, metadata prefetch off.
fn setup() -> (Mutex<App>, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let path = tmp.path().join("config.json").to_string_lossy().to_string();
    let mut engine = SettingsEngine::new(Some(path));
    engine.load().unwrap();
    engine.set_value("metadata.enabled", json!(false)).unwrap();
    engine.set_value("sharing.base_url", json!("https://links.example.com/")).unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let app = App::with_backend(engine, store.clone(), store);
    (Mutex::new(app), tmp)
}

async fn call(app: &Mutex<App>, method: &str, params: Value) -> Value {
    match handle_method(app, method, &params).await {
        Ok(v) => v,
        Err(e) => panic!("{} failed: {:?}", method, e),
    }
}

async fn call_err(app: &Mutex<App>, method: &str, params: Value) -> String {
    handle_method(app, method, &params).await.unwrap_err().kind
}

async fn signed_in() -> (Mutex<App>, TempDir) {
    let (app, tmp) = setup();
    call(&app, "auth.sign_up", json!({"email": "me@example.com", "password": "hunter22"})).await;
    (app, tmp)
}

// ─── Basics ───

#[tokio::test]
async fn test_ping() {
    let (app, _tmp) = setup();
    let res = call(&app, "ping", json!({})).await;
    assert_eq!(res["pong"], true);
    assert_eq!(res["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_method_returns_error() {
    let (app, _tmp) = setup();
    assert_eq!(call_err(&app, "nonexistent.method", json!({})).await, "unknown_method");
}

#[tokio::test]
async fn test_missing_param_is_invalid_params() {
    let (app, _tmp) = signed_in().await;
    assert_eq!(call_err(&app, "folder.create", json!({})).await, "invalid_params");
    assert_eq!(call_err(&app, "bookmark.add", json!({"title": "no url"})).await, "invalid_params");
}

#[tokio::test]
async fn test_url_normalize() {
    let (app, _tmp) = setup();
    let res = call(&app, "url.normalize", json!({"url": " example.com/path "})).await;
    assert_eq!(res["url"], "https://example.com/path");
    assert_eq!(call_err(&app, "url.normalize", json!({"url": "ftp://example.com"})).await, "invalid_url");
}

// ─── Auth ───

#[tokio::test]
async fn test_sign_up_creates_default_folder() {
    let (app, _tmp) = signed_in().await;
    let session = call(&app, "auth.session", json!({})).await;
    assert_eq!(session["email"], "me@example.com");
    assert!(session.get("access_token").is_none());

    let folders = call(&app, "folder.list", json!({})).await;
    let folders = folders.as_array().unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0]["name"], "All Bookmarks");
    assert_eq!(folders[0]["is_default"], true);
}

#[tokio::test]
async fn test_repeated_sign_in_keeps_one_default_folder() {
    let (app, _tmp) = signed_in().await;
    call(&app, "auth.sign_out", json!({})).await;
    call(&app, "auth.sign_in", json!({"email": "me@example.com", "password": "hunter22"})).await;
    call(&app, "auth.sign_in", json!({"email": "me@example.com", "password": "hunter22"})).await;

    let folders = call(&app, "folder.list", json!({})).await;
    let defaults = folders.as_array().unwrap().iter().filter(|f| f["is_default"] == true).count();
    assert_eq!(defaults, 1);
}

#[tokio::test]
async fn test_signed_out_calls_are_auth_errors() {
    let (app, _tmp) = setup();
    assert_eq!(call(&app, "auth.session", json!({})).await, Value::Null);
    assert_eq!(call_err(&app, "bookmark.list", json!({})).await, "auth");
    assert_eq!(call_err(&app, "folder.create", json!({"name": "x"})).await, "auth");
    assert_eq!(call_err(&app, "mirror.reload", json!({})).await, "auth");
}

#[tokio::test]
async fn test_sign_out_clears_mirror() {
    let (app, _tmp) = signed_in().await;
    call(&app, "bookmark.add", json!({"url": "example.com"})).await;
    call(&app, "auth.sign_out", json!({})).await;

    let a = app.lock().await;
    assert!(a.mirror.bookmarks().is_empty());
    assert_eq!(a.listener_count(), 0);
}

#[tokio::test]
async fn test_bad_password_is_auth_error() {
    let (app, _tmp) = signed_in().await;
    call(&app, "auth.sign_out", json!({})).await;
    let kind = call_err(&app, "auth.sign_in", json!({"email": "me@example.com", "password": "nope-nope"})).await;
    assert_eq!(kind, "auth");
}

// ─── Folders ───

#[tokio::test]
async fn test_folder_lifecycle() {
    let (app, _tmp) = signed_in().await;
    let folder = call(&app, "folder.create", json!({"name": "Reading"})).await;
    let id = folder["id"].as_str().unwrap().to_string();

    let renamed = call(&app, "folder.rename", json!({"id": id, "name": "Later"})).await;
    assert_eq!(renamed["name"], "Later");

    call(&app, "folder.delete", json!({"id": id})).await;
    assert_eq!(call(&app, "folder.list", json!({})).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_default_folder_delete_is_refused() {
    let (app, _tmp) = signed_in().await;
    let folders = call(&app, "folder.list", json!({})).await;
    let id = folders[0]["id"].clone();
    assert_eq!(
        call_err(&app, "folder.delete", json!({"id": id})).await,
        "default_folder_protected"
    );
}

// ─── Bookmarks ───

#[tokio::test]
async fn test_bookmark_add_list_and_filter() {
    let (app, _tmp) = signed_in().await;
    let reading = call(&app, "folder.create", json!({"name": "Reading"})).await;

    call(&app, "bookmark.add", json!({
        "url": "https://github.com",
        "title": "GitHub",
        "tags": ["code", "Code", "git"],
        "folder_id": reading["id"],
    }))
    .await;
    call(&app, "bookmark.add", json!({"url": "example.com", "title": "Example"})).await;

    let all = call(&app, "bookmark.list", json!({})).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["title"], "Example");
    assert_eq!(all[1]["tags"], json!(["code", "git"]));

    let in_folder = call(&app, "bookmark.list", json!({"folder_id": reading["id"]})).await;
    assert_eq!(in_folder.as_array().unwrap().len(), 1);

    let searched = call(&app, "bookmark.list", json!({"query": "GIT"})).await;
    assert_eq!(searched.as_array().unwrap().len(), 1);
    assert_eq!(searched[0]["url"], "https://github.com/");

    let default_id = call(&app, "folder.list", json!({})).await[0]["id"].clone();
    let via_default = call(&app, "bookmark.list", json!({"folder_id": default_id})).await;
    assert_eq!(via_default.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_duplicate_bookmark() {
    let (app, _tmp) = signed_in().await;
    call(&app, "bookmark.add", json!({"url": "https://github.com"})).await;
    let err = handle_method(&app, "bookmark.add", &json!({"url": "github.com"})).await.unwrap_err();
    assert_eq!(err.kind, "duplicate_bookmark");
    assert_eq!(err.message, "A bookmark for https://github.com/ already exists");
}

#[tokio::test]
async fn test_bookmark_update_and_delete() {
    let (app, _tmp) = signed_in().await;
    let added = call(&app, "bookmark.add", json!({"url": "example.com", "description": "old"})).await;
    let id = added["id"].clone();

    let updated = call(&app, "bookmark.update", json!({
        "id": id,
        "changes": {"title": "New title", "description": null, "is_private": true},
    }))
    .await;
    assert_eq!(updated["title"], "New title");
    assert_eq!(updated["description"], Value::Null);
    assert_eq!(updated["is_private"], true);

    assert_eq!(
        call_err(&app, "bookmark.update", json!({"id": id, "changes": {"share_id": "mine"}})).await,
        "invalid_params"
    );

    call(&app, "bookmark.delete", json!({"id": id})).await;
    assert!(call(&app, "bookmark.list", json!({})).await.as_array().unwrap().is_empty());
    assert_eq!(call_err(&app, "bookmark.delete", json!({"id": id})).await, "not_found");
}

// ─── Sharing ───

#[tokio::test]
async fn test_share_and_open() {
    let (app, _tmp) = signed_in().await;
    let added = call(&app, "bookmark.add", json!({"url": "example.com", "title": "Example"})).await;

    let first = call(&app, "bookmark.share", json!({"id": added["id"]})).await;
    let second = call(&app, "bookmark.share", json!({"id": added["id"]})).await;
    assert_eq!(first["share_id"], second["share_id"]);
    let token = first["share_id"].as_str().unwrap();
    assert_eq!(first["url"], format!("https://links.example.com/share/{}", token));

    call(&app, "auth.sign_out", json!({})).await;
    let opened = call(&app, "share.open", json!({"token": token})).await;
    assert_eq!(opened["state"], "found");
    assert_eq!(opened["bookmark"]["title"], "Example");

    let missing = call(&app, "share.open", json!({"token": "nope"})).await;
    assert_eq!(missing, json!({"state": "invalid"}));
}

// ─── Helpers ───

#[tokio::test]
async fn test_tags_suggest() {
    let (app, _tmp) = signed_in().await;
    call(&app, "bookmark.add", json!({"url": "a.example", "tags": ["rust", "web"]})).await;
    call(&app, "bookmark.add", json!({"url": "b.example", "tags": ["rust", "rustacean"]})).await;

    let res = call(&app, "tags.suggest", json!({"partial": "ru"})).await;
    assert_eq!(res, json!(["rust", "rustacean"]));
    let limited = call(&app, "tags.suggest", json!({"partial": "", "limit": 1})).await;
    assert_eq!(limited, json!(["rust"]));
}

#[tokio::test]
async fn test_metadata_fetch_disabled_is_unavailable() {
    let (app, _tmp) = signed_in().await;
    assert_eq!(call_err(&app, "metadata.fetch", json!({"url": "example.com"})).await, "unavailable");
    assert_eq!(call_err(&app, "metadata.fetch", json!({"url": "mailto:me@x.y"})).await, "invalid_url");
}

#[tokio::test]
async fn test_mirror_reload_reports_counts() {
    let (app, _tmp) = signed_in().await;
    call(&app, "bookmark.add", json!({"url": "a.example"})).await;
    let res = call(&app, "mirror.reload", json!({})).await;
    assert_eq!(res, json!({"folders": 1, "bookmarks": 1}));
}
