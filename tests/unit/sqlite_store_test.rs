//! Unit tests for the embedded SQLite backend: auth, owner isolation and the
//! constraints that back the bookmark invariants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Duration;
use rstest::rstest;
use tempfile::TempDir;

use linkshelf::remote::sqlite_store::SqliteStore;
use linkshelf::remote::{AuthClient, RemoteStore, BOOKMARK_URL_KEY, DEFAULT_FOLDER_KEY, SHARE_ID_KEY};
use linkshelf::types::bookmark::{BookmarkPatch, FolderPatch, NewBookmark, NewFolder};
use linkshelf::types::change::{ChangeKind, Relation};
use linkshelf::types::errors::StoreError;
use linkshelf::types::session::Session;

async fn setup() -> (SqliteStore, Session) {
    let store = SqliteStore::open_in_memory().expect("open store");
    let session = store.sign_up("owner@example.com", "secret-pass").await.expect("sign up");
    (store, session)
}

fn new_bookmark(url: &str) -> NewBookmark {
    NewBookmark {
        url: url.to_string(),
        title: url.to_string(),
        ..NewBookmark::default()
    }
}

fn folder(name: &str, is_default: bool) -> NewFolder {
    NewFolder {
        name: name.to_string(),
        is_default,
    }
}

// ─── Auth ───

#[tokio::test]
async fn test_sign_up_then_sign_in() {
    let (store, first) = setup().await;
    let second = store.sign_in("Owner@Example.com ", "secret-pass").await.unwrap();
    assert_eq!(first.user_id, second.user_id);
    assert_ne!(first.access_token, second.access_token);
    assert_eq!(store.current_session().unwrap().access_token, second.access_token);
}

#[rstest]
#[case("owner@example.com", "wrong-pass")]
#[case("nobody@example.com", "secret-pass")]
#[tokio::test]
async fn test_bad_credentials_are_rejected(#[case] email: &str, #[case] password: &str) {
    let (store, _) = setup().await;
    let err = store.sign_in(email, password).await.unwrap_err();
    match err {
        StoreError::Auth(msg) => assert_eq!(msg, "Invalid login credentials"),
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_sign_up_and_short_password() {
    let (store, _) = setup().await;
    assert!(matches!(
        store.sign_up("owner@example.com", "another-pass").await,
        Err(StoreError::Auth(_))
    ));
    assert!(matches!(store.sign_up("new@example.com", "123").await, Err(StoreError::Auth(_))));
    assert!(matches!(store.sign_up("not-an-email", "secret-pass").await, Err(StoreError::Auth(_))));
}

#[tokio::test]
async fn test_signed_out_token_is_rejected() {
    let (store, session) = setup().await;
    store.sign_out(&session).await.unwrap();
    assert!(store.current_session().is_none());
    assert!(matches!(store.list_folders(&session).await, Err(StoreError::Auth(_))));
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let store = SqliteStore::open_in_memory().unwrap().with_session_ttl(Duration::milliseconds(-1));
    let session = store.sign_up("late@example.com", "secret-pass").await.unwrap();
    assert!(session.is_expired());
    assert!(matches!(store.list_bookmarks(&session).await, Err(StoreError::Auth(_))));
}

#[tokio::test]
async fn test_forged_user_id_is_rejected() {
    let (store, session) = setup().await;
    let forged = Session {
        user_id: "someone-else".to_string(),
        ..session
    };
    assert!(matches!(store.list_folders(&forged).await, Err(StoreError::Auth(_))));
}

#[tokio::test]
async fn test_auth_state_is_broadcast() {
    let (store, session) = setup().await;
    let rx = store.subscribe_auth();
    assert_eq!(rx.borrow().as_ref().map(|s| s.user_id.clone()), Some(session.user_id.clone()));
    store.sign_out(&session).await.unwrap();
    assert!(rx.borrow().is_none());
}

// ─── Owner isolation ───

#[tokio::test]
async fn test_owners_only_see_their_rows() {
    let (store, alice) = setup().await;
    let bob = store.sign_up("bob@example.com", "secret-pass").await.unwrap();

    let mine = store.create_bookmark(&alice, &new_bookmark("https://a.example/")).await.unwrap();
    store.create_bookmark(&bob, &new_bookmark("https://a.example/")).await.unwrap();

    assert_eq!(store.list_bookmarks(&alice).await.unwrap().len(), 1);
    assert_eq!(store.list_bookmarks(&bob).await.unwrap().len(), 1);
    assert!(matches!(
        store.delete_bookmark(&bob, &mine.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_bookmark_cannot_reference_foreign_folder() {
    let (store, alice) = setup().await;
    let bob = store.sign_up("bob@example.com", "secret-pass").await.unwrap();
    let bobs = store.create_folder(&bob, &folder("Bob's", false)).await.unwrap();

    let draft = NewBookmark {
        folder_id: Some(bobs.id),
        ..new_bookmark("https://a.example/")
    };
    assert!(matches!(
        store.create_bookmark(&alice, &draft).await,
        Err(StoreError::ForeignKey(_))
    ));
}

// ─── Constraints ───

#[tokio::test]
async fn test_same_url_twice_is_unique_violation() {
    let (store, session) = setup().await;
    store.create_bookmark(&session, &new_bookmark("https://a.example/")).await.unwrap();
    match store.create_bookmark(&session, &new_bookmark("https://a.example/")).await {
        Err(StoreError::UniqueViolation { constraint }) => assert_eq!(constraint, BOOKMARK_URL_KEY),
        other => panic!("expected unique violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_default_folder_is_rejected() {
    let (store, session) = setup().await;
    store.create_folder(&session, &folder("All Bookmarks", true)).await.unwrap();
    match store.create_folder(&session, &folder("Another", true)).await {
        Err(StoreError::UniqueViolation { constraint }) => assert_eq!(constraint, DEFAULT_FOLDER_KEY),
        other => panic!("expected unique violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_default_folder_cannot_be_deleted() {
    let (store, session) = setup().await;
    let default = store.create_folder(&session, &folder("All Bookmarks", true)).await.unwrap();
    assert!(matches!(
        store.delete_folder(&session, &default.id).await,
        Err(StoreError::Rejected(_))
    ));
    assert_eq!(store.list_folders(&session).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_folder_delete_nulls_references() {
    let (store, session) = setup().await;
    let reading = store.create_folder(&session, &folder("Reading", false)).await.unwrap();
    for url in ["https://a.example/", "https://b.example/"] {
        let draft = NewBookmark {
            folder_id: Some(reading.id.clone()),
            ..new_bookmark(url)
        };
        store.create_bookmark(&session, &draft).await.unwrap();
    }

    let mut feed = store.subscribe(&session, Relation::Bookmarks).unwrap();
    store.delete_folder(&session, &reading.id).await.unwrap();

    let bookmarks = store.list_bookmarks(&session).await.unwrap();
    assert_eq!(bookmarks.len(), 2);
    assert!(bookmarks.iter().all(|b| b.folder_id.is_none()));

    for _ in 0..2 {
        let event = feed.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Updated);
    }
}

#[tokio::test]
async fn test_blank_folder_name_is_rejected() {
    let (store, session) = setup().await;
    assert!(matches!(
        store.create_folder(&session, &folder("  ", false)).await,
        Err(StoreError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_update_folder_refreshes_updated_at() {
    let (store, session) = setup().await;
    let created = store.create_folder(&session, &folder("Reading", false)).await.unwrap();
    let renamed = store
        .update_folder(&session, &created.id, &FolderPatch { name: Some("Later".to_string()) })
        .await
        .unwrap();
    assert_eq!(renamed.name, "Later");
    assert_eq!(renamed.created_at, created.created_at);
    assert!(renamed.updated_at >= created.updated_at);
}

#[tokio::test]
async fn test_updated_at_strictly_increases() {
    let (store, session) = setup().await;
    let bookmark = store.create_bookmark(&session, &new_bookmark("https://a.example/")).await.unwrap();
    let mut last = bookmark.updated_at;
    for title in ["one", "two", "three"] {
        let patch = BookmarkPatch {
            title: Some(title.to_string()),
            ..BookmarkPatch::default()
        };
        let next = store.update_bookmark(&session, &bookmark.id, &patch).await.unwrap();
        assert!(next.updated_at > last);
        last = next.updated_at;
    }
}

// ─── Runtime ───

#[tokio::test]
async fn test_store_calls_leave_the_runtime_free() {
    let store = SqliteStore::open_in_memory().unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    let session = store.sign_up("owner@example.com", "secret-pass").await.unwrap();
    store.sign_in("owner@example.com", "secret-pass").await.unwrap();
    store.list_bookmarks(&session).await.unwrap();
    ticker.abort();

    assert!(ticks.load(Ordering::Relaxed) > 0, "other tasks should run while hashing");
}

// ─── Share tokens ───

#[tokio::test]
async fn test_share_id_is_immutable_once_set() {
    let (store, session) = setup().await;
    let bookmark = store.create_bookmark(&session, &new_bookmark("https://a.example/")).await.unwrap();

    let shared = store
        .update_bookmark(&session, &bookmark.id, &BookmarkPatch::share("token-one"))
        .await
        .unwrap();
    assert_eq!(shared.share_id.as_deref(), Some("token-one"));

    assert!(matches!(
        store.update_bookmark(&session, &bookmark.id, &BookmarkPatch::share("token-two")).await,
        Err(StoreError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_share_id_is_globally_unique() {
    let (store, alice) = setup().await;
    let bob = store.sign_up("bob@example.com", "secret-pass").await.unwrap();
    let a = store.create_bookmark(&alice, &new_bookmark("https://a.example/")).await.unwrap();
    let b = store.create_bookmark(&bob, &new_bookmark("https://b.example/")).await.unwrap();

    store.update_bookmark(&alice, &a.id, &BookmarkPatch::share("same")).await.unwrap();
    match store.update_bookmark(&bob, &b.id, &BookmarkPatch::share("same")).await {
        Err(StoreError::UniqueViolation { constraint }) => assert_eq!(constraint, SHARE_ID_KEY),
        other => panic!("expected unique violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_find_by_share_id_needs_no_session() {
    let (store, session) = setup().await;
    let bookmark = store.create_bookmark(&session, &new_bookmark("https://a.example/")).await.unwrap();
    store.update_bookmark(&session, &bookmark.id, &BookmarkPatch::share("public")).await.unwrap();
    store.sign_out(&session).await.unwrap();

    assert_eq!(store.find_by_share_id("public").await.unwrap().id, bookmark.id);
    assert!(matches!(store.find_by_share_id("unknown").await, Err(StoreError::NotFound(_))));
}

// ─── Persistence ───

#[tokio::test]
async fn test_data_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("linkshelf.db");
    {
        let store = SqliteStore::open(&path).unwrap();
        let session = store.sign_up("owner@example.com", "secret-pass").await.unwrap();
        store.create_bookmark(&session, &new_bookmark("https://a.example/")).await.unwrap();
    }
    let store = SqliteStore::open(&path).unwrap();
    let session = store.sign_in("owner@example.com", "secret-pass").await.unwrap();
    assert_eq!(store.list_bookmarks(&session).await.unwrap().len(), 1);
}
