//! Unit tests for the error taxonomies and the store-to-core translation.

use rstest::rstest;

use linkshelf::remote::{BOOKMARK_URL_KEY, SHARE_ID_KEY};
use linkshelf::types::errors::*;

// === SyncError ===

#[rstest]
#[case(SyncError::InvalidUrl("x".into()), "invalid_url")]
#[case(SyncError::DuplicateBookmark("x".into()), "duplicate_bookmark")]
#[case(SyncError::Auth("x".into()), "auth")]
#[case(SyncError::Load("x".into()), "load")]
#[case(SyncError::Constraint("x".into()), "constraint")]
#[case(SyncError::NotFound("x".into()), "not_found")]
#[case(SyncError::DefaultFolderProtected("x".into()), "default_folder_protected")]
#[case(SyncError::Validation("x".into()), "validation")]
#[case(SyncError::Unavailable("x".into()), "unavailable")]
fn sync_error_kinds_are_stable(#[case] err: SyncError, #[case] kind: &str) {
    assert_eq!(err.kind(), kind);
}

#[test]
fn duplicate_message_names_the_url() {
    let err = SyncError::DuplicateBookmark("https://example.com/".to_string());
    assert_eq!(err.to_string(), "A bookmark for https://example.com/ already exists");
}

#[test]
fn url_unique_violation_becomes_duplicate() {
    let err = SyncError::from_write(
        StoreError::UniqueViolation { constraint: BOOKMARK_URL_KEY.to_string() },
        Some("https://example.com/"),
    );
    match err {
        SyncError::DuplicateBookmark(url) => assert_eq!(url, "https://example.com/"),
        other => panic!("expected duplicate, got {:?}", other),
    }
}

#[test]
fn other_unique_violation_is_constraint() {
    let err = SyncError::from_write(
        StoreError::UniqueViolation { constraint: SHARE_ID_KEY.to_string() },
        None,
    );
    assert_eq!(err.kind(), "constraint");
}

#[rstest]
#[case(StoreError::Auth("expired".into()), "auth")]
#[case(StoreError::Transport("timeout".into()), "unavailable")]
#[case(StoreError::NotFound("row".into()), "not_found")]
#[case(StoreError::ForeignKey("folder".into()), "constraint")]
#[case(StoreError::Rejected("policy".into()), "constraint")]
#[case(StoreError::Database("disk".into()), "constraint")]
fn write_failures_translate(#[case] err: StoreError, #[case] kind: &str) {
    assert_eq!(SyncError::from_write(err, None).kind(), kind);
}

#[rstest]
#[case(StoreError::Auth("expired".into()))]
#[case(StoreError::Transport("timeout".into()))]
#[case(StoreError::Database("disk".into()))]
fn load_failures_are_all_load(#[case] err: StoreError) {
    assert!(matches!(SyncError::from_load(err), SyncError::Load(_)));
}

// === StoreError from rusqlite ===

#[test]
fn no_rows_is_not_found() {
    let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// === SettingsError ===

#[test]
fn settings_error_display_variants() {
    assert_eq!(
        SettingsError::IoError("disk full".to_string()).to_string(),
        "Settings I/O error: disk full"
    );
    assert_eq!(
        SettingsError::InvalidKey("a.b".to_string()).to_string(),
        "Invalid settings key: a.b"
    );
}

#[test]
fn errors_implement_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(SyncError::NotFound("id".to_string()));
    assert!(err.source().is_none());
    let err: Box<dyn std::error::Error> = Box::new(StoreError::Transport("x".to_string()));
    assert!(err.source().is_none());
}
