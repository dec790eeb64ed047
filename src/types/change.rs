use serde::{Deserialize, Serialize};

use super::bookmark::{Bookmark, Folder};

/// The two relations a store exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Folders,
    Bookmarks,
}

impl Relation {
    /// Table name used by both backends.
    pub fn table(&self) -> &'static str {
        match self {
            Relation::Folders => "folders",
            Relation::Bookmarks => "bookmarks",
        }
    }
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// The record carried by a change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "relation", content = "record", rename_all = "lowercase")]
pub enum ChangeRecord {
    Folder(Folder),
    Bookmark(Bookmark),
}

impl ChangeRecord {
    pub fn id(&self) -> &str {
        match self {
            ChangeRecord::Folder(f) => &f.id,
            ChangeRecord::Bookmark(b) => &b.id,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            ChangeRecord::Folder(f) => &f.owner_id,
            ChangeRecord::Bookmark(b) => &b.owner_id,
        }
    }

    pub fn relation(&self) -> Relation {
        match self {
            ChangeRecord::Folder(_) => Relation::Folders,
            ChangeRecord::Bookmark(_) => Relation::Bookmarks,
        }
    }
}

/// A push notification from a store subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: ChangeRecord,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, record: ChangeRecord) -> Self {
        Self { kind, record }
    }
}
