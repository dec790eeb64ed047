//! Filter/search evaluator: the visible subset of the mirrored bookmarks.

use crate::types::bookmark::{Bookmark, Folder};

/// Which folder the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderFilter {
    /// The default "all bookmarks" view: no folder filtering.
    All,
    Folder(String),
}

impl FolderFilter {
    /// Maps a UI selection onto a filter. Selecting nothing or the default
    /// folder shows everything.
    pub fn for_selection(selected: Option<&str>, folders: &[Folder]) -> Self {
        match selected {
            None => FolderFilter::All,
            Some(id) if folders.iter().any(|f| f.id == id && f.is_default) => FolderFilter::All,
            Some(id) => FolderFilter::Folder(id.to_string()),
        }
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// True when the lowercase `needle` occurs in the title, description, URL or a tag.
pub fn matches_query(bookmark: &Bookmark, needle: &str) -> bool {
    contains(&bookmark.title, needle)
        || bookmark.description.as_deref().map(|d| contains(d, needle)).unwrap_or(false)
        || contains(&bookmark.url, needle)
        || bookmark.tags.iter().any(|t| contains(t, needle))
}

/// Computes the visible bookmarks. Pure: the result depends only on the
/// arguments and keeps the input order.
pub fn filter_bookmarks(bookmarks: &[Bookmark], folder: &FolderFilter, query: &str) -> Vec<Bookmark> {
    // A blank query matches everything; otherwise the query is used as typed.
    let needle = (!query.trim().is_empty()).then(|| query.to_lowercase());
    bookmarks
        .iter()
        .filter(|b| match folder {
            FolderFilter::All => true,
            FolderFilter::Folder(id) => b.folder_id.as_deref() == Some(id.as_str()),
        })
        .filter(|b| needle.as_deref().map_or(true, |n| matches_query(b, n)))
        .cloned()
        .collect()
}
