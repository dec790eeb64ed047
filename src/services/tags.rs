//! Tag set hygiene and suggestions.

use std::collections::{HashMap, HashSet};

use crate::types::bookmark::Bookmark;

/// Trims tags, drops empty ones and removes case-insensitive duplicates,
/// keeping the first spelling and the original order.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Suggests existing tags containing `partial`, most used first.
///
/// A tag equal to `partial` (ignoring case) is not suggested back. An empty
/// `partial` suggests the most used tags overall.
pub fn suggest_tags(bookmarks: &[Bookmark], partial: &str, limit: usize) -> Vec<String> {
    let needle = partial.trim().to_lowercase();
    // lowercase -> (display spelling, uses)
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for tag in bookmarks.iter().flat_map(|b| b.tags.iter()) {
        let key = tag.to_lowercase();
        counts
            .entry(key)
            .and_modify(|(_, n)| *n += 1)
            .or_insert_with(|| (tag.clone(), 1));
    }

    let mut candidates: Vec<(String, String, usize)> = counts
        .into_iter()
        .filter(|(key, _)| key.contains(&needle) && *key != needle)
        .map(|(key, (display, n))| (key, display, n))
        .collect();
    candidates.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    candidates
        .into_iter()
        .take(limit)
        .map(|(_, display, _)| display)
        .collect()
}
