//! Duplicate/identity guard.
//!
//! Normalizes user-entered URLs and answers "does this owner already have it"
//! from the mirrored bookmarks. The store's uniqueness constraint stays the
//! authority; this only saves a round trip for obvious duplicates.

use url::Url;

use crate::types::bookmark::Bookmark;
use crate::types::errors::SyncError;

/// Schemes that are written without `//` and must not be mistaken for a host.
const OPAQUE_SCHEMES: &[&str] = &["javascript", "mailto", "data", "about", "file", "tel", "blob"];

/// Returns the scheme if `input` starts with one (`scheme://` or a known
/// opaque scheme such as `javascript:`).
fn explicit_scheme(input: &str) -> Option<&str> {
    let (scheme, rest) = input.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    if rest.starts_with("//") || OPAQUE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        Some(scheme)
    } else {
        // `localhost:8080/x` is a host and port, not a scheme.
        None
    }
}

/// Normalizes raw URL text into the canonical serialized form.
///
/// Trims the input, assumes `https://` when no scheme is present, parses it as
/// an absolute URL and only accepts `http`/`https`. No canonicalization beyond
/// what URL parsing itself does is applied.
pub fn normalize(raw: &str) -> Result<String, SyncError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidUrl("URL is empty".to_string()));
    }

    let candidate = match explicit_scheme(trimmed) {
        Some(_) => trimmed.to_string(),
        None => format!("https://{}", trimmed),
    };

    let parsed = Url::parse(&candidate).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(SyncError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                trimmed, other
            )))
        }
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(SyncError::InvalidUrl(format!("{}: missing host", trimmed)));
    }

    Ok(parsed.as_str().to_string())
}

/// Advisory duplicate check over the owner's mirrored bookmarks.
///
/// `exclude_id` skips the bookmark being edited so an unchanged URL is not
/// reported as a duplicate of itself.
pub fn check_duplicate(bookmarks: &[Bookmark], owner_id: &str, normalized_url: &str, exclude_id: Option<&str>) -> bool {
    bookmarks.iter().any(|b| {
        b.owner_id == owner_id && b.url == normalized_url && Some(b.id.as_str()) != exclude_id
    })
}

/// Normalizes and rejects a duplicate in one step.
pub fn guard_new_url(bookmarks: &[Bookmark], owner_id: &str, raw: &str, exclude_id: Option<&str>) -> Result<String, SyncError> {
    let url = normalize(raw)?;
    if check_duplicate(bookmarks, owner_id, &url, exclude_id) {
        tracing::debug!(%url, "duplicate rejected before store call");
        return Err(SyncError::DuplicateBookmark(url));
    }
    Ok(url)
}
