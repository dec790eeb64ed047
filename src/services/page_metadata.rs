//! Page metadata prefetch for new bookmarks.
//!
//! Pulls title, description and thumbnail out of a page's HTML so the add
//! form can be prefilled. OpenGraph tags win over `<title>` and
//! `<meta name="description">`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::errors::SyncError;
use crate::types::settings::MetadataSettings;

/// Upper bound on how much of a page is scanned.
const MAX_HTML_BYTES: usize = 512 * 1024;

/// Metadata extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
}

/// Replaces the handful of entities that show up in titles.
fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn clean(text: &str) -> Option<String> {
    let collapsed = decode_entities(text).split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Parses `key="value"` / `key='value'` / `key=value` pairs of one tag.
fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let bytes = tag.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' && bytes[i] != b'/' {
            i += 1;
        }
        let name = tag[name_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            if name.is_empty() {
                i += 1;
            }
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
            let quote = bytes[i];
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            let value = &tag[start..i];
            i += 1;
            value
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            &tag[start..i]
        };
        if !name.is_empty() {
            attrs.push((name, value.to_string()));
        }
    }
    attrs
}

/// Yields the attribute text of every `<meta ...>` tag.
fn meta_tags(html: &str) -> Vec<&str> {
    let lower = html.to_ascii_lowercase();
    let mut tags = Vec::new();
    let mut offset = 0;
    while let Some(pos) = lower[offset..].find("<meta") {
        let start = offset + pos + "<meta".len();
        match lower[start..].find('>') {
            Some(end) => {
                tags.push(&html[start..start + end]);
                offset = start + end + 1;
            }
            None => break,
        }
    }
    tags
}

fn title_tag(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</title>")?;
    clean(&html[content_start..content_end])
}

/// Extracts metadata from HTML. Relative image URLs resolve against `base`.
pub fn extract_metadata(html: &str, base: &Url) -> PageMetadata {
    let html = if html.len() > MAX_HTML_BYTES {
        let mut cut = MAX_HTML_BYTES;
        while !html.is_char_boundary(cut) {
            cut -= 1;
        }
        &html[..cut]
    } else {
        html
    };

    let mut og_title = None;
    let mut og_description = None;
    let mut og_image = None;
    let mut description = None;

    for tag in meta_tags(html) {
        let attrs = parse_attributes(tag);
        let key = attrs
            .iter()
            .find(|(name, _)| name == "property" || name == "name")
            .map(|(_, value)| value.to_ascii_lowercase());
        let content = attrs.iter().find(|(name, _)| name == "content").map(|(_, v)| v.as_str());
        let (Some(key), Some(content)) = (key, content) else {
            continue;
        };
        match key.as_str() {
            "og:title" if og_title.is_none() => og_title = clean(content),
            "og:description" if og_description.is_none() => og_description = clean(content),
            "og:image" | "og:image:url" | "twitter:image" if og_image.is_none() => {
                og_image = base
                    .join(content.trim())
                    .ok()
                    .filter(|u| matches!(u.scheme(), "http" | "https"))
                    .map(|u| u.to_string())
            }
            "description" if description.is_none() => description = clean(content),
            _ => {}
        }
    }

    PageMetadata {
        title: og_title.or_else(|| title_tag(html)),
        description: og_description.or(description),
        thumbnail: og_image,
    }
}

/// Appends as much of `chunk` as fits under `limit`. Returns false once full.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    let room = limit.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    buf.len() < limit
}

/// Fetches pages over HTTP for metadata extraction.
pub struct MetadataFetcher {
    http: reqwest::Client,
}

impl MetadataFetcher {
    pub fn new(settings: &MetadataSettings) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| SyncError::Unavailable(e.to_string()))?;
        Ok(Self { http })
    }

    /// Fetches `url` (already normalized) and extracts its metadata.
    /// Non-HTML responses yield empty metadata.
    pub async fn fetch(&self, url: &str) -> Result<PageMetadata, SyncError> {
        let base = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
        let response = self
            .http
            .get(base.clone())
            .send()
            .await
            .map_err(|e| SyncError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SyncError::Unavailable(format!("{} returned {}", url, response.status())));
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("html"))
            .unwrap_or(true);
        if !is_html {
            return Ok(PageMetadata::default());
        }
        // Redirects may have moved the page; resolve relative images from the final URL.
        let final_url = response.url().clone();
        let mut response = response;
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SyncError::Unavailable(e.to_string()))?
        {
            if !append_capped(&mut body, &chunk, MAX_HTML_BYTES) {
                tracing::debug!(%final_url, "page truncated for metadata scan");
                break;
            }
        }
        Ok(extract_metadata(&String::from_utf8_lossy(&body), &final_url))
    }
}
