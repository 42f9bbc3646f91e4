//! Destination filename derivation.
//!
//! A URL's last path segment becomes the filename. URLs without one
//! (`http://host/`, unparseable input) get a synthesized
//! `file_{row}_{id}` name so concurrent transfers never share a fallback.

use std::path::{Component, Path};

use rand::Rng;
use tracing::debug;
use url::Url;

/// Prefix of synthesized filenames.
pub const FALLBACK_PREFIX: &str = "file";

/// Returns the filename for a URL: its decoded last path segment, or a
/// fallback built from the row index.
#[must_use]
pub fn target_filename(url: &str, row: usize) -> String {
    filename_from_url(url).unwrap_or_else(|| {
        let fallback = fallback_filename(row);
        debug!(url, row, filename = %fallback, "URL has no usable file name, using fallback");
        fallback
    })
}

/// Extracts the last path segment of a URL, percent-decoded and sanitized.
///
/// Returns `None` when the URL cannot be parsed or the segment is empty or
/// whitespace.
#[must_use]
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last).map_or_else(
        |e| {
            debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
            last.to_string()
        },
        std::borrow::Cow::into_owned,
    );
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(sanitize_filename(trimmed))
}

/// Builds `file_{row}_{id}` with a random 64-bit hex id.
#[must_use]
pub fn fallback_filename(row: usize) -> String {
    let id: u64 = rand::thread_rng().r#gen();
    format!("{FALLBACK_PREFIX}_{row}_{id:016x}")
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
