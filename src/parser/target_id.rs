//! Target id derivation from URLs.
//!
//! The id is the last `/`-separated path segment of the URL, percent-decoded,
//! with characters a file name cannot hold replaced by `_`. It is exactly
//! the name the fetched bytes are stored under. Query strings and fragments
//! are ignored.

use std::collections::HashSet;

use url::Url;

use crate::sink::replace_unsafe_chars;

/// Derives an id for the URL on line `line` (1-indexed).
///
/// Falls back to `<host>.bin` when the path ends in `/`, and to
/// `target-<line>` when no host can be found either.
#[must_use]
pub fn derive_target_id(url: &str, line: usize) -> String {
    let url = url.trim();
    let (host, segment) = match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().map(str::to_string),
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .unwrap_or_default(),
        ),
        Err(_) => split_raw(url),
    };

    let decoded = urlencoding::decode(&segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(segment);
    let name = replace_unsafe_chars(decoded.trim());
    if !name.is_empty() && !name.chars().all(|c| c == '.') {
        return name;
    }

    match host.filter(|host| !host.is_empty()) {
        Some(host) => replace_unsafe_chars(&format!("{host}.bin")),
        None => format!("target-{line}"),
    }
}

/// Best-effort split for input that is not an absolute URL, such as
/// `www.example.com/images/a.jpg`.
fn split_raw(url: &str) -> (Option<String>, String) {
    let without_suffix = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let without_scheme = without_suffix
        .split_once("://")
        .map_or(without_suffix, |(_, rest)| rest);

    let mut parts = without_scheme.split('/');
    let host = parts.next().map(str::to_string);
    let segment = parts.next_back().unwrap_or_default().to_string();
    (host, segment)
}

/// Makes `id` unique against `taken`, appending `_2`, `_3`, ... before the
/// extension. Records the returned id in `taken`.
pub fn unique_id(id: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(id.clone()) {
        return id;
    }

    let (stem, ext) = match id.rfind('.') {
        Some(pos) if pos > 0 => (&id[..pos], &id[pos..]),
        _ => (id.as_str(), ""),
    };
    let mut suffix = 2usize;
    loop {
        let candidate = format!("{stem}_{suffix}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}
