//! Path normalization: strip the directory prefix shared by every path.
//!
//! Archives and repositories commonly wrap all content in one top-level
//! directory (`project-main/…`). Removing the shared prefix gives stable
//! paths regardless of archive naming.

use crate::models::{FileCorpus, RawFiles};

/// Longest run of leading directory segments shared by every path,
/// returned with its trailing `/`, or empty when there is none.
///
/// Only directory segments count: the final segment of the first path is
/// never part of the prefix.
pub fn common_prefix<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let split: Vec<Vec<&str>> = paths.into_iter().map(|p| p.split('/').collect()).collect();
    let Some(first) = split.first() else {
        return String::new();
    };

    let mut shared = Vec::new();
    for (i, segment) in first.iter().enumerate().take(first.len().saturating_sub(1)) {
        if split.iter().all(|parts| parts.get(i) == Some(segment)) {
            shared.push(*segment);
        } else {
            break;
        }
    }

    if shared.is_empty() {
        String::new()
    } else {
        format!("{}/", shared.join("/"))
    }
}

/// Strip the common prefix from every path and freeze the result into a
/// [`FileCorpus`]. Entries whose stripped path is empty are dropped.
pub fn normalize(raw: RawFiles) -> FileCorpus {
    normalize_with_prefix(raw).0
}

/// Like [`normalize`], also returning the stripped prefix (empty when
/// nothing was stripped) so callers can map paths back to their origin.
pub fn normalize_with_prefix(raw: RawFiles) -> (FileCorpus, String) {
    let prefix = common_prefix(raw.iter().map(|(p, _)| p.as_str()));
    if !prefix.is_empty() {
        tracing::debug!(prefix = %prefix, "stripping shared root directory");
    }
    let corpus = FileCorpus::from_files(raw.into_iter().filter_map(|(path, content)| {
        let stripped = path.strip_prefix(prefix.as_str()).unwrap_or(&path);
        if stripped.is_empty() {
            None
        } else {
            Some((stripped.to_string(), content))
        }
    }));
    (corpus, prefix)
}
