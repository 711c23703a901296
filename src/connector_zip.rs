//! ZIP archive connector.
//!
//! Decompresses every qualifying archive entry on the blocking pool, one
//! task per entry, and merges the results in entry-enumeration order so the
//! corpus is deterministic no matter which task finishes first.
//!
//! # Per-entry policy
//!
//! Entries are filtered by path before decompression. An entry is then
//! skipped, and recorded in the diagnostics, when it:
//!
//! | Condition | [`SkipReason`] |
//! |-----------|----------------|
//! | fails to decompress | `Unreadable` |
//! | is not UTF-8, or contains NUL bytes | `NotText` |
//! | exceeds `max_file_chars` characters | `TooLarge` |
//!
//! Decompression is bounded at four bytes per allowed character, so a
//! zip bomb never inflates past the cap.

use async_trait::async_trait;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::classify::PathFilter;
use crate::error::{Error, Result};
use crate::models::{Ingestion, RawFiles, SkipReason, SkippedFile};
use crate::normalize::normalize;
use crate::traits::Connector;

type Archive = zip::ZipArchive<Cursor<Arc<[u8]>>>;

/// An uploaded archive, ready to be scanned.
pub struct ZipConnector {
    /// Display name (usually the uploaded file name).
    name: String,
    bytes: Arc<[u8]>,
    filter: PathFilter,
    max_file_chars: usize,
}

impl ZipConnector {
    pub fn new(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        filter: PathFilter,
        max_file_chars: usize,
    ) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            filter,
            max_file_chars,
        }
    }
}

#[async_trait]
impl Connector for ZipConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "zip"
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Ingestion> {
        let (raw, skipped) =
            extract_archive(self.bytes.clone(), &self.filter, self.max_file_chars, cancel).await?;
        let corpus = normalize(raw);
        tracing::info!(
            archive = %self.name,
            files = corpus.len(),
            skipped = skipped.len(),
            "archive ingested"
        );
        Ok(Ingestion {
            corpus,
            repo: None,
            skipped,
            source_label: self.name.clone(),
        })
    }
}

enum EntryOutcome {
    Text(String),
    Skipped(SkipReason),
}

/// Extract the raw (not yet normalized) file map from an archive blob.
///
/// # Errors
///
/// - [`Error::Archive`] if the blob is not a readable ZIP.
/// - [`Error::EmptyCorpus`] if no entry survives filtering and decoding.
/// - [`Error::Cancelled`] if `cancel` fires before the results are merged.
pub async fn extract_archive(
    bytes: Arc<[u8]>,
    filter: &PathFilter,
    max_file_chars: usize,
    cancel: &CancellationToken,
) -> Result<(RawFiles, Vec<SkippedFile>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::Archive {
        message: e.to_string(),
    })?;

    let candidates = list_candidates(&mut archive, filter);
    tracing::debug!(entries = archive.len(), candidates = candidates.len(), "archive listed");

    let max_bytes = (max_file_chars as u64).saturating_mul(4);
    let tasks = candidates.iter().map(|(index, _)| {
        let mut archive = archive.clone();
        let index = *index;
        tokio::task::spawn_blocking(move || {
            read_entry(&mut archive, index, max_bytes, max_file_chars)
        })
    });

    let outcomes = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        outcomes = futures::future::join_all(tasks) => outcomes,
    };
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut files = RawFiles::new();
    let mut skipped = Vec::new();
    for ((_, path), outcome) in candidates.into_iter().zip(outcomes) {
        match outcome {
            Ok(EntryOutcome::Text(content)) => files.push((path, content)),
            Ok(EntryOutcome::Skipped(reason)) => {
                tracing::debug!(path = %path, %reason, "skipping archive entry");
                skipped.push(SkippedFile { path, reason });
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "archive entry task failed");
                skipped.push(SkippedFile {
                    path,
                    reason: SkipReason::Unreadable,
                });
            }
        }
    }

    if files.is_empty() {
        return Err(Error::EmptyCorpus { source_kind: "ZIP" });
    }
    Ok((files, skipped))
}

/// Indices and cleaned paths of file entries that pass `filter`, in
/// enumeration order.
fn list_candidates(archive: &mut Archive, filter: &PathFilter) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    for index in 0..archive.len() {
        let Ok(entry) = archive.by_index_raw(index) else {
            continue;
        };
        if entry.is_dir() {
            continue;
        }
        let path = clean_entry_name(entry.name());
        if filter.includes(&path) {
            out.push((index, path));
        }
    }
    out
}

/// Archive names use `/`, but some tools emit `\` or a leading `/`.
fn clean_entry_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

fn read_entry(
    archive: &mut Archive,
    index: usize,
    max_bytes: u64,
    max_chars: usize,
) -> EntryOutcome {
    let entry = match archive.by_index(index) {
        Ok(entry) => entry,
        Err(_) => return EntryOutcome::Skipped(SkipReason::Unreadable),
    };

    let mut buf = Vec::new();
    if entry.take(max_bytes.saturating_add(1)).read_to_end(&mut buf).is_err() {
        return EntryOutcome::Skipped(SkipReason::Unreadable);
    }
    if buf.len() as u64 > max_bytes {
        return EntryOutcome::Skipped(SkipReason::TooLarge);
    }

    let text = match String::from_utf8(buf) {
        Ok(text) if !text.contains('\0') => text,
        _ => return EntryOutcome::Skipped(SkipReason::NotText),
    };
    if text.chars().count() > max_chars {
        return EntryOutcome::Skipped(SkipReason::TooLarge);
    }
    EntryOutcome::Text(text)
}
