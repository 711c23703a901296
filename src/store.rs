//! Persistence for question/answer history and user settings.
//!
//! The [`HistoryStore`] and [`SettingsStore`] traits let the session run
//! against any backend. Two are provided:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`InMemoryHistory`] / [`InMemorySettings`] | tests, the HTTP server's ephemeral mode |
//! | [`JsonFileHistory`] / [`JsonFileSettings`] | the CLI, under `[store].dir` |
//!
//! History is newest-first and truncated to its capacity on every append,
//! so the oldest entries are evicted first.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::ResolvedReference;

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub references: Vec<ResolvedReference>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub refactor_suggestion: Option<String>,
    /// `owner/repo` or the archive name.
    #[serde(default)]
    pub source: String,
}

impl HistoryEntry {
    /// New entry with a fresh id and the current time.
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        references: Vec<ResolvedReference>,
        tags: Vec<String>,
        refactor_suggestion: Option<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            question: question.into(),
            answer: answer.into(),
            references,
            tags,
            refactor_suggestion,
            source: source.into(),
        }
    }

    /// Case-insensitive match against question, tags, and source.
    pub fn matches(&self, filter: &str) -> bool {
        let needle = filter.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.question.to_lowercase().contains(&needle)
            || self.source.to_lowercase().contains(&needle)
            || self
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&needle))
    }
}

/// Ordered, capped question/answer history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert `entry` at the front and evict beyond capacity.
    async fn append(&self, entry: HistoryEntry) -> Result<()>;

    /// All entries, newest first.
    async fn list(&self) -> Result<Vec<HistoryEntry>>;

    /// Remove the entry with `id`. Returns whether one was removed.
    async fn remove_by_id(&self, id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

/// Settings key holding the reasoning engine credential.
pub const API_KEY_SETTING: &str = "api_key";

/// Small string key-value settings (e.g. [`API_KEY_SETTING`]).
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

fn push_front_capped(entries: &mut Vec<HistoryEntry>, entry: HistoryEntry, capacity: usize) {
    entries.insert(0, entry);
    entries.truncate(capacity);
}

// ============ In-memory ============

/// In-memory history for tests and ephemeral servers.
pub struct InMemoryHistory {
    capacity: usize,
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        push_front_capped(&mut entries, entry, self.capacity);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.entries.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn remove_by_id(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

/// In-memory settings.
#[derive(Default)]
pub struct InMemorySettings {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============ JSON files ============

/// A missing or unparseable file reads as the default value, so a corrupt
/// store never blocks the user. An unparseable file is moved aside to
/// `<name>.bak` first so the next write cannot destroy it.
async fn read_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            let backup = sibling(path, "bak");
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %e,
                "moving unreadable store file aside"
            );
            tokio::fs::rename(path, &backup).await?;
            Ok(T::default())
        }
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Writes to `<name>.tmp` and renames it over `path`.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw = serde_json::to_string_pretty(value)?;
    let tmp = sibling(path, "tmp");
    tokio::fs::write(&tmp, raw).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// History persisted as a JSON array in `history.json`.
pub struct JsonFileHistory {
    path: PathBuf,
    capacity: usize,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl JsonFileHistory {
    pub fn new(dir: &Path, capacity: usize) -> Self {
        Self {
            path: dir.join("history.json"),
            capacity,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistory {
    async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<HistoryEntry> = read_json(&self.path).await?;
        push_front_capped(&mut entries, entry, self.capacity);
        write_json(&self.path, &entries).await
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.lock.lock().await;
        read_json(&self.path).await
    }

    async fn remove_by_id(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<HistoryEntry> = read_json(&self.path).await?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        write_json(&self.path, &entries).await?;
        Ok(true)
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Settings persisted as a JSON object in `settings.json`.
pub struct JsonFileSettings {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileSettings {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("settings.json"),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let values: BTreeMap<String, String> = read_json(&self.path).await?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values: BTreeMap<String, String> = read_json(&self.path).await?;
        values.insert(key.to_string(), value.to_string());
        write_json(&self.path, &values).await
    }
}
