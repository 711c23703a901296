//! Implementations of the `cproof` subcommands.
//!
//! Each `run_*` function loads what it needs, prints human-readable output
//! to stdout, and returns `anyhow::Result` so the binary can report errors
//! with context.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::context::build_context;
use crate::engine;
use crate::models::{Ingestion, Reference, ResolvedReference};
use crate::resolve::resolve_reference;
use crate::search::{match_count, search_corpus};
use crate::session::{Session, SourceSpec};
use crate::store::{
    HistoryStore, JsonFileHistory, JsonFileSettings, SettingsStore, API_KEY_SETTING,
};
use crate::tree::{build_tree, render_tree};

/// Where a corpus command reads its codebase from.
#[derive(Debug, Clone)]
pub enum Source {
    Zip(PathBuf),
    Repo(String),
}

fn open_session(config: &Config) -> Result<Session> {
    let history = Arc::new(JsonFileHistory::new(
        &config.store.dir,
        config.store.max_history,
    ));
    Session::new(Arc::new(config.clone()), history)
}

async fn load(session: &Session, source: &Source) -> Result<Arc<Ingestion>> {
    let spec = match source {
        Source::Zip(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read archive: {}", path.display()))?;
            SourceSpec::Archive {
                name: archive_name(path),
                bytes: Arc::from(bytes),
            }
        }
        Source::Repo(url) => SourceSpec::Remote { url: url.clone() },
    };
    Ok(session.ingest(spec).await?)
}

fn archive_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_excerpt(config: &Config, ingestion: &Ingestion, resolved: &ResolvedReference) {
    let (Some(lines), Some(start), Some(end)) =
        (&resolved.lines, resolved.actual_start, resolved.actual_end)
    else {
        println!("  {} (not found in corpus)", resolved.reference.file);
        return;
    };
    println!("  {}:{}-{}", resolved.reference.file, start, end);
    if let Some(meta) = &ingestion.repo {
        println!(
            "  {}",
            meta.blob_url(&config.remote.web_base, &resolved.reference.file, start, end)
        );
    }
    let width = end.to_string().len();
    for (offset, line) in lines.iter().enumerate() {
        println!("  {:>width$} | {}", start + offset, line, width = width);
    }
}

// ============ files / tree / context ============

pub async fn run_files(config: &Config, source: &Source) -> Result<()> {
    let session = open_session(config)?;
    let ingestion = load(&session, source).await?;

    for path in ingestion.corpus.paths() {
        println!("{}", path);
    }
    println!();
    println!("files: {}", ingestion.corpus.len());
    if !ingestion.skipped.is_empty() {
        println!("skipped: {}", ingestion.skipped.len());
        for skipped in &ingestion.skipped {
            println!("  {} ({})", skipped.path, skipped.reason);
        }
    }
    Ok(())
}

pub async fn run_tree(config: &Config, source: &Source) -> Result<()> {
    let session = open_session(config)?;
    let ingestion = load(&session, source).await?;
    let tree = build_tree(ingestion.corpus.paths());
    for line in render_tree(&tree) {
        println!("{}", line);
    }
    Ok(())
}

pub async fn run_context(
    config: &Config,
    source: &Source,
    max_chars: Option<usize>,
) -> Result<()> {
    let session = open_session(config)?;
    let ingestion = load(&session, source).await?;
    let budget = max_chars.unwrap_or(config.limits.context_max_chars);
    print!("{}", build_context(&ingestion.corpus, budget));
    println!();
    Ok(())
}

// ============ search / show ============

pub async fn run_search(config: &Config, source: &Source, query: &str) -> Result<()> {
    let session = open_session(config)?;
    let ingestion = load(&session, source).await?;
    let hits = search_corpus(&ingestion.corpus, query);

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for hit in &hits {
        println!("{}", hit.path);
        for m in &hit.matches {
            println!("  {:>5}: {}", m.line_number, m.line);
        }
    }
    println!();
    println!(
        "{} matching lines in {} files",
        match_count(&hits),
        hits.len()
    );
    Ok(())
}

pub async fn run_show(
    config: &Config,
    source: &Source,
    file: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<()> {
    let session = open_session(config)?;
    let ingestion = load(&session, source).await?;
    let resolved = resolve_reference(
        &ingestion.corpus,
        Reference {
            file: file.to_string(),
            start_line: start,
            end_line: end,
            snippet: None,
            explanation: None,
        },
    );
    print_excerpt(config, &ingestion, &resolved);
    Ok(())
}

// ============ ask ============

pub async fn run_ask(config: &Config, source: &Source, question: &str) -> Result<()> {
    let settings = JsonFileSettings::new(&config.store.dir);
    // Check the credential before spending time on acquisition.
    let engine = engine::from_settings(&config.engine, &settings).await?;

    let session = open_session(config)?;
    let ingestion = load(&session, source).await?;
    let outcome = session.ask(&engine, question).await?;

    println!("{}", outcome.answer);
    if !outcome.references.is_empty() {
        println!();
        println!("References:");
        for reference in &outcome.references {
            print_excerpt(config, &ingestion, reference);
            if let Some(explanation) = &reference.reference.explanation {
                println!("  -> {}", explanation);
            }
            println!();
        }
    }
    if !outcome.tags.is_empty() {
        println!("tags: {}", outcome.tags.join(", "));
    }
    if let Some(suggestion) = &outcome.refactor_suggestion {
        println!("refactor: {}", suggestion);
    }
    println!("history id: {}", outcome.id);
    Ok(())
}

// ============ history / config ============

fn history_store(config: &Config) -> JsonFileHistory {
    JsonFileHistory::new(&config.store.dir, config.store.max_history)
}

pub async fn run_history_list(config: &Config, filter: Option<&str>) -> Result<()> {
    let entries = history_store(config).list().await?;
    let entries: Vec<_> = entries
        .iter()
        .filter(|e| filter.map(|f| e.matches(f)).unwrap_or(true))
        .collect();

    if entries.is_empty() {
        println!("No history.");
        return Ok(());
    }
    for entry in entries {
        println!("{}  {}  [{}]", entry.id, entry.timestamp, entry.source);
        println!("  Q: {}", entry.question);
        if !entry.tags.is_empty() {
            println!("  tags: {}", entry.tags.join(", "));
        }
        println!("  references: {}", entry.references.len());
    }
    Ok(())
}

pub async fn run_history_delete(config: &Config, id: &str) -> Result<()> {
    if !history_store(config).remove_by_id(id).await? {
        anyhow::bail!("No history entry with id: {}", id);
    }
    println!("Deleted {}", id);
    Ok(())
}

pub async fn run_history_clear(config: &Config) -> Result<()> {
    history_store(config).clear().await?;
    println!("History cleared.");
    Ok(())
}

pub async fn run_set_key(config: &Config, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key must not be empty");
    }
    JsonFileSettings::new(&config.store.dir)
        .set(API_KEY_SETTING, key)
        .await?;
    println!("API key saved to {}", config.store.dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_name_uses_file_name() {
        assert_eq!(archive_name(Path::new("/tmp/x/project.zip")), "project.zip");
        assert_eq!(archive_name(Path::new("bare.zip")), "bare.zip");
    }

    #[tokio::test]
    async fn test_set_key_persists_under_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.dir = dir.path().to_path_buf();

        run_set_key(&config, "  gsk_abc  ").await.unwrap();
        let stored = JsonFileSettings::new(dir.path())
            .get(API_KEY_SETTING)
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some("gsk_abc"));
        assert!(run_set_key(&config, " ").await.is_err());
    }
}
