//! Session orchestration: one current corpus, one in-flight ingestion.
//!
//! A [`Session`] owns the corpus produced by the latest successful
//! ingestion and hands it out as a shared, immutable `Arc<Ingestion>`.
//! Starting an ingestion cancels whichever one is still running; a
//! cancelled or failed ingestion never replaces the current corpus.
//!
//! Questions go through [`Session::ask`]: context assembly, the reasoning
//! engine, reference resolution, and a history record.

use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::classify::PathFilter;
use crate::config::Config;
use crate::connector_github::GitHubConnector;
use crate::connector_zip::ZipConnector;
use crate::context::{build_context, file_manifest};
use crate::engine::{EngineRequest, ReasoningEngine};
use crate::error::{Error, Result};
use crate::models::{Ingestion, RepositoryMeta, ResolvedReference};
use crate::resolve::resolve_all;
use crate::store::{HistoryEntry, HistoryStore};
use crate::traits::Connector;

/// Where a corpus comes from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// An uploaded ZIP archive.
    Archive { name: String, bytes: Arc<[u8]> },
    /// A public GitHub repository URL.
    Remote { url: String },
}

/// The answer to one question, with references resolved against the corpus.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QaOutcome {
    /// Id of the recorded history entry.
    pub id: String,
    pub question: String,
    pub answer: String,
    pub references: Vec<ResolvedReference>,
    pub tags: Vec<String>,
    pub refactor_suggestion: Option<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<RepositoryMeta>,
}

pub struct Session {
    config: Arc<Config>,
    filter: PathFilter,
    history: Arc<dyn HistoryStore>,
    current: RwLock<Option<Arc<Ingestion>>>,
    inflight: Mutex<Inflight>,
}

/// The running ingestion's token, tagged with a generation number so a
/// finishing run only clears its own slot.
#[derive(Default)]
struct Inflight {
    generation: u64,
    token: Option<CancellationToken>,
}

impl Session {
    pub fn new(config: Arc<Config>, history: Arc<dyn HistoryStore>) -> anyhow::Result<Self> {
        let filter = PathFilter::new(&config.limits.exclude_globs)?;
        Ok(Self {
            config,
            filter,
            history,
            current: RwLock::new(None),
            inflight: Mutex::new(Inflight::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Build the connector for `source` with this session's limits.
    pub fn connector(&self, source: SourceSpec) -> Result<Box<dyn Connector>> {
        let max_file_chars = self.config.limits.max_file_chars;
        Ok(match source {
            SourceSpec::Archive { name, bytes } => Box::new(ZipConnector::new(
                name,
                bytes,
                self.filter.clone(),
                max_file_chars,
            )),
            SourceSpec::Remote { url } => Box::new(GitHubConnector::new(
                url,
                self.config.remote.clone(),
                self.filter.clone(),
                max_file_chars,
            )?),
        })
    }

    /// Ingest `source`, cancelling any ingestion still in flight.
    pub async fn ingest(&self, source: SourceSpec) -> Result<Arc<Ingestion>> {
        let connector = self.connector(source)?;
        self.ingest_with(connector.as_ref()).await
    }

    /// Ingest through an arbitrary connector.
    pub async fn ingest_with(&self, connector: &dyn Connector) -> Result<Arc<Ingestion>> {
        let (generation, token) = self.begin();
        tracing::info!(source = %connector.source_label(), "ingestion started");

        let result = connector.scan(&token).await;
        self.finish(generation);

        if token.is_cancelled() {
            tracing::info!(source = %connector.source_label(), "ingestion superseded");
            return Err(Error::Cancelled);
        }
        let ingestion = Arc::new(result?);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(ingestion.clone());
        Ok(ingestion)
    }

    /// Cancel the in-flight ingestion, if any.
    pub fn cancel_inflight(&self) {
        let inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = &inflight.token {
            token.cancel();
        }
    }

    /// Swap in a fresh token, cancelling the previous one.
    fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = inflight.token.replace(token.clone()) {
            previous.cancel();
        }
        inflight.generation += 1;
        (inflight.generation, token)
    }

    fn finish(&self, generation: u64) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight.generation == generation {
            inflight.token = None;
        }
    }

    /// The current corpus, if any ingestion has succeeded.
    pub fn corpus(&self) -> Option<Arc<Ingestion>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The current corpus, or [`Error::NoCorpus`].
    pub fn require(&self) -> Result<Arc<Ingestion>> {
        self.corpus().ok_or(Error::NoCorpus)
    }

    /// Ask the engine about the current corpus and record the answer.
    pub async fn ask(&self, engine: &dyn ReasoningEngine, question: &str) -> Result<QaOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }
        let ingestion = self.require()?;
        let corpus = &ingestion.corpus;

        let context = build_context(corpus, self.config.limits.context_max_chars);
        let manifest = file_manifest(corpus, self.config.limits.manifest_limit);
        tracing::debug!(
            model = engine.model_name(),
            context_chars = context.chars().count(),
            manifest = manifest.len(),
            "asking reasoning engine"
        );

        let answer = engine
            .ask(&EngineRequest {
                question,
                context: &context,
                manifest: &manifest,
            })
            .await?;

        let references = resolve_all(corpus, answer.references);
        let entry = HistoryEntry::new(
            question,
            answer.answer,
            references,
            answer.tags,
            answer.refactor_suggestion,
            ingestion.source_label.clone(),
        );
        let outcome = QaOutcome {
            id: entry.id.clone(),
            question: entry.question.clone(),
            answer: entry.answer.clone(),
            references: entry.references.clone(),
            tags: entry.tags.clone(),
            refactor_suggestion: entry.refactor_suggestion.clone(),
            source: entry.source.clone(),
            repo: ingestion.repo.clone(),
        };

        // A failed history write never loses the answer.
        if let Err(e) = self.history.append(entry).await {
            tracing::warn!(error = %e, "could not record history entry");
        }
        Ok(outcome)
    }
}
