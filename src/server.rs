//! HTTP server.
//!
//! Exposes the session over a JSON HTTP API so a browser front end (or
//! `curl`) can upload a codebase, browse it, and ask questions about it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/ingest/archive?name=` | Ingest a raw ZIP request body |
//! | `POST`   | `/ingest/repo` | Ingest `{ "url" }` from GitHub |
//! | `GET`    | `/files` | Current paths plus skipped-file diagnostics |
//! | `GET`    | `/tree` | Directory tree of the current corpus |
//! | `POST`   | `/search` | Line search, `{ "query" }` |
//! | `POST`   | `/resolve` | Resolve one reference against the corpus |
//! | `POST`   | `/ask` | Ask a question, `{ "question" }` |
//! | `GET`    | `/history?filter=` | Recorded answers, newest first |
//! | `DELETE` | `/history` | Clear history |
//! | `DELETE` | `/history/{id}` | Delete one entry |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_corpus", "message": "No codebase loaded. ..." } }
//! ```
//!
//! Codes come from [`Error::code`]; `bad_request` (400) and `not_found`
//! (404) are added for request validation. `/resolve` never fails for an
//! unknown file: the reference comes back unresolved.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::engine::{self, ReasoningEngine};
use crate::error::Error;
use crate::models::{Reference, RepositoryMeta, ResolvedReference, SearchHit, SkippedFile};
use crate::resolve::resolve_reference;
use crate::search::{match_count, search_corpus};
use crate::session::{QaOutcome, Session, SourceSpec};
use crate::store::{
    HistoryEntry, InMemoryHistory, InMemorySettings, JsonFileHistory, JsonFileSettings,
    SettingsStore,
};
use crate::tree::{build_tree, render_tree, TreeNode};

/// Largest accepted archive upload.
const MAX_ARCHIVE_BYTES: usize = 100 * 1024 * 1024;

/// Archive name used when `?name=` is absent.
const DEFAULT_ARCHIVE_NAME: &str = "upload.zip";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    session: Arc<Session>,
    settings: Arc<dyn SettingsStore>,
    /// Fixed engine; when `None`, one is built per request from settings.
    engine: Option<Arc<dyn ReasoningEngine>>,
}

impl AppState {
    pub fn new(session: Arc<Session>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            session,
            settings,
            engine: None,
        }
    }

    /// Answer questions with `engine` instead of the configured endpoint.
    pub fn with_engine(mut self, engine: Arc<dyn ReasoningEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    fn config(&self) -> &Config {
        self.session.config()
    }
}

/// Starts the HTTP server on `[server].bind` with file-backed history and
/// settings under `[store].dir`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());
    let history = Arc::new(JsonFileHistory::new(
        &config.store.dir,
        config.store.max_history,
    ));
    let session = Arc::new(Session::new(config.clone(), history)?);
    let settings = Arc::new(JsonFileSettings::new(&config.store.dir));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("Server listening on http://{}", config.server.bind);

    serve(listener, AppState::new(session, settings)).await
}

/// Serve `state` on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// An ephemeral state with in-memory history and settings.
pub fn ephemeral_state(config: Config) -> anyhow::Result<AppState> {
    let config = Arc::new(config);
    let history = Arc::new(InMemoryHistory::new(config.store.max_history));
    let session = Arc::new(Session::new(config, history)?);
    Ok(AppState::new(session, Arc::new(InMemorySettings::new())))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/ingest/archive",
            post(handle_ingest_archive).layer(DefaultBodyLimit::max(MAX_ARCHIVE_BYTES)),
        )
        .route("/ingest/repo", post(handle_ingest_repo))
        .route("/files", get(handle_files))
        .route("/tree", get(handle_tree))
        .route("/search", post(handle_search))
        .route("/resolve", post(handle_resolve))
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history).delete(handle_clear_history))
        .route("/history/{id}", delete(handle_delete_history))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::warn!(error = %err, code = err.code(), "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidUrl { .. }
        | Error::Archive { .. }
        | Error::MissingApiKey { .. }
        | Error::EmptyQuestion => StatusCode::BAD_REQUEST,
        Error::RepoNotFound { .. } => StatusCode::NOT_FOUND,
        Error::EmptyCorpus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Cancelled | Error::NoCorpus => StatusCode::CONFLICT,
        Error::RateLimited | Error::EngineRateLimited => StatusCode::TOO_MANY_REQUESTS,
        Error::EngineAuth => StatusCode::UNAUTHORIZED,
        Error::ContextTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        Error::Remote { .. }
        | Error::Engine { .. }
        | Error::EmptyResponse
        | Error::MalformedResponse { .. }
        | Error::Http(_) => StatusCode::BAD_GATEWAY,
        Error::Io(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Ingestion ============

/// Summary of the current corpus, returned by ingestion and `GET /files`.
#[derive(Serialize)]
struct CorpusSummary {
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo: Option<RepositoryMeta>,
    files: Vec<String>,
    skipped: Vec<SkippedFile>,
}

impl CorpusSummary {
    fn of(ingestion: &crate::models::Ingestion) -> Self {
        Self {
            source: ingestion.source_label.clone(),
            repo: ingestion.repo.clone(),
            files: ingestion.corpus.paths().map(str::to_string).collect(),
            skipped: ingestion.skipped.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ArchiveParams {
    name: Option<String>,
}

async fn handle_ingest_archive(
    State(state): State<AppState>,
    Query(params): Query<ArchiveParams>,
    body: Bytes,
) -> Result<Json<CorpusSummary>, AppError> {
    if body.is_empty() {
        return Err(bad_request("request body must contain a ZIP archive"));
    }
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());
    let ingestion = state
        .session
        .ingest(SourceSpec::Archive {
            name,
            bytes: Arc::from(body.as_ref()),
        })
        .await?;
    Ok(Json(CorpusSummary::of(&ingestion)))
}

#[derive(Deserialize)]
struct RepoRequest {
    url: String,
}

async fn handle_ingest_repo(
    State(state): State<AppState>,
    Json(req): Json<RepoRequest>,
) -> Result<Json<CorpusSummary>, AppError> {
    let ingestion = state
        .session
        .ingest(SourceSpec::Remote {
            url: req.url.trim().to_string(),
        })
        .await?;
    Ok(Json(CorpusSummary::of(&ingestion)))
}

// ============ Browsing ============

async fn handle_files(State(state): State<AppState>) -> Result<Json<CorpusSummary>, AppError> {
    let ingestion = state.session.require()?;
    Ok(Json(CorpusSummary::of(&ingestion)))
}

#[derive(Serialize)]
struct TreeResponse {
    tree: TreeNode,
    /// Indented, sorted rendering.
    lines: Vec<String>,
}

async fn handle_tree(State(state): State<AppState>) -> Result<Json<TreeResponse>, AppError> {
    let ingestion = state.session.require()?;
    let tree = build_tree(ingestion.corpus.paths());
    let lines = render_tree(&tree);
    Ok(Json(TreeResponse { tree, lines }))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    hits: Vec<SearchHit>,
    total_matches: usize,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let ingestion = state.session.require()?;
    let hits = search_corpus(&ingestion.corpus, &req.query);
    let total_matches = match_count(&hits);
    Ok(Json(SearchResponse {
        hits,
        total_matches,
    }))
}

/// A resolved reference plus its browsable link for remote corpora.
#[derive(Serialize)]
struct LinkedReference {
    #[serde(flatten)]
    resolved: ResolvedReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

fn link(
    config: &Config,
    repo: Option<&RepositoryMeta>,
    resolved: ResolvedReference,
) -> LinkedReference {
    let url = match (repo, resolved.actual_start, resolved.actual_end) {
        (Some(meta), Some(start), Some(end)) => Some(meta.blob_url(
            &config.remote.web_base,
            &resolved.reference.file,
            start,
            end,
        )),
        _ => None,
    };
    LinkedReference { resolved, url }
}

async fn handle_resolve(
    State(state): State<AppState>,
    Json(reference): Json<Reference>,
) -> Result<Json<LinkedReference>, AppError> {
    let ingestion = state.session.require()?;
    let resolved = resolve_reference(&ingestion.corpus, reference);
    Ok(Json(link(state.config(), ingestion.repo.as_ref(), resolved)))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse {
    #[serde(flatten)]
    outcome: QaOutcome,
    /// Blob links for resolved references, parallel to `references`.
    links: Vec<Option<String>>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(Error::EmptyQuestion.into());
    }
    // Fail on a missing corpus before touching the credential.
    state.session.require()?;

    let outcome = match &state.engine {
        Some(engine) => state.session.ask(engine.as_ref(), &req.question).await?,
        None => {
            let engine =
                engine::from_settings(&state.config().engine, state.settings.as_ref()).await?;
            state.session.ask(&engine, &req.question).await?
        }
    };

    let links = outcome
        .references
        .iter()
        .map(|r| link(state.config(), outcome.repo.as_ref(), r.clone()).url)
        .collect();
    Ok(Json(AskResponse { outcome, links }))
}

// ============ History ============

#[derive(Deserialize)]
struct HistoryParams {
    filter: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    entries: Vec<HistoryEntry>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let mut entries = state.session.history().list().await?;
    if let Some(filter) = params.filter.as_deref() {
        entries.retain(|e| e.matches(filter));
    }
    Ok(Json(HistoryResponse { entries }))
}

async fn handle_clear_history(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.session.history().clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_delete_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.session.history().remove_by_id(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no history entry with id: {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::NoCorpus), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::InvalidUrl { url: "x".into() }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::RepoNotFound {
                owner: "a".into(),
                repo: "b".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&Error::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&Error::ContextTooLarge), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_for(&Error::EmptyResponse), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&Error::EmptyQuestion), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_link_only_for_resolved_remote_references() {
        let config = Config::default();
        let meta = RepositoryMeta {
            owner: "acme".into(),
            repo: "api".into(),
            branch: "main".into(),
            root: String::new(),
        };
        let reference = Reference {
            file: "src/a.rs".into(),
            start_line: Some(2),
            end_line: Some(4),
            snippet: None,
            explanation: None,
        };
        let resolved = ResolvedReference {
            reference: reference.clone(),
            lines: Some(vec!["x".into()]),
            actual_start: Some(2),
            actual_end: Some(4),
        };
        assert_eq!(
            link(&config, Some(&meta), resolved.clone()).url.as_deref(),
            Some("https://github.com/acme/api/blob/main/src/a.rs#L2-L4")
        );
        assert!(link(&config, None, resolved).url.is_none());
        assert!(link(&config, Some(&meta), ResolvedReference::unresolved(reference))
            .url
            .is_none());
    }
}
