//! Error taxonomy for ingestion, the reasoning engine, and persistence.
//!
//! Acquisition-level failures surface to the caller; per-file failures never
//! reach this type and are reported as [`SkippedFile`](crate::models::SkippedFile)
//! diagnostics instead.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the core pipeline.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Acquisition errors
    // ========================================================================
    /// The repository reference does not match `github.com/<owner>/<repo>`.
    #[error("Invalid GitHub URL: '{url}'. Expected: https://github.com/owner/repo")]
    InvalidUrl { url: String },

    /// Metadata lookup returned 404 (missing or private repository).
    #[error("Repo not found or private: {owner}/{repo}. Use a public repo or upload a ZIP.")]
    RepoNotFound { owner: String, repo: String },

    /// Metadata lookup returned 403.
    #[error("GitHub rate limit hit. Try again in a minute.")]
    RateLimited,

    /// Any other upstream failure during metadata or tree lookup.
    #[error("GitHub API error: {message}")]
    Remote { message: String },

    /// The uploaded blob could not be opened as a ZIP archive.
    #[error("Could not read archive: {message}")]
    Archive { message: String },

    /// Acquisition completed but no usable file survived filtering.
    #[error("No code files found in {source_kind}")]
    EmptyCorpus { source_kind: &'static str },

    /// A newer ingestion superseded this one.
    #[error("Ingestion cancelled")]
    Cancelled,

    /// An operation needs a corpus but nothing has been ingested yet.
    #[error("No codebase loaded. Ingest a ZIP or a repository first.")]
    NoCorpus,

    /// A question was blank after trimming.
    #[error("Question must not be empty")]
    EmptyQuestion,

    // ========================================================================
    // Reasoning engine errors
    // ========================================================================
    /// No credential in the settings store or the environment.
    #[error("No API key configured. Set one with `cproof config set-key` or ${env_var}.")]
    MissingApiKey { env_var: String },

    /// Engine rejected the credential (HTTP 401).
    #[error("Invalid API key. Check your key and try again.")]
    EngineAuth,

    /// Engine rate limit (HTTP 429).
    #[error("Engine rate limit hit. Wait a moment and retry.")]
    EngineRateLimited,

    /// Context plus question exceed the engine tier's request limits.
    #[error("This codebase + question is too large for the engine's request limits. Try a smaller repo/ZIP or a more focused question.")]
    ContextTooLarge,

    /// Other engine failure, carrying the upstream message.
    #[error("{message}")]
    Engine { message: String },

    /// Engine reply carried no message content.
    #[error("Empty response from the reasoning engine")]
    EmptyResponse,

    /// Engine reply could not be validated as an answer object.
    #[error("Could not parse AI response as JSON: {message}")]
    MalformedResponse { message: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// Transport failure talking to the engine.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable code used by the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUrl { .. } => "invalid_url",
            Error::RepoNotFound { .. } => "repo_not_found",
            Error::RateLimited => "rate_limited",
            Error::Remote { .. } => "remote_error",
            Error::Archive { .. } => "invalid_archive",
            Error::EmptyCorpus { .. } => "empty_corpus",
            Error::Cancelled => "cancelled",
            Error::NoCorpus => "no_corpus",
            Error::EmptyQuestion => "empty_question",
            Error::MissingApiKey { .. } => "missing_api_key",
            Error::EngineAuth => "engine_auth",
            Error::EngineRateLimited => "engine_rate_limited",
            Error::ContextTooLarge => "context_too_large",
            Error::Engine { .. } | Error::Http(_) => "engine_error",
            Error::EmptyResponse => "empty_response",
            Error::MalformedResponse { .. } => "malformed_response",
            Error::Io(_) | Error::Json(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_message_names_expected_shape() {
        let err = Error::InvalidUrl {
            url: "https://gitlab.com/a".to_string(),
        };
        assert!(err.to_string().contains("https://github.com/owner/repo"));
        assert_eq!(err.code(), "invalid_url");
    }

    #[test]
    fn test_empty_corpus_names_source() {
        let err = Error::EmptyCorpus { source_kind: "ZIP" };
        assert_eq!(err.to_string(), "No code files found in ZIP");
    }
}
