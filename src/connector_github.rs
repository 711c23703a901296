//! GitHub repository connector.
//!
//! Fetches a public repository without cloning, through three read-only
//! HTTP lookups:
//!
//! 1. `GET {api_base}/repos/{owner}/{repo}` for the default branch.
//! 2. `GET {api_base}/repos/{owner}/{repo}/git/trees/{branch}?recursive=1`
//!    for the full file listing.
//! 3. `GET {raw_base}/{owner}/{repo}/{branch}/{path}` for each accepted file.
//!
//! # Limits
//!
//! At most `remote.max_files` qualifying blobs are fetched (listing order),
//! in batches of `remote.batch_size` concurrent requests. Batch N+1 starts
//! only after batch N has fully settled.
//!
//! # Failure policy
//!
//! | Step | Failure | Result |
//! |------|---------|--------|
//! | URL parse | no `github.com/<owner>/<repo>` | [`Error::InvalidUrl`], no request sent |
//! | metadata | 404 / 403 / other | `RepoNotFound` / `RateLimited` / `Remote` |
//! | tree | non-2xx | `Remote` |
//! | raw file | non-2xx, transport, not UTF-8, too large | file skipped, never retried |
//!
//! Raw bodies are read chunk by chunk and abandoned as soon as they pass
//! `4 * max_file_chars` bytes.
//! | end | no file retrieved | `EmptyCorpus` |

use async_trait::async_trait;
use regex::Regex;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

use crate::classify::PathFilter;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{Ingestion, RawFiles, RepositoryMeta, SkipReason, SkippedFile};
use crate::normalize::normalize_with_prefix;
use crate::traits::Connector;

/// Branch assumed when the metadata omits `default_branch`.
const FALLBACK_BRANCH: &str = "main";

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"github\.com/([^/]+)/([^/\s?#]+)").expect("repository URL pattern is valid")
    })
}

/// Extract `(owner, repo)` from a repository URL, dropping a `.git` suffix.
pub fn parse_repo_url(url: &str) -> Result<(String, String)> {
    let invalid = || Error::InvalidUrl {
        url: url.to_string(),
    };
    let caps = repo_url_pattern().captures(url).ok_or_else(invalid)?;
    let owner = caps[1].to_string();
    let repo = caps[2].trim_end_matches(".git").to_string();
    if repo.is_empty() {
        return Err(invalid());
    }
    Ok((owner, repo))
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// A public GitHub repository, ready to be fetched.
pub struct GitHubConnector {
    url: String,
    remote: RemoteConfig,
    filter: PathFilter,
    max_file_chars: usize,
    client: reqwest::Client,
}

impl GitHubConnector {
    pub fn new(
        url: impl Into<String>,
        remote: RemoteConfig,
        filter: PathFilter,
        max_file_chars: usize,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(remote.user_agent.clone())
            .build()?;
        Ok(Self {
            url: url.into(),
            remote,
            filter,
            max_file_chars,
            client,
        })
    }
}

#[async_trait]
impl Connector for GitHubConnector {
    fn name(&self) -> &str {
        &self.url
    }

    fn connector_type(&self) -> &str {
        "github"
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Ingestion> {
        let (owner, repo) = parse_repo_url(&self.url)?;

        let branch = self.default_branch(&owner, &repo, cancel).await?;
        let paths = self.list_files(&owner, &repo, &branch, cancel).await?;
        tracing::info!(
            repo = %format!("{}/{}", owner, repo),
            branch = %branch,
            files = paths.len(),
            "fetching repository files"
        );

        let (raw, skipped) = self
            .fetch_files(&owner, &repo, &branch, paths, cancel)
            .await?;
        if raw.is_empty() {
            return Err(Error::EmptyCorpus {
                source_kind: "repo",
            });
        }

        let (corpus, root) = normalize_with_prefix(raw);
        let meta = RepositoryMeta {
            owner,
            repo,
            branch,
            root,
        };
        tracing::info!(
            repo = %meta.label(),
            files = corpus.len(),
            skipped = skipped.len(),
            "repository ingested"
        );
        Ok(Ingestion {
            corpus,
            source_label: meta.label(),
            repo: Some(meta),
            skipped,
        })
    }
}

impl GitHubConnector {
    fn api_url(&self, tail: &str) -> String {
        format!("{}/{}", self.remote.api_base.trim_end_matches('/'), tail)
    }

    async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<reqwest::Response> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .send();
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            resp = request => resp.map_err(|e| Error::Remote { message: e.to_string() }),
        }
    }

    async fn default_branch(
        &self,
        owner: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let url = self.api_url(&format!("repos/{}/{}", owner, repo));
        let resp = self.get(&url, cancel).await?;
        let status = resp.status();

        if !status.is_success() {
            return Err(match status {
                StatusCode::NOT_FOUND => Error::RepoNotFound {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                },
                StatusCode::FORBIDDEN => Error::RateLimited,
                _ => {
                    let message = resp
                        .json::<ApiMessage>()
                        .await
                        .ok()
                        .and_then(|m| m.message)
                        .unwrap_or_else(|| format!("status {}", status));
                    Error::Remote { message }
                }
            });
        }

        let info: RepoInfo = resp.json().await.map_err(|e| Error::Remote {
            message: format!("invalid repository metadata: {}", e),
        })?;
        Ok(info
            .default_branch
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| FALLBACK_BRANCH.to_string()))
    }

    /// Accepted blob paths in listing order, capped at `max_files`.
    async fn list_files(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let url = self.api_url(&format!(
            "repos/{}/{}/git/trees/{}?recursive=1",
            owner, repo, branch
        ));
        let resp = self.get(&url, cancel).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Remote {
                message: format!("could not fetch repo tree ({})", status),
            });
        }

        let listing: TreeListing = resp.json().await.map_err(|e| Error::Remote {
            message: format!("invalid repo tree: {}", e),
        })?;
        if listing.truncated {
            tracing::warn!(owner, repo, "repository tree truncated by the API (very large repo)");
        }

        Ok(listing
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && self.filter.includes(&entry.path))
            .map(|entry| entry.path)
            .take(self.remote.max_files)
            .collect())
    }

    async fn fetch_files(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        paths: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<(RawFiles, Vec<SkippedFile>)> {
        let mut files = RawFiles::new();
        let mut skipped = Vec::new();

        for batch in paths.chunks(self.remote.batch_size.max(1)) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let fetches = batch
                .iter()
                .map(|path| self.fetch_raw(owner, repo, branch, path));
            let outcomes = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcomes = futures::future::join_all(fetches) => outcomes,
            };

            for (path, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(content) => files.push((path.clone(), content)),
                    Err(reason) => {
                        tracing::debug!(path = %path, %reason, "skipping remote file");
                        skipped.push(SkippedFile {
                            path: path.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        Ok((files, skipped))
    }

    async fn fetch_raw(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> std::result::Result<String, SkipReason> {
        let url = raw_url(&self.remote.raw_base, &[owner, repo, branch, path])
            .ok_or(SkipReason::FetchFailed)?;
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|_| SkipReason::FetchFailed)?;
        if !resp.status().is_success() {
            return Err(SkipReason::FetchFailed);
        }

        // A char is at most 4 UTF-8 bytes, so nothing past this can fit.
        let max_bytes = (self.max_file_chars as u64).saturating_mul(4);
        if resp.content_length().is_some_and(|len| len > max_bytes) {
            return Err(SkipReason::TooLarge);
        }
        let mut buf = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|_| SkipReason::FetchFailed)? {
            if (buf.len() as u64).saturating_add(chunk.len() as u64) > max_bytes {
                return Err(SkipReason::TooLarge);
            }
            buf.extend_from_slice(&chunk);
        }
        let text = String::from_utf8(buf).map_err(|_| SkipReason::NotText)?;
        if text.chars().count() > self.max_file_chars {
            return Err(SkipReason::TooLarge);
        }
        Ok(text)
    }
}

/// `raw_base` followed by every `/`-separated segment of `parts`, each
/// percent-encoded.
fn raw_url(raw_base: &str, parts: &[&str]) -> Option<Url> {
    let mut url = Url::parse(raw_base).ok()?;
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        for part in parts {
            segments.extend(part.split('/'));
        }
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_url() {
        let (owner, repo) = parse_repo_url("https://github.com/rust-lang/cargo").unwrap();
        assert_eq!(owner, "rust-lang");
        assert_eq!(repo, "cargo");
    }

    #[test]
    fn test_parse_strips_git_suffix_and_extras() {
        let (_, repo) = parse_repo_url("https://github.com/a/b.git").unwrap();
        assert_eq!(repo, "b");
        let (owner, repo) = parse_repo_url("github.com/acme/api/tree/main/src?tab=x").unwrap();
        assert_eq!((owner.as_str(), repo.as_str()), ("acme", "api"));
        let (_, repo) = parse_repo_url("https://github.com/acme/api#readme").unwrap();
        assert_eq!(repo, "api");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for url in [
            "https://gitlab.com/a/b",
            "https://github.com/onlyowner",
            "not a url",
            "",
        ] {
            assert!(
                matches!(parse_repo_url(url), Err(Error::InvalidUrl { .. })),
                "accepted {:?}",
                url
            );
        }
    }

    #[test]
    fn test_raw_url_encodes_segments() {
        let url = raw_url(
            "https://raw.githubusercontent.com",
            &["acme", "api", "feature/x", "docs/read me#1.md"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://raw.githubusercontent.com/acme/api/feature/x/docs/read%20me%231.md"
        );
    }

    #[test]
    fn test_raw_url_with_base_path() {
        let url = raw_url("http://127.0.0.1:9/raw/", &["o", "r", "main", "a.py"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/raw/o/r/main/a.py");
    }
}
