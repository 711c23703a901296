//! Core data models used throughout code-proof.
//!
//! These types represent the ingested corpus, the references a reasoning
//! engine claims as evidence, and the derived search results that flow
//! through the pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Acquired `path → content` pairs before path normalization, in
/// acquisition order.
pub type RawFiles = Vec<(String, String)>;

/// One file of a [`FileCorpus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub path: String,
    pub content: String,
}

/// Ordered, immutable mapping from normalized relative path to file text.
///
/// Insertion order is acquisition order and drives context assembly and
/// search output order. Paths are unique and never empty.
#[derive(Debug, Clone, Default)]
pub struct FileCorpus {
    files: Vec<CorpusFile>,
    index: HashMap<String, usize>,
}

impl FileCorpus {
    /// Build a corpus from ordered pairs.
    ///
    /// Empty paths are dropped. A repeated path keeps its first position and
    /// takes the later content.
    pub fn from_files<I>(files: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut corpus = FileCorpus::default();
        for (path, content) in files {
            if path.is_empty() {
                continue;
            }
            match corpus.index.get(&path) {
                Some(&i) => corpus.files[i].content = content,
                None => {
                    corpus.index.insert(path.clone(), corpus.files.len());
                    corpus.files.push(CorpusFile { path, content });
                }
            }
        }
        corpus
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.index
            .get(path)
            .map(|&i| self.files[i].content.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn files(&self) -> &[CorpusFile] {
        &self.files
    }

    /// Iterate `(path, content)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .map(|f| (f.path.as_str(), f.content.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Origin of a remotely fetched corpus, used to build browsable links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMeta {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory prefix stripped during normalization (`""` or `"dir/"`),
    /// re-applied when linking back to the repository.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root: String,
}

impl RepositoryMeta {
    /// `owner/repo`, used as the history source label.
    pub fn label(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Link to a line range of `file` on the hosting web UI.
    pub fn blob_url(&self, web_base: &str, file: &str, start: usize, end: usize) -> String {
        format!(
            "{}/{}/{}/blob/{}/{}{}#L{}-L{}",
            web_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.branch,
            self.root,
            file,
            start,
            end
        )
    }
}

/// Why an otherwise eligible file is absent from the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Content exceeded the per-file character cap.
    TooLarge,
    /// Content is not valid UTF-8 text.
    NotText,
    /// Raw content fetch returned non-2xx or failed in transport.
    FetchFailed,
    /// Archive entry could not be decompressed.
    Unreadable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::TooLarge => "too large",
            SkipReason::NotText => "not text",
            SkipReason::FetchFailed => "fetch failed",
            SkipReason::Unreadable => "unreadable",
        };
        f.write_str(s)
    }
}

/// A dropped file and the reason it was dropped. Paths are as acquired
/// (not normalized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// Result of one acquisition run.
#[derive(Debug, Clone)]
pub struct Ingestion {
    pub corpus: FileCorpus,
    pub repo: Option<RepositoryMeta>,
    pub skipped: Vec<SkippedFile>,
    /// Human-readable origin: `owner/repo` or the archive name.
    pub source_label: String,
}

/// A claimed evidence location as produced by the reasoning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub file: String,
    #[serde(
        default,
        deserialize_with = "lenient_line",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_line: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient_line",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Engines sometimes emit line numbers as `3.0` or `"3"`. Accept any whole
/// number in those shapes; anything else reads as absent.
fn lenient_line<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }))
}

fn whole(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// A [`Reference`] enriched with the exact lines found in the corpus.
///
/// The resolution fields stay `None` when the referenced file is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReference {
    #[serde(flatten)]
    pub reference: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<usize>,
}

impl ResolvedReference {
    pub fn unresolved(reference: Reference) -> Self {
        Self {
            reference,
            lines: None,
            actual_start: None,
            actual_end: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.lines.is_some()
    }
}

/// One matching line inside a [`SearchHit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMatch {
    /// 1-based line number.
    pub line_number: usize,
    /// Line text with trailing whitespace removed.
    pub line: String,
}

/// All matching lines of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub matches: Vec<LineMatch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_preserves_insertion_order() {
        let corpus = FileCorpus::from_files(vec![
            ("z.py".to_string(), "z".to_string()),
            ("a.py".to_string(), "a".to_string()),
        ]);
        let paths: Vec<&str> = corpus.paths().collect();
        assert_eq!(paths, vec!["z.py", "a.py"]);
    }

    #[test]
    fn test_corpus_drops_empty_paths_and_dedups() {
        let corpus = FileCorpus::from_files(vec![
            ("a.py".to_string(), "old".to_string()),
            (String::new(), "ignored".to_string()),
            ("b.py".to_string(), "b".to_string()),
            ("a.py".to_string(), "new".to_string()),
        ]);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get("a.py"), Some("new"));
        assert_eq!(corpus.files()[0].path, "a.py");
    }

    #[test]
    fn test_blob_url() {
        let meta = RepositoryMeta {
            owner: "acme".to_string(),
            repo: "api".to_string(),
            branch: "main".to_string(),
            root: String::new(),
        };
        assert_eq!(
            meta.blob_url("https://github.com/", "src/app.js", 3, 9),
            "https://github.com/acme/api/blob/main/src/app.js#L3-L9"
        );
        assert_eq!(meta.label(), "acme/api");

        let rooted = RepositoryMeta {
            root: "packages/".to_string(),
            ..meta
        };
        assert_eq!(
            rooted.blob_url("https://github.com", "app.js", 1, 1),
            "https://github.com/acme/api/blob/main/packages/app.js#L1-L1"
        );
    }

    #[test]
    fn test_reference_accepts_camel_case_and_missing_lines() {
        let r: Reference = serde_json::from_str(
            r#"{"file":"a.py","startLine":4,"snippet":"x = 1","explanation":null}"#,
        )
        .unwrap();
        assert_eq!(r.start_line, Some(4));
        assert_eq!(r.end_line, None);
        assert_eq!(r.explanation, None);
    }

    #[test]
    fn test_resolved_reference_flattens() {
        let resolved = ResolvedReference {
            reference: Reference {
                file: "a.py".to_string(),
                start_line: Some(1),
                end_line: Some(2),
                snippet: None,
                explanation: None,
            },
            lines: Some(vec!["one".to_string(), "two".to_string()]),
            actual_start: Some(1),
            actual_end: Some(2),
        };
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["file"], "a.py");
        assert_eq!(json["actualEnd"], 2);
        let back: ResolvedReference = serde_json::from_value(json).unwrap();
        assert_eq!(back, resolved);
    }
}
