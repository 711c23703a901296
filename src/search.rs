//! Linear full-text search over the corpus.
//!
//! Every line of every file is tested for case-insensitive substring
//! containment of the query. Output follows corpus insertion order, and a
//! file appears only when at least one of its lines matches.

use crate::models::{FileCorpus, LineMatch, SearchHit};

/// Search `corpus` for `query`.
///
/// A blank (empty or whitespace-only) query returns no hits. The query is
/// otherwise used verbatim, so surrounding spaces are significant.
pub fn search_corpus(corpus: &FileCorpus, query: &str) -> Vec<SearchHit> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();

    corpus
        .iter()
        .filter_map(|(path, content)| {
            let matches: Vec<LineMatch> = content
                .split('\n')
                .enumerate()
                .filter(|(_, line)| line.to_lowercase().contains(&needle))
                .map(|(i, line)| LineMatch {
                    line_number: i + 1,
                    line: line.trim_end().to_string(),
                })
                .collect();
            if matches.is_empty() {
                None
            } else {
                Some(SearchHit {
                    path: path.to_string(),
                    matches,
                })
            }
        })
        .collect()
}

/// Total number of matching lines across all hits.
pub fn match_count(hits: &[SearchHit]) -> usize {
    hits.iter().map(|h| h.matches.len()).sum()
}
