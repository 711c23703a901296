//! Reference resolution: map an engine's claimed `(file, line range)` back
//! to the exact stored lines.
//!
//! Resolution is best-effort. An unknown file leaves the reference
//! unresolved; out-of-range or inverted line numbers are clamped into the
//! file so that an excerpt is always produced for a known file.

use crate::models::{FileCorpus, Reference, ResolvedReference};

/// Range used when the engine gives neither a start nor an end line.
const DEFAULT_END_LINE: i64 = 10;

/// Resolve a single reference against `corpus`.
pub fn resolve_reference(corpus: &FileCorpus, reference: Reference) -> ResolvedReference {
    let Some(content) = corpus.get(&reference.file) else {
        tracing::debug!(file = %reference.file, "reference to unknown file left unresolved");
        return ResolvedReference::unresolved(reference);
    };

    let lines: Vec<&str> = content.split('\n').collect();
    let total = lines.len() as i64;

    // Zero is treated as "not given", matching how engines emit placeholders.
    let claimed_start = reference.start_line.filter(|&n| n != 0);
    let claimed_end = reference.end_line.filter(|&n| n != 0);

    let start = claimed_start.unwrap_or(1).max(1);
    let end = claimed_end
        .or(claimed_start)
        .unwrap_or(DEFAULT_END_LINE)
        .max(start);

    let start = start.min(total);
    let end = end.min(total);

    let excerpt = lines[(start - 1) as usize..end as usize]
        .iter()
        .map(|l| l.to_string())
        .collect();

    ResolvedReference {
        reference,
        lines: Some(excerpt),
        actual_start: Some(start as usize),
        actual_end: Some(end as usize),
    }
}

/// Resolve every reference, preserving order.
pub fn resolve_all(corpus: &FileCorpus, references: Vec<Reference>) -> Vec<ResolvedReference> {
    references
        .into_iter()
        .map(|r| resolve_reference(corpus, r))
        .collect()
}
