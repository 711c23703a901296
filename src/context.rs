//! Context assembly: serialize the corpus into one character-budgeted string.
//!
//! Files are emitted in corpus insertion order as
//!
//! ```text
//!
//!
//! ### FILE: src/app.py (42 lines)
//! <content>
//! ```
//!
//! When the next block would overflow the budget, the remaining budget
//! (minus the header and a 100-character reserve) decides whether a
//! truncated prefix of that file is still worth sending (> 200 characters)
//! or whether assembly stops outright. Nothing after the cutoff file is
//! included either way, so earlier files are privileged.
//!
//! All lengths are counted in characters, not bytes.

use crate::models::FileCorpus;

/// Characters held back from the budget when truncating a file.
pub const TRUNCATION_RESERVE: i64 = 100;

/// Smallest truncated prefix worth sending.
pub const MIN_TRUNCATED_CHARS: i64 = 200;

/// Appended after a truncated file.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

fn header(path: &str, content: &str) -> String {
    let line_count = content.split('\n').count();
    format!("\n\n### FILE: {} ({} lines)\n", path, line_count)
}

/// Build the context window for `corpus` within `max_chars` characters.
///
/// The output never exceeds `max_chars` plus one header and one marker.
pub fn build_context(corpus: &FileCorpus, max_chars: usize) -> String {
    let max_chars = max_chars as i64;
    let mut context = String::new();
    let mut used: i64 = 0;

    for (path, content) in corpus.iter() {
        let header = header(path, content);
        let header_len = header.chars().count() as i64;
        let content_len = content.chars().count() as i64;
        let entry_len = header_len + content_len;

        if used + entry_len > max_chars {
            let remaining = max_chars - used - header_len - TRUNCATION_RESERVE;
            if remaining > MIN_TRUNCATED_CHARS {
                context.push_str(&header);
                context.extend(content.chars().take(remaining as usize));
                context.push_str(TRUNCATION_MARKER);
            }
            break;
        }

        context.push_str(&header);
        context.push_str(content);
        used += entry_len;
    }

    context
}

/// The first `limit` corpus paths, sent to the engine as the list of files
/// it may reference.
pub fn file_manifest(corpus: &FileCorpus, limit: usize) -> Vec<String> {
    corpus.paths().take(limit).map(str::to_string).collect()
}
