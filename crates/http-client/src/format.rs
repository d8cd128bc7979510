//! Plain-text rendering of search and RAG results.

use crate::types::{ChunkResult, RagAnswer, SearchResults};

/// Truncate to at most `max` characters, appending `...` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Render one chunk as `"{n}. [Score: 0.873] text\n   Document: id"`.
#[must_use]
pub fn format_chunk(position: usize, chunk: &ChunkResult, max_text: usize) -> String {
    let score = chunk
        .score
        .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"));
    let document = chunk.document_id.as_deref().unwrap_or("unknown");
    format!(
        "{position}. [Score: {score}] {}\n   Document: {document}",
        truncate_chars(&chunk.text, max_text)
    )
}

/// Numbered listing of chunk hits, optionally capped at `limit` entries.
#[must_use]
pub fn format_search_results(results: &SearchResults, limit: Option<usize>) -> String {
    let chunks = &results.chunk_search_results;
    if chunks.is_empty() {
        return "No results found.".to_string();
    }
    chunks
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, chunk)| format_chunk(i + 1, chunk, 300))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Citation snippets (first 100 characters of each cited text).
#[must_use]
pub fn extract_citations(answer: &RagAnswer) -> Vec<String> {
    answer
        .citations
        .iter()
        .filter_map(|c| c.text.as_deref())
        .map(|text| truncate_chars(text, 100))
        .collect()
}
