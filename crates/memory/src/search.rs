//! Search queries and ranking.
//!
//! Text relevance is case-insensitive substring matching: the number of
//! occurrences, plus one when the entry starts with the query. Importance
//! breaks ties (weighted by half a match, so it never outranks a stronger
//! match on its own). Without a text query entries rank by importance, then
//! recency.

use ember_core::memory::{normalize_tags, MemoryEntry};
use serde::Serialize;
use std::cmp::Ordering;

/// Limit used when a query asks for `0` results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

const IMPORTANCE_WEIGHT: f32 = 0.5;

/// A memory search.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring to look for, matched as given
    /// (whitespace-only means none)
    pub text: Option<String>,

    /// Entries must carry every one of these tags
    pub tags: Vec<String>,

    /// Maximum hits returned (`0` = [`DEFAULT_SEARCH_LIMIT`])
    pub limit: usize,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tags: vec![tag.into()],
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn effective_limit(&self) -> usize {
        if self.limit == 0 { DEFAULT_SEARCH_LIMIT } else { self.limit }
    }

    pub(crate) fn normalized_tags(&self) -> Vec<String> {
        normalize_tags(&self.tags)
    }

    /// The lowercase text needle, spaces kept. Whitespace-only text counts
    /// as no text.
    pub(crate) fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_lowercase)
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry: MemoryEntry,
    pub score: f32,
}

/// Ranked hits plus the number of matches before truncation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total_matches: usize,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.total_matches > self.hits.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.hits.iter().map(|h| &h.entry)
    }
}

/// Match strength of `needle` (already lowercase) in `text`, `0` if absent.
pub(crate) fn match_strength(text: &str, needle: &str) -> u32 {
    let haystack = text.to_lowercase();
    let occurrences = haystack.matches(needle).count() as u32;
    if occurrences == 0 {
        return 0;
    }
    occurrences + u32::from(haystack.starts_with(needle))
}

/// Score and order candidates, then truncate to the query limit.
pub(crate) fn rank<'a>(
    candidates: impl Iterator<Item = &'a MemoryEntry>,
    query: &SearchQuery,
) -> SearchResults {
    let mut hits: Vec<SearchHit> = match query.needle() {
        Some(needle) => candidates
            .filter_map(|e| {
                let strength = match_strength(&e.text, &needle);
                (strength > 0).then(|| SearchHit {
                    score: strength as f32 + e.importance * IMPORTANCE_WEIGHT,
                    entry: e.clone(),
                })
            })
            .collect(),
        None => candidates
            .map(|e| SearchHit {
                score: e.importance,
                entry: e.clone(),
            })
            .collect(),
    };

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.entry.pinned.cmp(&a.entry.pinned))
            .then_with(|| b.entry.id.cmp(&a.entry.id))
    });

    let total_matches = hits.len();
    hits.truncate(query.effective_limit());
    SearchResults { hits, total_matches }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_counts_occurrences_case_insensitively() {
        assert_eq!(match_strength("Rust and rust and RUST", "rust"), 4);
        assert_eq!(match_strength("I like Rust", "rust"), 1);
        assert_eq!(match_strength("Python", "rust"), 0);
    }

    #[test]
    fn blank_text_is_no_text() {
        assert!(SearchQuery::text("   ").needle().is_none());
        assert_eq!(SearchQuery::text(" Tim").needle().as_deref(), Some(" tim"));
    }

    #[test]
    fn zero_limit_means_default() {
        assert_eq!(SearchQuery::default().effective_limit(), DEFAULT_SEARCH_LIMIT);
        assert_eq!(SearchQuery::default().with_limit(3).effective_limit(), 3);
    }
}
