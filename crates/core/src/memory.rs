//! Memory domain types: durable facts and the adaptive-learning seam.
//!
//! Entries are owned by the memory store (`ember-memory`). The tool registry
//! only sees the [`AdaptiveSource`] trait, which lets it inject learned
//! corrections and patterns into the system prompt without depending on the
//! storage crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag reserved for user corrections.
pub const CORRECTION_TAG: &str = "correction";

/// Tag reserved for successful patterns.
pub const PATTERN_TAG: &str = "pattern";

/// Tag carried by conversation summaries produced by context eviction.
pub const SUMMARY_TAG: &str = "summary";

/// What kind of fact an entry records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    #[default]
    Plain,
    /// A user correction ("no, I meant Celsius")
    Correction,
    /// An approach that worked and should be repeated
    Pattern,
}

/// A single memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Monotonic id, unique within one store
    pub id: u64,

    /// The remembered text
    pub text: String,

    /// Normalized tags (lowercase, deduplicated, sorted)
    #[serde(default)]
    pub tags: Vec<String>,

    /// Importance in [0, 1]
    pub importance: f32,

    /// When this entry was created
    pub created_at: DateTime<Utc>,

    /// Plain fact, correction or pattern
    #[serde(default)]
    pub category: MemoryCategory,

    /// Pinned entries win ranking ties
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
}

impl MemoryEntry {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Normalize a tag list: trim, lowercase, drop empties, dedupe, sort.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Source of learned preferences injected into the system prompt.
///
/// Both methods return statements most-recent-first.
pub trait AdaptiveSource {
    fn corrections(&self, limit: usize) -> Vec<String>;

    fn patterns(&self, limit: usize) -> Vec<String>;
}
