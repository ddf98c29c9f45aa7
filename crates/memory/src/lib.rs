//! Durable session memory for Ember.
//!
//! A [`MemoryStore`] keeps facts, user corrections and successful patterns
//! for one session, indexed by id and by tag, backed by an append-only
//! JSONL log under the storage root.

pub mod export;
pub mod log;
pub mod search;
pub mod store;

pub use export::ExportFormat;
pub use search::{SearchHit, SearchQuery, SearchResults, DEFAULT_SEARCH_LIMIT};
pub use store::{MemoryStore, SharedMemory, CORRECTION_IMPORTANCE, PATTERN_IMPORTANCE};
