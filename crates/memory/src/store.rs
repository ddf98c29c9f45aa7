//! The session-scoped memory store.
//!
//! Entries live in an id index (`HashMap<u64, MemoryEntry>`) and a tag index
//! (`HashMap<tag, BTreeSet<id>>`). Every mutation writes the session log
//! first and only then touches both indices, so a failed write leaves the
//! in-memory state unchanged and every (id, tag) pair is reachable through
//! both indices or through neither.

use chrono::{DateTime, Utc};
use ember_core::error::MemoryError;
use ember_core::memory::{
    AdaptiveSource, MemoryCategory, MemoryEntry, CORRECTION_TAG, PATTERN_TAG, normalize_tags,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::log::{self, SessionLog};
use crate::search::{self, SearchQuery, SearchResults};

/// Importance assigned to every correction.
pub const CORRECTION_IMPORTANCE: f32 = 0.99;

/// Importance assigned to every pattern.
pub const PATTERN_IMPORTANCE: f32 = 0.9;

/// A memory store shared between a governor session and its tools.
pub type SharedMemory = Arc<Mutex<MemoryStore>>;

/// Durable, hash-indexed fact store for one session.
pub struct MemoryStore {
    session_id: String,
    root: PathBuf,
    log: SessionLog,
    entries: HashMap<u64, MemoryEntry>,
    tag_index: HashMap<String, BTreeSet<u64>>,
    next_id: u64,
    total_stored: u64,
}

impl MemoryStore {
    /// Open the store for `session_id` under `storage_root`, replaying its
    /// log. A missing session id is generated.
    pub fn open(session_id: Option<&str>, storage_root: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let root = storage_root.into();
        let session_id = match session_id {
            Some(id) => {
                log::validate_session_id(id)?;
                id.to_string()
            }
            None => log::generate_session_id(),
        };

        let (log, existing) = SessionLog::open(&root, &session_id)?;
        let mut store = Self {
            session_id,
            root,
            log,
            entries: HashMap::new(),
            tag_index: HashMap::new(),
            next_id: 1,
            total_stored: 0,
        };
        for entry in existing {
            store.next_id = store.next_id.max(entry.id + 1);
            store.index(entry);
        }
        store.total_stored = store.entries.len() as u64;

        info!(
            session = %store.session_id,
            entries = store.entries.len(),
            root = %store.root.display(),
            "Memory store opened"
        );
        Ok(store)
    }

    /// Wrap the store for sharing with tools.
    pub fn into_shared(self) -> SharedMemory {
        Arc::new(Mutex::new(self))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn storage_root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries stored through this handle's lifetime, including replayed ones.
    pub fn total_stored(&self) -> u64 {
        self.total_stored
    }

    /// Store a plain fact. The `correction` and `pattern` tags are reserved.
    pub fn add<S: AsRef<str>>(
        &mut self,
        text: &str,
        tags: &[S],
        importance: f32,
        pinned: bool,
    ) -> Result<u64, MemoryError> {
        let tags = normalize_tags(tags);
        if let Some(reserved) = tags.iter().find(|t| *t == CORRECTION_TAG || *t == PATTERN_TAG) {
            return Err(MemoryError::InvalidArgument(format!(
                "tag '{reserved}' is reserved; use store_correction / store_pattern"
            )));
        }
        self.insert(text, tags, importance, MemoryCategory::Plain, pinned, Utc::now())
    }

    /// Record a user correction (importance fixed at 0.99).
    pub fn store_correction(
        &mut self,
        statement: &str,
        mistake_context: Option<&str>,
    ) -> Result<u64, MemoryError> {
        let text = match mistake_context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("{} (mistake: {context})", statement.trim()),
            None => statement.to_string(),
        };
        self.insert(
            &text,
            vec![CORRECTION_TAG.to_string()],
            CORRECTION_IMPORTANCE,
            MemoryCategory::Correction,
            false,
            Utc::now(),
        )
    }

    /// Record an approach that worked.
    pub fn store_pattern(&mut self, statement: &str) -> Result<u64, MemoryError> {
        self.insert(
            statement,
            vec![PATTERN_TAG.to_string()],
            PATTERN_IMPORTANCE,
            MemoryCategory::Pattern,
            false,
            Utc::now(),
        )
    }

    pub(crate) fn insert(
        &mut self,
        text: &str,
        tags: Vec<String>,
        importance: f32,
        category: MemoryCategory,
        pinned: bool,
        created_at: DateTime<Utc>,
    ) -> Result<u64, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::InvalidArgument("memory text is empty".into()));
        }
        if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
            return Err(MemoryError::InvalidArgument(format!(
                "importance {importance} is outside [0, 1]"
            )));
        }

        let entry = MemoryEntry {
            id: self.next_id,
            text: text.to_string(),
            tags,
            importance,
            created_at,
            category,
            pinned,
        };

        // durable first: a failed append must not leave indexed entries behind
        self.log.append(&entry)?;

        let id = entry.id;
        debug!(id, category = ?entry.category, tags = ?entry.tags, "Memory stored");
        self.index(entry);
        self.next_id += 1;
        self.total_stored += 1;
        Ok(id)
    }

    fn index(&mut self, entry: MemoryEntry) {
        for tag in &entry.tags {
            self.tag_index.entry(tag.clone()).or_default().insert(entry.id);
        }
        self.entries.insert(entry.id, entry);
    }

    pub fn get_by_id(&self, id: u64) -> Result<&MemoryEntry, MemoryError> {
        self.entries.get(&id).ok_or(MemoryError::NotFound(id))
    }

    /// Search by text and/or tags. See [`crate::search`] for ranking.
    pub fn search(&self, query: &SearchQuery) -> SearchResults {
        let tags = query.normalized_tags();
        if tags.is_empty() {
            return search::rank(self.entries.values(), query);
        }

        let ids = self.intersect_tags(&tags);
        search::rank(ids.iter().filter_map(|id| self.entries.get(id)), query)
    }

    fn intersect_tags(&self, tags: &[String]) -> BTreeSet<u64> {
        let mut sets: Vec<&BTreeSet<u64>> = Vec::with_capacity(tags.len());
        for tag in tags {
            match self.tag_index.get(tag) {
                Some(set) => sets.push(set),
                None => return BTreeSet::new(),
            }
        }
        sets.sort_by_key(|s| s.len());
        let Some((smallest, rest)) = sets.split_first() else {
            return BTreeSet::new();
        };
        smallest
            .iter()
            .copied()
            .filter(|id| rest.iter().all(|s| s.contains(id)))
            .collect()
    }

    /// Most recent corrections first.
    pub fn get_corrections(&self, limit: usize) -> Vec<&MemoryEntry> {
        self.by_category(CORRECTION_TAG, MemoryCategory::Correction, limit)
    }

    /// Most recent patterns first.
    pub fn get_patterns(&self, limit: usize) -> Vec<&MemoryEntry> {
        self.by_category(PATTERN_TAG, MemoryCategory::Pattern, limit)
    }

    fn by_category(&self, tag: &str, category: MemoryCategory, limit: usize) -> Vec<&MemoryEntry> {
        let Some(ids) = self.tag_index.get(tag) else {
            return Vec::new();
        };
        ids.iter()
            .rev()
            .filter_map(|id| self.entries.get(id))
            .filter(|e| e.category == category)
            .take(limit)
            .collect()
    }

    /// All entries ordered by id.
    pub fn entries(&self) -> Vec<&MemoryEntry> {
        let mut all: Vec<&MemoryEntry> = self.entries.values().collect();
        all.sort_by_key(|e| e.id);
        all
    }

    /// Tag → number of entries carrying it.
    pub fn tags(&self) -> BTreeMap<&str, usize> {
        self.tag_index
            .iter()
            .map(|(tag, ids)| (tag.as_str(), ids.len()))
            .collect()
    }

    /// Move every other session's log into `<root>/archive/`.
    pub fn archive_sessions(&self) -> Result<usize, MemoryError> {
        log::archive_sessions(&self.root, &self.session_id)
    }

    /// Flush the log and drop the indices. Persisted files are kept.
    pub fn close(mut self) -> Result<(), MemoryError> {
        self.log.sync()?;
        self.entries.clear();
        self.tag_index.clear();
        info!(session = %self.session_id, "Memory store closed");
        Ok(())
    }
}

impl AdaptiveSource for MemoryStore {
    fn corrections(&self, limit: usize) -> Vec<String> {
        self.get_corrections(limit).into_iter().map(|e| e.text.clone()).collect()
    }

    fn patterns(&self, limit: usize) -> Vec<String> {
        self.get_patterns(limit).into_iter().map(|e| e.text.clone()).collect()
    }
}
