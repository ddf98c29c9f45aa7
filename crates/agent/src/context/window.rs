//! Context window manager: the per-turn position ledger of the model's
//! state cache.
//!
//! The cache is a single run of token positions. The system prompt occupies
//! the fixed span `[0, system_prompt_end)` and is never evicted; every
//! conversation turn after it owns an inclusive span directly following the
//! previous one. Eviction removes turns from the ledger but never moves the
//! survivors, so the cursor only grows and the tokens of evicted turns are
//! counted as reclaimed.
//!
//! # Eviction strategies
//!
//! | Action | Selects | Side effect |
//! |--------|---------|-------------|
//! | `summarize_old` | all but the last `keep_last_n` turns | summary stored in memory (tag `summary`) |
//! | `shift_window` | all but the last `keep_last_n` turns | none |
//! | `prune_unimportant` | turns below a threshold outside the protected tail | none |

use chrono::{DateTime, Utc};
use ember_config::ContextConfig;
use ember_core::error::{ContextError, ModelError};
use ember_core::event::HealthLevel;
use ember_core::memory::SUMMARY_TAG;
use ember_core::model::{GenerationRequest, Model};
use ember_memory::SharedMemory;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Maximum characters kept from a turn's text.
pub const PREVIEW_CHARS: usize = 80;

/// Importance of stored conversation summaries.
const SUMMARY_IMPORTANCE: f32 = 0.7;

/// A window shared between a governor session and its `context_manage` tool.
pub type SharedWindow = Arc<Mutex<ContextWindowManager>>;

// ── Data Structures ───────────────────────────────────────────────────────

/// One recorded turn and the cache positions it occupies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Contiguous from 1; renumbered after eviction.
    pub turn_number: u32,
    pub is_user: bool,
    /// First cache position (inclusive).
    pub start: u32,
    /// Last cache position (inclusive).
    pub end: u32,
    pub importance: f32,
    pub timestamp: DateTime<Utc>,
    pub preview: String,
}

impl ConversationTurn {
    pub fn tokens(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, position: u32) -> bool {
        (self.start..=self.end).contains(&position)
    }
}

/// Snapshot of window occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowHealth {
    pub occupied_tokens: u32,
    pub capacity: u32,
    pub occupied_fraction: f32,
    pub level: HealthLevel,
}

/// How much detail a conversation summary keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryDetail {
    Brief,
    #[default]
    Moderate,
    Detailed,
}

impl SummaryDetail {
    /// Token budget handed to the model for the summary.
    pub fn token_budget(&self) -> u32 {
        match self {
            Self::Brief => 64,
            Self::Moderate => 160,
            Self::Detailed => 320,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Moderate => "moderate",
            Self::Detailed => "detailed",
        }
    }
}

impl FromStr for SummaryDetail {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "brief" => Ok(Self::Brief),
            "moderate" => Ok(Self::Moderate),
            "detailed" => Ok(Self::Detailed),
            other => Err(ContextError::InvalidArgument(format!(
                "unknown summary detail '{other}' (expected brief, moderate or detailed)"
            ))),
        }
    }
}

/// Outcome of one eviction action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub tokens_freed: u32,
    pub turns_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_memory_id: Option<u64>,
}

// ── Manager ───────────────────────────────────────────────────────────────

pub struct ContextWindowManager {
    capacity: u32,
    warning_threshold: f32,
    critical_threshold: f32,
    turns: Vec<ConversationTurn>,
    system_prompt_end: u32,
    current_position: u32,
    reclaimed: u32,
}

impl ContextWindowManager {
    /// Create a manager for a cache of `capacity` tokens with the default
    /// health thresholds.
    pub fn new(capacity: u32) -> Self {
        let defaults = ContextConfig::default();
        Self {
            capacity: capacity.max(1),
            warning_threshold: defaults.warning_threshold,
            critical_threshold: defaults.critical_threshold,
            turns: Vec::new(),
            system_prompt_end: 0,
            current_position: 0,
            reclaimed: 0,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.capacity).with_thresholds(config.warning_threshold, config.critical_threshold)
    }

    pub fn with_thresholds(mut self, warning: f32, critical: f32) -> Self {
        self.warning_threshold = warning;
        self.critical_threshold = critical;
        self
    }

    pub fn into_shared(self) -> SharedWindow {
        Arc::new(Mutex::new(self))
    }

    /// Fix the system prompt span to `[0, tokens)`. Only allowed while no
    /// turn has been recorded.
    pub fn set_system_prompt_span(&mut self, tokens: u32) -> Result<(), ContextError> {
        if !self.turns.is_empty() || self.current_position != self.system_prompt_end {
            return Err(ContextError::InvalidArgument(
                "system prompt span is fixed once turns are recorded".into(),
            ));
        }
        self.system_prompt_end = tokens;
        self.current_position = tokens;
        debug!(tokens, "System prompt span set");
        Ok(())
    }

    /// Record a turn occupying `span`. The span must start right at the
    /// cursor, i.e. one past the previous turn (or the system prompt).
    pub fn append_turn(
        &mut self,
        is_user: bool,
        preview: &str,
        span: RangeInclusive<u32>,
        importance: f32,
    ) -> Result<u32, ContextError> {
        let (start, end) = (*span.start(), *span.end());
        if start > end {
            return Err(ContextError::InvalidArgument(format!(
                "inverted span [{start}, {end}]"
            )));
        }
        if start != self.current_position {
            return Err(ContextError::InvalidArgument(format!(
                "span [{start}, {end}] must start at position {}",
                self.current_position
            )));
        }
        if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
            return Err(ContextError::InvalidArgument(format!(
                "importance {importance} is outside [0, 1]"
            )));
        }

        let turn_number = self.turns.len() as u32 + 1;
        self.turns.push(ConversationTurn {
            turn_number,
            is_user,
            start,
            end,
            importance,
            timestamp: Utc::now(),
            preview: clip_preview(preview),
        });
        self.current_position = end + 1;
        Ok(turn_number)
    }

    /// Record a turn of `tokens` positions at the cursor.
    pub fn append_tokens(
        &mut self,
        is_user: bool,
        preview: &str,
        tokens: u32,
        importance: f32,
    ) -> Result<u32, ContextError> {
        if tokens == 0 {
            return Err(ContextError::InvalidArgument("a turn needs at least one token".into()));
        }
        let start = self.current_position;
        self.append_turn(is_user, preview, start..=start + tokens - 1, importance)
    }

    pub fn health(&self) -> WindowHealth {
        let occupied_tokens = self
            .current_position
            .saturating_sub(self.system_prompt_end)
            .saturating_sub(self.reclaimed);
        let occupied_fraction = occupied_tokens as f32 / self.capacity as f32;
        let level = if occupied_fraction >= self.critical_threshold {
            HealthLevel::Critical
        } else if occupied_fraction >= self.warning_threshold {
            HealthLevel::Warning
        } else {
            HealthLevel::Ok
        };
        WindowHealth {
            occupied_tokens,
            capacity: self.capacity,
            occupied_fraction,
            level,
        }
    }

    /// Tokens held by live turns.
    pub fn total_tokens(&self) -> u32 {
        self.turns.iter().map(ConversationTurn::tokens).sum()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn current_position(&self) -> u32 {
        self.current_position
    }

    pub fn system_prompt_end(&self) -> u32 {
        self.system_prompt_end
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether `position` is held by the system prompt or a live turn.
    pub fn contains_position(&self, position: u32) -> bool {
        if position < self.system_prompt_end {
            return true;
        }
        self.turns
            .binary_search_by(|t| {
                if t.end < position {
                    std::cmp::Ordering::Less
                } else if t.start > position {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    // ── Eviction ──────────────────────────────────────────────────────────

    /// Summarize every turn except the last `keep_last_n`, store the summary
    /// in memory, then evict them. Nothing is evicted if the model or the
    /// store fails.
    pub async fn summarize_old(
        &mut self,
        keep_last_n: usize,
        detail: SummaryDetail,
        model: &dyn Model,
        memory: &SharedMemory,
    ) -> Result<EvictionReport, ContextError> {
        let count = self.oldest_eligible(keep_last_n)?;

        let mut transcript = String::new();
        for turn in &self.turns[..count] {
            let speaker = if turn.is_user { "User" } else { "Assistant" };
            let _ = writeln!(transcript, "{speaker}: {}", turn.preview);
        }
        let budget = detail.token_budget();
        let prompt = format!(
            "Summarize the conversation below in at most {budget} tokens. \
             Keep names, facts and decisions.\n\n{transcript}\nSummary:"
        );

        let generation = model.generate(GenerationRequest::new(prompt, budget)).await?;
        let summary = generation.text.trim();
        if summary.is_empty() {
            return Err(ModelError::Generation("model returned an empty summary".into()).into());
        }

        let memory_id = memory.lock().await.add(
            &format!("Conversation summary: {summary}"),
            &[SUMMARY_TAG],
            SUMMARY_IMPORTANCE,
            false,
        )?;

        let mut report = self.evict(|index, _| index < count);
        report.summary_memory_id = Some(memory_id);
        info!(
            turns = report.turns_removed,
            tokens = report.tokens_freed,
            memory_id,
            detail = detail.as_str(),
            "Summarized old turns"
        );
        Ok(report)
    }

    /// Drop every turn except the last `keep_last_n`.
    pub fn shift_window(&mut self, keep_last_n: usize) -> Result<EvictionReport, ContextError> {
        let count = self.oldest_eligible(keep_last_n)?;
        let report = self.evict(|index, _| index < count);
        info!(turns = report.turns_removed, tokens = report.tokens_freed, "Shifted window");
        Ok(report)
    }

    /// Drop turns with importance below `threshold`, never touching the last
    /// `protected_tail` turns.
    pub fn prune_unimportant(
        &mut self,
        threshold: f32,
        protected_tail: usize,
    ) -> Result<EvictionReport, ContextError> {
        let eligible = self.turns.len().saturating_sub(protected_tail);
        if !self.turns[..eligible].iter().any(|t| t.importance < threshold) {
            return Err(ContextError::Eviction(format!(
                "no turn below importance {threshold} outside the last {protected_tail}"
            )));
        }
        let report = self.evict(|index, turn| index < eligible && turn.importance < threshold);
        info!(
            turns = report.turns_removed,
            tokens = report.tokens_freed,
            threshold,
            "Pruned unimportant turns"
        );
        Ok(report)
    }

    /// Number of leading turns eligible when keeping the last `keep_last_n`.
    fn oldest_eligible(&self, keep_last_n: usize) -> Result<usize, ContextError> {
        if self.turns.len() <= keep_last_n {
            return Err(ContextError::Eviction(format!(
                "{} turns recorded, need more than {keep_last_n} to evict",
                self.turns.len()
            )));
        }
        Ok(self.turns.len() - keep_last_n)
    }

    fn evict(&mut self, mut selected: impl FnMut(usize, &ConversationTurn) -> bool) -> EvictionReport {
        let mut report = EvictionReport::default();
        let mut index = 0;
        self.turns.retain(|turn| {
            let evict = selected(index, turn);
            index += 1;
            if evict {
                report.tokens_freed += turn.tokens();
                report.turns_removed += 1;
            }
            !evict
        });
        for (n, turn) in self.turns.iter_mut().enumerate() {
            turn.turn_number = n as u32 + 1;
        }
        self.reclaimed += report.tokens_freed;
        report
    }
}

fn clip_preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        flat.chars().take(PREVIEW_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedModel;
    use ember_memory::{MemoryStore, SearchQuery};

    /// System prompt `[0, 99]`, then `n` user/assistant turns of 10 tokens.
    fn window_with_turns(n: u32) -> ContextWindowManager {
        let mut window = ContextWindowManager::new(4096);
        window.set_system_prompt_span(100).unwrap();
        for i in 0..n {
            let importance = if i % 2 == 0 { 0.9 } else { 0.3 };
            window
                .append_tokens(i % 2 == 0, &format!("turn {}", i + 1), 10, importance)
                .unwrap();
        }
        window
    }

    fn assert_ledger_invariants(window: &ContextWindowManager) {
        for (i, turn) in window.turns().iter().enumerate() {
            assert_eq!(turn.turn_number, i as u32 + 1);
            assert!(turn.start <= turn.end);
            assert!(turn.start >= window.system_prompt_end());
        }
        for pair in window.turns().windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn append_and_shift_window() {
        let mut window = ContextWindowManager::new(4096);
        window.set_system_prompt_span(100).unwrap();
        assert_eq!(window.append_turn(true, "hi", 100..=149, 0.8).unwrap(), 1);
        assert_eq!(window.append_turn(false, "hello", 150..=249, 0.5).unwrap(), 2);
        assert_eq!(window.total_tokens(), 150);

        let report = window.shift_window(0).unwrap();
        assert_eq!(report.turns_removed, 2);
        assert_eq!(report.tokens_freed, 150);
        assert_eq!(window.turn_count(), 0);
        assert_eq!(window.health().occupied_tokens, 0);
        // the cursor does not move back
        assert_eq!(window.current_position(), 250);
    }

    #[test]
    fn rejects_gaps_overlaps_and_inverted_spans() {
        let mut window = ContextWindowManager::new(4096);
        window.set_system_prompt_span(100).unwrap();
        assert!(window.append_turn(true, "gap", 101..=110, 0.5).is_err());
        window.append_turn(true, "ok", 100..=110, 0.5).unwrap();
        assert!(window.append_turn(true, "overlap", 110..=120, 0.5).is_err());
        #[allow(clippy::reversed_empty_ranges)]
        let inverted = 120..=111;
        assert!(window.append_turn(true, "inverted", inverted, 0.5).is_err());
        assert!(window.append_turn(true, "bad importance", 111..=120, 1.5).is_err());
        assert_eq!(window.turn_count(), 1);
    }

    #[test]
    fn system_prompt_span_is_fixed_once_turns_exist() {
        let mut window = window_with_turns(1);
        assert!(window.set_system_prompt_span(50).is_err());
        assert!(window.contains_position(0));
        assert!(window.contains_position(99));
        assert!(window.contains_position(105));
        assert!(!window.contains_position(110));
    }

    #[test]
    fn preview_is_clipped() {
        let mut window = ContextWindowManager::new(4096);
        let long = "word ".repeat(100);
        window.append_tokens(true, &long, 5, 0.5).unwrap();
        assert_eq!(window.turns()[0].preview.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn health_levels_follow_thresholds() {
        let mut window = ContextWindowManager::new(100);
        window.append_tokens(true, "a", 79, 0.5).unwrap();
        assert_eq!(window.health().level, HealthLevel::Ok);
        window.append_tokens(false, "b", 1, 0.5).unwrap();
        assert_eq!(window.health().level, HealthLevel::Warning);
        window.append_tokens(true, "c", 15, 0.5).unwrap();
        let health = window.health();
        assert_eq!(health.level, HealthLevel::Critical);
        assert!((health.occupied_fraction - 0.95).abs() < 1e-6);
    }

    #[test]
    fn system_prompt_does_not_count_as_occupied() {
        let window = window_with_turns(2);
        assert_eq!(window.health().occupied_tokens, 20);
        assert_eq!(window.total_tokens(), 20);
    }

    #[test]
    fn shift_window_keeps_tail_and_positions() {
        let mut window = window_with_turns(12);
        let kept_start = window.turns()[2].start;

        let report = window.shift_window(10).unwrap();
        assert_eq!(report.turns_removed, 2);
        assert_eq!(report.tokens_freed, 20);
        assert_eq!(window.turn_count(), 10);
        assert_eq!(window.turns()[0].start, kept_start);
        assert_eq!(window.turns()[0].preview, "turn 3");
        assert_eq!(window.health().occupied_tokens, 100);
        assert!(!window.contains_position(100));
        assert_ledger_invariants(&window);

        // appends continue after the old cursor
        let next = window.append_tokens(true, "next", 5, 0.5).unwrap();
        assert_eq!(next, 11);
        assert_ledger_invariants(&window);
    }

    #[test]
    fn shift_window_needs_enough_turns() {
        let mut window = window_with_turns(10);
        let err = window.shift_window(10).unwrap_err();
        assert!(matches!(err, ContextError::Eviction(_)));
        assert_eq!(window.turn_count(), 10);
    }

    #[test]
    fn prune_respects_threshold_and_tail() {
        let mut window = window_with_turns(8);
        // turns 2, 4, 6 and 8 have importance 0.3
        let report = window.prune_unimportant(0.5, 3).unwrap();
        assert_eq!(report.turns_removed, 2);
        assert!(
            window.turns()[..window.turn_count() - 3]
                .iter()
                .all(|t| t.importance >= 0.5)
        );
        let previews: Vec<&str> = window.turns().iter().map(|t| t.preview.as_str()).collect();
        assert_eq!(previews, vec!["turn 1", "turn 3", "turn 5", "turn 6", "turn 7", "turn 8"]);
        assert_ledger_invariants(&window);
    }

    #[test]
    fn prune_with_nothing_below_threshold_fails() {
        let mut window = window_with_turns(6);
        let err = window.prune_unimportant(0.1, 2).unwrap_err();
        assert!(matches!(err, ContextError::Eviction(_)));
        assert_eq!(window.turn_count(), 6);
    }

    #[tokio::test]
    async fn summarize_old_stores_summary_then_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(Some("window"), dir.path()).unwrap().into_shared();
        let model = ScriptedModel::new(["The user introduced themselves as Tim."]);
        let mut window = window_with_turns(12);

        let report = window
            .summarize_old(5, SummaryDetail::Brief, &model, &memory)
            .await
            .unwrap();
        assert_eq!(report.turns_removed, 7);
        assert_eq!(report.tokens_freed, 70);
        assert_eq!(window.turn_count(), 5);
        assert_ledger_invariants(&window);

        let id = report.summary_memory_id.unwrap();
        let store = memory.lock().await;
        let entry = store.get_by_id(id).unwrap();
        assert!(entry.text.contains("Tim"));
        assert!(entry.has_tag(SUMMARY_TAG));
        assert_eq!(store.search(&SearchQuery::tag(SUMMARY_TAG)).len(), 1);

        let request = model.requests().remove(0);
        assert_eq!(request.max_tokens, 64);
        assert!(request.prompt.contains("User: turn 1"));
        assert!(!request.prompt.contains("turn 8"));
    }

    #[tokio::test]
    async fn failed_summary_evicts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(Some("window"), dir.path()).unwrap().into_shared();
        let model = ScriptedModel::failing();
        let mut window = window_with_turns(12);

        let err = window
            .summarize_old(10, SummaryDetail::Moderate, &model, &memory)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Summarization(_)));
        assert_eq!(window.turn_count(), 12);
        assert!(memory.lock().await.is_empty());
    }

    #[test]
    fn detail_budgets() {
        assert_eq!("brief".parse::<SummaryDetail>().unwrap().token_budget(), 64);
        assert_eq!(SummaryDetail::default().token_budget(), 160);
        assert_eq!(SummaryDetail::Detailed.token_budget(), 320);
        assert!("verbose".parse::<SummaryDetail>().is_err());
    }
}
