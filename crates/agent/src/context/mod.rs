//! Context window bookkeeping.
//!
//! The model's KV cache is a strip of token positions: the system prompt
//! occupies `[0, system_prompt_end)` and every turn after it occupies one
//! contiguous span. The manager ledgers those spans, reports how full the
//! cache is, and evicts old turns on request.

pub mod manage_tool;
pub mod token;
pub mod window;

pub use manage_tool::ContextManageTool;
pub use token::{estimate_tokens, span_tokens};
pub use window::{
    ContextWindowManager, ConversationTurn, EvictionReport, SharedWindow, SummaryDetail, WindowHealth,
};
