//! The Ember governor and its context window.
//!
//! The governor runs bounded think / act cycles against a local [`Model`]:
//!
//! 1. **Render** the prompt (system prompt + live turns) through the chat template
//! 2. **Generate** a response and parse `TOOL_CALL:` directives and a `CONFIDENCE:` tag
//! 3. **Dispatch** tools, ledger their results and loop back to step 1
//! 4. **Finish** once the answer is confident, a clarifying question, or the budget runs out
//!
//! Every turn is ledgered by the [`ContextWindowManager`], which reports
//! health and evicts old turns (optionally summarizing them into memory)
//! through the `context_manage` tool.
//!
//! [`Model`]: ember_core::model::Model

pub mod context;
pub mod directive;
pub mod governor;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    estimate_tokens, ContextManageTool, ContextWindowManager, ConversationTurn, EvictionReport,
    SharedWindow, SummaryDetail, WindowHealth,
};
pub use directive::{parse_response, ParsedResponse, ToolDirective};
pub use governor::{ConfidenceMetrics, ConfirmationHook, GovernorOutcome, GovernorSession, GovernorState};
