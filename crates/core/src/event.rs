//! Governor progress events.
//!
//! Events are delivered synchronously, in the order the governor changes
//! state, to an optional observer. Observers are never needed for
//! correctness; the governor behaves the same without one.

use serde::{Deserialize, Serialize};

/// How full the model state cache is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Ok,
    Warning,
    Critical,
}

/// Terminal status of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Confidence cleared the threshold with no further tool call
    Success,
    /// The model asked an open question
    NeedClarification,
    /// Iteration or time budget exhausted first
    Timeout,
    /// Unrecoverable failure (model error)
    Error,
    /// A confirmation-gated tool was declined
    UserDenied,
}

/// All events emitted by the governor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernorEvent {
    /// A new reasoning iteration begins.
    IterationStart { iteration: u32 },

    /// The model produced a response.
    Thinking {
        iteration: u32,
        confidence: f32,
        explicit: bool,
    },

    /// A tool is about to run.
    ToolCall {
        name: String,
        params: serde_json::Value,
        proactive: bool,
    },

    /// A tool finished successfully.
    ToolResult {
        name: String,
        output: String,
        duration_ms: u64,
    },

    /// A tool call failed, was unknown, malformed or declined.
    ToolError { name: String, error: String },

    /// The context window crossed into a warning or critical tier.
    ContextHealth { level: HealthLevel, occupied_fraction: f32 },

    /// The governor reached a terminal status.
    Finished {
        status: ExecutionStatus,
        iterations: u32,
        tool_calls_made: u32,
    },
}

impl GovernorEvent {
    /// Stable event name for logs and observers.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IterationStart { .. } => "iteration_start",
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ToolError { .. } => "tool_error",
            Self::ContextHealth { .. } => "context_health",
            Self::Finished { .. } => "finished",
        }
    }
}

/// Synchronous progress observer.
pub type ProgressCallback = Box<dyn Fn(&GovernorEvent) + Send + Sync>;
