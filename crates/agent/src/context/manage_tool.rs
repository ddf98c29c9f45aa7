//! `context_manage`: the tool through which the model (or the governor,
//! proactively) frees space in the context window.

use async_trait::async_trait;
use ember_config::{ContextConfig, EvictionAction};
use ember_core::error::{ContextError, ToolError};
use ember_core::model::Model;
use ember_core::tool::{Tool, ToolFlags, ToolResult};
use ember_memory::SharedMemory;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use super::window::{EvictionReport, SharedWindow, SummaryDetail};

pub const TOOL_NAME: &str = "context_manage";

const MIN_KEEP_LAST_N: u64 = 5;
const MAX_KEEP_LAST_N: u64 = 50;

pub struct ContextManageTool {
    window: SharedWindow,
    memory: Option<SharedMemory>,
    model: Arc<dyn Model>,
    default_keep_last_n: usize,
    default_threshold: f32,
    protected_tail: usize,
}

impl ContextManageTool {
    pub fn new(window: SharedWindow, model: Arc<dyn Model>, config: &ContextConfig) -> Self {
        Self {
            window,
            memory: None,
            model,
            default_keep_last_n: config
                .default_keep_last_n
                .clamp(MIN_KEEP_LAST_N as usize, MAX_KEEP_LAST_N as usize),
            default_threshold: config.prune_threshold,
            protected_tail: config.protected_tail,
        }
    }

    /// Memory store receiving summaries. Without one `summarize_old` fails.
    pub fn with_memory(mut self, memory: SharedMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    fn parse_action(arguments: &Value) -> Result<EvictionAction, ToolError> {
        let raw = arguments
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'action' argument".into()))?;
        serde_json::from_value(Value::String(raw.trim().to_lowercase())).map_err(|_| {
            ToolError::InvalidArguments(format!(
                "unknown action '{raw}' (expected summarize_old, shift_window or prune_unimportant)"
            ))
        })
    }

    fn keep_last_n(&self, arguments: &Value) -> Result<usize, ToolError> {
        let Some(value) = arguments.get("keep_last_n_turns").filter(|v| !v.is_null()) else {
            return Ok(self.default_keep_last_n);
        };
        let n = value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("'keep_last_n_turns' must be an integer, got {value}"))
            })?;
        if !(MIN_KEEP_LAST_N..=MAX_KEEP_LAST_N).contains(&n) {
            return Err(ToolError::InvalidArguments(format!(
                "'keep_last_n_turns' must be between {MIN_KEEP_LAST_N} and {MAX_KEEP_LAST_N}, got {n}"
            )));
        }
        Ok(n as usize)
    }

    fn threshold(&self, arguments: &Value) -> Result<f32, ToolError> {
        let Some(value) = arguments.get("importance_threshold").filter(|v| !v.is_null()) else {
            return Ok(self.default_threshold);
        };
        let t = value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("'importance_threshold' must be a number, got {value}"))
            })?;
        if !(0.0..=1.0).contains(&t) {
            return Err(ToolError::InvalidArguments(format!(
                "'importance_threshold' must be within [0, 1], got {t}"
            )));
        }
        Ok(t as f32)
    }

    fn detail(arguments: &Value) -> Result<SummaryDetail, ToolError> {
        match arguments.get("summary_detail").and_then(Value::as_str) {
            None => Ok(SummaryDetail::default()),
            Some(s) => s
                .parse()
                .map_err(|e: ContextError| ToolError::InvalidArguments(e.to_string())),
        }
    }
}

fn report_data(success: bool, report: &EvictionReport) -> Value {
    json!({
        "success": success,
        "tokens_freed": report.tokens_freed,
        "turns_removed": report.turns_removed,
        "summary_stored": report.summary_memory_id.is_some(),
        "memory_id": report.summary_memory_id,
    })
}

#[async_trait]
impl Tool for ContextManageTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Free space in your context window when the conversation gets long. \
         summarize_old saves a summary of older turns to memory before dropping them, \
         shift_window drops older turns, prune_unimportant drops low-importance turns."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["summarize_old", "shift_window", "prune_unimportant"]
                },
                "keep_last_n_turns": {
                    "type": "integer",
                    "minimum": MIN_KEEP_LAST_N,
                    "maximum": MAX_KEEP_LAST_N,
                    "default": self.default_keep_last_n
                },
                "summary_detail": {
                    "type": "string",
                    "enum": ["brief", "moderate", "detailed"],
                    "default": "moderate"
                },
                "importance_threshold": {
                    "type": "number",
                    "default": self.default_threshold
                }
            },
            "required": ["action"]
        })
    }

    fn flags(&self) -> ToolFlags {
        ToolFlags {
            stateful: true,
            ..ToolFlags::default()
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let action = Self::parse_action(&arguments)?;

        let outcome = match action {
            EvictionAction::SummarizeOld => {
                let keep = self.keep_last_n(&arguments)?;
                let detail = Self::detail(&arguments)?;
                let Some(memory) = &self.memory else {
                    return Ok(ToolResult::failure("summarize_old needs a memory store")
                        .with_data(report_data(false, &EvictionReport::default())));
                };
                let mut window = self.window.lock().await;
                window.summarize_old(keep, detail, self.model.as_ref(), memory).await
            }
            EvictionAction::ShiftWindow => {
                let keep = self.keep_last_n(&arguments)?;
                self.window.lock().await.shift_window(keep)
            }
            EvictionAction::PruneUnimportant => {
                let threshold = self.threshold(&arguments)?;
                self.window.lock().await.prune_unimportant(threshold, self.protected_tail)
            }
        };

        match outcome {
            Ok(report) => {
                let mut output = format!(
                    "{}: removed {} turns, freed {} tokens.",
                    action.as_str(),
                    report.turns_removed,
                    report.tokens_freed
                );
                if let Some(id) = report.summary_memory_id {
                    output.push_str(&format!(" Summary stored as memory #{id}."));
                }
                Ok(ToolResult::ok(output).with_data(report_data(true, &report)))
            }
            Err(ContextError::InvalidArgument(reason)) => Err(ToolError::InvalidArguments(reason)),
            Err(e) => {
                warn!(action = action.as_str(), error = %e, "Context management failed");
                Ok(ToolResult::failure(format!("{} failed: {e}", action.as_str()))
                    .with_data(report_data(false, &EvictionReport::default())))
            }
        }
    }
}
