//! Memory store tool: lets the agent save facts, corrections and patterns.

use async_trait::async_trait;
use ember_core::error::{MemoryError, ToolError};
use ember_core::tool::{Tool, ToolFlags, ToolResult};
use ember_memory::SharedMemory;
use tracing::debug;

use crate::params;

const DEFAULT_IMPORTANCE: f64 = 0.5;

pub struct MemoryStoreTool {
    memory: SharedMemory,
}

impl MemoryStoreTool {
    pub fn new(memory: SharedMemory) -> Self {
        Self { memory }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Fact,
    Correction,
    Pattern,
}

impl Kind {
    fn parse(value: Option<&str>) -> Result<Self, ToolError> {
        match value.map(str::to_lowercase).as_deref() {
            None | Some("fact") => Ok(Self::Fact),
            Some("correction") => Ok(Self::Correction),
            Some("pattern") => Ok(Self::Pattern),
            Some(other) => Err(ToolError::InvalidArguments(format!(
                "unknown kind '{other}' (expected fact, correction or pattern)"
            ))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Correction => "correction",
            Self::Pattern => "pattern",
        }
    }
}

/// Tags arrive either as a JSON array or as one comma-separated string.
fn parse_tags(arguments: &serde_json::Value) -> Result<Vec<String>, ToolError> {
    match arguments.get("tags") {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::String(s)) => Ok(s.split(',').map(|t| t.trim().to_string()).collect()),
        Some(value @ serde_json::Value::Array(_)) => serde_json::from_value(value.clone())
            .map_err(|e| ToolError::InvalidArguments(format!("'tags' must be strings: {e}"))),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'tags' must be a list or a comma-separated string, got {other}"
        ))),
    }
}

#[async_trait]
impl Tool for MemoryStoreTool {
    fn name(&self) -> &str {
        "memory_store"
    }

    fn description(&self) -> &str {
        "Remember something for later. Use kind=\"correction\" when the user corrects you \
         and kind=\"pattern\" for an approach that worked."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "What to remember"
                },
                "kind": {
                    "type": "string",
                    "enum": ["fact", "correction", "pattern"],
                    "default": "fact"
                },
                "tags": {
                    "type": "string",
                    "description": "Comma-separated tags (facts only)"
                },
                "importance": {
                    "type": "number",
                    "description": "0.0 to 1.0 (facts only, default 0.5)"
                },
                "context": {
                    "type": "string",
                    "description": "What you got wrong (corrections only)"
                }
            },
            "required": ["text"]
        })
    }

    fn flags(&self) -> ToolFlags {
        ToolFlags {
            stateful: true,
            ..ToolFlags::default()
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = params::required_str(&arguments, "text")?;
        let kind = Kind::parse(params::optional_str(&arguments, "kind")?)?;

        let stored = {
            let mut memory = self.memory.lock().await;
            match kind {
                Kind::Fact => {
                    let tags = parse_tags(&arguments)?;
                    let importance =
                        params::optional_f64(&arguments, "importance")?.unwrap_or(DEFAULT_IMPORTANCE);
                    memory.add(text, &tags, importance as f32, false)
                }
                Kind::Correction => {
                    let context = params::optional_str(&arguments, "context")?;
                    memory.store_correction(text, context)
                }
                Kind::Pattern => memory.store_pattern(text),
            }
        };

        match stored {
            Ok(id) => {
                debug!(id, kind = kind.as_str(), "Memory stored by tool");
                Ok(ToolResult::ok(format!("Stored {} #{id}.", kind.as_str()))
                    .with_data(serde_json::json!({"id": id, "kind": kind.as_str()})))
            }
            Err(MemoryError::InvalidArgument(reason)) => Err(ToolError::InvalidArguments(reason)),
            Err(e) => Ok(ToolResult::failure(format!("Could not store memory: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_memory::{MemoryStore, SearchQuery};

    fn tool() -> (tempfile::TempDir, SharedMemory, MemoryStoreTool) {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(Some("tools"), dir.path()).unwrap().into_shared();
        let tool = MemoryStoreTool::new(memory.clone());
        (dir, memory, tool)
    }

    #[test]
    fn is_stateful() {
        let (_dir, _memory, tool) = tool();
        assert!(tool.flags().stateful);
        assert!(!tool.flags().deterministic);
    }

    #[tokio::test]
    async fn stores_fact_with_tags() {
        let (_dir, memory, tool) = tool();
        let result = tool
            .execute(serde_json::json!({
                "text": "Dentist appointment on Friday",
                "tags": "reminder, Important",
                "importance": "0.9"
            }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["kind"], "fact");

        let memory = memory.lock().await;
        let hits = memory.search(&SearchQuery::tag("important"));
        assert_eq!(hits.len(), 1);
        assert!((hits.hits[0].entry.importance - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn stores_correction_and_pattern() {
        let (_dir, memory, tool) = tool();
        tool.execute(serde_json::json!({
            "text": "Use Celsius",
            "kind": "correction",
            "context": "answered in Fahrenheit"
        }))
        .await
        .unwrap();
        tool.execute(serde_json::json!({"text": "Check memory first", "kind": "pattern"}))
            .await
            .unwrap();

        let memory = memory.lock().await;
        assert_eq!(memory.get_corrections(5).len(), 1);
        assert_eq!(memory.get_patterns(5).len(), 1);
    }

    #[tokio::test]
    async fn reserved_tag_is_invalid_argument() {
        let (_dir, _memory, tool) = tool();
        let result = tool
            .execute(serde_json::json!({"text": "sneaky", "tags": ["correction"]}))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let (_dir, _memory, tool) = tool();
        let result = tool
            .execute(serde_json::json!({"text": "x", "kind": "rumor"}))
            .await;
        assert!(result.is_err());
    }
}
