//! Memory search tool: lets the agent look up what it has been told before.
//!
//! Delegates to [`MemoryStore::search`] through the session's shared handle;
//! the lock is held only for the duration of the lookup.

use async_trait::async_trait;
use ember_core::error::ToolError;
use ember_core::tool::{Tool, ToolResult};
use ember_memory::{SearchQuery, SharedMemory};
use serde::Serialize;

use crate::params;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 50;

/// A tool that searches the session's memory store.
pub struct MemorySearchTool {
    memory: SharedMemory,
}

impl MemorySearchTool {
    pub fn new(memory: SharedMemory) -> Self {
        Self { memory }
    }
}

#[derive(Serialize)]
struct MemoryResult {
    id: u64,
    text: String,
    tags: Vec<String>,
    importance: f32,
    score: f32,
    created_at: String,
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search your memory for facts, corrections and notes the user gave you earlier. \
         Use this before answering questions about the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text to look for (case-insensitive)"
                },
                "tag": {
                    "type": "string",
                    "description": "Only return memories with this tag"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of memories to return (default 5)",
                    "default": DEFAULT_LIMIT
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        // validated trimmed, searched as written
        let text = params::optional_str(&arguments, "query")?
            .and(arguments.get("query").and_then(serde_json::Value::as_str));
        let tag = params::optional_str(&arguments, "tag")?;
        if text.is_none() && tag.is_none() {
            return Err(ToolError::InvalidArguments(
                "memory_search needs a 'query' or a 'tag'".into(),
            ));
        }
        let limit = params::optional_u64(&arguments, "limit")?
            .map_or(DEFAULT_LIMIT, |l| (l as usize).clamp(1, MAX_LIMIT));

        let query = SearchQuery {
            text: text.map(str::to_string),
            tags: tag.map(|t| vec![t.to_string()]).unwrap_or_default(),
            limit,
        };

        let found = self.memory.lock().await.search(&query);

        let results: Vec<MemoryResult> = found
            .hits
            .iter()
            .map(|hit| MemoryResult {
                id: hit.entry.id,
                text: hit.entry.text.clone(),
                tags: hit.entry.tags.clone(),
                importance: hit.entry.importance,
                score: hit.score,
                created_at: hit.entry.created_at.to_rfc3339(),
            })
            .collect();

        let what = text.or(tag).unwrap_or_default();
        let output = if results.is_empty() {
            format!("No memories found matching '{what}'.")
        } else {
            let mut lines: Vec<String> = results
                .iter()
                .map(|r| {
                    if r.tags.is_empty() {
                        format!("- [{}] {}", r.id, r.text)
                    } else {
                        format!("- [{}] {} (tags: {})", r.id, r.text, r.tags.join(", "))
                    }
                })
                .collect();
            if found.truncated() {
                lines.push(format!("({} of {} matches shown)", results.len(), found.total_matches));
            }
            lines.join("\n")
        };

        let data = serde_json::json!({
            "results": results,
            "total_matches": found.total_matches,
        });
        Ok(ToolResult::ok(output).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_memory::MemoryStore;

    fn shared_store() -> (tempfile::TempDir, SharedMemory) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::open(Some("tools"), dir.path()).unwrap();
        store.add("User's favorite color is teal", &["preference"], 0.8, false).unwrap();
        store.add("The capital of France is Paris", &["geography"], 0.5, false).unwrap();
        store.add("User works on a Rust project", &["work"], 0.7, false).unwrap();
        (dir, store.into_shared())
    }

    #[test]
    fn tool_definition() {
        let (_dir, memory) = shared_store();
        let tool = MemorySearchTool::new(memory);
        assert_eq!(tool.name(), "memory_search");
        let schema = tool.parameters_schema();
        assert!(schema["properties"]["query"].is_object());
        assert!(schema["properties"]["tag"].is_object());
        assert!(!tool.flags().stateful);
    }

    #[tokio::test]
    async fn finds_by_text() {
        let (_dir, memory) = shared_store();
        let tool = MemorySearchTool::new(memory);
        let result = tool
            .execute(serde_json::json!({"query": "favorite color"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("teal"));
        let data = result.data.unwrap();
        assert_eq!(data["total_matches"], 1);
    }

    #[tokio::test]
    async fn query_spaces_are_kept() {
        let (_dir, memory) = shared_store();
        let tool = MemorySearchTool::new(memory);
        let result = tool
            .execute(serde_json::json!({"query": " rust"}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["total_matches"], 1);

        let result = tool
            .execute(serde_json::json!({"query": " user"}))
            .await
            .unwrap();
        // both entries start with "User", neither has a space before it
        assert_eq!(result.data.unwrap()["total_matches"], 0);
    }

    #[tokio::test]
    async fn finds_by_tag_with_string_limit() {
        let (_dir, memory) = shared_store();
        let tool = MemorySearchTool::new(memory);
        let result = tool
            .execute(serde_json::json!({"tag": "work", "limit": "3"}))
            .await
            .unwrap();
        assert!(result.output.contains("Rust project"));
        assert!(!result.output.contains("Paris"));
    }

    #[tokio::test]
    async fn no_results() {
        let (_dir, memory) = shared_store();
        let tool = MemorySearchTool::new(memory);
        let result = tool
            .execute(serde_json::json!({"query": "nonexistent topic xyz"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("No memories found"));
    }

    #[tokio::test]
    async fn missing_query_and_tag_is_error() {
        let (_dir, memory) = shared_store();
        let tool = MemorySearchTool::new(memory);
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn truncation_is_reported() {
        let (_dir, memory) = shared_store();
        let tool = MemorySearchTool::new(memory);
        let result = tool
            .execute(serde_json::json!({"query": "e", "limit": 1}))
            .await
            .unwrap();
        assert!(result.output.contains("1 of 3 matches shown"));
    }
}
