//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act: look up memories,
//! manage its own context window, read the clock, and so on. Every tool is
//! invoked the same way, with one JSON parameter object, and answers with a
//! [`ToolResult`] or a [`ToolError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use crate::error::{RegistryError, ToolError};
use crate::memory::AdaptiveSource;
use crate::template::ChatTemplate;

/// Default catalog capacity when `0` is requested.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 16;

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content, fed back to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Behavioral flags of a tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFlags {
    /// Output is a pure function of the parameters
    pub deterministic: bool,
    /// The user must approve each call before it runs
    pub requires_confirmation: bool,
    /// The tool mutates state outside the call
    pub stateful: bool,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "memory_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    fn flags(&self) -> ToolFlags {
        ToolFlags::default()
    }

    /// Typical wall-clock cost of one call.
    fn latency_estimate(&self) -> Duration {
        Duration::from_millis(10)
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;
}

/// A registered tool. Everything is captured at registration and read-only
/// afterwards.
pub struct ToolDescriptor {
    name: String,
    description: String,
    parameters: serde_json::Value,
    flags: ToolFlags,
    latency_estimate: Duration,
    tool: Box<dyn Tool>,
}

impl ToolDescriptor {
    pub fn new(tool: Box<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
            flags: tool.flags(),
            latency_estimate: tool.latency_estimate(),
            tool,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }

    pub fn flags(&self) -> ToolFlags {
        self.flags
    }

    pub fn latency_estimate(&self) -> Duration {
        self.latency_estimate
    }

    /// Parameter names declared in the schema.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    pub async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
        self.tool.execute(arguments).await
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("latency_estimate", &self.latency_estimate)
            .finish()
    }
}

/// A registry of available tools.
///
/// The registry is populated once, then shared read-only with governor
/// sessions, which use it to:
/// 1. Render the system prompt
/// 2. Look up and execute tools when the model requests them
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
    prompt_budget: Option<usize>,
    adaptive_limit: usize,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty catalog. `0` selects [`DEFAULT_REGISTRY_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_REGISTRY_CAPACITY
        } else {
            capacity
        };
        Self {
            tools: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            prompt_budget: None,
            adaptive_limit: 5,
        }
    }

    /// Cap the rendered system prompt at `max_chars`.
    pub fn with_prompt_budget(mut self, max_chars: usize) -> Self {
        self.prompt_budget = Some(max_chars);
        self
    }

    /// How many corrections and patterns to inject into the prompt.
    pub fn with_adaptive_limit(mut self, limit: usize) -> Self {
        self.adaptive_limit = limit;
        self
    }

    /// Register a tool. Rejects duplicate names.
    pub fn add(&mut self, descriptor: ToolDescriptor) -> std::result::Result<(), RegistryError> {
        if self.index.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateName(descriptor.name().to_string()));
        }
        if self.tools.len() == self.tools.capacity() {
            let grow = self.tools.capacity().max(1);
            self.tools.reserve_exact(grow);
        }
        debug!(tool = descriptor.name(), "Registered tool");
        self.index.insert(descriptor.name().to_string(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    /// Convenience wrapper around [`ToolRegistry::add`].
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), RegistryError> {
        self.add(ToolDescriptor::new(tool))
    }

    /// Get a tool by name.
    pub fn find(&self, name: &str) -> std::result::Result<&ToolDescriptor, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// List all registered tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn capacity(&self) -> usize {
        self.tools.capacity()
    }

    /// Render the system prompt: tool catalog, usage examples, rules and,
    /// when an adaptive source is given, learned corrections and patterns.
    pub fn build_system_prompt(
        &self,
        template: &dyn ChatTemplate,
        adaptive_source: Option<&dyn AdaptiveSource>,
    ) -> std::result::Result<String, RegistryError> {
        let mut out = PromptWriter::new(self.prompt_budget);

        out.push("You are Ember, an on-device assistant. Answer the user's request, \
                  calling tools when they help.\n\n")?;

        out.push("AVAILABLE TOOLS:\n")?;
        if self.tools.is_empty() {
            out.push("(none)\n")?;
        }
        for tool in &self.tools {
            let params = tool.parameter_names().join(", ");
            let mut line = format!("- {}: {}", tool.name(), tool.description());
            if !params.is_empty() {
                line.push_str(&format!(" (params: {params})"));
            }
            if tool.flags().requires_confirmation {
                line.push_str(" [asks the user first]");
            }
            line.push('\n');
            out.push(&line)?;
        }

        out.push(
            "\nTOOL USAGE:\n\
             Call a tool by writing one line per call:\n\
             TOOL_CALL: tool_name(param=\"text value\", number=3)\n\
             Examples:\n\
             TOOL_CALL: memory_search(query=\"favorite color\", limit=3)\n\
             TOOL_CALL: context_manage(action=\"summarize_old\", keep_last_n_turns=10)\n",
        )?;

        out.push(
            "\nRULES:\n\
             1. Only call tools listed above.\n\
             2. Never invent tool results; wait for them.\n\
             3. End every answer with a line CONFIDENCE: <0.0-1.0>.\n\
             4. If the request is ambiguous, ask one clarifying question instead of guessing.\n\
             5. Keep answers short; this device has a small context window.\n",
        )?;

        if let Some(source) = adaptive_source {
            let corrections = source.corrections(self.adaptive_limit);
            if !corrections.is_empty() {
                out.push("\nUSER CORRECTIONS (always follow these):\n")?;
                for c in &corrections {
                    out.push(&format!("- {c}\n"))?;
                }
            }

            let patterns = source.patterns(self.adaptive_limit);
            if !patterns.is_empty() {
                out.push("\nSUCCESSFUL PATTERNS:\n")?;
                for p in &patterns {
                    out.push(&format!("- {p}\n"))?;
                }
            }
        }

        let wrapped = template.system(out.as_str().trim_end());
        if let Some(limit) = self.prompt_budget {
            if wrapped.len() > limit {
                return Err(RegistryError::Truncation {
                    required: wrapped.len(),
                    limit,
                });
            }
        }
        Ok(wrapped)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Growable prompt buffer that refuses writes past an optional budget.
struct PromptWriter {
    buf: String,
    limit: Option<usize>,
}

impl PromptWriter {
    fn new(limit: Option<usize>) -> Self {
        Self {
            buf: String::new(),
            limit,
        }
    }

    fn push(&mut self, s: &str) -> std::result::Result<(), RegistryError> {
        if let Some(limit) = self.limit {
            let required = self.buf.len() + s.len();
            if required > limit {
                return Err(RegistryError::Truncation { required, limit });
            }
        }
        self.buf.push_str(s);
        Ok(())
    }

    fn as_str(&self) -> &str {
        &self.buf
    }
}
