//! Chat templates: the per-model prompt wrapping boundary.
//!
//! Each model family wraps system / user / assistant turns differently and
//! marks end-of-turn with its own stop sequences. Ember only depends on the
//! [`ChatTemplate`] trait; [`ChatMlTemplate`] and [`Llama3Template`] cover
//! the common local model families.

/// Per-model prompt wrapping.
pub trait ChatTemplate: Send + Sync {
    /// Template name (e.g., "chatml").
    fn name(&self) -> &str;

    /// Wrap a system message.
    fn system(&self, content: &str) -> String;

    /// Wrap a user message.
    fn user(&self, content: &str) -> String;

    /// Wrap a completed assistant message.
    fn assistant(&self, content: &str) -> String;

    /// Wrap the output of a tool so the model can read it back.
    fn tool_result(&self, tool_name: &str, content: &str) -> String;

    /// The header that opens the assistant turn the model should generate.
    fn generation_prefix(&self) -> &str;

    /// Sequences that terminate an assistant turn.
    fn stop_sequences(&self) -> Vec<String>;
}

/// `<|im_start|>role\n{content}<|im_end|>\n`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatMlTemplate;

impl ChatMlTemplate {
    fn wrap(role: &str, content: &str) -> String {
        format!("<|im_start|>{role}\n{content}<|im_end|>\n")
    }
}

impl ChatTemplate for ChatMlTemplate {
    fn name(&self) -> &str {
        "chatml"
    }

    fn system(&self, content: &str) -> String {
        Self::wrap("system", content)
    }

    fn user(&self, content: &str) -> String {
        Self::wrap("user", content)
    }

    fn assistant(&self, content: &str) -> String {
        Self::wrap("assistant", content)
    }

    fn tool_result(&self, tool_name: &str, content: &str) -> String {
        // tool results become user messages
        Self::wrap("user", &format!("[Tool Result: {tool_name}] {content}"))
    }

    fn generation_prefix(&self) -> &str {
        "<|im_start|>assistant\n"
    }

    fn stop_sequences(&self) -> Vec<String> {
        vec!["<|im_end|>".into(), "<|im_start|>".into()]
    }
}

/// `<|start_header_id|>role<|end_header_id|>\n\n{content}<|eot_id|>`
#[derive(Debug, Clone, Copy, Default)]
pub struct Llama3Template;

impl Llama3Template {
    fn wrap(role: &str, content: &str) -> String {
        format!("<|start_header_id|>{role}<|end_header_id|>\n\n{content}<|eot_id|>")
    }
}

impl ChatTemplate for Llama3Template {
    fn name(&self) -> &str {
        "llama3"
    }

    fn system(&self, content: &str) -> String {
        format!("<|begin_of_text|>{}", Self::wrap("system", content))
    }

    fn user(&self, content: &str) -> String {
        Self::wrap("user", content)
    }

    fn assistant(&self, content: &str) -> String {
        Self::wrap("assistant", content)
    }

    fn tool_result(&self, tool_name: &str, content: &str) -> String {
        Self::wrap("ipython", &format!("[{tool_name}] {content}"))
    }

    fn generation_prefix(&self) -> &str {
        "<|start_header_id|>assistant<|end_header_id|>\n\n"
    }

    fn stop_sequences(&self) -> Vec<String> {
        vec!["<|eot_id|>".into()]
    }
}
