//! `ember prompt`: Preview the system prompt.

use ember_agent::{ContextManageTool, ContextWindowManager};
use ember_core::error::ModelError;
use ember_core::memory::AdaptiveSource;
use ember_core::model::{Generation, GenerationRequest, Model};
use ember_core::template::{ChatMlTemplate, ChatTemplate, Llama3Template};
use std::sync::Arc;

use super::{load_config, open_store};

/// Stands in for the on-device model; `prompt` never generates.
struct OfflineModel;

#[async_trait::async_trait]
impl Model for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<Generation, ModelError> {
        Err(ModelError::Unavailable("no model is attached to the CLI".into()))
    }
}

pub fn template_named(name: &str) -> Result<Box<dyn ChatTemplate>, Box<dyn std::error::Error>> {
    match name.trim().to_lowercase().as_str() {
        "chatml" => Ok(Box::new(ChatMlTemplate)),
        "llama3" => Ok(Box::new(Llama3Template)),
        other => Err(format!("Unknown template '{other}' (expected chatml or llama3)").into()),
    }
}

pub async fn run(session: Option<&str>, template: &str) -> Result<(), Box<dyn std::error::Error>> {
    let template = template_named(template)?;
    let config = load_config()?;
    let memory = open_store(&config, session)?.into_shared();

    let window = ContextWindowManager::from_config(&config.context).into_shared();
    let mut registry = ember_tools::default_registry(memory.clone())?
        .with_adaptive_limit(config.memory.adaptive_limit);
    if let Some(limit) = config.prompt.max_prompt_chars {
        registry = registry.with_prompt_budget(limit);
    }
    registry.register(Box::new(
        ContextManageTool::new(window, Arc::new(OfflineModel), &config.context).with_memory(memory.clone()),
    ))?;

    let store = memory.lock().await;
    let prompt = registry.build_system_prompt(template.as_ref(), Some(&*store as &dyn AdaptiveSource))?;
    println!("{prompt}");
    Ok(())
}
