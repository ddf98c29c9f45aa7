//! Shared test helpers for governor and context tests.

use ember_core::error::ModelError;
use ember_core::model::{Generation, GenerationRequest, Model};
use std::sync::Mutex;

/// A mock model that returns a sequence of scripted responses.
///
/// Each call to `generate` returns the next response in the queue; once the
/// script runs out the last response repeats. Every request is recorded.
pub struct ScriptedModel {
    responses: Vec<String>,
    fail: bool,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model whose every call fails.
    pub fn failing() -> Self {
        Self {
            responses: Vec::new(),
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, ModelError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };

        if self.fail {
            return Err(ModelError::Unavailable("scripted failure".into()));
        }
        let text = self
            .responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(Generation::text(text))
    }
}
