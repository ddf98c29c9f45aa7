//! The governor: bounded think / act cycles over a local model.
//!
//! ```text
//! START ──▶ THINKING ──▶ DONE(SUCCESS | NEED_CLARIFICATION | TIMEOUT | ERROR | USER_DENIED)
//!              ▲  │
//!              │  ▼
//!          TOOL_DISPATCH
//! ```
//!
//! Each iteration renders the prompt from the system prompt and the turns
//! still live in the context window, asks the model for a response, and
//! either finishes (confident answer or clarifying question), dispatches the
//! tool directives it contains, or nudges the model to try again. Every
//! recorded turn is ledgered in the window; when the window turns critical
//! the governor runs `context_manage` on its own.

use ember_config::{ContextConfig, GovernorConfig};
use ember_core::error::Error;
use ember_core::event::{ExecutionStatus, GovernorEvent, HealthLevel, ProgressCallback};
use ember_core::memory::AdaptiveSource;
use ember_core::model::{GenerationRequest, Model};
use ember_core::template::ChatTemplate;
use ember_core::tool::{ToolRegistry, ToolResult};
use ember_memory::SharedMemory;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::context::manage_tool::TOOL_NAME as CONTEXT_MANAGE;
use crate::context::token::span_tokens;
use crate::context::window::SharedWindow;
use crate::directive::{self, ParsedResponse};

/// Decides whether a `requires_confirmation` tool may run.
pub type ConfirmationHook = Box<dyn Fn(&str, &Value) -> bool + Send + Sync>;

const USER_IMPORTANCE: f32 = 0.9;
const ASSISTANT_IMPORTANCE: f32 = 0.6;
const TOOL_RESULT_IMPORTANCE: f32 = 0.4;
const NUDGE_IMPORTANCE: f32 = 0.2;

/// Deterministic results kept per session.
const MEMO_CAPACITY: usize = 128;

const TOOL_SUCCESS_BONUS: f32 = 0.25;
const HEDGE_PENALTY: f32 = 0.2;
const HEDGES: &[&str] = &["not sure", "maybe", "might", "i think"];

const REFINEMENT_NUDGE: &str = "Your answer is not confident enough yet. Call a tool if you need \
     more information, ask a clarifying question if the request is ambiguous, or give your final \
     answer ending with CONFIDENCE: <0.0-1.0>.";

// ── Data Structures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernorState {
    Start,
    Thinking,
    ToolDispatch,
    Done(ExecutionStatus),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConfidenceMetrics {
    pub confidence: f32,
    pub iteration_count: u32,
    pub tool_calls_made: u32,
    pub has_explicit_confidence: bool,
}

/// The result of one `execute` call.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorOutcome {
    pub status: ExecutionStatus,
    pub answer: String,
    pub metrics: ConfidenceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-execute bookkeeping.
#[derive(Debug, Default)]
struct Run {
    metrics: ConfidenceMetrics,
    last_tool_success: Option<bool>,
    answer: String,
}

// ── Session ───────────────────────────────────────────────────────────────

pub struct GovernorSession {
    config: GovernorConfig,
    context: ContextConfig,
    registry: Arc<ToolRegistry>,
    model: Arc<dyn Model>,
    template: Arc<dyn ChatTemplate>,
    window: SharedWindow,
    memory: Option<SharedMemory>,
    progress: Option<ProgressCallback>,
    confirmation: Option<ConfirmationHook>,
    system_prompt: Option<String>,
    /// Rendered turns keyed by their first cache position.
    segments: BTreeMap<u32, String>,
    /// Results of deterministic tools keyed by name and parameters.
    memo: HashMap<String, ToolResult>,
    memo_order: VecDeque<String>,
    state: GovernorState,
}

impl GovernorSession {
    pub fn new(
        registry: Arc<ToolRegistry>,
        model: Arc<dyn Model>,
        template: Arc<dyn ChatTemplate>,
        window: SharedWindow,
    ) -> Self {
        Self {
            config: GovernorConfig::default(),
            context: ContextConfig::default(),
            registry,
            model,
            template,
            window,
            memory: None,
            progress: None,
            confirmation: None,
            system_prompt: None,
            segments: BTreeMap::new(),
            memo: HashMap::new(),
            memo_order: VecDeque::new(),
            state: GovernorState::Start,
        }
    }

    pub fn with_config(mut self, config: GovernorConfig) -> Self {
        self.config = config;
        self
    }

    /// Proactive remediation settings.
    pub fn with_context_config(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// Use `memory` as the adaptive source of the system prompt.
    pub fn with_memory(mut self, memory: SharedMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_confirmation(mut self, hook: ConfirmationHook) -> Self {
        self.confirmation = Some(hook);
        self
    }

    pub fn state(&self) -> GovernorState {
        self.state
    }

    /// The most recently rendered system prompt.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn window(&self) -> &SharedWindow {
        &self.window
    }

    /// Run the think / act loop for one user query. Only an empty query is
    /// an `Err`; every later failure ends the run with status ERROR.
    pub async fn execute(&mut self, query: &str) -> Result<GovernorOutcome, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("query is empty".into()));
        }

        self.state = GovernorState::Start;
        let mut run = Run {
            metrics: ConfidenceMetrics {
                confidence: self.config.default_confidence,
                ..ConfidenceMetrics::default()
            },
            ..Run::default()
        };

        match self.run_loop(query, &mut run).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(iterations = run.metrics.iteration_count, error = %e, "Governor failed");
                let answer = run.answer.clone();
                Ok(self.finish(ExecutionStatus::Error, answer, &run, Some(e.to_string())))
            }
        }
    }

    async fn run_loop(&mut self, query: &str, run: &mut Run) -> Result<GovernorOutcome, Error> {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        self.prepare_system_prompt().await?;
        info!(query_len = query.len(), model = self.model.name(), "Governor execute");

        let segment = self.template.user(query);
        self.record_turn(true, segment, query, USER_IMPORTANCE).await?;

        loop {
            if run.metrics.iteration_count >= self.config.max_iterations || started.elapsed() >= timeout {
                warn!(
                    iterations = run.metrics.iteration_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Governor timed out"
                );
                let answer = run.answer.clone();
                return Ok(self.finish(ExecutionStatus::Timeout, answer, run, None));
            }

            run.metrics.iteration_count += 1;
            let iteration = run.metrics.iteration_count;
            self.state = GovernorState::Thinking;
            self.emit(GovernorEvent::IterationStart { iteration });
            debug!(iteration, "Governor iteration");

            let prompt = self.render_prompt().await;
            let request = GenerationRequest::new(prompt, self.config.max_response_tokens)
                .with_stop(self.template.stop_sequences());
            let response = match self.model.generate(request).await {
                Ok(generation) => generation.text.trim().to_string(),
                Err(e) => {
                    warn!(iteration, error = %e, "Model generation failed");
                    let answer = run.answer.clone();
                    return Ok(self.finish(ExecutionStatus::Error, answer, run, Some(e.to_string())));
                }
            };

            let segment = self.template.assistant(&response);
            self.record_turn(false, segment, &response, ASSISTANT_IMPORTANCE).await?;

            let parsed = directive::parse_response(&response, self.config.max_tool_calls_per_iteration as usize);
            self.report_parse_problems(&parsed);

            run.answer = parsed.answer.clone();
            run.metrics.has_explicit_confidence = parsed.confidence.is_some();
            run.metrics.confidence = parsed
                .confidence
                .unwrap_or_else(|| self.heuristic_confidence(&parsed.answer, run.last_tool_success));
            self.emit(GovernorEvent::Thinking {
                iteration,
                confidence: run.metrics.confidence,
                explicit: run.metrics.has_explicit_confidence,
            });

            if parsed.calls.is_empty() {
                if run.metrics.confidence >= self.config.confidence_threshold {
                    let answer = run.answer.clone();
                    return Ok(self.finish(ExecutionStatus::Success, answer, run, None));
                }
                if directive::is_question(&parsed.answer) {
                    let answer = run.answer.clone();
                    return Ok(self.finish(ExecutionStatus::NeedClarification, answer, run, None));
                }
                debug!(iteration, confidence = run.metrics.confidence, "Below threshold, nudging");
                let segment = self.template.user(REFINEMENT_NUDGE);
                self.record_turn(true, segment, REFINEMENT_NUDGE, NUDGE_IMPORTANCE).await?;
                continue;
            }

            self.state = GovernorState::ToolDispatch;
            let registry = self.registry.clone();
            for call in parsed.calls {
                self.emit(GovernorEvent::ToolCall {
                    name: call.name.clone(),
                    params: call.params.clone(),
                    proactive: false,
                });

                let descriptor = match registry.find(&call.name) {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        warn!(tool = %call.name, "Model requested an unknown tool");
                        self.emit(GovernorEvent::ToolError {
                            name: call.name.clone(),
                            error: e.to_string(),
                        });
                        let output = format!(
                            "Error: unknown tool '{}'. Available tools: {}",
                            call.name,
                            registry.names().join(", ")
                        );
                        let segment = self.template.tool_result(&call.name, &output);
                        self.record_turn(true, segment, &output, TOOL_RESULT_IMPORTANCE).await?;
                        continue;
                    }
                };

                if descriptor.flags().requires_confirmation {
                    let approved = self
                        .confirmation
                        .as_ref()
                        .is_some_and(|hook| hook(&call.name, &call.params));
                    if !approved {
                        info!(tool = %call.name, "Tool call declined");
                        let answer = format!("The call to '{}' was not approved.", call.name);
                        return Ok(self.finish(ExecutionStatus::UserDenied, answer, run, None));
                    }
                }

                let memo_key = format!("{}:{}", call.name, call.params);
                let deterministic = descriptor.flags().deterministic;
                let tool_started = Instant::now();
                let result = match self.memo.get(&memo_key).filter(|_| deterministic) {
                    Some(cached) => {
                        debug!(tool = %call.name, "Reusing memoized tool result");
                        Ok(cached.clone())
                    }
                    None => descriptor.execute(call.params.clone()).await,
                };
                let duration_ms = tool_started.elapsed().as_millis() as u64;
                run.metrics.tool_calls_made += 1;

                let result = match result {
                    Ok(result) => {
                        if deterministic && result.success {
                            self.remember(memo_key, result.clone());
                        }
                        if result.success {
                            self.emit(GovernorEvent::ToolResult {
                                name: call.name.clone(),
                                output: result.output.clone(),
                                duration_ms,
                            });
                        } else {
                            self.emit(GovernorEvent::ToolError {
                                name: call.name.clone(),
                                error: result.output.clone(),
                            });
                        }
                        result
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        self.emit(GovernorEvent::ToolError {
                            name: call.name.clone(),
                            error: e.to_string(),
                        });
                        ToolResult::failure(format!("Error: {e}"))
                    }
                };
                run.last_tool_success = Some(result.success);

                let segment = self.template.tool_result(&call.name, &result.output);
                self.record_turn(true, segment, &result.output, TOOL_RESULT_IMPORTANCE).await?;
            }
        }
    }

    /// Render the system prompt. With a memory store attached it is
    /// re-rendered on every execute so corrections and patterns learned
    /// earlier in the session reach the model. The ledgered span is pinned
    /// while the window is still empty and stays fixed afterwards.
    async fn prepare_system_prompt(&mut self) -> Result<(), Error> {
        if self.system_prompt.is_some() && self.memory.is_none() {
            return Ok(());
        }

        let prompt = match &self.memory {
            Some(memory) => {
                let store = memory.lock().await;
                self.registry
                    .build_system_prompt(self.template.as_ref(), Some(&*store as &dyn AdaptiveSource))?
            }
            None => self.registry.build_system_prompt(self.template.as_ref(), None)?,
        };

        let tokens = span_tokens(&prompt);
        {
            let mut window = self.window.lock().await;
            if window.turn_count() == 0 && window.current_position() == window.system_prompt_end() {
                window.set_system_prompt_span(tokens)?;
            } else if tokens != window.system_prompt_end() {
                debug!(
                    tokens,
                    pinned = window.system_prompt_end(),
                    "System prompt re-rendered; span stays pinned"
                );
            }
        }
        info!(tokens, tools = self.registry.tool_count(), "System prompt built");
        self.system_prompt = Some(prompt);
        Ok(())
    }

    /// Cache a deterministic result, dropping the oldest one when full.
    fn remember(&mut self, key: String, result: ToolResult) {
        if self.memo.contains_key(&key) {
            return;
        }
        if self.memo.len() >= MEMO_CAPACITY {
            if let Some(oldest) = self.memo_order.pop_front() {
                self.memo.remove(&oldest);
            }
        }
        self.memo_order.push_back(key.clone());
        self.memo.insert(key, result);
    }

    /// Ledger a rendered segment as a turn, then check window health.
    async fn record_turn(
        &mut self,
        is_user: bool,
        segment: String,
        preview: &str,
        importance: f32,
    ) -> Result<(), Error> {
        let health = {
            let mut window = self.window.lock().await;
            let start = window.current_position();
            window.append_tokens(is_user, preview, span_tokens(&segment), importance)?;
            self.segments.insert(start, segment);
            window.health()
        };

        if health.level != HealthLevel::Ok {
            self.emit(GovernorEvent::ContextHealth {
                level: health.level,
                occupied_fraction: health.occupied_fraction,
            });
        }
        if health.level == HealthLevel::Critical && self.context.proactive_remediation {
            self.remediate().await;
        }
        Ok(())
    }

    /// Run the configured eviction through the registered `context_manage`
    /// tool. Failures are logged; the loop carries on.
    async fn remediate(&mut self) {
        let Ok(descriptor) = self.registry.find(CONTEXT_MANAGE) else {
            warn!("Context window critical and no context_manage tool registered");
            return;
        };

        let params = json!({
            "action": self.context.proactive_action.as_str(),
            "keep_last_n_turns": self.context.default_keep_last_n.clamp(5, 50),
        });
        self.emit(GovernorEvent::ToolCall {
            name: CONTEXT_MANAGE.into(),
            params: params.clone(),
            proactive: true,
        });

        let started = Instant::now();
        match descriptor.execute(params).await {
            Ok(result) if result.success => {
                info!(output = %result.output, "Proactive context remediation");
                self.emit(GovernorEvent::ToolResult {
                    name: CONTEXT_MANAGE.into(),
                    output: result.output,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            Ok(result) => {
                warn!(output = %result.output, "Proactive context remediation failed");
                self.emit(GovernorEvent::ToolError {
                    name: CONTEXT_MANAGE.into(),
                    error: result.output,
                });
            }
            Err(e) => {
                warn!(error = %e, "Proactive context remediation rejected");
                self.emit(GovernorEvent::ToolError {
                    name: CONTEXT_MANAGE.into(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// System prompt, every live turn in cache order, then the generation
    /// prefix. Segments of evicted turns are dropped here.
    async fn render_prompt(&mut self) -> String {
        let window = self.window.lock().await;
        self.segments.retain(|start, _| window.contains_position(*start));

        let mut prompt = self.system_prompt.clone().unwrap_or_default();
        for segment in self.segments.values() {
            prompt.push_str(segment);
        }
        prompt.push_str(self.template.generation_prefix());
        prompt
    }

    fn heuristic_confidence(&self, answer: &str, last_tool_success: Option<bool>) -> f32 {
        let mut confidence = self.config.default_confidence;
        if last_tool_success == Some(true) {
            confidence += TOOL_SUCCESS_BONUS;
        }
        let lower = answer.to_lowercase();
        if HEDGES.iter().any(|h| lower.contains(h)) {
            confidence -= HEDGE_PENALTY;
        }
        confidence.clamp(0.0, 1.0)
    }

    fn report_parse_problems(&self, parsed: &ParsedResponse) {
        for bad in &parsed.malformed {
            warn!(directive = %bad.raw, reason = %bad.reason, "Malformed tool directive");
            self.emit(GovernorEvent::ToolError {
                name: bad.raw.clone(),
                error: format!("malformed directive: {}", bad.reason),
            });
        }
        if parsed.ignored > 0 {
            warn!(
                ignored = parsed.ignored,
                limit = self.config.max_tool_calls_per_iteration,
                "Ignoring tool directives past the per-iteration limit"
            );
        }
    }

    fn finish(
        &mut self,
        status: ExecutionStatus,
        answer: String,
        run: &Run,
        error: Option<String>,
    ) -> GovernorOutcome {
        self.state = GovernorState::Done(status);
        self.emit(GovernorEvent::Finished {
            status,
            iterations: run.metrics.iteration_count,
            tool_calls_made: run.metrics.tool_calls_made,
        });
        info!(
            ?status,
            iterations = run.metrics.iteration_count,
            tool_calls = run.metrics.tool_calls_made,
            confidence = run.metrics.confidence,
            "Governor finished"
        );
        GovernorOutcome {
            status,
            answer,
            metrics: run.metrics,
            error,
        }
    }

    fn emit(&self, event: GovernorEvent) {
        if let Some(callback) = &self.progress {
            callback(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::manage_tool::ContextManageTool;
    use crate::context::window::ContextWindowManager;
    use crate::test_helpers::ScriptedModel;
    use async_trait::async_trait;
    use ember_core::error::ToolError;
    use ember_core::template::ChatMlTemplate;
    use ember_core::tool::{Tool, ToolFlags};
    use ember_memory::MemoryStore;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts executions; flags are configurable.
    struct CountingTool {
        name: &'static str,
        flags: ToolFlags,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Counts how often it runs"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"x": {"type": "integer"}}})
        }
        fn flags(&self) -> ToolFlags {
            self.flags
        }
        async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolResult::ok(format!("{} ran {n} times with {arguments}", self.name)))
        }
    }

    fn counting_tool(name: &'static str, flags: ToolFlags) -> (Box<dyn Tool>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = CountingTool {
            name,
            flags,
            calls: calls.clone(),
        };
        (Box::new(tool), calls)
    }

    fn session(model: &Arc<ScriptedModel>, registry: ToolRegistry) -> GovernorSession {
        GovernorSession::new(
            Arc::new(registry),
            model.clone(),
            Arc::new(ChatMlTemplate),
            ContextWindowManager::new(4096).into_shared(),
        )
    }

    fn record_events(session: GovernorSession) -> (GovernorSession, Arc<StdMutex<Vec<GovernorEvent>>>) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();
        let session = session.with_progress(Box::new(move |e| sink.lock().unwrap().push(e.clone())));
        (session, events)
    }

    #[tokio::test]
    async fn confident_answer_succeeds_on_first_iteration() {
        let model = Arc::new(ScriptedModel::new(["Your name is Tim.\nCONFIDENCE: 0.9"]));
        let (mut session, events) = record_events(session(&model, ToolRegistry::new()));

        let outcome = session.execute("What is my name?").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.answer, "Your name is Tim.");
        assert_eq!(outcome.metrics.iteration_count, 1);
        assert_eq!(outcome.metrics.tool_calls_made, 0);
        assert!(outcome.metrics.has_explicit_confidence);
        assert!((outcome.metrics.confidence - 0.9).abs() < 1e-6);
        assert_eq!(session.state(), GovernorState::Done(ExecutionStatus::Success));

        let events = events.lock().unwrap();
        assert_eq!(events.first().unwrap().event_type(), "iteration_start");
        assert_eq!(events.last().unwrap().event_type(), "finished");
    }

    #[tokio::test]
    async fn never_confident_times_out_at_max_iterations() {
        let model = Arc::new(ScriptedModel::new(["Hmm, maybe it is blue."]));
        let mut session = session(&model, ToolRegistry::new());

        let outcome = session.execute("What is my favorite color?").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Timeout);
        assert_eq!(outcome.metrics.iteration_count, 5);
        assert_eq!(model.call_count(), 5);
        assert!(!outcome.metrics.has_explicit_confidence);
        assert!((outcome.metrics.confidence - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn tool_result_feeds_next_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::open(Some("gov"), dir.path()).unwrap();
        store.add("User's favorite color is teal", &["preference"], 0.8, false).unwrap();
        let memory = store.into_shared();
        let registry = ember_tools::default_registry(memory.clone()).unwrap();

        let model = Arc::new(ScriptedModel::new([
            "Let me check.\nTOOL_CALL: memory_search(query=\"favorite color\")",
            "Your favorite color is teal.",
        ]));
        let mut session = session(&model, registry).with_memory(memory);

        let outcome = session.execute("What's my favorite color?").await.unwrap();
        // no tag, but the last tool succeeded: 0.5 + 0.25
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert!(!outcome.metrics.has_explicit_confidence);
        assert!((outcome.metrics.confidence - 0.75).abs() < 1e-6);
        assert_eq!(outcome.metrics.tool_calls_made, 1);
        assert_eq!(outcome.metrics.iteration_count, 2);

        let second = &model.requests()[1];
        assert!(second.prompt.contains("[Tool Result: memory_search]"));
        assert!(second.prompt.contains("teal"));
        assert!(second.prompt.ends_with("<|im_start|>assistant\n"));
        assert!(session.system_prompt().unwrap().contains("memory_search"));
    }

    #[tokio::test]
    async fn question_needs_clarification() {
        let model = Arc::new(ScriptedModel::new(["Which city do you mean?"]));
        let mut session = session(&model, ToolRegistry::new());
        let outcome = session.execute("What's the weather there?").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::NeedClarification);
        assert_eq!(outcome.answer, "Which city do you mean?");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_and_loop_continues() {
        let model = Arc::new(ScriptedModel::new([
            "TOOL_CALL: teleport(to=\"Paris\")",
            "I cannot do that.\nCONFIDENCE: 0.8",
        ]));
        let (mut session, events) = record_events(session(&model, ToolRegistry::new()));

        let outcome = session.execute("Take me to Paris").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.metrics.tool_calls_made, 0);
        assert!(model.requests()[1].prompt.contains("unknown tool 'teleport'"));
        assert!(events.lock().unwrap().iter().any(|e| matches!(
            e,
            GovernorEvent::ToolError { name, .. } if name == "teleport"
        )));
    }

    #[tokio::test]
    async fn confirmation_required_without_hook_is_denied() {
        let (tool, calls) = counting_tool(
            "send_message",
            ToolFlags {
                requires_confirmation: true,
                ..ToolFlags::default()
            },
        );
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        let model = Arc::new(ScriptedModel::new(["TOOL_CALL: send_message(x=1)"]));
        let mut session = session(&model, registry);

        let outcome = session.execute("Text mom").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::UserDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn approved_confirmation_runs_tool() {
        let (tool, calls) = counting_tool(
            "send_message",
            ToolFlags {
                requires_confirmation: true,
                ..ToolFlags::default()
            },
        );
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        let model = Arc::new(ScriptedModel::new([
            "TOOL_CALL: send_message(x=1)",
            "Sent.\nCONFIDENCE: 0.95",
        ]));
        let mut session = session(&model, registry)
            .with_confirmation(Box::new(|name, _params| name == "send_message"));

        let outcome = session.execute("Text mom").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deterministic_results_are_memoized() {
        let (tool, calls) = counting_tool(
            "square",
            ToolFlags {
                deterministic: true,
                ..ToolFlags::default()
            },
        );
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        let model = Arc::new(ScriptedModel::new([
            "TOOL_CALL: square(x=4)\nTOOL_CALL: square(x=4)",
            "TOOL_CALL: square(x=5)",
            "Done.\nCONFIDENCE: 0.9",
        ]));
        let mut session = session(&model, registry);

        let outcome = session.execute("Square 4 twice, then 5").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.metrics.tool_calls_made, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn extra_directives_are_capped() {
        let (tool, calls) = counting_tool("noop", ToolFlags::default());
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        let model = Arc::new(ScriptedModel::new([
            "TOOL_CALL: noop(x=1)\nTOOL_CALL: noop(x=2)\nTOOL_CALL: noop(x=3)\nTOOL_CALL: noop(x=4)",
            "Done.\nCONFIDENCE: 0.9",
        ]));
        let mut session = session(&model, registry);

        let outcome = session.execute("Run noop four times").await.unwrap();
        assert_eq!(outcome.metrics.tool_calls_made, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn model_failure_is_error_status() {
        let model = Arc::new(ScriptedModel::failing());
        let mut session = session(&model, ToolRegistry::new());
        let outcome = session.execute("Hello").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert!(outcome.error.unwrap().contains("scripted failure"));
        assert_eq!(outcome.metrics.iteration_count, 1);
    }

    #[tokio::test]
    async fn empty_query_is_invalid() {
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let mut session = session(&model, ToolRegistry::new());
        let err = session.execute("   ").await.unwrap_err();
        assert_eq!(err.kind(), ember_core::error::ErrorKind::InvalidArgument);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn session_is_resumable_after_terminal_status() {
        let model = Arc::new(ScriptedModel::new([
            "Which one?",
            "The red one.\nCONFIDENCE: 0.9",
        ]));
        let mut session = session(&model, ToolRegistry::new());

        let first = session.execute("Pick a color").await.unwrap();
        assert_eq!(first.status, ExecutionStatus::NeedClarification);
        let second = session.execute("The warm one").await.unwrap();
        assert_eq!(second.status, ExecutionStatus::Success);
        assert_eq!(second.metrics.iteration_count, 1);

        // both exchanges are in the prompt of the second call
        let prompt = &model.requests()[1].prompt;
        assert!(prompt.contains("Pick a color"));
        assert!(prompt.contains("Which one?"));
        assert_eq!(session.window().lock().await.turn_count(), 4);
    }

    #[tokio::test]
    async fn prompt_build_failure_finishes_with_error_status() {
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let registry = ToolRegistry::new().with_prompt_budget(32);
        let (mut session, events) = record_events(session(&model, registry));

        let outcome = session.execute("hello").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert!(outcome.error.unwrap().contains("budget"));
        assert_eq!(outcome.metrics.iteration_count, 0);
        assert_eq!(outcome.metrics.tool_calls_made, 0);
        assert!((outcome.metrics.confidence - 0.5).abs() < 1e-6);
        assert_eq!(session.state(), GovernorState::Done(ExecutionStatus::Error));
        assert_eq!(model.call_count(), 0);

        let events = events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(GovernorEvent::Finished { status: ExecutionStatus::Error, .. })
        ));
    }

    #[tokio::test]
    async fn corrections_learned_mid_session_reach_next_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::open(Some("learn"), dir.path()).unwrap().into_shared();
        let registry = ember_tools::default_registry(memory.clone()).unwrap();
        let model = Arc::new(ScriptedModel::new([
            "TOOL_CALL: memory_store(text=\"Call the user Sam\", kind=\"correction\")",
            "Noted.\nCONFIDENCE: 0.9",
            "Hi Sam.\nCONFIDENCE: 0.9",
        ]));
        let mut session = session(&model, registry).with_memory(memory.clone());

        session.execute("My name is Sam, not Samuel").await.unwrap();
        let pinned = session.window().lock().await.system_prompt_end();
        let outcome = session.execute("Say hi").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Success);

        let requests = model.requests();
        assert!(!requests[0].prompt.contains("USER CORRECTIONS"));
        assert!(requests[2].prompt.contains("USER CORRECTIONS"));
        assert!(requests[2].prompt.contains("- Call the user Sam"));
        assert!(session.system_prompt().unwrap().contains("Call the user Sam"));
        // turns keep their recorded positions
        assert_eq!(session.window().lock().await.system_prompt_end(), pinned);
        assert_eq!(memory.lock().await.get_corrections(10).len(), 1);
    }

    #[test]
    fn memo_drops_oldest_when_full() {
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let mut session = session(&model, ToolRegistry::new());
        for n in 0..=MEMO_CAPACITY {
            session.remember(format!("square:{n}"), ToolResult::ok(n.to_string()));
        }
        assert_eq!(session.memo.len(), MEMO_CAPACITY);
        assert!(!session.memo.contains_key("square:0"));
        assert!(session.memo.contains_key(&format!("square:{MEMO_CAPACITY}")));
    }

    #[tokio::test]
    async fn critical_window_triggers_proactive_remediation() {
        let long = "I am still working through this request. ".repeat(10);
        let model = Arc::new(ScriptedModel::new([long.as_str()]));
        let window = ContextWindowManager::new(1000).into_shared();
        let context = ContextConfig::default();

        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(ContextManageTool::new(window.clone(), model.clone(), &context)))
            .unwrap();

        let session = GovernorSession::new(Arc::new(registry), model.clone(), Arc::new(ChatMlTemplate), window.clone())
            .with_config(GovernorConfig {
                max_iterations: 10,
                ..GovernorConfig::default()
            })
            .with_context_config(context);
        let (mut session, events) = record_events(session);

        let outcome = session.execute("Explain the plan").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Timeout);

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            GovernorEvent::ContextHealth { level: HealthLevel::Critical, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            GovernorEvent::ToolCall { name, proactive: true, .. } if name == "context_manage"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            GovernorEvent::ToolResult { name, .. } if name == "context_manage"
        )));

        // evicted turns no longer reach the model
        let window = window.lock().await;
        assert_eq!(window.turns()[0].turn_number, 1);
        let last_prompt = model.requests().pop().unwrap().prompt;
        assert!(!last_prompt.contains("Explain the plan"));
    }
}
