//! ReAct loop over the tool registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use super::AgentError;
use crate::config::{parse_duration, AppConfig};
use crate::events::{Emitter, Event, EventKind};
use crate::llm::{GenerateOptions, LlmProvider, Message, ToolCall};
use crate::prompts::PostPrompts;
use crate::state::CoreState;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Markdown code fences some models wrap around tool arguments.
static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("valid regex"));

pub(crate) fn clean_json_block(args: &str) -> &str {
    match JSON_FENCE.captures(args).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => args.trim(),
    }
}

/// Drives one conversation: asks the model, runs the tools it requests and
/// feeds the results back until it answers in plain text.
pub struct Orchestrator {
    state: Arc<CoreState>,
    provider: Arc<dyn LlmProvider>,
    options: GenerateOptions,
    system_prompt: String,
    post_prompts: PostPrompts,
    max_iters: usize,
    tool_timeouts: HashMap<String, Duration>,
    emitter: RwLock<Option<Arc<dyn Emitter>>>,
}

impl Orchestrator {
    pub fn new(
        state: Arc<CoreState>,
        provider: Arc<dyn LlmProvider>,
        options: GenerateOptions,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            state,
            provider,
            options,
            system_prompt: system_prompt.into(),
            post_prompts: PostPrompts::default(),
            max_iters: DEFAULT_MAX_ITERATIONS,
            tool_timeouts: HashMap::new(),
            emitter: RwLock::new(None),
        }
    }

    pub fn with_post_prompts(mut self, post_prompts: PostPrompts) -> Self {
        self.post_prompts = post_prompts;
        self
    }

    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters.max(1);
        self
    }

    /// Take per-tool `timeout` settings from configuration.
    pub fn with_tool_timeouts(mut self, cfg: &AppConfig) -> Self {
        self.tool_timeouts = cfg
            .tools
            .iter()
            .filter_map(|(name, t)| parse_duration(&t.timeout).map(|d| (name.clone(), d)))
            .collect();
        self
    }

    pub fn set_emitter(&self, emitter: Arc<dyn Emitter>) {
        *self.emitter.write() = Some(emitter);
    }

    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    pub fn state(&self) -> &Arc<CoreState> {
        &self.state
    }

    async fn emit(&self, kind: EventKind) {
        let emitter = self.emitter.read().clone();
        if let Some(emitter) = emitter {
            emitter.emit(Event::new(kind)).await;
        }
    }

    /// Answer `query`, appending every exchanged message to the session
    /// history.
    pub async fn run(&self, query: &str) -> Result<String, AgentError> {
        log::info!("running agent query len={}", query.len());
        self.emit(EventKind::Thinking { query: query.to_string() }).await;

        match self.react(query).await {
            Ok(answer) => {
                self.emit(EventKind::Done { content: answer.clone() }).await;
                Ok(answer)
            }
            Err(e) => {
                log::error!("agent query failed error={e}");
                self.emit(EventKind::Error { message: e.to_string() }).await;
                Err(e)
            }
        }
    }

    async fn react(&self, query: &str) -> Result<String, AgentError> {
        self.state.append_message(Message::user(query));
        let mut system_prompt = self.system_prompt.clone();

        for iteration in 1..=self.max_iters {
            let messages = self.state.build_agent_context(&system_prompt);
            let tools = self.state.tools().definitions();
            let reply = self.provider.generate(&messages, &tools, &self.options).await?;
            self.state.append_message(reply.clone());

            if reply.tool_calls.is_empty() {
                log::debug!("agent answered iteration={iteration}");
                return Ok(reply.content);
            }
            if !reply.content.trim().is_empty() {
                self.emit(EventKind::Message { content: reply.content.clone() }).await;
            }

            for call in &reply.tool_calls {
                let output = self.execute_call(call).await;
                self.state.append_message(Message::tool_result(&call.id, output));
            }

            // The first tool of the batch decides the next system prompt.
            if let Some(post) = reply
                .tool_calls
                .first()
                .and_then(|call| self.post_prompts.get(&call.name))
            {
                log::debug!("post-prompt activated tool={}", reply.tool_calls[0].name);
                system_prompt = post.to_string();
            }
        }

        Err(AgentError::MaxIterations(self.max_iters))
    }

    /// Run one tool call. Failures become the tool's output so the model can
    /// react to them.
    async fn execute_call(&self, call: &ToolCall) -> String {
        let args = clean_json_block(&call.arguments);
        self.emit(EventKind::ToolCall {
            tool: call.name.clone(),
            args: args.to_string(),
        })
        .await;

        let started = Instant::now();
        let output = match self.state.tools().get(&call.name) {
            None => {
                log::warn!("model requested unknown tool tool={}", call.name);
                format!("Error: tool not found: {}", call.name)
            }
            Some(tool) => {
                let timeout = self
                    .tool_timeouts
                    .get(&call.name)
                    .copied()
                    .unwrap_or(DEFAULT_TOOL_TIMEOUT);
                match tokio::time::timeout(timeout, tool.execute(args)).await {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        log::warn!("tool failed tool={} error={e}", call.name);
                        format!("Error: {e}")
                    }
                    Err(_) => {
                        log::warn!("tool timed out tool={} timeout={timeout:?}", call.name);
                        format!(
                            "Tool \"{}\" exceeded timeout of {timeout:?}. Either the tool is stuck or the API response is slow.",
                            call.name
                        )
                    }
                }
            }
        };

        let duration = started.elapsed();
        log::debug!("tool executed tool={} duration_ms={}", call.name, duration.as_millis());
        self.emit(EventKind::ToolResult {
            tool: call.name.clone(),
            result: output.clone(),
            duration,
        })
        .await;
        output
    }
}
