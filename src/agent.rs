use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::{default_temperature, default_timeout_secs, AppConfig};
use crate::error::{Result, SyndicateError};
use crate::llm::{ChatRequest, FinishReason, LanguageModel, Usage};
use crate::memory::Memory;
use crate::message::{Message, ToolCall};
use crate::metrics::{MetricsTracker, TurnGuard};
use crate::prompt::instruction_message;
use crate::repair::repair_sequence;
use crate::schema::ResponseFormat;
use crate::tool::{Tool, ToolDefinition, ToolRegistry};

/// Everything needed to build an [`Agent`].
///
/// `client`, `name`, `memory` and `model` are required; [`Agent::new`]
/// rejects the configuration before any conversation can start when one of
/// them is missing.
pub struct AgentConfig {
    pub client: Option<Arc<dyn LanguageModel>>,
    pub name: String,
    pub system_prompt: String,
    pub memory: Option<Box<dyn Memory>>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub tools: Vec<Arc<dyn Tool>>,
    pub response_format: Option<ResponseFormat>,
    /// Maximum tool rounds per turn. `None` lets the model call tools until
    /// it answers (bounded only by `timeout`).
    pub max_tool_rounds: Option<usize>,
    pub metrics: Option<MetricsTracker>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            client: None,
            name: String::new(),
            system_prompt: String::new(),
            memory: None,
            model: String::new(),
            temperature: default_temperature(),
            timeout: Duration::from_secs(default_timeout_secs()),
            tools: Vec::new(),
            response_format: None,
            max_tool_rounds: None,
            metrics: None,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the model and agent defaults of an application config.
    pub fn from_app_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: Some(cfg.model.build_client()?),
            model: cfg.model.model.clone(),
            temperature: cfg.agent.temperature,
            timeout: cfg.agent.timeout(),
            max_tool_rounds: cfg.agent.max_tool_rounds,
            ..Self::default()
        })
    }

    pub fn with_client(mut self, client: Arc<dyn LanguageModel>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_memory(mut self, memory: impl Memory + 'static) -> Self {
        self.memory = Some(Box::new(memory));
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsTracker) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.client.is_none() {
            missing.push("client");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.memory.is_none() {
            missing.push("memory");
        }
        if self.model.trim().is_empty() {
            missing.push("model");
        }
        if !missing.is_empty() {
            return Err(SyndicateError::Validation(format!(
                "agent configuration is missing required fields: {}",
                missing.join(", ")
            )));
        }
        if self.timeout.is_zero() {
            return Err(SyndicateError::Validation(
                "agent timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// One user request against one agent.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub user_name: String,
    pub input: String,
    pub image_urls: Vec<String>,
    /// Appended after the agent's own history, e.g. shared pipeline context.
    pub additional_messages: Vec<Message>,
    /// Overrides the agent's default turn timeout.
    pub timeout: Option<Duration>,
}

impl ChatInput {
    pub fn new(user_name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn with_image_urls(mut self, urls: Vec<String>) -> Self {
        self.image_urls = urls;
        self
    }

    pub fn with_additional_messages(mut self, messages: Vec<Message>) -> Self {
        self.additional_messages = messages;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_name.is_empty() {
            return Err(SyndicateError::Validation("user name must not be empty".into()));
        }
        if self.input.is_empty() {
            return Err(SyndicateError::Validation("input must not be empty".into()));
        }
        Ok(())
    }
}

struct AgentState {
    system_prompt: String,
    tools: ToolRegistry,
    memory: Box<dyn Memory>,
    usage: Usage,
}

/// Aborts in-flight tool tasks when a turn is dropped (timeout or cancel).
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// An agent that alternates between the language model and its tools until
/// the model produces a plain answer.
///
/// All mutable state (system prompt, tools, memory) sits behind a single
/// read/write lock, so an `Agent` can be shared through an `Arc` and driven
/// from several tasks. Concurrent turns on the same agent interleave their
/// memory appends in invocation order.
pub struct Agent {
    name: String,
    client: Arc<dyn LanguageModel>,
    model: String,
    temperature: f32,
    timeout: Duration,
    response_format: Option<ResponseFormat>,
    max_tool_rounds: Option<usize>,
    metrics: Option<MetricsTracker>,
    state: RwLock<AgentState>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let AgentConfig {
            client,
            name,
            system_prompt,
            memory,
            model,
            temperature,
            timeout,
            tools,
            response_format,
            max_tool_rounds,
            metrics,
        } = config;
        let (Some(client), Some(memory)) = (client, memory) else {
            return Err(SyndicateError::Validation(
                "agent configuration is missing client or memory".into(),
            ));
        };

        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register_arc(tool);
        }

        Ok(Self {
            name,
            client,
            model,
            temperature,
            timeout,
            response_format,
            max_tool_rounds,
            metrics,
            state: RwLock::new(AgentState {
                system_prompt,
                tools: registry,
                memory,
                usage: Usage::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn system_prompt(&self) -> String {
        self.state.read().await.system_prompt.clone()
    }

    pub async fn set_system_prompt(&self, prompt: impl Into<String>) {
        self.state.write().await.system_prompt = prompt.into();
    }

    /// Registers `tool`, replacing a tool with the same name.
    pub async fn add_tool(&self, tool: impl Tool + 'static) {
        self.state.write().await.tools.register(tool);
    }

    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.state.read().await.tools.definitions()
    }

    pub async fn memory_snapshot(&self) -> Vec<Message> {
        self.state.read().await.memory.get()
    }

    pub async fn memory_len(&self) -> usize {
        self.state.read().await.memory.len()
    }

    /// Token usage accumulated across every completion this agent requested.
    pub async fn usage(&self) -> Usage {
        self.state.read().await.usage
    }

    /// Send `input` from `user_name` and wait for the final answer.
    pub async fn chat(
        &self,
        user_name: impl Into<String>,
        input: impl Into<String>,
    ) -> Result<String> {
        self.process(ChatInput::new(user_name, input)).await
    }

    /// Run one turn: record the user message, then loop between the model and
    /// the tools until a plain answer arrives, which is recorded and returned.
    ///
    /// The whole loop, tool rounds included, shares one deadline: the
    /// per-call timeout if given, otherwise the agent's default.
    pub async fn process(&self, input: ChatInput) -> Result<String> {
        input.validate()?;
        let ChatInput {
            user_name,
            input,
            image_urls,
            additional_messages,
            timeout,
        } = input;
        let timeout = timeout.unwrap_or(self.timeout);
        let mut guard = self.metrics.as_ref().map(|m| m.start_turn(&self.name));

        tracing::debug!(agent = %self.name, user = %user_name, "starting turn");
        let user_message = Message::user(input)
            .with_name(user_name)
            .with_image_urls(image_urls);
        self.state.write().await.memory.add(user_message);

        let tools = Arc::new(self.state.read().await.tools.clone());
        let turn = self.run_turn(tools, &additional_messages, &mut guard);
        let outcome = tokio::time::timeout(timeout, turn)
            .await
            .unwrap_or(Err(SyndicateError::Timeout(timeout)));

        match outcome {
            Ok(answer) => {
                if let Some(guard) = guard {
                    guard.finish(true);
                }
                tracing::debug!(agent = %self.name, "turn finished");
                Ok(answer)
            }
            Err(err) => {
                tracing::debug!(agent = %self.name, error = %err, "turn failed");
                Err(err)
            }
        }
    }

    async fn run_turn(
        &self,
        tools: Arc<ToolRegistry>,
        additional: &[Message],
        metrics: &mut Option<TurnGuard>,
    ) -> Result<String> {
        let definitions = tools.definitions();
        let mut tool_rounds = 0usize;

        loop {
            let request = ChatRequest {
                model: self.model.clone(),
                messages: self.build_messages(additional).await,
                tools: definitions.clone(),
                temperature: self.temperature,
                response_format: self.response_format.clone(),
            };
            let response = self.client.complete_chat(&request).await.map_err(|source| {
                SyndicateError::Completion {
                    agent: self.name.clone(),
                    source: Box::new(source),
                }
            })?;

            self.state.write().await.usage += response.usage;
            if let Some(guard) = metrics.as_mut() {
                guard.record_round(response.usage);
            }

            let choice = response.choices.into_iter().next().ok_or_else(|| {
                SyndicateError::Protocol(format!(
                    "model returned no choices for agent `{}`",
                    self.name
                ))
            })?;

            if choice.finish_reason != FinishReason::ToolCalls {
                let answer = choice.message.content;
                self.state
                    .write()
                    .await
                    .memory
                    .add(Message::assistant(answer.clone()).with_name(self.name.clone()));
                return Ok(answer);
            }

            if choice.message.tool_calls.is_empty() {
                return Err(SyndicateError::Protocol(format!(
                    "model requested tool calls for agent `{}` but supplied none",
                    self.name
                )));
            }
            if self.max_tool_rounds.is_some_and(|limit| tool_rounds >= limit) {
                return Err(SyndicateError::StepLimit {
                    agent: self.name.clone(),
                    rounds: tool_rounds,
                });
            }

            let calls = choice.message.tool_calls.clone();
            tracing::debug!(
                agent = %self.name,
                round = tool_rounds + 1,
                calls = calls.len(),
                "dispatching tool calls"
            );
            let results = self.dispatch_tools(&tools, &calls).await?;
            if let Some(guard) = metrics.as_mut() {
                guard.record_tool_calls(calls.len());
            }

            // The request and its answers land together, so a failed batch
            // leaves no half-answered tool request behind.
            {
                let mut state = self.state.write().await;
                state
                    .memory
                    .add(choice.message.with_name(self.name.clone()));
                for result in results {
                    state.memory.add(result);
                }
            }
            tool_rounds += 1;
        }
    }

    /// Prompt message, repaired memory, then the caller's additional context.
    async fn build_messages(&self, additional: &[Message]) -> Vec<Message> {
        let state = self.state.read().await;
        let mut messages = Vec::new();
        if let Some(instruction) = instruction_message(&self.model, &state.system_prompt) {
            messages.push(instruction);
        }
        messages.extend(repair_sequence(state.memory.get()));
        messages.extend(additional.iter().cloned());
        messages
    }

    /// Run every call on its own task and wait for all of them. Results come
    /// back in call order; the first failure (in call order) fails the batch.
    async fn dispatch_tools(
        &self,
        tools: &Arc<ToolRegistry>,
        calls: &[ToolCall],
    ) -> Result<Vec<Message>> {
        let handles: Vec<JoinHandle<Result<String>>> = calls
            .iter()
            .map(|call| {
                let tools = Arc::clone(tools);
                let name = call.name.clone();
                let arguments = call.arguments.clone();
                tokio::spawn(async move { tools.call(&name, &arguments).await })
            })
            .collect();
        let _abort = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());

        let outputs = join_all(handles).await;
        let mut results = Vec::with_capacity(calls.len());
        for (call, output) in calls.iter().zip(outputs) {
            let output = output.map_err(|join_err| SyndicateError::ToolInvocation {
                name: call.name.clone(),
                source: Box::new(join_err),
            });
            match output.and_then(|result| result) {
                Ok(content) => results.push(Message::tool(&call.name, &call.id, content)),
                Err(err) => {
                    tracing::warn!(
                        agent = %self.name,
                        tool = %call.name,
                        call_id = %call.id,
                        error = %err,
                        "tool call failed, discarding batch"
                    );
                    return Err(err);
                }
            }
        }
        Ok(results)
    }
}
