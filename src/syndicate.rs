use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agent::{Agent, ChatInput};
use crate::error::{Result, SyndicateError};
use crate::memory::{ConversationMemory, Memory};
use crate::message::Message;

/// Whether an agent call sees the syndicate's shared history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    /// Replay the global history as additional context.
    #[default]
    Global,
    /// Only the agent's own memory.
    Isolated,
}

#[derive(Default)]
pub struct SyndicateBuilder {
    agents: Vec<Arc<Agent>>,
    pipeline: Vec<String>,
    global_history: Option<Box<dyn Memory>>,
}

impl SyndicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(Arc::new(agent));
        self
    }

    /// Register an agent that is also used outside this syndicate.
    pub fn with_shared_agent(mut self, agent: Arc<Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_agents(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.agents.extend(agents.into_iter().map(Arc::new));
        self
    }

    pub fn with_pipeline<I, S>(mut self, pipeline: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline = pipeline.into_iter().map(Into::into).collect();
        self
    }

    /// Defaults to an unbounded [`ConversationMemory`].
    pub fn with_global_history(mut self, memory: impl Memory + 'static) -> Self {
        self.global_history = Some(Box::new(memory));
        self
    }

    pub fn build(self) -> Result<Syndicate> {
        let mut agents = HashMap::with_capacity(self.agents.len());
        for agent in self.agents {
            let name = agent.name().to_string();
            if agents.insert(name.clone(), agent).is_some() {
                return Err(SyndicateError::Validation(format!(
                    "agent `{name}` registered more than once"
                )));
            }
        }

        if let Some(unknown) = self.pipeline.iter().find(|name| !agents.contains_key(*name)) {
            return Err(SyndicateError::Validation(format!(
                "pipeline references unknown agent `{unknown}`"
            )));
        }

        let global_history = self
            .global_history
            .unwrap_or_else(|| Box::new(ConversationMemory::new()));

        Ok(Syndicate {
            agents,
            pipeline: self.pipeline,
            global_history: RwLock::new(global_history),
        })
    }
}

/// Named agents, a fixed pipeline over them, and the history they share.
///
/// Each pipeline step feeds its answer to the next step as input. Every
/// successful agent call appends two entries to the global history: the raw
/// input (named after the user) and the answer prefixed with
/// `"[<agent>]: "` so later agents can tell who said what.
///
/// Reading the history snapshot and appending the exchange are not atomic
/// with respect to other concurrent calls; callers that need strict ordering
/// across concurrent pipelines serialize them themselves.
pub struct Syndicate {
    agents: HashMap<String, Arc<Agent>>,
    pipeline: Vec<String>,
    global_history: RwLock<Box<dyn Memory>>,
}

impl Syndicate {
    pub fn builder() -> SyndicateBuilder {
        SyndicateBuilder::new()
    }

    pub fn find_agent(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn pipeline(&self) -> &[String] {
        &self.pipeline
    }

    pub async fn global_history(&self) -> Vec<Message> {
        self.global_history.read().await.get()
    }

    pub async fn global_history_len(&self) -> usize {
        self.global_history.read().await.len()
    }

    /// Run one agent with the global history as context.
    pub async fn execute_agent(&self, agent_name: &str, input: ChatInput) -> Result<String> {
        self.execute_agent_with(agent_name, input, HistoryMode::Global)
            .await
    }

    pub async fn execute_agent_with(
        &self,
        agent_name: &str,
        mut input: ChatInput,
        mode: HistoryMode,
    ) -> Result<String> {
        input.validate()?;
        let agent = self
            .find_agent(agent_name)
            .ok_or_else(|| SyndicateError::AgentNotFound(agent_name.to_string()))?;

        if mode == HistoryMode::Global {
            let mut context = self.global_history.read().await.get();
            context.append(&mut input.additional_messages);
            input.additional_messages = context;
        }

        let user_name = input.user_name.clone();
        let raw_input = input.input.clone();
        let response = agent.process(input).await?;

        let mut history = self.global_history.write().await;
        history.add(Message::user(raw_input).with_name(user_name));
        history.add(
            Message::assistant(format!("[{agent_name}]: {response}")).with_name(agent_name),
        );
        Ok(response)
    }

    /// Run the pipeline in order, feeding each answer to the next agent.
    /// Images go to the first step only. The first failing step aborts the
    /// run; history recorded by earlier steps is kept.
    pub async fn execute_pipeline(
        &self,
        user_name: impl Into<String>,
        input: impl Into<String>,
        image_urls: Vec<String>,
    ) -> Result<String> {
        if self.pipeline.is_empty() {
            return Err(SyndicateError::Validation("no pipeline configured".into()));
        }
        let user_name = user_name.into();
        let mut current = input.into();
        ChatInput::new(user_name.as_str(), current.as_str()).validate()?;

        let mut images = Some(image_urls);
        for (step, agent_name) in self.pipeline.iter().enumerate() {
            tracing::info!(step, agent = %agent_name, "running pipeline step");
            let request = ChatInput::new(user_name.as_str(), current)
                .with_image_urls(images.take().unwrap_or_default());
            current = self
                .execute_agent(agent_name, request)
                .await
                .map_err(|source| {
                    tracing::warn!(step, agent = %agent_name, error = %source, "pipeline step failed");
                    SyndicateError::Pipeline {
                        agent: agent_name.clone(),
                        source: Box::new(source),
                    }
                })?;
        }
        Ok(current)
    }
}
