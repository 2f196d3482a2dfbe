//! Multi-agent orchestration over chat-completion models.
//!
//! The crate provides:
//! - An [`Agent`] that runs tool-calling turns against a [`LanguageModel`],
//!   dispatching each batch of tool calls in parallel and keeping its
//!   [`Memory`] consistent on failure, timeout or cancellation.
//! - A [`Syndicate`] that registers named agents, runs them as a sequential
//!   pipeline and records every exchange in a shared global history.
//! - Tool and schema helpers ([`FunctionTool`], [`generate_schema`]) and a
//!   [`PromptBuilder`] for structured system prompts.

mod agent;
mod config;
mod error;
mod llm;
mod memory;
mod message;
mod metrics;
mod openai;
mod prompt;
mod repair;
mod schema;
mod syndicate;
mod telemetry;
mod tool;

pub use agent::{Agent, AgentConfig, ChatInput};
pub use config::{AgentDefaults, AppConfig, LoggingConfig, ModelConfig};
pub use error::{Result, SyndicateError};
pub use llm::{
    ChatRequest, ChatResponse, Choice, FinishReason, LanguageModel, StubModel, Usage,
};
pub use memory::{ConversationMemory, Memory, TokenLimitedMemory, WindowedMemory};
pub use message::{Message, Role, ToolCall};
pub use metrics::{MetricsTracker, TurnGuard, TurnReport};
pub use openai::OpenAiClient;
pub use prompt::{instruction_message, system_role_for, PromptBuilder};
pub use repair::repair_sequence;
pub use schema::{generate_schema, ResponseFormat};
pub use syndicate::{HistoryMode, Syndicate, SyndicateBuilder};
pub use telemetry::init_tracing;
pub use tool::{render_result, FunctionTool, Tool, ToolDefinition, ToolRegistry};
