//! Language model abstraction shared by every transport.

use std::collections::VecDeque;
use std::ops::AddAssign;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyndicateError};
use crate::message::{Message, ToolCall};
use crate::schema::ResponseFormat;
use crate::tool::ToolDefinition;

/// Everything a provider needs for one completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw {
            None | Some("stop") => FinishReason::Stop,
            Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub message: Message,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// Minimal abstraction around a chat completion provider.
///
/// Implementations return at least one choice or an error, report
/// `FinishReason::ToolCalls` whenever the message carries tool calls, and
/// ignore `temperature`/`response_format` when the provider lacks them.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// A deterministic model used for tests and demos.
///
/// Each call pops the next scripted directive:
/// - `{"action":"respond","content":"..."}`
/// - `{"action":"call_tool","name":"...","arguments":{...}}`
/// - `{"action":"call_tools","calls":[{"name":"...","arguments":{...}}, ...]}`
/// - `{"action":"fail","error":"..."}`
/// - `{"action":"empty"}` (a response with no choices)
///
/// Anything that is not a directive is returned verbatim as the answer.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self::scripted(responses))
    }

    /// Like `new`, but every completion first sleeps for `delay`.
    pub fn with_delay(responses: Vec<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::scripted(responses)
        })
    }

    fn scripted(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .map(|responses| responses.len())
            .unwrap_or_default()
    }

    fn next_response(&self, request: &ChatRequest) -> Result<String> {
        let poisoned = || SyndicateError::LanguageModel("stub model poisoned".into());
        self.requests
            .lock()
            .map_err(|_| poisoned())?
            .push(request.clone());
        self.responses
            .lock()
            .map_err(|_| poisoned())?
            .pop_front()
            .ok_or_else(|| {
                SyndicateError::LanguageModel("StubModel ran out of scripted responses".into())
            })
    }
}

#[derive(Debug, Deserialize)]
struct StubCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond {
        content: String,
        #[serde(default)]
        usage: Usage,
    },
    CallTool {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        usage: Usage,
    },
    CallTools {
        calls: Vec<StubCall>,
        #[serde(default)]
        usage: Usage,
    },
    Fail {
        error: String,
    },
    Empty,
}

fn stub_tool_calls(calls: Vec<StubCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(idx, call)| ToolCall {
            id: call.id.unwrap_or_else(|| format!("call_{idx}")),
            name: call.name,
            arguments: match call.arguments {
                Value::Null => "{}".to_string(),
                Value::String(raw) => raw,
                other => other.to_string(),
            },
        })
        .collect()
}

fn single_choice(message: Message, finish_reason: FinishReason, usage: Usage) -> ChatResponse {
    ChatResponse {
        choices: vec![Choice {
            message,
            finish_reason,
        }],
        usage,
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let raw = self.next_response(request)?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content, usage }) => Ok(single_choice(
                Message::assistant(content),
                FinishReason::Stop,
                usage,
            )),
            Ok(StubDirective::CallTool {
                id,
                name,
                arguments,
                usage,
            }) => Ok(single_choice(
                Message::assistant_tool_calls(
                    "",
                    stub_tool_calls(vec![StubCall {
                        id,
                        name,
                        arguments,
                    }]),
                ),
                FinishReason::ToolCalls,
                usage,
            )),
            Ok(StubDirective::CallTools { calls, usage }) => Ok(single_choice(
                Message::assistant_tool_calls("", stub_tool_calls(calls)),
                FinishReason::ToolCalls,
                usage,
            )),
            Ok(StubDirective::Fail { error }) => Err(SyndicateError::LanguageModel(error)),
            Ok(StubDirective::Empty) => Ok(ChatResponse::default()),
            Err(_) => Ok(single_choice(
                Message::assistant(raw),
                FinishReason::Stop,
                Usage::default(),
            )),
        }
    }
}
