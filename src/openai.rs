//! OpenAI-compatible chat completions transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::ModelConfig;
use crate::error::{Result, SyndicateError};
use crate::llm::{ChatRequest, ChatResponse, Choice, FinishReason, LanguageModel, Usage};
use crate::message::{Message, Role, ToolCall};
use crate::schema::ResponseFormat;
use crate::tool::ToolDefinition;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn coalesce_error(status: reqwest::StatusCode, body: &str) -> SyndicateError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return SyndicateError::LanguageModel(format!("openai rate limit exceeded: {body}"));
    }
    SyndicateError::LanguageModel(format!("openai request failed with {status}: {body}"))
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    organization: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(&ModelConfig {
            provider: "openai".into(),
            api_key: Some(api_key.into()),
            ..ModelConfig::default()
        })
    }

    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| SyndicateError::Config("missing OpenAI API key in model config".into()))?;
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.request_timeout_secs))
                .build()
                .map_err(|err| SyndicateError::LanguageModel(format!("http client error: {err}")))?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            organization: cfg.organization.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_payload(request: &ChatRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": to_openai_messages(&request.messages),
            "temperature": request.temperature,
        });
        if let Some(tools) = to_openai_tools(&request.tools) {
            payload["tools"] = json!(tools);
            payload["tool_choice"] = json!("auto");
        }
        if let Some(format) = &request.response_format {
            payload["response_format"] = to_openai_response_format(format);
        }
        payload
    }
}

fn to_openai_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
    messages
        .iter()
        .map(|message| {
            let content = if message.role == Role::User && !message.image_urls.is_empty() {
                let mut parts = vec![json!({"type": "text", "text": message.content})];
                parts.extend(message.image_urls.iter().map(|url| {
                    json!({"type": "image_url", "image_url": {"url": url}})
                }));
                Some(Value::Array(parts))
            } else if message.content.is_empty() && !message.tool_calls.is_empty() {
                None
            } else {
                Some(Value::String(message.content.clone()))
            };

            let tool_calls = if message.tool_calls.is_empty() {
                None
            } else {
                Some(
                    message
                        .tool_calls
                        .iter()
                        .map(|call| OpenAiToolCall {
                            id: call.id.clone(),
                            r#type: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            };

            // Tool replies carry the call id; the tool name is implied by it.
            let name = match message.role {
                Role::Tool => None,
                _ => message.name.as_deref().map(sanitize_name),
            };

            OpenAiMessage {
                role: message.role.as_str().to_string(),
                content,
                name,
                tool_call_id: message.tool_call_id.clone(),
                tool_calls,
            }
        })
        .collect()
}

/// OpenAI only accepts `[a-zA-Z0-9_-]{1,64}` as a participant name.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Option<Vec<OpenAiTool>> {
    if tools.is_empty() {
        return None;
    }

    Some(
        tools
            .iter()
            .map(|tool| OpenAiTool {
                r#type: "function".to_string(),
                function: OpenAiFunction {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    parameters: Some(tool.parameters.clone()),
                },
            })
            .collect(),
    )
}

fn to_openai_response_format(format: &ResponseFormat) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": format.name,
            "schema": format.schema,
            "strict": format.strict,
        }
    })
}

fn from_openai_response(body: OpenAiResponse) -> ChatResponse {
    let choices = body
        .choices
        .into_iter()
        .map(|choice| {
            let tool_calls: Vec<ToolCall> = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    // Some compatible servers omit ids; results are paired by id.
                    id: if call.id.is_empty() {
                        format!("call_{}", Uuid::new_v4().simple())
                    } else {
                        call.id
                    },
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect();
            let mut finish_reason = FinishReason::from_provider(choice.finish_reason.as_deref());
            if !tool_calls.is_empty() {
                finish_reason = FinishReason::ToolCalls;
            }
            Choice {
                message: Message::assistant_tool_calls(
                    choice.message.content.unwrap_or_default(),
                    tool_calls,
                ),
                finish_reason,
            }
        })
        .collect();

    ChatResponse {
        choices,
        usage: body.usage.unwrap_or_default(),
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let payload = Self::build_payload(request);

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            );
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        let resp = builder
            .json(&payload)
            .send()
            .await
            .map_err(|err| SyndicateError::LanguageModel(format!("OpenAI request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            SyndicateError::LanguageModel(format!("OpenAI response parse error: {err}"))
        })?;

        Ok(from_openai_response(body))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: "o3-mini".into(),
            messages,
            tools: vec![ToolDefinition {
                name: "Add".into(),
                description: "Adds numbers".into(),
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.3,
            response_format: Some(ResponseFormat::new("answer", json!({"type": "object"}))),
        }
    }

    #[test]
    fn builds_payload_with_tools_images_and_schema() {
        let messages = vec![
            Message::developer("be terse"),
            Message::user("what is this?")
                .with_name("alice smith")
                .with_image_urls(vec!["https://img/1.png".into()]),
            Message::assistant_tool_calls("", vec![ToolCall::new("call_1", "Add", r#"{"a":1}"#)]),
            Message::tool("Add", "call_1", "1"),
        ];

        let payload = OpenAiClient::build_payload(&request(messages));
        let sent = &payload["messages"];

        assert_eq!(sent[0]["role"], "developer");
        assert_eq!(sent[1]["name"], "alice_smith");
        assert_eq!(sent[1]["content"][1]["image_url"]["url"], "https://img/1.png");
        assert!(sent[2].get("content").is_none());
        assert_eq!(sent[2]["tool_calls"][0]["function"]["arguments"], r#"{"a":1}"#);
        assert_eq!(sent[3]["tool_call_id"], "call_1");
        assert!(sent[3].get("name").is_none());
        assert_eq!(payload["tools"][0]["function"]["name"], "Add");
        assert_eq!(payload["tool_choice"], "auto");
        assert_eq!(payload["response_format"]["type"], "json_schema");
        assert_eq!(payload["response_format"]["json_schema"]["name"], "answer");
    }

    #[test]
    fn omits_tools_when_none_registered() {
        let mut req = request(vec![Message::user("hi")]);
        req.tools.clear();
        req.response_format = None;
        let payload = OpenAiClient::build_payload(&req);
        assert!(payload.get("tools").is_none());
        assert!(payload.get("response_format").is_none());
    }

    #[test]
    fn decodes_choices_and_usage() {
        let body: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "Add", "arguments": "{\"a\":2,\"b\":3}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();

        let response = from_openai_response(body);
        let choice = &response.choices[0];
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);
        assert_eq!(choice.message.tool_calls[0].id, "call_9");
        assert_eq!(choice.message.tool_calls[0].arguments, "{\"a\":2,\"b\":3}");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn fills_missing_tool_call_ids() {
        let body: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [
                        {"function": {"name": "add", "arguments": "{}"}},
                        {"function": {"name": "add", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "stop"
            }]
        }))
        .unwrap();

        let response = from_openai_response(body);
        let calls = &response.choices[0].message.tool_calls;
        assert_eq!(response.choices[0].finish_reason, FinishReason::ToolCalls);
        assert!(calls[0].id.starts_with("call_"));
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn decodes_empty_choice_list() {
        let body: OpenAiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        let response = from_openai_response(body);
        assert!(response.choices.is_empty());
        assert_eq!(response.usage, Usage::default());
    }

    #[test]
    fn requires_api_key() {
        let err = OpenAiClient::from_config(&ModelConfig::default()).err().unwrap();
        assert!(matches!(err, SyndicateError::Config(_)));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = OpenAiClient::new("sk-test").unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.api_key, "sk-test");

        let local = client.with_base_url("http://localhost:8080/v1/");
        assert_eq!(local.base_url, "http://localhost:8080/v1");
    }
}
