use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyndicateError>;

#[derive(Debug, Error)]
pub enum SyndicateError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("agent `{0}` not found")]
    AgentNotFound(String),

    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("chat completion for agent `{agent}` failed: {source}")]
    Completion {
        agent: String,
        #[source]
        source: Box<SyndicateError>,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("turn timed out after {0:?}")]
    Timeout(Duration),

    #[error("agent `{agent}` exceeded {rounds} tool rounds without a final answer")]
    StepLimit { agent: String, rounds: usize },

    #[error("pipeline step `{agent}` failed: {source}")]
    Pipeline {
        agent: String,
        #[source]
        source: Box<SyndicateError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl SyndicateError {
    /// Walks through `Completion` and `Pipeline` wrappers to the error that caused them.
    pub fn root_cause(&self) -> &SyndicateError {
        match self {
            SyndicateError::Completion { source, .. } | SyndicateError::Pipeline { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}
