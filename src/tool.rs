use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyndicateError};
use crate::schema::generate_schema;

/// Static description of a tool, sent to the model with every request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool against the raw argument payload issued by the model.
    async fn execute(&self, arguments: &str) -> Result<Value>;
}

/// Render a tool result as the text stored in a tool-role message.
/// Strings are kept verbatim, everything else becomes compact JSON.
pub fn render_result(value: Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text),
        other => Ok(serde_json::to_string(&other)?),
    }
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers `tool`, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.definition()).collect();

        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Look up `name`, execute it and render the result as text.
    pub async fn call(&self, name: &str, arguments: &str) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| SyndicateError::ToolNotFound(name.to_string()))?;
        let wrap = |source: SyndicateError| SyndicateError::ToolInvocation {
            name: name.to_string(),
            source: Box::new(source),
        };
        let output = tool.execute(arguments).await.map_err(wrap)?;
        render_result(output).map_err(wrap)
    }
}

type Handler<A> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A tool backed by an async closure over typed arguments. The parameter
/// schema is derived from `A`.
pub struct FunctionTool<A> {
    name: String,
    description: String,
    parameters: Value,
    handler: Handler<A>,
    _args: PhantomData<fn() -> A>,
}

impl<A> FunctionTool<A>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
{
    pub fn new<F, Fut, R>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            name: name.into(),
            description: description.into(),
            parameters: generate_schema::<A>(),
            handler: Arc::new(move |args: A| {
                let fut = handler(args);
                Box::pin(async move {
                    let output = fut.await?;
                    Ok(serde_json::to_value(output)?)
                }) as BoxFuture<'static, Result<Value>>
            }),
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<A> Tool for FunctionTool<A>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
{
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    async fn execute(&self, arguments: &str) -> Result<Value> {
        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let args: A = serde_json::from_str(raw)?;
        (self.handler)(args).await
    }
}
