//! JSON schema generation for tool parameters and structured responses.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generate the JSON schema describing `T`.
pub fn generate_schema<T: JsonSchema>() -> Value {
    Value::from(schemars::schema_for!(T))
}

/// Asks the model to answer with JSON matching `schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
    #[serde(default)]
    pub strict: bool,
}

impl ResponseFormat {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }

    pub fn json_schema<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self::new(name, generate_schema::<T>())
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
