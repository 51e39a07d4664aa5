//! Tool System
//!
//! The orchestrator only sees the [`ToolExecutor`] collaborator: a schema
//! list to offer the model and a `call(name, args)` entry point. The
//! [`ToolRegistry`] here is the in-process implementation, built from
//! individually registered [`Tool`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{AgentError, Result};

/// Tool description offered to the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,

    /// JSON Schema of the argument object
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Schema used when a tool declares no parameters
    pub fn empty_parameters() -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }
}

/// Tool registry collaborator consumed by the orchestrator
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Descriptors for every callable tool
    fn schema(&self) -> Vec<ToolDescriptor>;

    /// Invoke a tool by name.
    ///
    /// Fails with [`AgentError::ToolNotFound`] for unknown names, or with the
    /// tool's own error otherwise.
    async fn call(&self, name: &str, args: Value) -> Result<Value>;
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Tool definition schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Render as a descriptor with a JSON Schema object
    pub fn to_descriptor(&self) -> ToolDescriptor {
        if self.parameters.is_empty() {
            return ToolDescriptor::new(&self.name, &self.description, ToolDescriptor::empty_parameters());
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        ToolDescriptor::new(
            &self.name,
            &self.description,
            json!({ "type": "object", "properties": properties, "required": required }),
        )
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with an argument object
    async fn execute(&self, args: &Value) -> Result<Value>;

    /// Validate arguments before execution (optional)
    fn validate(&self, args: &Value) -> Result<()> {
        let schema = self.schema();

        for param in schema.parameters.iter().filter(|p| p.required) {
            if args.get(&param.name).is_none() {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ClockTool);
        registry
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn schema(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.schema().to_descriptor()).collect()
    }

    async fn call(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        tool.validate(&args)?;

        tool.execute(&args).await.map_err(|e| match e {
            AgentError::ToolExecution(_) | AgentError::ToolValidation(_) => e,
            other => AgentError::ToolExecution(format!("tool \"{name}\" failed: {other}")),
        })
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Clock tool - returns the current time
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_current_time".into(),
            description: "Get the current date and time".into(),
            parameters: vec![
                ParameterSchema::new(
                    "utc_offset_hours",
                    "number",
                    "Offset from UTC in hours for the formatted time (default: 0)",
                )
                .with_default(json!(0)),
            ],
        }
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let offset_hours = args
            .get("utc_offset_hours")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        #[allow(clippy::cast_possible_truncation)]
        let offset_secs = (offset_hours * 3600.0).round() as i32;
        let offset = chrono::FixedOffset::east_opt(offset_secs).ok_or_else(|| {
            AgentError::ToolValidation(format!("utc_offset_hours out of range: {offset_hours}"))
        })?;

        let now = chrono::Utc::now();
        let local = now.with_timezone(&offset);

        Ok(json!({
            "iso": now.to_rfc3339(),
            "unix": now.timestamp(),
            "utc_offset": offset.to_string(),
            "formatted": local.format("%Y-%m-%d %H:%M:%S").to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo the text back".into(),
                parameters: vec![ParameterSchema::new("text", "string", "Text to echo").required()],
            }
        }

        async fn execute(&self, args: &Value) -> Result<Value> {
            Ok(args["text"].clone())
        }
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::with_builtins();
        registry.register(EchoTool);

        assert_eq!(registry.len(), 2);
        assert!(registry.get("get_current_time").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec!["echo", "get_current_time"]);
    }

    #[test]
    fn test_schema_renders_json_schema() {
        let descriptor = EchoTool.schema().to_descriptor();
        assert_eq!(descriptor.parameters["type"], "object");
        assert_eq!(descriptor.parameters["properties"]["text"]["type"], "string");
        assert_eq!(descriptor.parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_call_dispatches_and_validates() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let out = registry.call("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, json!("hi"));

        let missing = registry.call("echo", json!({})).await.unwrap_err();
        assert!(matches!(missing, AgentError::ToolValidation(_)));

        let unknown = registry.call("nope", json!({})).await.unwrap_err();
        assert!(matches!(unknown, AgentError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_clock_tool() {
        let out = ClockTool.execute(&json!({"utc_offset_hours": 8})).await.unwrap();
        assert_eq!(out["utc_offset"], "+08:00");
        assert!(out["unix"].as_i64().unwrap() > 0);

        assert!(ClockTool.execute(&json!({"utc_offset_hours": 99})).await.is_err());
    }
}
