//! Tool trait — the abstraction over the bot's capabilities.
//!
//! Tools are what let the model answer with live data: the clock, weather,
//! web search, news, the user's todo list. The model asks for them in plain
//! text; the dispatcher runs them and feeds the results back.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::state::ConversationState;

/// A request to execute a tool, as recovered from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub tool_name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call this result answers
    pub tool_call: ToolCall,

    /// The payload: a string or any structured JSON value
    pub result: Value,
}

impl ToolResult {
    /// The payload as prompt text. Strings pass through verbatim,
    /// everything else is serialized as JSON.
    pub fn result_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Context a tool asks the dispatcher to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Injection {
    /// The shared outbound HTTP client.
    HttpClient,
    /// Mutable access to the caller's conversation state. Sync tools only.
    UserState,
    /// Fill this argument from the configured tool defaults when the model
    /// did not supply it.
    Default(&'static str),
}

/// Process-wide context shared by every dispatch.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub http: reqwest::Client,

    /// Default argument values, keyed by argument name (e.g. `city`)
    pub defaults: HashMap<String, Value>,
}

impl ToolContext {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            defaults: HashMap::new(),
        }
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }
}

/// Everything a tool receives for one execution.
///
/// Injected handles live outside `arguments`, so nothing the model writes
/// can replace them.
pub struct ToolInput<'a> {
    pub arguments: Map<String, Value>,
    pub http: Option<reqwest::Client>,
    pub state: Option<&'a mut ConversationState>,
}

impl<'a> ToolInput<'a> {
    pub fn new(arguments: Map<String, Value>) -> Self {
        Self {
            arguments,
            http: None,
            state: None,
        }
    }

    /// A string argument, if present and a string.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// A required, non-blank string argument.
    pub fn require_str(&self, tool_name: &str, key: &str) -> Result<&str, ToolError> {
        self.str_arg(key)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("{tool_name}: missing '{key}' argument"))
            })
    }

    /// The injected HTTP client.
    pub fn http(&self, tool_name: &str) -> Result<&reqwest::Client, ToolError> {
        self.http.as_ref().ok_or_else(|| ToolError::MissingContext {
            tool_name: tool_name.to_string(),
            what: "http client".into(),
        })
    }

    /// The injected conversation state.
    pub fn state(&mut self, tool_name: &str) -> Result<&mut ConversationState, ToolError> {
        self.state.as_deref_mut().ok_or_else(|| ToolError::MissingContext {
            tool_name: tool_name.to_string(),
            what: "user state".into(),
        })
    }
}

/// The core Tool trait.
///
/// Each plugin (time, weather, search, news, todos, music) implements this
/// trait and is registered in the ToolRegistry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name the model uses (e.g., "get_current_time").
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's arguments.
    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Async tools are fanned out concurrently; sync tools run one after
    /// another in encounter order.
    fn is_async(&self) -> bool {
        false
    }

    /// Context this tool needs injected.
    fn injections(&self) -> &[Injection] {
        &[]
    }

    /// Execute the tool.
    async fn execute(&self, input: ToolInput<'_>) -> Result<Value, ToolError>;
}

/// A registry of available tools, fixed after startup.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    ///
    /// An async tool that declares [`Injection::UserState`] is rejected.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        if tool.is_async() && tool.injections().contains(&Injection::UserState) {
            return Err(ToolError::InvalidRegistration {
                tool_name: tool.name().to_string(),
                reason: "async tools cannot borrow user state".into(),
            });
        }
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// One `- name: description` line per tool, sorted by name.
    pub fn catalog(&self) -> String {
        self.names()
            .into_iter()
            .filter_map(|name| self.get(name))
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
