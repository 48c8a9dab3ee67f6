//! Tool dispatcher.
//!
//! Runs a batch of tool calls against the registry. Sync tools run one
//! after another in encounter order and are the only ones that may touch
//! the user's state; async tools are fanned out together. Both groups run
//! at the same time.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lalabot_core::error::ToolError;
use lalabot_core::state::ConversationState;
use lalabot_core::tool::{Injection, Tool, ToolCall, ToolContext, ToolInput, ToolRegistry, ToolResult};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Longest payload excerpt written to the log.
const LOG_PAYLOAD_CHARS: usize = 150;

/// The result value a failed or timed-out tool contributes.
pub fn unavailable(reason: &str) -> Value {
    Value::String(format!("(tool unavailable: {reason})"))
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext, timeout: Duration) -> Self {
        Self {
            registry,
            context,
            timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `calls` and return one result per registered call.
    ///
    /// Results list the sync tools in encounter order, then the async
    /// tools in call order. Unregistered names are dropped. A failing tool
    /// yields an `unavailable` result and never affects the others.
    pub async fn dispatch(
        &self,
        calls: Vec<ToolCall>,
        state: &mut ConversationState,
    ) -> Vec<ToolResult> {
        let mut sync_calls = Vec::new();
        let mut async_calls = Vec::new();

        for call in calls {
            let Some(tool) = self.registry.get(&call.tool_name) else {
                warn!(tool = %call.tool_name, "Model requested an unregistered tool");
                continue;
            };
            info!(
                tool = %call.tool_name,
                arguments = %serde_json::Value::Object(call.arguments.clone()),
                "Dispatching tool call"
            );
            if tool.is_async() {
                async_calls.push((tool, call));
            } else {
                sync_calls.push((tool, call));
            }
        }

        let sync_group = async {
            let mut results = Vec::with_capacity(sync_calls.len());
            for (tool, call) in sync_calls {
                let mut input = self.prepare(tool, &call);
                if tool.injections().contains(&Injection::UserState) {
                    input.state = Some(&mut *state);
                }
                let outcome = self.run(tool, input).await;
                results.push(settle(call, outcome));
            }
            results
        };

        let async_group = join_all(async_calls.into_iter().map(|(tool, call)| async move {
            let outcome = self.run(tool, self.prepare(tool, &call)).await;
            settle(call, outcome)
        }));

        let (mut results, async_results) = tokio::join!(sync_group, async_group);
        results.extend(async_results);
        results
    }

    /// Build the tool's input: model arguments, injected handles, and
    /// defaults for keys the model left out.
    fn prepare<'s>(&self, tool: &dyn Tool, call: &ToolCall) -> ToolInput<'s> {
        let mut input = ToolInput::new(call.arguments.clone());
        for injection in tool.injections() {
            match injection {
                Injection::HttpClient => input.http = Some(self.context.http.clone()),
                Injection::Default(key) => {
                    if !input.arguments.contains_key(*key) {
                        if let Some(value) = self.context.defaults.get(*key) {
                            input.arguments.insert((*key).to_string(), value.clone());
                        }
                    }
                }
                Injection::UserState => {}
            }
        }
        input
    }

    async fn run(&self, tool: &dyn Tool, input: ToolInput<'_>) -> Result<Value, ToolError> {
        match tokio::time::timeout(self.timeout, tool.execute(input)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolError::Timeout {
                tool_name: tool.name().to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

fn settle(call: ToolCall, outcome: Result<Value, ToolError>) -> ToolResult {
    let result = match outcome {
        Ok(value) => value,
        Err(e) => {
            warn!(tool = %call.tool_name, error = %e, "Tool failed");
            unavailable(&e.to_string())
        }
    };
    let result = ToolResult {
        tool_call: call,
        result,
    };
    debug!(
        tool = %result.tool_call.tool_name,
        payload = %excerpt(&result.result_text()),
        "Tool finished"
    );
    result
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(LOG_PAYLOAD_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
