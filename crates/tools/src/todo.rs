//! Todo tools — a per-user list kept in the conversation state.

use async_trait::async_trait;
use lalabot_core::error::ToolError;
use lalabot_core::tool::{Injection, Tool, ToolInput};
use serde_json::Value;

pub struct AddTodoTool;

#[async_trait]
impl Tool for AddTodoTool {
    fn name(&self) -> &str {
        "add_todo"
    }

    fn description(&self) -> &str {
        "Add an item to the user's todo list."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "item": { "type": "string", "description": "The todo item" }
            },
            "required": ["item"]
        })
    }

    fn injections(&self) -> &[Injection] {
        &[Injection::UserState]
    }

    async fn execute(&self, mut input: ToolInput<'_>) -> Result<Value, ToolError> {
        let item = input.require_str(self.name(), "item")?.to_string();
        input.state(self.name())?.todos.push(item.clone());
        Ok(Value::String(format!("成功新增待辦事項：{item}")))
    }
}

pub struct ListTodosTool;

#[async_trait]
impl Tool for ListTodosTool {
    fn name(&self) -> &str {
        "list_todos"
    }

    fn description(&self) -> &str {
        "List the user's todo items."
    }

    fn injections(&self) -> &[Injection] {
        &[Injection::UserState]
    }

    async fn execute(&self, mut input: ToolInput<'_>) -> Result<Value, ToolError> {
        let todos = &input.state(self.name())?.todos;
        if todos.is_empty() {
            return Ok(Value::String("待辦清單是空的".into()));
        }
        Ok(Value::String(format!("目前的待辦事項有：{}", todos.join(", "))))
    }
}
