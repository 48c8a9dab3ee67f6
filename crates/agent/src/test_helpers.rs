//! Shared test doubles: a scripted model backend, a recording front end,
//! and configurable fake tools.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lalabot_core::channel::{Channel, ChannelId, ChannelMessage, MessageHandle};
use lalabot_core::error::{ChannelError, ProviderError, ToolError};
use lalabot_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use lalabot_core::tool::{Injection, Tool, ToolInput};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::stream::split_chunks;

enum Reply {
    Text(String),
    Interrupted(String),
}

/// A model backend that answers from a script, one entry per call.
///
/// Panics if more calls are made than entries provided.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    always_fail: Option<ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
    fragment_size: usize,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Reply::Text(r.to_string())).collect()),
            always_fail: None,
            requests: Mutex::new(Vec::new()),
            fragment_size: 5,
        }
    }

    /// Every call fails with `error` before streaming anything.
    pub fn failing(error: ProviderError) -> Self {
        let mut provider = Self::new(vec![]);
        provider.always_fail = Some(error);
        provider
    }

    /// One call that streams `text` and then breaks.
    pub fn interrupted(text: &str) -> Self {
        let provider = Self::new(vec![]);
        provider
            .script
            .lock()
            .unwrap()
            .push_back(Reply::Interrupted(text.to_string()));
        provider
    }

    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no reply left for call #{call}"));

        let (text, interrupted) = match reply {
            Reply::Text(text) => (text, false),
            Reply::Interrupted(text) => (text, true),
        };
        let fragments = split_chunks(&text, self.fragment_size);

        let (tx, rx) = mpsc::channel(fragments.len() + 2);
        tokio::spawn(async move {
            for fragment in fragments {
                let _ = tx.send(Ok(StreamChunk::text(fragment))).await;
            }
            let last = if interrupted {
                Err(ProviderError::StreamInterrupted("connection reset".into()))
            } else {
                Ok(StreamChunk::done())
            };
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["qwen2:7b".into(), "llava:latest".into()])
    }
}

/// Something the bot did on the recording channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message { text: String, rich: bool },
    Edit { message_id: String, text: String },
    Typing,
}

/// A front end that records every outgoing action.
pub struct RecordingChannel {
    id: ChannelId,
    next_id: AtomicU64,
    log: Mutex<Vec<Sent>>,
    shown: Mutex<HashMap<String, String>>,
    /// Edits succeed this many times, then are rejected.
    edits_allowed: Option<usize>,
    reject_markup: bool,
    fail_sends: bool,
    allowed: Vec<String>,
    edit_delay: Option<Duration>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId("recording".into()),
            next_id: AtomicU64::new(1),
            log: Mutex::new(Vec::new()),
            shown: Mutex::new(HashMap::new()),
            edits_allowed: None,
            reject_markup: false,
            fail_sends: false,
            allowed: Vec::new(),
            edit_delay: None,
        }
    }

    pub fn rejecting_edits_after(mut self, successful: usize) -> Self {
        self.edits_allowed = Some(successful);
        self
    }

    pub fn rejecting_markup(mut self) -> Self {
        self.reject_markup = true;
        self
    }

    /// Every fresh message fails to deliver.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Every edit takes `delay` to complete.
    pub fn slow_edits(mut self, delay: Duration) -> Self {
        self.edit_delay = Some(delay);
        self
    }

    pub fn allowing(mut self, users: &[&str]) -> Self {
        self.allowed = users.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn log(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    /// Texts of fresh messages, in order.
    pub fn messages(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Texts of edits, in order.
    pub fn edits(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// What the user currently sees in the last sent message.
    pub fn last_visible(&self) -> Option<String> {
        let last_id = (self.next_id.load(Ordering::SeqCst) - 1).to_string();
        self.shown.lock().unwrap().get(&last_id).cloned()
    }

    fn record_send(&self, chat_id: &str, text: &str, rich: bool) -> Result<MessageHandle, ChannelError> {
        if self.fail_sends {
            return Err(ChannelError::DeliveryFailed {
                channel: "recording".into(),
                reason: "blocked by user".into(),
            });
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.log.lock().unwrap().push(Sent::Message {
            text: text.to_string(),
            rich,
        });
        self.shown
            .lock()
            .unwrap()
            .insert(message_id.clone(), text.to_string());
        Ok(MessageHandle {
            chat_id: chat_id.to_string(),
            message_id,
        })
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str) -> Result<MessageHandle, ChannelError> {
        self.record_send(chat_id, content, false)
    }

    async fn send_rich(&self, chat_id: &str, content: &str) -> Result<MessageHandle, ChannelError> {
        if self.reject_markup {
            return Err(ChannelError::MarkupRejected {
                channel: "recording".into(),
                reason: "can't parse entities".into(),
            });
        }
        self.record_send(chat_id, content, true)
    }

    async fn edit(&self, handle: &MessageHandle, content: &str) -> Result<(), ChannelError> {
        if let Some(delay) = self.edit_delay {
            tokio::time::sleep(delay).await;
        }
        let mut shown = self.shown.lock().unwrap();
        if shown.get(&handle.message_id).map(String::as_str) == Some(content) {
            return Err(ChannelError::NotModified);
        }
        if let Some(allowed) = self.edits_allowed {
            let done = self
                .log
                .lock()
                .unwrap()
                .iter()
                .filter(|s| matches!(s, Sent::Edit { .. }))
                .count();
            if done >= allowed {
                return Err(ChannelError::EditRejected {
                    channel: "recording".into(),
                    reason: "message can't be edited".into(),
                });
            }
        }
        shown.insert(handle.message_id.clone(), content.to_string());
        self.log.lock().unwrap().push(Sent::Edit {
            message_id: handle.message_id.clone(),
            text: content.to_string(),
        });
        Ok(())
    }

    async fn send_typing(&self, _chat_id: &str) -> Result<(), ChannelError> {
        self.log.lock().unwrap().push(Sent::Typing);
        Ok(())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|u| u == sender_id)
    }
}

enum Behavior {
    Return(Value),
    Fail,
    ReportHttp,
    AddTodo,
}

/// A tool whose behavior is chosen by the test.
pub struct FakeTool {
    name: &'static str,
    is_async: bool,
    injections: &'static [Injection],
    behavior: Behavior,
    delay: Option<Duration>,
    seen: Arc<Mutex<Vec<Map<String, Value>>>>,
}

impl FakeTool {
    fn build(name: &'static str, is_async: bool, behavior: Behavior) -> Self {
        Self {
            name,
            is_async,
            injections: &[],
            behavior,
            delay: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sync(name: &'static str, result: Value) -> Self {
        Self::build(name, false, Behavior::Return(result))
    }

    pub fn asynchronous(name: &'static str, result: Value) -> Self {
        Self::build(name, true, Behavior::Return(result))
    }

    /// A sync tool that appends its `item` argument to the user's todos.
    pub fn todo_adder(name: &'static str) -> Self {
        let mut tool = Self::build(name, false, Behavior::AddTodo);
        tool.injections = &[Injection::UserState];
        tool
    }

    pub fn failing(mut self) -> Self {
        self.behavior = Behavior::Fail;
        self
    }

    /// Return whether an HTTP client was injected.
    pub fn reporting_http(mut self) -> Self {
        self.behavior = Behavior::ReportHttp;
        self
    }

    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_injections(mut self, injections: &'static [Injection]) -> Self {
        self.injections = injections;
        self
    }

    /// Arguments of every execution, in order.
    pub fn seen(&self) -> Arc<Mutex<Vec<Map<String, Value>>>> {
        self.seen.clone()
    }
}

#[async_trait]
impl Tool for FakeTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn injections(&self) -> &[Injection] {
        self.injections
    }

    async fn execute(&self, mut input: ToolInput<'_>) -> Result<Value, ToolError> {
        self.seen.lock().unwrap().push(input.arguments.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            Behavior::Return(value) => Ok(value.clone()),
            Behavior::Fail => Err(ToolError::ExecutionFailed {
                tool_name: self.name.to_string(),
                reason: "upstream returned 503".into(),
            }),
            Behavior::ReportHttp => Ok(Value::Bool(input.http.is_some())),
            Behavior::AddTodo => {
                let item = input.require_str(self.name, "item")?.to_string();
                input.state(self.name)?.todos.push(item.clone());
                Ok(Value::String(format!("added {item}")))
            }
        }
    }
}
