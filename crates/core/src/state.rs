//! Per-user conversation state.
//!
//! One `ConversationState` exists per user. It is created lazily on the first
//! interaction and only destroyed by an explicit reset. The orchestrator and
//! the tools that declare [`Injection::UserState`](crate::tool::Injection)
//! receive it by `&mut` reference; nothing in the process holds a global copy.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Default number of user/assistant rounds kept in history.
pub const DEFAULT_MAX_ROUNDS: usize = 6;

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

/// Everything the bot remembers about one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Bounded history; holds at most `2 * max_rounds` entries.
    #[serde(default)]
    history: VecDeque<Message>,

    #[serde(default = "default_max_rounds")]
    max_rounds: usize,

    /// System prompt override. `None` falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    /// Completion model override. `None` falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Todo items, in insertion order.
    #[serde(default)]
    pub todos: Vec<String>,

    /// URLs already returned by the news tool during this session.
    #[serde(default)]
    pub seen_news_urls: BTreeSet<String>,
}

impl ConversationState {
    pub fn new(max_rounds: usize) -> Self {
        let max_rounds = max_rounds.max(1);
        Self {
            history: VecDeque::with_capacity(max_rounds * 2),
            max_rounds,
            persona: None,
            model: None,
            todos: Vec::new(),
            seen_news_urls: BTreeSet::new(),
        }
    }

    /// Maximum number of history entries (two per round).
    pub fn capacity(&self) -> usize {
        self.max_rounds * 2
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Change the round limit, evicting the oldest entries if needed.
    pub fn set_max_rounds(&mut self, max_rounds: usize) {
        self.max_rounds = max_rounds.max(1);
        self.evict();
    }

    /// History entries, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Message> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Append one entry, dropping the oldest ones on overflow.
    pub fn push(&mut self, message: Message) {
        self.history.push_back(message);
        self.evict();
    }

    /// Append one completed round: the user turn followed by the reply.
    pub fn push_round(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.push(Message::user(user));
        self.push(Message::assistant(assistant));
    }

    /// The persona to use, falling back to `default`.
    pub fn persona_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.persona.as_deref().unwrap_or(default)
    }

    /// The model to use, falling back to `default`.
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default)
    }

    /// Restore every field to its default. The round limit is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.max_rounds);
    }

    fn evict(&mut self) {
        let capacity = self.capacity();
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROUNDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn history_is_bounded_and_evicts_oldest_first() {
        let mut state = ConversationState::new(3);
        for i in 0..5 {
            state.push_round(format!("q{i}"), format!("a{i}"));
        }

        assert_eq!(state.history_len(), 6);
        let contents: Vec<&str> = state.history().map(|m| m.content.as_str()).collect();
        // Rounds 0 and 1 were evicted, in order.
        assert_eq!(contents, vec!["q2", "a2", "q3", "a3", "q4", "a4"]);
        assert_eq!(state.history().next().unwrap().role, Role::User);
    }

    #[test]
    fn history_below_capacity_keeps_everything() {
        let mut state = ConversationState::new(6);
        state.push_round("hi", "hello");
        assert_eq!(state.history_len(), 2);
    }

    #[test]
    fn shrinking_rounds_evicts() {
        let mut state = ConversationState::new(4);
        for i in 0..4 {
            state.push_round(format!("q{i}"), format!("a{i}"));
        }
        state.set_max_rounds(1);
        let contents: Vec<&str> = state.history().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q3", "a3"]);
    }

    #[test]
    fn overrides_fall_back_to_defaults() {
        let mut state = ConversationState::default();
        assert_eq!(state.persona_or("You are Lala"), "You are Lala");
        assert_eq!(state.model_or("qwen2:7b"), "qwen2:7b");

        state.persona = Some("You are a pirate".into());
        state.model = Some("llama3:8b".into());
        assert_eq!(state.persona_or("You are Lala"), "You are a pirate");
        assert_eq!(state.model_or("qwen2:7b"), "llama3:8b");
    }

    #[test]
    fn reset_clears_everything_but_round_limit() {
        let mut state = ConversationState::new(2);
        state.push_round("q", "a");
        state.persona = Some("p".into());
        state.model = Some("m".into());
        state.todos.push("buy milk".into());
        state.seen_news_urls.insert("https://news.example/1".into());

        state.reset();
        assert_eq!(state, ConversationState::new(2));
    }

    #[test]
    fn deserializes_partial_records() {
        let state: ConversationState = serde_json::from_str(r#"{"todos":["a"]}"#).unwrap();
        assert_eq!(state.todos, vec!["a".to_string()]);
        assert_eq!(state.max_rounds(), DEFAULT_MAX_ROUNDS);
        assert_eq!(state.history_len(), 0);
    }
}
