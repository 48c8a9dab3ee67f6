//! Configuration loading, validation, and management for lalabot.
//!
//! Loads configuration from `~/.lalabot/config.toml`, then a `.env` file,
//! then environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default system prompt. It teaches the model the textual tool protocol.
pub const DEFAULT_PERSONA: &str = r#"You are Lala, a cheerful assistant who chats in Traditional Chinese.
Answer directly when you can. When the user needs live information, reply with ONLY a JSON object (or a JSON array of objects) and nothing else:
{"tool_name": "<tool>", "arguments": {...}}
Available tools:
- get_current_time: the current local date and time. No arguments.
- get_current_weather: current weather. Arguments: {"city": "<city>"} (optional).
- search_web: search the web. Arguments: {"query": "<text>"}.
- get_news_headlines: recent news. Arguments: {"query": "<topic>", "category": "<category>"} (category optional).
- add_todo: remember a todo item. Arguments: {"item": "<text>"}.
- list_todos: list the user's todo items. No arguments.
- recommend_music: suggest music. Arguments: {"mood": "<mood>"}."#;

/// The root configuration structure.
///
/// Maps directly to `~/.lalabot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// System prompt used when a user has not set their own persona
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Model backend configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Conversation loop tuning
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Tool plugin settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Telegram front end
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Conversation state persistence
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_persona() -> String {
    DEFAULT_PERSONA.into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend kind: "ollama" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Only used by OpenAI-compatible backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used to describe photos and stickers
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound for one model request, streaming included
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_base_url() -> String {
    "http://localhost:11434/api".into()
}
fn default_model() -> String {
    "qwen2:7b".into()
}
fn default_vision_model() -> String {
    "llava:latest".into()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_request_timeout() -> u64 {
    300
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            default_model: default_model(),
            vision_model: default_vision_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("vision_model", &self.vision_model)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// History keeps this many user/assistant rounds
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Minimum time between two edits of a streamed reply
    #[serde(default = "default_edit_interval")]
    pub edit_interval_ms: u64,

    /// Chunk length (in characters) when replaying a complete answer
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Pause between replayed chunks
    #[serde(default = "default_chunk_pause")]
    pub chunk_pause_ms: u64,

    /// Largest image the bot will download and describe
    #[serde(default = "default_image_size_limit")]
    pub image_size_limit_bytes: u64,
}

fn default_max_rounds() -> usize {
    6
}
fn default_edit_interval() -> u64 {
    750
}
fn default_chunk_chars() -> usize {
    10
}
fn default_chunk_pause() -> u64 {
    10
}
fn default_image_size_limit() -> u64 {
    5 * 1024 * 1024
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            edit_interval_ms: default_edit_interval(),
            chunk_chars: default_chunk_chars(),
            chunk_pause_ms: default_chunk_pause(),
            image_size_limit_bytes: default_image_size_limit(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// OpenWeatherMap API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_api_key: Option<String>,

    /// City used when the model does not name one
    #[serde(default = "default_city")]
    pub default_city: String,

    /// NewsAPI key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news_api_key: Option<String>,

    #[serde(default = "default_news_language")]
    pub news_language: String,

    /// Offset from UTC for the clock tool
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Upper bound for a single tool execution
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_city() -> String {
    "Taipei".into()
}
fn default_news_language() -> String {
    "zh".into()
}
fn default_utc_offset() -> i32 {
    8
}
fn default_tool_timeout() -> u64 {
    20
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            weather_api_key: None,
            default_city: default_city(),
            news_api_key: None,
            news_language: default_news_language(),
            utc_offset_hours: default_utc_offset(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("weather_api_key", &redact(&self.weather_api_key))
            .field("default_city", &self.default_city)
            .field("news_api_key", &redact(&self.news_api_key))
            .field("news_language", &self.news_language)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// User IDs allowed to talk to the bot. Empty means everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("allowed_users", &self.allowed_users)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "file"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// State file for the "file" backend. Defaults to `~/.lalabot/state.jsonl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.lalabot/config.toml).
    ///
    /// A `.env` file in the working directory is loaded first, then these
    /// environment variables override the file:
    /// `BOT_TOKEN`, `NEWS_API_KEY`, `WEATHER_API_KEY`, `WEATHER_CITY`,
    /// `OLLAMA_BASE_URL`, `OLLAMA_MODEL`, `OLLAMA_VISION_MODEL`,
    /// `DEFAULT_PERSONA`, `LALABOT_PROVIDER`, `LALABOT_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::read_file(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        if !config.persona_has_tool_protocol() {
            tracing::warn!(
                "Default persona does not mention \"tool_name\"; the model may never call tools"
            );
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides through `lookup`. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(key) = get("NEWS_API_KEY") {
            self.tools.news_api_key = Some(key);
        }
        if let Some(key) = get("WEATHER_API_KEY") {
            self.tools.weather_api_key = Some(key);
        }
        if let Some(city) = get("WEATHER_CITY") {
            self.tools.default_city = city;
        }
        if let Some(url) = get("OLLAMA_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            self.model.default_model = model;
        }
        if let Some(model) = get("OLLAMA_VISION_MODEL") {
            self.model.vision_model = model;
        }
        if let Some(persona) = get("DEFAULT_PERSONA") {
            self.default_persona = persona;
        }
        if let Some(provider) = get("LALABOT_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(key) = get("LALABOT_API_KEY") {
            self.model.api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lalabot")
    }

    /// Where the file store keeps its records.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("state.jsonl"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.model.provider.as_str(), "ollama" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "model.provider must be \"ollama\" or \"openai\", got \"{}\"",
                self.model.provider
            )));
        }

        if self.model.request_timeout_secs == 0 || self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be at least one second".into(),
            ));
        }

        if self.conversation.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_rounds must be > 0".into(),
            ));
        }

        if self.conversation.chunk_chars == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.chunk_chars must be > 0".into(),
            ));
        }

        if !(-12..=14).contains(&self.tools.utc_offset_hours) {
            return Err(ConfigError::ValidationError(
                "tools.utc_offset_hours must be between -12 and 14".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"memory\" or \"file\", got \"{}\"",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Whether the default persona teaches the JSON tool protocol.
    pub fn persona_has_tool_protocol(&self) -> bool {
        self.default_persona.contains("tool_name")
    }

    pub fn has_bot_token(&self) -> bool {
        self.telegram.bot_token.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_persona: default_persona(),
            model: ModelConfig::default(),
            conversation: ConversationConfig::default(),
            tools: ToolsConfig::default(),
            telegram: TelegramConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
