//! Chat front ends for lalabot.
//!
//! Each channel connects to a chat platform and relays messages to/from
//! the bot. Channels are trait-based and platform-agnostic.
//!
//! Available channels:
//! - **Telegram** — Telegram Bot API (long polling)
//! - **CLI** — Interactive terminal chat (stdin/stdout)

pub mod cli;
pub mod telegram;

pub use cli::CliChannel;
pub use telegram::{TelegramChannel, TelegramConfig};

impl TelegramConfig {
    /// Build the channel settings from the application config.
    pub fn from_app(config: &lalabot_config::AppConfig) -> Option<Self> {
        Some(Self {
            bot_token: config.telegram.bot_token.clone()?,
            allowed_users: config.telegram.allowed_users.clone(),
            image_size_limit: config.conversation.image_size_limit_bytes,
        })
    }
}
