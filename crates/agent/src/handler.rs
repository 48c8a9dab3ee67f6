//! Bot event handler: routes incoming channel events to commands, image
//! turns and chat turns.

use std::sync::Arc;
use std::time::Duration;

use lalabot_core::channel::{Channel, ChannelMessage};
use lalabot_core::error::ChannelError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;
use crate::session::{SessionGuard, SessionManager};

/// How often sessions nobody is using are dropped from memory.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// A slash command and its argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Reset,
    Model(Option<String>),
    Models,
    Persona(Option<String>),
    Unknown(String),
}

impl Command {
    /// Parse `/name[@bot] [args]`. Returns `None` for ordinary text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        let arg = (!args.is_empty()).then(|| args.to_string());

        Some(match name {
            "start" => Command::Start,
            "reset" => Command::Reset,
            "model" => Command::Model(arg.and_then(|a| a.split_whitespace().next().map(String::from))),
            "models" => Command::Models,
            "persona" => Command::Persona(arg),
            other => Command::Unknown(other.to_string()),
        })
    }
}

pub struct BotHandler {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionManager>,
}

impl BotHandler {
    pub fn new(orchestrator: Arc<Orchestrator>, sessions: Arc<SessionManager>) -> Self {
        Self {
            orchestrator,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Pump events from `channel` until it closes or `shutdown` fires.
    ///
    /// Each event is handled on its own task, so one user's slow turn
    /// never holds up another user.
    pub async fn run(
        self: Arc<Self>,
        channel: Arc<dyn Channel>,
        shutdown: CancellationToken,
    ) -> Result<(), ChannelError> {
        let mut events = channel.start().await?;
        info!(channel = channel.name(), "Listening for messages");

        let mut sweep = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sweep.tick() => {
                    self.sessions.evict_idle().await;
                }
                event = events.recv() => match event {
                    Some(Ok(message)) => {
                        let handler = self.clone();
                        let channel = channel.clone();
                        tokio::spawn(async move {
                            handler.handle(channel.as_ref(), message).await;
                        });
                    }
                    Some(Err(e)) => warn!(channel = channel.name(), error = %e, "Channel error"),
                    None => break,
                },
            }
        }

        info!(channel = channel.name(), "Shutting down");
        self.sessions.cancel_all().await;
        channel.stop().await
    }

    /// Handle one incoming event.
    pub async fn handle(&self, channel: &dyn Channel, message: ChannelMessage) {
        if !channel.is_allowed(&message.sender_id) {
            warn!(
                channel = channel.name(),
                sender_id = %message.sender_id,
                "Ignoring message from sender not on the allowlist"
            );
            return;
        }

        if let Some(command) = Command::parse(&message.content).filter(|_| message.image.is_none()) {
            self.command(channel, &message, command).await;
            return;
        }

        if message.image.is_none() && message.content.trim().is_empty() {
            return;
        }

        let preview: String = message.content.chars().take(80).collect();
        info!(user_id = %message.sender_id, text = %preview, image = message.image.is_some(), "Incoming message");
        if let Err(e) = channel.send_typing(&message.chat_id).await {
            debug!(error = %e, "Typing indicator failed");
        }

        let mut session = self.sessions.acquire(&message.sender_id).await;
        let cancel = session.cancellation().clone();
        let chat_id = message.chat_id.as_str();

        let finished = tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.turn(channel, chat_id, &mut session, &message) => true,
        };

        if finished {
            self.save(&session).await;
        } else {
            info!(user_id = %message.sender_id, "Turn cancelled");
        }
    }

    async fn turn(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        session: &mut SessionGuard,
        message: &ChannelMessage,
    ) {
        match &message.image {
            Some(image) => {
                self.orchestrator
                    .image_turn(channel, chat_id, session, image)
                    .await;
            }
            None => {
                self.orchestrator
                    .chat_turn(channel, chat_id, session, &message.content)
                    .await;
            }
        }
    }

    async fn save(&self, session: &SessionGuard) {
        if let Err(e) = self.sessions.persist(session).await {
            warn!(user_id = session.user_id(), error = %e, "Could not persist conversation state");
        }
    }

    async fn command(&self, channel: &dyn Channel, message: &ChannelMessage, command: Command) {
        let chat_id = message.chat_id.as_str();
        let user_id = message.sender_id.as_str();
        debug!(user_id, ?command, "Command");

        match command {
            Command::Start => {
                let name = message.sender_name.as_deref().unwrap_or("你");
                let greeting = format!(
                    "哈囉，{name}～ 你好呀！🖐️\n我是你的私人助手 Lala ：）\n\n\
                     你可以隨時開始跟我聊天、傳照片或貼圖，或者要我幫你查天氣、找資料、看新聞都可以喔！\n\n\
                     如果需要重設我們的對話，可以輸入 /reset。"
                );
                reply(channel, chat_id, &greeting).await;
            }
            Command::Reset => {
                if let Err(e) = self.sessions.reset(user_id).await {
                    warn!(user_id, error = %e, "Could not clear stored state");
                }
                reply(channel, chat_id, "🗑️ 已清空您的個人對話歷史、模型和 persona 設定。").await;
            }
            Command::Model(None) => {
                let session = self.sessions.acquire(user_id).await;
                let current = session.model_or(self.orchestrator.default_model()).to_string();
                drop(session);
                reply(channel, chat_id, &format!("目前模型：{current}\n用法：/model llama3:8b")).await;
            }
            Command::Model(Some(name)) => {
                let mut session = self.sessions.acquire(user_id).await;
                session.model = Some(name.clone());
                self.save(&session).await;
                drop(session);
                info!(user_id, model = %name, "Model override set");
                reply(channel, chat_id, &format!("✅ 模型已切換為 {name}")).await;
            }
            Command::Models => {
                let text = match self.orchestrator.provider().list_models().await {
                    Ok(models) if models.is_empty() => "目前沒有可用的模型。".to_string(),
                    Ok(models) => {
                        let lines: Vec<String> = models.iter().map(|m| format!("• {m}")).collect();
                        format!("可用模型：\n{}", lines.join("\n"))
                    }
                    Err(e) => {
                        warn!(error = %e, "Could not list models");
                        "⚠️ 無法取得模型列表。".to_string()
                    }
                };
                reply(channel, chat_id, &text).await;
            }
            Command::Persona(None) => {
                let session = self.sessions.acquire(user_id).await;
                let current = session.persona_or(self.orchestrator.default_persona()).to_string();
                drop(session);
                reply(channel, chat_id, &format!("目前的 persona：\n{current}\n\n用法：/persona <新的設定>")).await;
            }
            Command::Persona(Some(persona)) => {
                let mut session = self.sessions.acquire(user_id).await;
                session.persona = Some(persona);
                self.save(&session).await;
                drop(session);
                info!(user_id, "Persona override set");
                reply(channel, chat_id, "✅ persona 已更新").await;
            }
            Command::Unknown(name) => debug!(user_id, command = %name, "Ignoring unknown command"),
        }
    }
}

/// Command replies are plain text.
async fn reply(channel: &dyn Channel, chat_id: &str, text: &str) {
    if let Err(e) = channel.send(chat_id, text).await {
        warn!(channel = channel.name(), error = %e, "Reply could not be delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::model::ModelClient;
    use crate::stream::Chunking;
    use crate::test_helpers::{RecordingChannel, ScriptedProvider, Sent};
    use lalabot_core::channel::ChannelId;
    use lalabot_core::state::ConversationState;
    use lalabot_core::store::StateStore;
    use lalabot_core::tool::{ToolContext, ToolRegistry};
    use std::time::Duration;

    struct NullStore;

    #[async_trait::async_trait]
    impl StateStore for NullStore {
        fn name(&self) -> &str {
            "null"
        }
        async fn load(&self, _: &str) -> Result<Option<ConversationState>, lalabot_core::error::StoreError> {
            Ok(None)
        }
        async fn save(&self, _: &str, _: &ConversationState) -> Result<(), lalabot_core::error::StoreError> {
            Ok(())
        }
        async fn clear(&self, _: &str) -> Result<(), lalabot_core::error::StoreError> {
            Ok(())
        }
        async fn count(&self) -> Result<usize, lalabot_core::error::StoreError> {
            Ok(0)
        }
    }

    fn handler(provider: Arc<ScriptedProvider>) -> BotHandler {
        let dispatcher = Dispatcher::new(
            Arc::new(ToolRegistry::new()),
            ToolContext::default(),
            Duration::from_secs(5),
        );
        let orchestrator = Orchestrator::new(
            ModelClient::new(provider, 0.5),
            dispatcher,
            "You are Lala.",
            "qwen2:7b",
        )
        .with_chunking(Chunking {
            size: 10,
            pause: Duration::ZERO,
        });
        BotHandler::new(
            Arc::new(orchestrator),
            Arc::new(SessionManager::new(Arc::new(NullStore), 6)),
        )
    }

    fn text(sender: &str, content: &str) -> ChannelMessage {
        ChannelMessage::text(ChannelId("recording".into()), sender, "chat", content)
    }

    #[test]
    fn command_parsing() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/reset@LalaBot"), Some(Command::Reset));
        assert_eq!(Command::parse("/model"), Some(Command::Model(None)));
        assert_eq!(
            Command::parse("/model  llama3:8b extra"),
            Some(Command::Model(Some("llama3:8b".into())))
        );
        assert_eq!(
            Command::parse("/persona 你是一隻貓"),
            Some(Command::Persona(Some("你是一隻貓".into())))
        );
        assert_eq!(Command::parse("/foo"), Some(Command::Unknown("foo".into())));
        assert_eq!(Command::parse("hello /start"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn chat_turn_is_recorded_in_the_session() {
        let provider = Arc::new(ScriptedProvider::new(vec!["哈囉！"]));
        let handler = handler(provider);
        let channel = RecordingChannel::new();

        handler.handle(&channel, text("42", "嗨")).await;

        assert_eq!(channel.log()[0], Sent::Typing);
        let session = handler.sessions().acquire("42").await;
        let history: Vec<&str> = session.history().map(|m| m.content.as_str()).collect();
        assert_eq!(history, vec!["嗨", "哈囉！"]);
    }

    #[tokio::test]
    async fn senders_off_the_allowlist_are_ignored() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let handler = handler(provider.clone());
        let channel = RecordingChannel::new().allowing(&["42"]);

        handler.handle(&channel, text("666", "hi")).await;

        assert!(channel.log().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn model_command_sets_and_shows_the_override() {
        let handler = handler(Arc::new(ScriptedProvider::new(vec![])));
        let channel = RecordingChannel::new();

        handler.handle(&channel, text("42", "/model")).await;
        handler.handle(&channel, text("42", "/model llama3:8b")).await;
        handler.handle(&channel, text("42", "/model")).await;

        let messages = channel.messages();
        assert!(messages[0].contains("qwen2:7b"));
        assert!(messages[1].contains("llama3:8b"));
        assert!(messages[2].contains("llama3:8b"));
    }

    #[tokio::test(start_paused = true)]
    async fn persona_override_reaches_the_model() {
        let provider = Arc::new(ScriptedProvider::new(vec!["喵～"]));
        let handler = handler(provider.clone());
        let channel = RecordingChannel::new();

        handler.handle(&channel, text("42", "/persona 你是一隻貓")).await;
        handler.handle(&channel, text("42", "你好")).await;

        assert_eq!(provider.requests()[0].messages[0].content, "你是一隻貓");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_the_session() {
        let provider = Arc::new(ScriptedProvider::new(vec!["哈囉！"]));
        let handler = handler(provider);
        let channel = RecordingChannel::new();

        handler.handle(&channel, text("42", "/model llama3:8b")).await;
        handler.handle(&channel, text("42", "嗨")).await;
        handler.handle(&channel, text("42", "/reset")).await;

        let session = handler.sessions().acquire("42").await;
        assert_eq!(session.history_len(), 0);
        assert!(session.model.is_none());
        assert!(channel.messages().last().unwrap().contains("已清空"));
    }

    #[tokio::test]
    async fn models_command_lists_backend_models() {
        let handler = handler(Arc::new(ScriptedProvider::new(vec![])));
        let channel = RecordingChannel::new();
        handler.handle(&channel, text("42", "/models")).await;
        let listing = &channel.messages()[0];
        assert!(listing.contains("qwen2:7b") && listing.contains("llava:latest"));
    }

    #[tokio::test]
    async fn unknown_commands_and_blank_text_are_ignored() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let handler = handler(provider.clone());
        let channel = RecordingChannel::new();

        handler.handle(&channel, text("42", "/dance")).await;
        handler.handle(&channel, text("42", "   ")).await;

        assert!(channel.log().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn image_that_failed_to_download_still_gets_a_reply() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let handler = handler(provider.clone());
        let channel = RecordingChannel::new();

        let mut message = text("42", "");
        message.image = Some(lalabot_core::channel::ImageAttachment {
            kind: lalabot_core::channel::ImageKind::Photo,
            bytes: Vec::new(),
            declared_size: Some(100),
            animated: false,
        });
        handler.handle(&channel, message).await;

        assert_eq!(channel.messages(), vec![crate::prompt::IMAGE_FAILED.to_string()]);
        assert_eq!(provider.call_count(), 0);
    }
}
