//! Telegram channel adapter over the Bot API.
//!
//! Uses `getUpdates` long polling for input and `sendMessage` /
//! `editMessageText` for output. Photos and stickers are downloaded through
//! `getFile` before the event is handed to the bot, unless they are
//! animated or larger than the configured limit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lalabot_core::channel::{
    Channel, ChannelId, ChannelMessage, ImageAttachment, ImageKind, MessageHandle,
};
use lalabot_core::error::ChannelError;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Allowed user IDs. Empty or ["*"] = allow all.
    pub allowed_users: Vec<String>,
    /// Images above this size are not downloaded.
    pub image_size_limit: u64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_users", &self.allowed_users)
            .field("image_size_limit", &self.image_size_limit)
            .finish()
    }
}

/// Thin client for the Bot API methods the channel needs.
#[derive(Clone)]
struct BotApi {
    client: reqwest::Client,
    base: String,
    file_base: String,
}

impl BotApi {
    fn new(client: reqwest::Client, api_base: &str, token: &str) -> Self {
        let api_base = api_base.trim_end_matches('/');
        Self {
            client,
            base: format!("{api_base}/bot{token}"),
            file_base: format!("{api_base}/file/bot{token}"),
        }
    }

    /// Call a Bot API method and return its `result`.
    async fn call(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, ChannelError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        if envelope["ok"].as_bool() == Some(true) {
            return Ok(envelope["result"].clone());
        }

        let description = envelope["description"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string();
        Err(classify_error(method, &description))
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let file = self
            .call("getFile", &json!({ "file_id": file_id }), Duration::from_secs(30))
            .await?;
        let path = file["file_path"]
            .as_str()
            .ok_or_else(|| ChannelError::InvalidPayload("getFile returned no file_path".into()))?;

        let bytes = self
            .client
            .get(format!("{}/{path}", self.file_base))
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// Map a Bot API error description to a `ChannelError`.
fn classify_error(method: &str, description: &str) -> ChannelError {
    let lower = description.to_lowercase();
    if lower.contains("message is not modified") {
        ChannelError::NotModified
    } else if lower.contains("can't parse entities") {
        ChannelError::MarkupRejected {
            channel: "telegram".into(),
            reason: description.to_string(),
        }
    } else if method == "editMessageText" {
        ChannelError::EditRejected {
            channel: "telegram".into(),
            reason: description.to_string(),
        }
    } else {
        ChannelError::DeliveryFailed {
            channel: "telegram".into(),
            reason: description.to_string(),
        }
    }
}

/// An image referenced by an update, not yet downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub file_id: String,
    pub kind: ImageKind,
    pub file_size: Option<u64>,
    pub animated: bool,
}

/// A decoded update: the event plus the image to fetch, if any.
#[derive(Debug, Clone)]
pub struct ParsedUpdate {
    pub update_id: i64,
    pub message: Option<(ChannelMessage, Option<ImageRef>)>,
}

/// Decode one element of a `getUpdates` result.
///
/// Updates that are not messages (edits, joins, callbacks) carry `None` but
/// still advance the offset.
pub fn parse_update(channel_id: &ChannelId, update: &Value) -> Option<ParsedUpdate> {
    let update_id = update["update_id"].as_i64()?;
    let message = &update["message"];
    if !message.is_object() {
        return Some(ParsedUpdate {
            update_id,
            message: None,
        });
    }

    let chat_id = message["chat"]["id"].as_i64()?.to_string();
    let from = &message["from"];
    let sender_id = from["id"]
        .as_i64()
        .map(|id| id.to_string())
        .unwrap_or_else(|| chat_id.clone());
    let sender_name = from["first_name"]
        .as_str()
        .or_else(|| from["username"].as_str())
        .map(String::from);
    let content = message["text"]
        .as_str()
        .or_else(|| message["caption"].as_str())
        .unwrap_or_default()
        .to_string();

    let image = if let Some(sizes) = message["photo"].as_array() {
        // Telegram lists sizes smallest first.
        sizes.last().and_then(|largest| {
            Some(ImageRef {
                file_id: largest["file_id"].as_str()?.to_string(),
                kind: ImageKind::Photo,
                file_size: largest["file_size"].as_u64(),
                animated: false,
            })
        })
    } else if message["sticker"].is_object() {
        let sticker = &message["sticker"];
        sticker["file_id"].as_str().map(|file_id| ImageRef {
            file_id: file_id.to_string(),
            kind: ImageKind::Sticker,
            file_size: sticker["file_size"].as_u64(),
            animated: sticker["is_animated"].as_bool().unwrap_or(false)
                || sticker["is_video"].as_bool().unwrap_or(false),
        })
    } else {
        None
    };

    if content.is_empty() && image.is_none() {
        return Some(ParsedUpdate {
            update_id,
            message: None,
        });
    }

    let mut msg = ChannelMessage::text(channel_id.clone(), sender_id, chat_id, content);
    msg.sender_name = sender_name;

    Some(ParsedUpdate {
        update_id,
        message: Some((msg, image)),
    })
}

/// Telegram channel adapter.
pub struct TelegramChannel {
    config: TelegramConfig,
    channel_id: ChannelId,
    api: BotApi,
    shutdown: CancellationToken,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, client: reqwest::Client) -> Self {
        Self::with_api_base(config, client, API_BASE)
    }

    /// Use another Bot API server (self-hosted `telegram-bot-api`).
    pub fn with_api_base(config: TelegramConfig, client: reqwest::Client, api_base: &str) -> Self {
        let api = BotApi::new(client, api_base, &config.bot_token);
        Self {
            config,
            channel_id: ChannelId("telegram".into()),
            api,
            shutdown: CancellationToken::new(),
        }
    }

    fn parse_message_id(handle: &MessageHandle) -> Result<i64, ChannelError> {
        handle
            .message_id
            .parse()
            .map_err(|_| ChannelError::InvalidPayload(format!("bad message id {}", handle.message_id)))
    }

    async fn send_with(
        &self,
        chat_id: &str,
        content: &str,
        parse_mode: Option<&str>,
    ) -> Result<MessageHandle, ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "text": content });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }
        let sent = self
            .api
            .call("sendMessage", &body, Duration::from_secs(30))
            .await?;
        let message_id = sent["message_id"]
            .as_i64()
            .ok_or_else(|| ChannelError::InvalidPayload("sendMessage returned no message_id".into()))?;
        Ok(MessageHandle {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        })
    }
}

/// Fetch the image bytes for an update, honoring the size limit and
/// skipping animated stickers.
async fn attach_image(
    api: &BotApi,
    limit: u64,
    image: ImageRef,
) -> Result<ImageAttachment, ChannelError> {
    let mut attachment = ImageAttachment {
        kind: image.kind,
        bytes: Vec::new(),
        declared_size: image.file_size,
        animated: image.animated,
    };
    if image.animated || image.file_size.is_some_and(|size| size > limit) {
        return Ok(attachment);
    }
    attachment.bytes = api.download(&image.file_id).await?;
    Ok(attachment)
}

/// Like [`attach_image`], but a failed download still yields an attachment.
/// Its bytes are empty, so the turn answers with the image error notice
/// instead of staying silent.
async fn fetch_image(api: &BotApi, limit: u64, image: ImageRef, chat_id: &str) -> ImageAttachment {
    let fallback = ImageAttachment {
        kind: image.kind,
        bytes: Vec::new(),
        declared_size: image.file_size,
        animated: image.animated,
    };
    match attach_image(api, limit, image).await {
        Ok(attachment) => attachment,
        Err(e) => {
            warn!(error = %e, chat_id, "Image download failed");
            fallback
        }
    }
}

/// Hand one message to the handler. `false` once the receiver is gone.
async fn deliver(
    tx: &mpsc::Sender<Result<ChannelMessage, ChannelError>>,
    msg: ChannelMessage,
) -> bool {
    debug!(chat_id = %msg.chat_id, sender = %msg.sender_id, "Telegram message received");
    if tx.send(Ok(msg)).await.is_err() {
        debug!("Message receiver dropped");
        return false;
    }
    true
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        if self.config.bot_token.is_empty() {
            return Err(ChannelError::NotConfigured("telegram bot token".into()));
        }

        info!("Telegram channel starting (long polling)");
        let (tx, rx) = mpsc::channel(64);
        let api = self.api.clone();
        let channel_id = self.channel_id.clone();
        let limit = self.config.image_size_limit;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"],
                });
                let poll = api.call(
                    "getUpdates",
                    &body,
                    Duration::from_secs(POLL_TIMEOUT_SECS + 10),
                );

                let updates = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = poll => result,
                };

                let updates = match updates {
                    Ok(Value::Array(updates)) => updates,
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        warn!(error = %e, "Telegram polling failed, retrying");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(RETRY_DELAY) => continue,
                        }
                    }
                };

                for update in &updates {
                    let Some(parsed) = parse_update(&channel_id, update) else {
                        continue;
                    };
                    offset = offset.max(parsed.update_id + 1);
                    let Some((mut msg, image)) = parsed.message else {
                        continue;
                    };

                    let Some(image) = image else {
                        if !deliver(&tx, msg).await {
                            return; // receiver dropped
                        }
                        continue;
                    };

                    // Downloads run off the polling loop so one slow file
                    // never holds up other chats.
                    let api = api.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        msg.image = Some(fetch_image(&api, limit, image, &msg.chat_id).await);
                        deliver(&tx, msg).await;
                    });
                }
            }
            info!("Telegram polling stopped");
        });

        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str) -> Result<MessageHandle, ChannelError> {
        self.send_with(chat_id, content, None).await
    }

    async fn send_rich(&self, chat_id: &str, content: &str) -> Result<MessageHandle, ChannelError> {
        self.send_with(chat_id, content, Some("MarkdownV2")).await
    }

    async fn edit(&self, handle: &MessageHandle, content: &str) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": handle.chat_id,
            "message_id": Self::parse_message_id(handle)?,
            "text": content,
        });
        self.api
            .call("editMessageText", &body, Duration::from_secs(30))
            .await
            .map(|_| ())
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        let body = json!({ "chat_id": chat_id, "action": "typing" });
        self.api
            .call("sendChatAction", &body, Duration::from_secs(10))
            .await
            .map(|_| ())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        let allowed = &self.config.allowed_users;
        allowed.is_empty() || allowed.iter().any(|u| u == "*" || u == sender_id)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Telegram channel stopping");
        self.shutdown.cancel();
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        if self.config.bot_token.is_empty() {
            return Ok(false);
        }
        Ok(self
            .api
            .call("getMe", &json!({}), Duration::from_secs(10))
            .await
            .is_ok())
    }
}
