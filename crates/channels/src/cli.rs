//! CLI channel — interactive terminal-based chat.
//!
//! Reads from stdin, writes to stdout. A terminal cannot rewrite earlier
//! output, so an edit prints only the text appended since the last one.
//! `/photo <path>` sends an image file as if it were a photo.
//! Used for `lalabot chat`.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lalabot_core::channel::{
    Channel, ChannelId, ChannelMessage, ImageAttachment, ImageKind, MessageHandle,
};
use lalabot_core::error::ChannelError;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const CHAT_ID: &str = "cli_session";

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
    next_id: AtomicU64,
    /// What each sent message currently shows.
    shown: Mutex<HashMap<String, String>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId("cli".into()),
            next_id: AtomicU64::new(1),
            shown: Mutex::new(HashMap::new()),
        }
    }

    fn print(text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// What to print so the terminal shows `new` after showing `shown`.
/// `None` when nothing changed.
pub fn render_edit(shown: &str, new: &str) -> Option<String> {
    if shown == new {
        return None;
    }
    match new.strip_prefix(shown) {
        Some(suffix) => Some(suffix.to_string()),
        None => Some(format!("\n{new}")),
    }
}

async fn read_photo(path: &str) -> Result<ImageAttachment, ChannelError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ChannelError::InvalidPayload(format!("cannot read {path}: {e}")))?;
    Ok(ImageAttachment {
        kind: ImageKind::Photo,
        declared_size: Some(bytes.len() as u64),
        bytes,
        animated: false,
    })
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let channel_id = self.id.clone();

        tokio::spawn(async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        // Check for exit commands
                        if matches!(line.as_str(), "exit" | "quit" | "/exit" | "/quit" | ":q") {
                            break;
                        }

                        let mut msg =
                            ChannelMessage::text(channel_id.clone(), "local_user", CHAT_ID, "");
                        msg.sender_name = Some("User".into());

                        if let Some(path) = line.strip_prefix("/photo ") {
                            match read_photo(path.trim()).await {
                                Ok(image) => msg.image = Some(image),
                                Err(e) => {
                                    if tx.send(Err(e)).await.is_err() {
                                        break;
                                    }
                                    continue;
                                }
                            }
                        } else {
                            msg.content = line;
                        }

                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str) -> Result<MessageHandle, ChannelError> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        Self::print(&format!("\n{content}"));
        if let Ok(mut shown) = self.shown.lock() {
            shown.insert(message_id.clone(), content.to_string());
        }
        Ok(MessageHandle {
            chat_id: chat_id.to_string(),
            message_id,
        })
    }

    async fn edit(&self, handle: &MessageHandle, content: &str) -> Result<(), ChannelError> {
        let mut shown = self
            .shown
            .lock()
            .map_err(|_| ChannelError::ConnectionLost("terminal state poisoned".into()))?;
        let previous = shown.get(&handle.message_id).ok_or_else(|| ChannelError::EditRejected {
            channel: "cli".into(),
            reason: format!("unknown message {}", handle.message_id),
        })?;

        let Some(output) = render_edit(previous, content) else {
            return Err(ChannelError::NotModified);
        };
        Self::print(&output);
        shown.insert(handle.message_id.clone(), content.to_string());
        Ok(())
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        true // CLI is always allowed (local user)
    }
}
