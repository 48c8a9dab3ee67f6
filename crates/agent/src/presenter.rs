//! Streaming presenter: turns a fragment stream into one live-updating
//! message on the front end.

use std::time::Duration;

use futures::StreamExt;
use lalabot_core::channel::{Channel, MessageHandle};
use lalabot_core::error::ChannelError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::prompt::EMPTY_REPLY_FALLBACK;
use crate::stream::Fragments;

/// Shown until the first fragment arrives.
pub const PLACEHOLDER: &str = "...";

/// Sent when the markup retry also fails.
pub const APOLOGY_MISSPOKE: &str = "抱歉，我好像說錯話了 >.<";

/// Sent when the platform refuses a reply for any other reason.
pub const APOLOGY_GENERIC: &str = "抱歉，回覆時發生問題。";

pub struct Presenter {
    edit_interval: Duration,
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new(Duration::from_millis(750))
    }
}

impl Presenter {
    pub fn new(edit_interval: Duration) -> Self {
        Self { edit_interval }
    }

    /// Stream `fragments` into a single message and return the full text.
    ///
    /// Edits replace the whole message and are throttled to one per edit
    /// interval. If the platform rejects an edit, editing stops and the
    /// finished text is sent once as a new message.
    pub async fn present(&self, channel: &dyn Channel, chat_id: &str, mut fragments: Fragments) -> String {
        let handle = match channel.send(chat_id, PLACEHOLDER).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(channel = channel.name(), error = %e, "Could not send placeholder");
                None
            }
        };

        let mut buffer = String::new();
        let mut shown = PLACEHOLDER.to_string();
        let mut last_edit: Option<Instant> = None;
        let mut editing = handle.is_some();

        while let Some(fragment) = fragments.next().await {
            buffer.push_str(&fragment);
            let Some(handle) = handle.as_ref().filter(|_| editing) else {
                continue;
            };
            let due = last_edit.is_none_or(|at| at.elapsed() > self.edit_interval);
            if !due || buffer.is_empty() {
                continue;
            }
            let issued = Instant::now();
            match edit(channel, handle, &buffer).await {
                Ok(()) => {
                    shown.clone_from(&buffer);
                    last_edit = Some(issued);
                }
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "Edit rejected, sending the reply afresh");
                    editing = false;
                }
            }
        }

        let text = if buffer.trim().is_empty() {
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            buffer
        };

        if let Some(handle) = handle.as_ref().filter(|_| editing) {
            if shown != text {
                if let Err(e) = edit(channel, handle, &text).await {
                    warn!(channel = channel.name(), error = %e, "Final edit rejected, sending the reply afresh");
                    editing = false;
                }
            }
        }

        if !editing {
            safe_send(channel, chat_id, &text).await;
        }
        text
    }
}

/// Edit, treating "not modified" as success.
async fn edit(channel: &dyn Channel, handle: &MessageHandle, text: &str) -> Result<(), ChannelError> {
    match channel.edit(handle, text).await {
        Err(e) if e.is_not_modified() => Ok(()),
        other => other,
    }
}

/// Send a fresh message, rich text first.
///
/// Falls back to plain text when the markup is rejected, and to a short
/// apology when that fails too. Blank text is never sent.
pub async fn safe_send(channel: &dyn Channel, chat_id: &str, text: &str) -> Option<MessageHandle> {
    if text.trim().is_empty() {
        debug!("Skipping empty reply");
        return None;
    }

    let apology = match channel.send_rich(chat_id, text).await {
        Ok(handle) => return Some(handle),
        Err(ChannelError::MarkupRejected { reason, .. }) => {
            warn!(%reason, "Markup rejected, retrying as plain text");
            match channel.send(chat_id, text).await {
                Ok(handle) => return Some(handle),
                Err(e) => {
                    warn!(error = %e, "Plain text send failed");
                    APOLOGY_MISSPOKE
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Reply could not be delivered");
            APOLOGY_GENERIC
        }
    };

    match channel.send(chat_id, apology).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Apology could not be delivered either");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::from_pieces;
    use crate::test_helpers::{RecordingChannel, Sent};
    use futures::stream;

    /// Fragments arriving `gap` apart, the first one immediately.
    fn paced(pieces: &[&str], gap: Duration) -> Fragments {
        let pieces: Vec<String> = pieces.iter().map(|p| p.to_string()).collect();
        stream::iter(pieces.into_iter().enumerate())
            .then(move |(i, piece)| async move {
                if i > 0 {
                    tokio::time::sleep(gap).await;
                }
                piece
            })
            .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn edits_are_throttled() {
        let channel = RecordingChannel::new();
        let presenter = Presenter::default();
        let fragments = paced(&["a", "b", "c", "d", "e"], Duration::from_millis(300));

        let text = presenter.present(&channel, "chat", fragments).await;

        assert_eq!(text, "abcde");
        assert_eq!(channel.messages(), vec![PLACEHOLDER.to_string()]);
        // t=0 first edit, t=900 second, then the final edit.
        assert_eq!(channel.edits(), vec!["a", "abcd", "abcde"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_edits_do_not_stretch_the_interval() {
        let channel = RecordingChannel::new().slow_edits(Duration::from_millis(500));
        let fragments = paced(&["a", "b", "c", "d", "e"], Duration::from_millis(300));

        let text = Presenter::default().present(&channel, "chat", fragments).await;

        assert_eq!(text, "abcde");
        // Each fragment lands 800ms after the previous edit was issued.
        assert_eq!(channel.edits(), vec!["a", "ab", "abc", "abcd", "abcde"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_stream_gets_one_early_and_one_final_edit() {
        let channel = RecordingChannel::new();
        let text = Presenter::default()
            .present(&channel, "chat", from_pieces(["Hel", "lo ", "there"]))
            .await;
        assert_eq!(text, "Hello there");
        assert_eq!(channel.edits(), vec!["Hel", "Hello there"]);
        assert_eq!(channel.last_visible().as_deref(), Some("Hello there"));
    }

    #[tokio::test]
    async fn rejected_edit_falls_back_to_one_fresh_message() {
        let channel = RecordingChannel::new().rejecting_edits_after(1);
        let text = Presenter::new(Duration::ZERO)
            .present(&channel, "chat", from_pieces(["one ", "two ", "three"]))
            .await;

        assert_eq!(text, "one two three");
        assert_eq!(channel.edits(), vec!["one "]);
        assert_eq!(
            channel.messages(),
            vec![PLACEHOLDER.to_string(), "one two three".to_string()]
        );
    }

    #[tokio::test]
    async fn not_modified_is_tolerated() {
        let channel = RecordingChannel::new();
        // The first fragment repeats the placeholder, so its edit is a no-op.
        let text = Presenter::new(Duration::ZERO)
            .present(&channel, "chat", from_pieces(["...", " and more"]))
            .await;

        assert_eq!(text, "... and more");
        assert_eq!(channel.edits(), vec!["... and more"]);
        assert_eq!(channel.messages().len(), 1);
    }

    #[tokio::test]
    async fn empty_stream_shows_the_fallback() {
        let channel = RecordingChannel::new();
        let text = Presenter::default()
            .present(&channel, "chat", from_pieces(Vec::<String>::new()))
            .await;
        assert_eq!(text, EMPTY_REPLY_FALLBACK);
        assert_eq!(channel.edits(), vec![EMPTY_REPLY_FALLBACK.to_string()]);
    }

    #[tokio::test]
    async fn failed_placeholder_still_returns_the_text() {
        let channel = RecordingChannel::new().failing_sends();
        let text = Presenter::default()
            .present(&channel, "chat", from_pieces(["hi"]))
            .await;
        assert_eq!(text, "hi");
        assert!(channel.log().is_empty());
    }

    #[tokio::test]
    async fn safe_send_prefers_rich_text() {
        let channel = RecordingChannel::new();
        assert!(safe_send(&channel, "chat", "*bold*").await.is_some());
        assert_eq!(
            channel.log(),
            vec![Sent::Message {
                text: "*bold*".into(),
                rich: true
            }]
        );
    }

    #[tokio::test]
    async fn safe_send_retries_plain_on_markup_rejection() {
        let channel = RecordingChannel::new().rejecting_markup();
        safe_send(&channel, "chat", "1 + 1 = 2!").await;
        assert_eq!(
            channel.log(),
            vec![Sent::Message {
                text: "1 + 1 = 2!".into(),
                rich: false
            }]
        );
    }

    #[tokio::test]
    async fn safe_send_skips_blank_text() {
        let channel = RecordingChannel::new();
        assert!(safe_send(&channel, "chat", "  \n").await.is_none());
        assert!(channel.log().is_empty());
    }
}
