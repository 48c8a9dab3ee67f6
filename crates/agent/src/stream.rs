//! Fragment streams: the uniform shape every reply takes on its way to the
//! presenter, whether it came from the model or was already complete.

use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};

use crate::extract::strip_think;

/// A lazy sequence of text fragments.
pub type Fragments = BoxStream<'static, String>;

/// How a complete answer is replayed as fragments.
#[derive(Debug, Clone, Copy)]
pub struct Chunking {
    /// Characters per fragment
    pub size: usize,
    /// Pause between two fragments
    pub pause: Duration,
}

impl Default for Chunking {
    fn default() -> Self {
        Self {
            size: 10,
            pause: Duration::from_millis(10),
        }
    }
}

impl Chunking {
    pub fn from_config(config: &lalabot_config::ConversationConfig) -> Self {
        Self {
            size: config.chunk_chars.max(1),
            pause: Duration::from_millis(config.chunk_pause_ms),
        }
    }
}

/// Split `text` into pieces of at most `size` characters.
///
/// Joining the pieces gives back `text` exactly.
pub fn split_chunks(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(text.len() / size + 1);
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Replay a complete text as a paced fragment stream.
pub fn rechunk(text: &str, chunking: Chunking) -> Fragments {
    let pause = chunking.pause;
    stream::iter(split_chunks(text, chunking.size).into_iter().enumerate())
        .then(move |(i, chunk)| async move {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            chunk
        })
        .boxed()
}

/// Drain `fragments`, strip think blocks from the whole text, trim it and
/// replay it.
///
/// Stripping happens on the assembled text so a marker split across two
/// fragments is still removed. Nothing is emitted before the source ends.
pub fn think_filter(fragments: Fragments, chunking: Chunking) -> Fragments {
    stream::once(async move {
        let raw: String = fragments.collect::<Vec<_>>().await.concat();
        rechunk(strip_think(&raw).trim(), chunking)
    })
    .flatten()
    .boxed()
}

/// A fragment stream over fixed pieces, with no pauses.
pub fn from_pieces<I, S>(pieces: I) -> Fragments
where
    I: IntoIterator<Item = S>,
    I::IntoIter: Send + 'static,
    S: Into<String> + 'static,
{
    stream::iter(pieces.into_iter().map(Into::<String>::into)).boxed()
}
