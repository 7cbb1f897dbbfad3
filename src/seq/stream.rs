//! Generation output streams.
//!
//! A [`GenStream`] is the readable end of one generation. The raw stream
//! yields every [`Chunk`] the server emits, hidden or not; the derived
//! views ([`GenStream::text_stream`], [`GenStream::text`],
//! [`GenStream::text_and_tokens`]) drop hidden chunks.
//!
//! Chunks are queued without back-pressure: the connection's dispatch
//! loop never blocks on a slow consumer, and an unread stream buffers
//! until it is read or dropped.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

// ============================================================================
// Chunk
// ============================================================================

/// One streamed unit of generation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Generated text; empty when the server sent none.
    pub text: String,

    /// Token ids backing the text, when the server reports them.
    pub tokens: Option<Vec<u32>>,

    /// Excluded from derived text views when set.
    pub hidden: bool,
}

// ============================================================================
// TextAndTokens
// ============================================================================

/// Accumulated non-hidden output of one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextAndTokens {
    /// Concatenated non-hidden text.
    pub text: String,

    /// Flattened non-hidden token ids.
    pub tokens: Vec<u32>,
}

// ============================================================================
// GenStream
// ============================================================================

/// The readable half of one generation.
///
/// Ends after the server finishes the generation (or the sequence
/// closes) and all buffered chunks have been read.
#[derive(Debug)]
pub struct GenStream {
    /// Chunk channel fed by the owning sequence.
    rx: mpsc::UnboundedReceiver<Chunk>,
}

impl GenStream {
    /// Creates a stream over the receiving half of a generation slot.
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Chunk>) -> Self {
        Self { rx }
    }

    /// Receives the next chunk, hidden or not.
    ///
    /// Returns `None` once the generation is finished and drained.
    pub async fn recv(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    /// Converts into a stream of non-hidden text fragments.
    #[must_use]
    pub fn text_stream(self) -> TextStream {
        TextStream { inner: self }
    }

    /// Concatenates all non-hidden text.
    pub async fn text(mut self) -> String {
        let mut out = String::new();
        while let Some(chunk) = self.recv().await {
            if !chunk.hidden {
                out.push_str(&chunk.text);
            }
        }
        out
    }

    /// Concatenates non-hidden text and flattens non-hidden token runs.
    pub async fn text_and_tokens(mut self) -> TextAndTokens {
        let mut out = TextAndTokens::default();
        while let Some(chunk) = self.recv().await {
            if chunk.hidden {
                continue;
            }
            out.text.push_str(&chunk.text);
            if let Some(tokens) = chunk.tokens {
                out.tokens.extend(tokens);
            }
        }
        out
    }
}

impl Stream for GenStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// TextStream
// ============================================================================

/// Stream of non-hidden text fragments from one generation.
#[derive(Debug)]
pub struct TextStream {
    /// Underlying chunk stream.
    inner: GenStream,
}

impl Stream for TextStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        loop {
            match self.inner.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) if chunk.hidden => {}
                Poll::Ready(Some(chunk)) => return Poll::Ready(Some(chunk.text)),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
