//! Line splitter for newline-delimited JSON bodies.
//!
//! The game-history endpoint streams one JSON document per line for as long as
//! it has games to send. [`LineStream`] turns the raw chunked byte stream into
//! complete lines as soon as each one has fully arrived, so a caller never has
//! to hold the whole body in memory.
//!
//! - Chunk boundaries may fall anywhere, including inside a multi-byte UTF-8
//!   sequence; bytes are buffered until a `\n` shows up.
//! - `\r\n` endings are accepted.
//! - Blank lines (keep-alives) are skipped.
//! - A final line without a trailing newline is still yielded at end of stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// A stream adapter that yields complete, non-empty lines from a byte stream.
pub struct LineStream<S> {
    inner: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S> LineStream<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            done: false,
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let end = self.buffer.iter().position(|b| *b == b'\n')?;
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
    }
}

impl<S, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Vec<u8>, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.take_line() {
                return Poll::Ready(Some(Ok(line)));
            }

            if self.done {
                // Flush a trailing line that had no newline.
                let rest = std::mem::take(&mut self.buffer);
                if rest.iter().all(u8::is_ascii_whitespace) {
                    return Poll::Ready(None);
                }
                return Poll::Ready(Some(Ok(rest)));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => self.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
