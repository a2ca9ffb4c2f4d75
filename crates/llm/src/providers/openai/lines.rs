//! Splitting an HTTP body stream into protocol lines.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;

use parley_runtime::{FrameSource, TransportError};

type ByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

struct State<E> {
    bytes: ByteStream<E>,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no `\n`.
    scanned: usize,
    finished: bool,
}

impl<E> State<E> {
    /// Take the next complete line out of the buffer, if there is one.
    fn next_line(&mut self) -> Option<String> {
        match self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let pos = self.scanned + offset;
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                self.scanned = 0;
                Some(decode_line(&raw[..pos]))
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end_matches('\r').to_string()
}

/// Turn a body byte stream into a [`FrameSource`] of lines.
///
/// Lines may be split across chunks; bytes are buffered until a `\n` shows
/// up, so multi-byte characters are never cut. A trailing line without a
/// newline is still yielded. A body error becomes one
/// [`TransportError::Stream`] item and ends the source.
pub(crate) fn line_stream<S, E>(bytes: S) -> FrameSource
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let state = State {
        bytes: Box::pin(bytes) as ByteStream<E>,
        buffer: Vec::new(),
        scanned: 0,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.next_line() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    state.scanned = 0;
                    return Some((Err(TransportError::Stream(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    if state.buffer.is_empty() {
                        return None;
                    }
                    state.scanned = 0;
                    let rest = std::mem::take(&mut state.buffer);
                    return Some((Ok(decode_line(&rest)), state));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_state() -> State<String> {
        State {
            bytes: Box::pin(stream::empty::<Result<Bytes, String>>()),
            buffer: Vec::new(),
            scanned: 0,
            finished: false,
        }
    }

    #[test]
    fn test_partial_line_is_not_rescanned() {
        let mut state = empty_state();
        state.buffer.extend_from_slice(b"data: {\"content\":");
        assert_eq!(state.next_line(), None);
        assert_eq!(state.scanned, state.buffer.len());

        state.buffer.extend_from_slice(b"\"hi\"}\ndata: [DO");
        assert_eq!(state.next_line().as_deref(), Some("data: {\"content\":\"hi\"}"));
        assert_eq!(state.scanned, 0);
        assert_eq!(state.next_line(), None);
        assert_eq!(state.scanned, b"data: [DO".len());
    }
}
