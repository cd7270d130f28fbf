use super::Delta;
use crate::error::ChatError;
use futures_core::Stream;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<ChoiceDelta>,
}

#[derive(Debug, Deserialize)]
struct ChoiceDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder for `data: {json}` line framing.
///
/// - Buffers partial lines across chunks
/// - Drops blank lines and anything that is not a JSON completion chunk
/// - Yields only non-empty `choices[0].delta.content`
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns the deltas completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.drain(..=pos).collect::<Vec<u8>>();
            out.extend(decode_line(&line[..line.len() - 1]));
        }

        out
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buf);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let s = match std::str::from_utf8(line) {
        Ok(s) => s,
        Err(e) => {
            tracing::trace!(error = %e, "dropping non UTF-8 stream line");
            return None;
        }
    };
    if s.trim().is_empty() {
        return None;
    }

    let payload = match s.strip_prefix("data:") {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => s,
    };

    // Keep-alives, `[DONE]`, comments and other framing lines land here.
    let chunk: CompletionChunk = match serde_json::from_str(payload) {
        Ok(c) => c,
        Err(e) => {
            tracing::trace!(error = %e, line = s, "dropping unparsable stream line");
            return None;
        }
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|t| !t.is_empty())
}

/// Adapts a stream of raw body chunks into a lazy stream of [`Delta`]s.
pub struct Deltas<S> {
    body: S,
    decoder: StreamDecoder,
    ready: VecDeque<String>,
    done: bool,
}

impl<S> Deltas<S> {
    pub fn new(body: S) -> Self {
        Self {
            body,
            decoder: StreamDecoder::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, B, E> Stream for Deltas<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    type Item = Result<Delta, ChatError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(text) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(Delta { text })));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.body).poll_next(cx)) {
                Some(Ok(bytes)) => {
                    let deltas = this.decoder.push(bytes.as_ref());
                    this.ready.extend(deltas);
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(ChatError::transport(format!(
                        "response stream interrupted: {e}"
                    )))));
                }
                None => {
                    this.done = true;
                    this.ready.extend(this.decoder.finish());
                }
            }
        }
    }
}
