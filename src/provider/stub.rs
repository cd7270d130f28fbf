use super::{ChatRequest, Delta, DeltaStream, Provider};
use crate::error::ChatError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_stream::{Stream, StreamExt};

/// What the stub does for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream these deltas, then end.
    Deltas(Vec<&'static str>),
    /// Stream these deltas, then stall forever.
    Stall(Vec<&'static str>),
    /// Fail before any stream data.
    Fail(&'static str),
    /// Never answer the request.
    Hang,
}

/// Scripted provider that records every request it receives.
#[derive(Debug, Default)]
pub struct StubProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
    dropped: Arc<AtomicBool>,
}

impl StubProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// True once the most recent stream was dropped.
    pub fn stream_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Stream wrapper that flips the drop flag when the session lets go of it.
struct Guarded {
    inner: DeltaStream,
    _flag: DropFlag,
}

impl Stream for Guarded {
    type Item = Result<Delta, ChatError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

fn deltas(parts: Vec<&'static str>) -> impl Stream<Item = Result<Delta, ChatError>> {
    tokio_stream::iter(parts).map(|p| Ok(Delta { text: p.to_string() }))
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn stream_chat(
        &self,
        req: ChatRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<DeltaStream, ChatError>> + Send>>
    {
        self.requests.lock().expect("requests lock").push(req);
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Reply::Deltas(Vec::new()));

        self.dropped.store(false, Ordering::SeqCst);
        let flag = DropFlag(self.dropped.clone());

        Box::pin(async move {
            let inner: DeltaStream = match reply {
                Reply::Fail(msg) => return Err(ChatError::transport(msg)),
                Reply::Hang => std::future::pending().await,
                Reply::Deltas(parts) => Box::pin(deltas(parts)),
                Reply::Stall(parts) => Box::pin(deltas(parts).chain(tokio_stream::pending())),
            };
            Ok(Box::pin(Guarded { inner, _flag: flag }) as DeltaStream)
        })
    }
}
