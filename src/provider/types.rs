use crate::error::ChatError;
use crate::history::Turn;
use crate::profile::Profile;
use futures_core::stream::BoxStream;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub profile: Profile,
    pub messages: Vec<Turn>,
}

/// One incremental fragment of assistant text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub text: String,
}

/// Lazy stream of deltas. Dropping it closes the underlying connection.
pub type DeltaStream = BoxStream<'static, Result<Delta, ChatError>>;

/// Provider interface: one streaming chat method.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Send the request; resolves once response headers arrive.
    fn stream_chat(
        &self,
        req: ChatRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<DeltaStream, ChatError>> + Send>>;
}
