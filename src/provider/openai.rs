use super::decoder::Deltas;
use super::{ChatRequest, DeltaStream, Provider};
use crate::error::ChatError;
use crate::history::Turn;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

pub fn completions_url(endpoint_base: &str) -> Result<Url, ChatError> {
    let base = endpoint_base.trim().trim_end_matches('/');
    Url::parse(&format!("{base}/chat/completions"))
        .map_err(|e| ChatError::transport(format!("invalid endpoint {endpoint_base:?}: {e}")))
}

fn headers(credential: &str) -> Result<HeaderMap, ChatError> {
    let mut h = HeaderMap::new();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    h.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    let mut v = HeaderValue::from_str(&format!("Bearer {credential}"))
        .map_err(|_| ChatError::transport("credential contains characters not allowed in a header"))?;
    v.set_sensitive(true);
    h.insert(AUTHORIZATION, v);
    Ok(h)
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn stream_chat(
        &self,
        req: ChatRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<DeltaStream, ChatError>> + Send>>
    {
        let http = self.http.clone();

        Box::pin(async move {
            let url = completions_url(&req.profile.endpoint_base)?;
            let headers = headers(&req.profile.credential)?;

            let body = CompletionRequest {
                model: &req.profile.model_id,
                messages: &req.messages,
                stream: true,
            };

            tracing::debug!(
                %url,
                model = %req.profile.model_id,
                messages = req.messages.len(),
                "sending chat request"
            );

            let resp = http.post(url).headers(headers).json(&body).send().await?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(ChatError::transport(format!("HTTP {status}: {}", text.trim())));
            }

            let deltas = Deltas::new(Box::pin(resp.bytes_stream()));
            Ok(Box::pin(deltas) as DeltaStream)
        })
    }
}
