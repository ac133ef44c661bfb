//! Model Router: submits a conversation to an OpenAI-compatible chat completions
//! endpoint with `stream: true` and relays the generated tokens through a channel.

use azbot_core::{openai_api_key, ChatMessage, ConfigError, CoreConfig, GatewayError};
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Buffered tokens between the upstream reader and the HTTP body.
const TOKEN_CHANNEL_CAPACITY: usize = 64;
/// Upstream error bodies are cut to this many characters in logs.
const ERROR_BODY_PREVIEW: usize = 300;
const DONE_SENTINEL: &str = "[DONE]";

/// Completion service failure.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request to completion service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion stream failed: {0}")]
    Stream(String),
}

impl From<CompletionError> for GatewayError {
    fn from(e: CompletionError) -> Self {
        GatewayError::Upstream(e.to_string())
    }
}

/// Generated text chunks in arrival order. The channel closes when upstream completes;
/// an `Err` item means the stream broke after it started.
pub type TokenStream = mpsc::Receiver<Result<String, CompletionError>>;

/// A text-completion backend that streams its output.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Model identifier requested from the backend.
    fn model(&self) -> &str;

    /// Starts a streamed completion. Returns once the backend has accepted the request.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, CompletionError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Live OpenAI chat completions client.
pub struct ModelRouter {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ModelRouter {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Builds the router from config plus the `OPENAI_API_KEY` credential.
    pub fn from_config(config: &CoreConfig) -> Result<Self, ConfigError> {
        let api_key = openai_api_key()?;
        Ok(Self::new(
            config.llm_api_url.clone(),
            api_key,
            config.llm_model.clone(),
        ))
    }
}

#[async_trait::async_trait]
impl CompletionService for ModelRouter {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, CompletionError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            stream: true,
            messages: &messages,
        };

        tracing::debug!(
            target: "azbot::llm",
            model = %self.model,
            messages = messages.len(),
            "Submitting streamed completion"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        tokio::spawn(relay_stream(response, tx));
        Ok(rx)
    }
}

/// Reads the SSE body and forwards content deltas until `[DONE]`, end of body,
/// an upstream error, or the receiver going away. Dropping the event stream on
/// return releases the upstream connection.
async fn relay_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<String, CompletionError>>,
) {
    let mut events = response.bytes_stream().eventsource();
    let mut forwarded = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(target: "azbot::llm", forwarded, "Receiver dropped; closing upstream stream");
                return;
            }
            next = events.next() => next,
        };
        let Some(event) = next else { break };

        let event = match event {
            Ok(event) => event,
            Err(EventStreamError::Transport(e)) => {
                tracing::warn!(target: "azbot::llm", error = %e, "Completion stream read failed");
                let _ = tx.send(Err(CompletionError::Transport(e))).await;
                return;
            }
            Err(e) => {
                tracing::warn!(target: "azbot::llm", error = %e, "Completion stream undecodable");
                let _ = tx.send(Err(CompletionError::Stream(e.to_string()))).await;
                return;
            }
        };
        if event.data.is_empty() {
            continue;
        }

        match forward_event(&event.data, &tx).await {
            Flow::Continue(n) => forwarded += n,
            Flow::Stop => {
                tracing::debug!(target: "azbot::llm", forwarded, "Completion stream finished");
                return;
            }
        }
    }
    tracing::debug!(target: "azbot::llm", forwarded, "Completion stream ended");
}

enum Flow {
    /// Keep reading; carries the number of chunks forwarded.
    Continue(usize),
    Stop,
}

async fn forward_event(data: &str, tx: &mpsc::Sender<Result<String, CompletionError>>) -> Flow {
    if data == DONE_SENTINEL {
        return Flow::Stop;
    }
    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(
                target: "azbot::llm",
                error = %e,
                data = %data.chars().take(100).collect::<String>(),
                "Skipping malformed completion chunk"
            );
            return Flow::Continue(0);
        }
    };
    if let Some(err) = chunk.error {
        let _ = tx.send(Err(CompletionError::Stream(err.message))).await;
        return Flow::Stop;
    }

    let mut sent = 0;
    for content in chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .filter(|c| !c.is_empty())
    {
        if tx.send(Ok(content)).await.is_err() {
            tracing::debug!(target: "azbot::llm", "Receiver dropped; closing upstream stream");
            return Flow::Stop;
        }
        sent += 1;
    }
    Flow::Continue(sent)
}
