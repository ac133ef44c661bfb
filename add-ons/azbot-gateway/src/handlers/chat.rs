//! Chat handler: resolves the latest message against the team knowledge base,
//! prepends the Jeff persona system message, and relays the model's token
//! stream to the browser as plain text.
//!
//! A turn moves through `Idle -> Validating -> Resolving -> Requesting ->
//! Streaming -> Done`; any failure ends it in `Failed`. Phases are logged under
//! the `azbot::chat` target with the request id.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use azbot_core::{assemble_conversation, ChatMessage, GatewayError, KnowledgeBase};
use azbot_skills::{CompletionService, TokenStream};
use futures_util::stream::StreamExt;
use std::fmt;

use crate::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Lifecycle of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConversePhase {
    Idle,
    Validating,
    Resolving,
    Requesting,
    Streaming,
    Done,
    Failed,
}

impl ConversePhase {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, ConversePhase::Done | ConversePhase::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub(crate) fn can_advance_to(self, next: ConversePhase) -> bool {
        use ConversePhase::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Idle, Validating)
            | (Validating, Resolving)
            | (Resolving, Requesting)
            | (Requesting, Streaming)
            | (Streaming, Done) => true,
            _ => false,
        }
    }

    fn advance(self, next: ConversePhase, request_id: &str) -> ConversePhase {
        debug_assert!(self.can_advance_to(next), "illegal transition {self} -> {next}");
        tracing::debug!(
            target: "azbot::chat",
            request_id = %request_id,
            from = %self,
            to = %next,
            "Phase transition"
        );
        next
    }
}

impl fmt::Display for ConversePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversePhase::Idle => "idle",
            ConversePhase::Validating => "validating",
            ConversePhase::Resolving => "resolving",
            ConversePhase::Requesting => "requesting",
            ConversePhase::Streaming => "streaming",
            ConversePhase::Done => "done",
            ConversePhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Accepted upstream stream, ready to be relayed.
pub(crate) struct Conversation {
    pub(crate) request_id: String,
    pub(crate) tokens: TokenStream,
}

/// Parses `{ "messages": [{ role, content }, ...] }`.
///
/// A missing or non-array `messages` is `InvalidInput` (400). A body that is not JSON,
/// or a message that does not deserialize, is `Internal` (500).
pub(crate) fn parse_chat_request(body: &[u8]) -> Result<Vec<ChatMessage>, GatewayError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Internal(format!("body is not JSON: {}", e)))?;
    let messages = value
        .get("messages")
        .filter(|m| m.is_array())
        .cloned()
        .ok_or_else(|| GatewayError::InvalidInput("messages must be an array".to_string()))?;
    serde_json::from_value(messages)
        .map_err(|e| GatewayError::Internal(format!("malformed message: {}", e)))
}

/// Runs a chat turn up to the point where the upstream stream has been accepted.
pub(crate) async fn converse(
    knowledge: &KnowledgeBase,
    llm: &dyn CompletionService,
    history: Vec<ChatMessage>,
    request_id: String,
) -> Result<Conversation, GatewayError> {
    let mut phase = ConversePhase::Idle.advance(ConversePhase::Validating, &request_id);

    let Some(last) = history.last() else {
        phase.advance(ConversePhase::Failed, &request_id);
        return Err(GatewayError::InvalidInput(
            "messages must not be empty".to_string(),
        ));
    };

    phase = phase.advance(ConversePhase::Resolving, &request_id);
    let query = last.content.to_lowercase();
    let resolution = knowledge.resolve(&query);
    tracing::info!(
        target: "azbot::chat",
        request_id = %request_id,
        turns = history.len(),
        source = %resolution.as_ref().map(|r| r.source.to_string()).unwrap_or_else(|| "fallback".to_string()),
        "Knowledge resolved"
    );

    phase = phase.advance(ConversePhase::Requesting, &request_id);
    let messages = assemble_conversation(resolution.as_ref(), &history);
    match llm.stream_chat(messages).await {
        Ok(tokens) => {
            phase.advance(ConversePhase::Streaming, &request_id);
            Ok(Conversation { request_id, tokens })
        }
        Err(e) => {
            phase.advance(ConversePhase::Failed, &request_id);
            Err(e.into())
        }
    }
}

/// Turns the upstream token channel into a plain-text body. Chunks keep arrival order;
/// an upstream error ends the body early. Dropping the body drops the receiver, which
/// stops the upstream reader.
pub(crate) fn relay_body(conversation: Conversation) -> Body {
    let Conversation {
        request_id,
        mut tokens,
    } = conversation;

    let stream = async_stream::stream! {
        let mut relayed = 0usize;
        let mut phase = ConversePhase::Streaming;
        while let Some(item) = tokens.recv().await {
            match item {
                Ok(chunk) => {
                    relayed += chunk.len();
                    yield chunk;
                }
                Err(e) => {
                    tracing::error!(
                        target: "azbot::chat",
                        request_id = %request_id,
                        error = %e,
                        "Completion stream broke after {} bytes",
                        relayed
                    );
                    phase = phase.advance(ConversePhase::Failed, &request_id);
                    break;
                }
            }
        }
        if !phase.is_terminal() {
            phase.advance(ConversePhase::Done, &request_id);
            tracing::info!(
                target: "azbot::chat",
                request_id = %request_id,
                bytes = relayed,
                "[Chat] Streaming complete"
            );
        }
    };

    Body::from_stream(stream.map(Ok::<_, std::convert::Infallible>))
}

pub(crate) fn error_response(err: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        err.public_message(),
    )
        .into_response()
}

/// POST /api/chat – streams the assistant reply as plain text.
pub(crate) async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        target: "azbot::chat",
        request_id = %request_id,
        "Chat request received: {} bytes",
        body.len()
    );

    let result = match parse_chat_request(&body) {
        Ok(history) => {
            converse(
                &state.knowledge,
                state.llm.as_ref(),
                history,
                request_id.clone(),
            )
            .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(conversation) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, TEXT_PLAIN),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            relay_body(conversation),
        )
            .into_response(),
        Err(e) => {
            match &e {
                GatewayError::InvalidInput(reason) => tracing::warn!(
                    target: "azbot::chat",
                    request_id = %request_id,
                    reason = %reason,
                    "Rejected chat request"
                ),
                other => tracing::error!(
                    target: "azbot::chat",
                    request_id = %request_id,
                    error = %other,
                    "Error in chat handler"
                ),
            }
            error_response(&e)
        }
    }
}
