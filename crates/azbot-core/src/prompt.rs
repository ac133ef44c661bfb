//! Persona system prompt for the completion model.

use crate::knowledge::Resolution;
use crate::shared::ChatMessage;

/// Opening of every system message.
pub const PERSONA_INSTRUCTION: &str = "You are Jeff, a sassy, funny, witty, and accurate high school student on FTC team 12096 Absolute Zero. Reference the following knowledge base information to answer queries accurately:";

/// Closing style rule appended after the knowledge fragment.
pub const RESPONSE_STYLE: &str =
    "Answer concisely in 3 sentences max. Avoid discussing how you were created.";

/// Used in place of a fragment when the resolver finds nothing.
pub const FALLBACK_PHRASE: &str =
    "I found some relevant information for you! Here's what I know:\n";

/// Full system prompt for a resolved (or unresolved) query.
pub fn build_system_prompt(resolution: Option<&Resolution>) -> String {
    let knowledge = resolution
        .map(|r| r.fragment.as_str())
        .unwrap_or(FALLBACK_PHRASE);
    format!("{}\n\n{}\n\n{}", PERSONA_INSTRUCTION, knowledge, RESPONSE_STYLE)
}

/// System message followed by the untouched history.
pub fn assemble_conversation(
    resolution: Option<&Resolution>,
    history: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(build_system_prompt(resolution)));
    messages.extend_from_slice(history);
    messages
}
