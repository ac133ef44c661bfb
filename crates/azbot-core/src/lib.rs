//! azbot-core: shared types, team knowledge base, keyword resolver, and persona prompt.
//!
//! The knowledge base is built once at startup and shared read-only (`Arc<KnowledgeBase>`)
//! between requests.

mod error;
mod knowledge;
mod prompt;
mod shared;

pub use error::{ConfigError, GatewayError, KnowledgeError};

pub use shared::{
    openai_api_key, ChatMessage, CoreConfig, Role, DEFAULT_LLM_API_URL, DEFAULT_MODEL,
    ENV_OPENAI_API_KEY,
};

pub use knowledge::{
    render_value, search_value, KeywordBinding, KeywordEntry, KeywordTable, KnowledgeBase,
    Resolution, ResolutionSource, BUILTIN_DOCUMENT,
};

pub use prompt::{
    assemble_conversation, build_system_prompt, FALLBACK_PHRASE, PERSONA_INSTRUCTION,
    RESPONSE_STYLE,
};
