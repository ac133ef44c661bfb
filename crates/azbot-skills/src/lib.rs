//! Completion service seam and the live OpenAI streaming client.

mod model_router;

pub use model_router::{CompletionError, CompletionService, ModelRouter, TokenStream};
