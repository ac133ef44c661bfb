//! Error types for the Jeff-bot workspace.
//!
//! Startup failures (`ConfigError`, `KnowledgeError`) abort the process.
//! Request failures are reported through [`GatewayError`], whose variants map
//! one-to-one onto HTTP status classes at the gateway.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with the knowledge document. Always fatal at startup.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("failed to read knowledge document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("knowledge document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("knowledge root must be a JSON object")]
    RootNotObject,

    #[error("keyword trigger must not be empty (path {path})")]
    EmptyTrigger { path: String },

    #[error("keyword '{trigger}' points at unknown path '{path}'")]
    UnknownPath { trigger: String, path: String },
}

/// Configuration failures. Always fatal at startup, never surfaced per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("required environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

/// Request-level failure of a chat turn.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or empty conversation (400).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Completion service failure (500).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Anything else (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidInput(_) => 400,
            GatewayError::Upstream(_) | GatewayError::Internal(_) => 500,
        }
    }

    /// Text returned to the caller. Never carries internal details.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::InvalidInput(_) => "Invalid messages structure",
            GatewayError::Upstream(_) | GatewayError::Internal(_) => "Internal Server Error",
        }
    }
}
