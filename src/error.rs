//! Error types for the entity synchronization engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by entity bindings, store operations and the variant editor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// The request never produced a usable response (connection, status code, decoding).
    #[error("{text}")]
    Transport { technical_error: String, text: String },

    /// The remote service answered with an `error` payload.
    #[error("{text}")]
    Server { technical_error: String, text: String },

    /// A field rule rejected the edited value.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// The entity binding deliberately does not implement this operation.
    #[error("{0} doesn't exist")]
    Unsupported(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Dot-path could not be applied to the selected variant.
    #[error("invalid property path: {0}")]
    InvalidPath(String),

    #[error("unknown variant: {0}")]
    UnknownVariant(String),
}

impl SyncError {
    pub fn unsupported(operation: &str) -> Self {
        SyncError::Unsupported(operation.to_string())
    }

    pub fn transport(technical_error: impl ToString, text: &str) -> Self {
        SyncError::Transport {
            technical_error: technical_error.to_string(),
            text: text.to_string(),
        }
    }

    /// Normalized `{technicalError, text}` shape surfaced to the rendering layer.
    pub fn message(&self) -> ErrorMessage {
        match self {
            SyncError::Transport {
                technical_error,
                text,
            }
            | SyncError::Server {
                technical_error,
                text,
            } => ErrorMessage {
                technical_error: technical_error.clone(),
                text: text.clone(),
            },
            other => ErrorMessage {
                technical_error: format!("{:?}", other),
                text: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub technical_error: String,
    pub text: String,
}
