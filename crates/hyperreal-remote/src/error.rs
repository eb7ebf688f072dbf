//! Error types for the remote generation client

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four remote operations, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOperation {
    Sketch,
    Synthesize,
    Evaluate,
    Caption,
}

impl RemoteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperation::Sketch => "sketch",
            RemoteOperation::Synthesize => "synthesize",
            RemoteOperation::Evaluate => "evaluate",
            RemoteOperation::Caption => "caption",
        }
    }
}

impl std::fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while calling the generation service
#[derive(Error, Debug)]
pub enum RemoteCallError {
    /// No API key configured
    #[error("API key not found; set GEMINI_API_KEY")]
    MissingApiKey,

    /// The service rejected the key (or the model is not visible to it)
    #[error("API key is invalid or lacks access to the requested model")]
    InvalidApiKey,

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success status from the service
    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The call succeeded but produced nothing usable
    #[error("{operation} returned an empty result")]
    EmptyResult { operation: RemoteOperation },

    /// Inline payload could not be decoded
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Injected failure from a scripted client
    #[error("scripted failure on {operation} call #{call}")]
    Scripted { operation: RemoteOperation, call: u32 },
}

impl From<reqwest::Error> for RemoteCallError {
    fn from(err: reqwest::Error) -> Self {
        RemoteCallError::Http(err.to_string())
    }
}

impl From<base64::DecodeError> for RemoteCallError {
    fn from(err: base64::DecodeError) -> Self {
        RemoteCallError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_names_operation() {
        let err = RemoteCallError::EmptyResult {
            operation: RemoteOperation::Synthesize,
        };
        assert_eq!(err.to_string(), "synthesize returned an empty result");
    }

    #[test]
    fn test_api_error_display() {
        let err = RemoteCallError::Api {
            status: 429,
            message: "quota exhausted".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("quota exhausted"));
    }
}
