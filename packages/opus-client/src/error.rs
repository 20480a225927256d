//! Error types for the Opus Blocks client.

use thiserror::Error;

/// Result type for Opus Blocks client operations.
pub type Result<T> = std::result::Result<T, OpusError>;

/// Opus Blocks client errors.
#[derive(Debug, Error)]
pub enum OpusError {
    /// Configuration error (invalid base URL, bad settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response)
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, unexpected response shape)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl OpusError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            OpusError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OpusError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            OpusError::Parse(err.to_string())
        } else {
            OpusError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for OpusError {
    fn from(err: serde_json::Error) -> Self {
        OpusError::Parse(err.to_string())
    }
}

/// Pull a human-readable message out of an error response body.
///
/// The backend answers with `{"detail": "..."}`, with validation errors as
/// `{"detail": [{"msg": "..."}, ...]}`, or occasionally `{"message": "..."}`.
/// Plain-text bodies are returned as-is.
pub fn resolve_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let payload: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return Some(body.to_string()),
    };

    match &payload {
        serde_json::Value::String(s) => return Some(s.clone()),
        serde_json::Value::Object(_) => {}
        _ => return None,
    }

    match payload.get("detail") {
        Some(serde_json::Value::String(s)) => return Some(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s.as_str()),
                    serde_json::Value::Object(_) => item.get("msg").and_then(|m| m.as_str()),
                    _ => None,
                })
                .collect();
            if !messages.is_empty() {
                return Some(messages.join("; "));
            }
        }
        _ => {}
    }

    payload
        .get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
}
