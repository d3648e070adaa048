//! Per-item request outcomes. Every request settles into a
//! [`RequestOutcome`]; failures are values, never propagated faults.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    Timeout { after: Duration },
    Connect { message: String },
    Status { code: u16, body: String },
    Body { message: String },
    Transport { message: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Timeout { after } => {
                write!(f, "request timed out after {} ms", after.as_millis())
            }
            RequestError::Connect { message } => write!(f, "connection failed: {message}"),
            RequestError::Status { code, body } if body.is_empty() => {
                write!(f, "server responded with status {code}")
            }
            RequestError::Status { code, body } => {
                write!(f, "server responded with status {code}: {body}")
            }
            RequestError::Body { message } => write!(f, "failed to read response body: {message}"),
            RequestError::Transport { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn transport(message: impl Into<String>) -> Self {
        RequestError::Transport {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }
}

/// Settled result of one item request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// `payload` is the response body byte for byte; bodies that are not
    /// UTF-8 settle as [`RequestError::Body`] instead.
    Success { status: u16, payload: String },
    Failure { error: RequestError },
}

impl RequestOutcome {
    pub fn success(payload: impl Into<String>) -> Self {
        RequestOutcome::Success {
            status: 200,
            payload: payload.into(),
        }
    }

    pub fn failure(error: RequestError) -> Self {
        RequestOutcome::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            RequestOutcome::Success { payload, .. } => Some(payload),
            RequestOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&RequestError> {
        match self {
            RequestOutcome::Success { .. } => None,
            RequestOutcome::Failure { error } => Some(error),
        }
    }
}

/// Renders a response body for diagnostics: JSON bodies are re-serialized
/// compactly, anything else is passed through as-is.
pub fn render_payload(payload: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => value.to_string(),
        Err(_) => payload.to_owned(),
    }
}
