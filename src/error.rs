use std::fmt;

use serde::Serialize;

/// Faults raised by an inference capability for a single call.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The call did not finish in time.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The server could not be reached or the connection dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered, but not with something we understand.
    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("{0}")]
    Unknown(String),
}

impl InferenceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InferenceError::Timeout(_) => FailureKind::Timeout,
            InferenceError::Connection(_) => FailureKind::Connection,
            InferenceError::Protocol(_) => FailureKind::Protocol,
            InferenceError::Unknown(_) => FailureKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        // A connect timeout reports both; it is a connection fault.
        if err.is_connect() {
            InferenceError::Connection(message)
        } else if err.is_timeout() {
            InferenceError::Timeout(message)
        } else if err.is_decode() || err.is_body() || err.is_status() {
            InferenceError::Protocol(message)
        } else {
            InferenceError::Unknown(message)
        }
    }
}

impl From<serde_json::Error> for InferenceError {
    fn from(err: serde_json::Error) -> Self {
        InferenceError::Protocol(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Timeout,
    Connection,
    Protocol,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Protocol => "protocol",
            FailureKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified task failure, fixed at the point it happened.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
    pub model: String,
    pub prompt: String,
}

impl FailureInfo {
    pub fn from_error(err: &InferenceError, model: &str, prompt: &str) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            model: model.to_string(),
            prompt: prompt.to_string(),
        }
    }
}
