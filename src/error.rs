//! Error taxonomy for the review client.
//!
//! Fetch failures take over the whole view; simulation failures stay local to
//! the what-if panel; stale responses are never surfaced at all, they are only
//! reported back to the caller so it can log and drop them.

use std::fmt;

/// Transport-level failure talking to the inference backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// HTTP status when the backend answered with a non-2xx code.
    pub status: Option<u16>,
    pub message: String,
}

impl ConnectionError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ConnectionError {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ConnectionError {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "backend returned {}: {}", status, self.message),
            None => write!(f, "connection failed: {}", self.message),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<reqwest::Error> for ConnectionError {
    fn from(e: reqwest::Error) -> Self {
        ConnectionError {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// A backend payload that does not match the expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("{context}: expected a JSON object")]
    NotAnObject { context: String },

    #[error("{context}: missing field `{field}`")]
    MissingField { context: String, field: &'static str },

    #[error("{context}: invalid `{field}`: {detail}")]
    InvalidValue {
        context: String,
        field: &'static str,
        detail: String,
    },

    #[error("timeline[{index}]: timestamp {timestamp} does not follow {previous}")]
    OutOfOrder {
        index: usize,
        previous: u64,
        timestamp: u64,
    },
}

/// Failure to retrieve a match review or the live match listing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("malformed review payload: {0}")]
    Malformed(#[from] ParseError),
}

/// Failure of a what-if request. The simulation chain is left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("a simulation is already in flight")]
    Busy,

    #[error("no match review is loaded")]
    NoMatch,

    #[error("scoring service failed: {0}")]
    Scoring(#[from] ConnectionError),

    #[error("malformed scoring response: {0}")]
    Malformed(#[from] ParseError),
}

/// A completion whose request token has been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale response discarded (generation {received}, current {current})")]
pub struct StaleResponse {
    pub received: u64,
    pub current: u64,
}
