//! Error taxonomy for the collector.
//!
//! Nothing here is fatal to the process. Transport and storage failures are
//! logged by the scheduler and the cycle is skipped; session state errors are
//! returned straight to the caller that misused the session API.

use thiserror::Error;

/// The instrument could not be reached or returned something unusable.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request to {url} failed after {attempts} attempt(s): {message}")]
    Exhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("instrument worker failed: {0}")]
    Worker(String),
}

/// A write or read against one of the SQLite files failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// Misuse of the single-session state machine.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionStateError {
    #[error("a measurement session is already collecting")]
    AlreadyCollecting,

    #[error("no measurement session is collecting")]
    NotCollecting,

    #[error("no stored measurement session has that id")]
    UnknownSession,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] SessionStateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("CO/O2 reading is not a finite number (co={co}, o2={o2})")]
    NonFiniteReading { co: f64, o2: f64 },
}

impl SessionError {
    pub fn is_state(&self, expected: SessionStateError) -> bool {
        matches!(self, SessionError::State(actual) if *actual == expected)
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        SessionError::Storage(StorageError::Database(err))
    }
}
