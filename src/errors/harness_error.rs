use std::path::PathBuf;
use std::time::Duration;

use crate::core::timing::SpeechEventKind;

/// Harness error types
///
/// Session-scoped errors (`Timeout`, `EventTimeout`, `Authentication`,
/// browser failures) are fatal to the owning session only. Comparison-scoped
/// errors (`MissingArtifact`, `NoStartEvent`, `InsufficientSessions`,
/// `NotConcurrent`) abort the serial phase without touching finished sessions.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// An artifact directory never reached its target count
    #[error(
        "Timed out after {elapsed:?} waiting for {target} artifacts in {} (found {actual})",
        directory.display()
    )]
    Timeout {
        directory: PathBuf,
        target: usize,
        actual: usize,
        elapsed: Duration,
    },

    /// The in-browser speech log never reached its target count
    #[error("Timed out after {elapsed:?} waiting for {target} '{kind}' speech events (found {actual})")]
    EventTimeout {
        kind: SpeechEventKind,
        target: usize,
        actual: usize,
        elapsed: Duration,
    },

    /// A session's persisted timing log could not be found
    #[error("Timing log for session {session_index} is missing at {}", path.display())]
    MissingArtifact { session_index: usize, path: PathBuf },

    /// A session as a whole overran its deadline
    #[error("Session {session_index} exceeded its {elapsed:?} deadline while in {state}")]
    SessionDeadline {
        session_index: usize,
        state: String,
        elapsed: Duration,
    },

    /// A persisted log has start/end events out of pair or out of order
    #[error("Session {session_index} has out-of-order speech events: {detail}")]
    UnexpectedEventOrdering { session_index: usize, detail: String },

    /// A timing log exists but contains no start event to compare
    #[error("Session {session_index} recorded no speech start event")]
    NoStartEvent { session_index: usize },

    /// Not enough timing logs to compare
    #[error("At least two timing logs are required for a concurrency verdict, got {0}")]
    InsufficientSessions(usize),

    /// Assert mode: the sessions were not serviced concurrently
    #[error("Sessions were not serviced concurrently: first starts differ by {difference_ms}ms (threshold {threshold_ms}ms)")]
    NotConcurrent { difference_ms: u64, threshold_ms: u64 },

    /// Login did not complete
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// WebDriver endpoint returned a protocol error
    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    /// Browser transport or script failure
    #[error("Browser error: {0}")]
    Browser(String),

    /// A session task panicked before reporting an outcome
    #[error("Session {session_index} panicked")]
    SessionPanicked { session_index: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    /// Whether the error is a deadline expiry rather than a hard failure
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            HarnessError::Timeout { .. }
                | HarnessError::EventTimeout { .. }
                | HarnessError::SessionDeadline { .. }
        )
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;
