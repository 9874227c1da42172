//! Speech timing data captured per session.
//!
//! A [`SessionTimingLog`] is the unit that crosses the barrier between the
//! parallel session phase and the serial comparison phase. Timestamps are Unix
//! epoch milliseconds so that events captured in different browser contexts
//! are directly comparable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{HarnessError, HarnessResult};

/// Lifecycle edge of a single utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEventKind {
    Start,
    End,
}

impl std::fmt::Display for SpeechEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechEventKind::Start => write!(f, "start"),
            SpeechEventKind::End => write!(f, "end"),
        }
    }
}

/// One timestamped utterance edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechEvent {
    /// Index of the session that produced the event. The in-page log does not
    /// know its session, so the driver stamps it after extraction.
    #[serde(default)]
    pub session_index: usize,
    pub kind: SpeechEventKind,
    pub text: String,
    pub timestamp_ms: u64,
}

/// Where a log's playback timings came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackSource {
    /// Captured in the browser by the speech bridge
    Bridge,
    /// Derived from speech artifact arrival times (start events only)
    Artifacts,
}

/// Ordered speech events of one session plus capture metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTimingLog {
    pub session_index: usize,
    pub username: String,
    pub source: PlaybackSource,
    /// Time spent waiting for recognition artifacts
    pub recognition_wait_ms: u64,
    pub captured_at_ms: u64,
    pub events: Vec<SpeechEvent>,
}

impl SessionTimingLog {
    pub fn new(
        session_index: usize,
        username: impl Into<String>,
        source: PlaybackSource,
        recognition_wait_ms: u64,
        mut events: Vec<SpeechEvent>,
    ) -> Self {
        for event in &mut events {
            event.session_index = session_index;
        }
        // Stable sort keeps start-before-end for events sharing a millisecond.
        events.sort_by_key(|e| e.timestamp_ms);

        Self {
            session_index,
            username: username.into(),
            source,
            recognition_wait_ms,
            captured_at_ms: now_ms(),
            events,
        }
    }

    /// Timestamp of the earliest start event, if any
    pub fn first_start_ms(&self) -> Option<u64> {
        self.events
            .iter()
            .filter(|e| e.kind == SpeechEventKind::Start)
            .map(|e| e.timestamp_ms)
            .min()
    }

    pub fn count(&self, kind: SpeechEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Check that every end has a preceding start for the same utterance and
    /// that no utterance was left open while a later one finished.
    ///
    /// A start still open at the tail of the log is accepted: the snapshot
    /// may have been taken mid-utterance. Artifact-derived logs only carry
    /// start events and are not checked.
    pub fn validate_ordering(&self) -> HarnessResult<()> {
        if self.source == PlaybackSource::Artifacts {
            return Ok(());
        }

        // Positions of open starts per utterance text; repeated phrases are
        // legal as long as they pair up.
        let mut open: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut last_end = None;
        for (position, event) in self.events.iter().enumerate() {
            match event.kind {
                SpeechEventKind::Start => open
                    .entry(event.text.as_str())
                    .or_default()
                    .push(position),
                SpeechEventKind::End => match open.get_mut(event.text.as_str()) {
                    Some(starts) if !starts.is_empty() => {
                        starts.remove(0);
                        last_end = Some(position);
                    }
                    _ => {
                        return Err(HarnessError::UnexpectedEventOrdering {
                            session_index: self.session_index,
                            detail: format!(
                                "end at {}ms for '{}' has no preceding start",
                                event.timestamp_ms, event.text
                            ),
                        });
                    }
                },
            }
        }

        if let Some(last_end) = last_end {
            let interrupted = open
                .iter()
                .find(|(_, starts)| starts.iter().any(|&position| position < last_end));
            if let Some((text, _)) = interrupted {
                return Err(HarnessError::UnexpectedEventOrdering {
                    session_index: self.session_index,
                    detail: format!(
                        "start for '{text}' was never followed by an end before later speech finished"
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Current wall-clock time in Unix epoch milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
