//! Cross-session concurrency verdict.
//!
//! Runs strictly after every session has finished. Two sessions serviced in
//! parallel start speaking at nearly the same moment; serialized pipelines
//! push the second session's first utterance back by at least one full
//! request.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::timing::{PlaybackSource, SessionTimingLog, SpeechEvent, SpeechEventKind};
use crate::errors::{HarnessError, HarnessResult};

/// What to do with a negative verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictMode {
    /// Print the verdict, never fail the run
    #[default]
    Report,
    /// Fail the run when the sessions were not concurrent
    Assert,
}

impl FromStr for VerdictMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "report" => Ok(VerdictMode::Report),
            "assert" => Ok(VerdictMode::Assert),
            _ => Err(HarnessError::InvalidConfiguration(format!(
                "Unsupported verdict mode: {s}. Supported modes: report, assert"
            ))),
        }
    }
}

/// First start observed for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirstStart {
    pub session_index: usize,
    pub timestamp_ms: u64,
}

/// Outcome of comparing first-start timestamps across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConcurrencyVerdict {
    /// First starts, earliest first
    pub first_starts: Vec<FirstStart>,
    /// Gap between the two earliest-starting sessions
    pub difference_ms: u64,
    /// Gap between the earliest and latest first start
    pub spread_ms: u64,
    pub threshold_ms: u64,
    pub concurrent: bool,
}

impl ConcurrencyVerdict {
    /// Apply `mode`: in assert mode a non-concurrent verdict becomes an error.
    pub fn enforce(&self, mode: VerdictMode) -> HarnessResult<()> {
        if mode == VerdictMode::Assert && !self.concurrent {
            return Err(HarnessError::NotConcurrent {
                difference_ms: self.difference_ms,
                threshold_ms: self.threshold_ms,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ConcurrencyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Speech start times:")?;
        for start in &self.first_starts {
            writeln!(
                f,
                "  session {}: {}ms",
                start.session_index, start.timestamp_ms
            )?;
        }
        writeln!(
            f,
            "Start time difference: {}ms (threshold {}ms, spread {}ms)",
            self.difference_ms, self.threshold_ms, self.spread_ms
        )?;
        if self.concurrent {
            write!(f, "Verdict: concurrent")
        } else {
            write!(f, "Verdict: not concurrent")
        }
    }
}

/// Rebuild artifact-derived logs from the shared arrival order.
///
/// In API playback every session records the same shared speech directory,
/// so no single log says when *its* session started speaking. Instead the
/// union of all recorded arrivals is ranked by first observation and the
/// k-th distinct arrival stands for the first start of the k-th
/// artifact-derived log. Session labels are therefore ranks; the gap between
/// the two earliest arrivals is what the verdict needs. A missing rank leaves
/// that log without a start event. Bridge logs pass through untouched.
pub fn attribute_shared_arrivals(mut logs: Vec<SessionTimingLog>) -> Vec<SessionTimingLog> {
    let mut first_seen: HashMap<String, u64> = HashMap::new();
    for log in logs.iter().filter(|l| l.source == PlaybackSource::Artifacts) {
        for event in log.events.iter().filter(|e| e.kind == SpeechEventKind::Start) {
            first_seen
                .entry(event.text.clone())
                .and_modify(|ts| *ts = (*ts).min(event.timestamp_ms))
                .or_insert(event.timestamp_ms);
        }
    }
    if first_seen.is_empty() {
        return logs;
    }

    let mut ranked: Vec<(String, u64)> = first_seen.into_iter().collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    let mut ranked = ranked.into_iter();

    for log in logs
        .iter_mut()
        .filter(|l| l.source == PlaybackSource::Artifacts)
    {
        log.events = ranked
            .next()
            .map(|(text, timestamp_ms)| SpeechEvent {
                session_index: log.session_index,
                kind: SpeechEventKind::Start,
                text,
                timestamp_ms,
            })
            .into_iter()
            .collect();
    }
    logs
}

/// Compare the first start of every log against `threshold`.
///
/// Every log must be present and contain a start event; absent data is an
/// error, never an implicit zero.
pub fn compare(
    logs: &[SessionTimingLog],
    threshold: Duration,
) -> HarnessResult<ConcurrencyVerdict> {
    if logs.len() < 2 {
        return Err(HarnessError::InsufficientSessions(logs.len()));
    }

    let mut first_starts = logs
        .iter()
        .map(|log| {
            log.first_start_ms()
                .map(|timestamp_ms| FirstStart {
                    session_index: log.session_index,
                    timestamp_ms,
                })
                .ok_or(HarnessError::NoStartEvent {
                    session_index: log.session_index,
                })
        })
        .collect::<HarnessResult<Vec<_>>>()?;
    first_starts.sort_by_key(|s| (s.timestamp_ms, s.session_index));

    let earliest = first_starts[0].timestamp_ms;
    let difference_ms = first_starts[1].timestamp_ms - earliest;
    let spread_ms = first_starts[first_starts.len() - 1].timestamp_ms - earliest;
    let threshold_ms = threshold.as_millis() as u64;

    Ok(ConcurrencyVerdict {
        first_starts,
        difference_ms,
        spread_ms,
        threshold_ms,
        concurrent: difference_ms < threshold_ms,
    })
}
