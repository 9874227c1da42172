//! In-page speech instrumentation.
//!
//! Locally synthesized speech never touches the filesystem, so its timing is
//! captured inside the page: `speechSynthesis.speak` is wrapped before any
//! page script runs, and every utterance gets one-shot `start`/`end`
//! listeners that append to a page-scoped log. The log lives and dies with
//! the browser session; the harness only ever sees JSON snapshots of it.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::browser::BrowserSession;
use super::timing::{SpeechEvent, SpeechEventKind};
use crate::errors::{HarnessError, HarnessResult};

/// Installed before navigation via the browser's init-script hook.
///
/// Re-running it in the same document is a no-op, and each utterance object
/// is wired at most once, so repeated `speak` calls for the same utterance
/// still yield exactly one start and one end.
pub const SPEECH_BRIDGE_SCRIPT: &str = r#"
(() => {
  if (window.__callcheckBridge) {
    return;
  }
  window.__callcheckBridge = true;
  window.__callcheckSpeechLog = [];

  const synth = window.speechSynthesis;
  if (!synth || typeof synth.speak !== 'function') {
    return;
  }

  const tracked = new WeakSet();
  const record = (kind, utterance) => {
    window.__callcheckSpeechLog.push({
      kind,
      text: String(utterance.text || ''),
      timestamp_ms: Date.now(),
    });
  };
  const once = (utterance, kind) => {
    let fired = false;
    utterance.addEventListener(kind, () => {
      if (!fired) {
        fired = true;
        record(kind, utterance);
      }
    });
  };

  const originalSpeak = synth.speak.bind(synth);
  synth.speak = (...args) => {
    const utterance = args[0];
    if (utterance && typeof utterance === 'object' && !tracked.has(utterance)) {
      tracked.add(utterance);
      once(utterance, 'start');
      once(utterance, 'end');
    }
    return originalSpeak(...args);
  };
})();
"#;

/// Returns a detached copy of the in-page log
pub const SPEECH_SNAPSHOT_SCRIPT: &str =
    "return JSON.parse(JSON.stringify(window.__callcheckSpeechLog || []));";

/// Harness-side handle on the in-page speech log
#[derive(Debug, Clone)]
pub struct SpeechBridge {
    poll_interval: Duration,
}

impl SpeechBridge {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Register the wrapper. Must run before the first navigation so that no
    /// utterance spoken during page load is missed.
    pub async fn install(&self, session: &dyn BrowserSession) -> HarnessResult<()> {
        session.add_init_script(SPEECH_BRIDGE_SCRIPT).await?;
        info!("Speech bridge installed");
        Ok(())
    }

    /// Pull the current log out of the page.
    pub async fn snapshot(&self, session: &dyn BrowserSession) -> HarnessResult<Vec<SpeechEvent>> {
        let value = session.evaluate(SPEECH_SNAPSHOT_SCRIPT).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value).map_err(|e| {
            HarnessError::Browser(format!("speech log snapshot is malformed: {e}"))
        })
    }

    /// Poll snapshots until `target` events of `kind` are logged.
    ///
    /// Returns the snapshot that satisfied the target. Fails with
    /// [`HarnessError::EventTimeout`] no earlier than `timeout`.
    pub async fn await_events(
        &self,
        session: &dyn BrowserSession,
        kind: SpeechEventKind,
        target: usize,
        timeout: Duration,
    ) -> HarnessResult<Vec<SpeechEvent>> {
        let started = Instant::now();
        loop {
            let events = self.snapshot(session).await?;
            let actual = events.iter().filter(|e| e.kind == kind).count();
            let elapsed = started.elapsed();

            if actual >= target {
                debug!(
                    %kind,
                    actual,
                    target,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Speech event target reached"
                );
                return Ok(events);
            }
            if elapsed >= timeout {
                return Err(HarnessError::EventTimeout {
                    kind,
                    target,
                    actual,
                    elapsed,
                });
            }

            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }
}
