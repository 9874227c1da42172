//! Scripted browser double for harness tests.
//!
//! Each `ScriptedBrowser` stands in for one isolated page plus the backend it
//! talks to: clicking the call control makes the "backend" write recognition
//! artifacts and, after a per-session delay, speak a reply. Spoken replies
//! are only logged when the speech bridge script was installed, just as the
//! real wrapper only sees utterances once it is in place.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use callcheck::config::{Credential, UiSelectors};
use callcheck::core::bridge::{SPEECH_BRIDGE_SCRIPT, SPEECH_SNAPSHOT_SCRIPT};
use callcheck::core::timing::now_ms;
use callcheck::{BrowserFactory, BrowserSession, HarnessConfig, HarnessError, HarnessResult};

/// What the simulated backend does for one session
#[derive(Debug, Clone)]
pub struct SessionScript {
    /// Delay between the call click and the first spoken reply; `None` means
    /// the reply never comes
    pub speak_after: Option<Duration>,
    pub utterance: Duration,
    /// Whether sign-in ever completes
    pub login_succeeds: bool,
    /// Whether the backend writes recognition artifacts for this call
    pub transcribes: bool,
}

impl SessionScript {
    pub fn speaking_after(ms: u64) -> Self {
        Self {
            speak_after: Some(Duration::from_millis(ms)),
            utterance: Duration::from_millis(150),
            login_succeeds: true,
            transcribes: true,
        }
    }

    pub fn silent() -> Self {
        Self {
            speak_after: None,
            ..Self::speaking_after(0)
        }
    }

    /// The call connects but its audio is never recognized
    pub fn untranscribed() -> Self {
        Self {
            transcribes: false,
            ..Self::speaking_after(50)
        }
    }

    pub fn locked_out() -> Self {
        Self {
            login_succeeds: false,
            ..Self::speaking_after(0)
        }
    }
}

#[derive(Clone)]
pub struct ScriptedFactory {
    transcription_dir: PathBuf,
    speech_dir: PathBuf,
    scripts: Vec<SessionScript>,
    ops: Arc<Mutex<BTreeMap<usize, Vec<String>>>>,
}

impl ScriptedFactory {
    pub fn new(config: &HarnessConfig, scripts: Vec<SessionScript>) -> Self {
        Self {
            transcription_dir: config.transcription_dir.clone(),
            speech_dir: config.speech_dir.clone(),
            scripts,
            ops: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Every browser operation a session performed, in order
    pub fn ops(&self, session_index: usize) -> Vec<String> {
        self.ops
            .lock()
            .get(&session_index)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowserFactory for ScriptedFactory {
    async fn open(&self, session_index: usize) -> HarnessResult<Box<dyn BrowserSession>> {
        let script = self
            .scripts
            .get(session_index)
            .cloned()
            .ok_or_else(|| HarnessError::Browser(format!("no script for {session_index}")))?;

        Ok(Box::new(ScriptedBrowser {
            session_index,
            script,
            selectors: UiSelectors::default(),
            transcription_dir: self.transcription_dir.clone(),
            speech_dir: self.speech_dir.clone(),
            ops: Arc::clone(&self.ops),
            bridge_installed: AtomicBool::new(false),
            navigated: AtomicBool::new(false),
            signed_in: AtomicBool::new(false),
            page_log: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

pub struct ScriptedBrowser {
    session_index: usize,
    script: SessionScript,
    selectors: UiSelectors,
    transcription_dir: PathBuf,
    speech_dir: PathBuf,
    ops: Arc<Mutex<BTreeMap<usize, Vec<String>>>>,
    bridge_installed: AtomicBool,
    navigated: AtomicBool,
    signed_in: AtomicBool,
    page_log: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedBrowser {
    fn record(&self, op: String) {
        self.ops.lock().entry(self.session_index).or_default().push(op);
    }

    fn start_backend(&self) {
        let index = self.session_index;
        let script = self.script.clone();
        let transcription_dir = self.transcription_dir.clone();
        let speech_dir = self.speech_dir.clone();
        let page_log = Arc::clone(&self.page_log);
        let observed = self.bridge_installed.load(Ordering::SeqCst);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let utterances = if script.transcribes { 2 } else { 0 };
            for n in 1..=utterances {
                let _ = tokio::fs::write(
                    transcription_dir.join(format!("s{index}-utt{n}.json")),
                    b"{\"text\":\"hello\"}",
                )
                .await;
            }

            let Some(delay) = script.speak_after else {
                return;
            };
            tokio::time::sleep(delay).await;

            let text = format!("Reply for session {index}");
            let _ = tokio::fs::write(speech_dir.join(format!("s{index}-reply.mp3")), b"ID3").await;
            if observed {
                page_log
                    .lock()
                    .push(json!({ "kind": "start", "text": text, "timestamp_ms": now_ms() }));
            }
            tokio::time::sleep(script.utterance).await;
            if observed {
                page_log
                    .lock()
                    .push(json!({ "kind": "end", "text": text, "timestamp_ms": now_ms() }));
            }
        });
    }
}

#[async_trait]
impl BrowserSession for ScriptedBrowser {
    async fn add_init_script(&self, source: &str) -> HarnessResult<()> {
        if source == SPEECH_BRIDGE_SCRIPT {
            self.bridge_installed.store(true, Ordering::SeqCst);
        }
        self.record("init_script".to_string());
        Ok(())
    }

    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        self.navigated.store(true, Ordering::SeqCst);
        self.record(format!("navigate:{url}"));
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> HarnessResult<()> {
        let shown = if selector == self.selectors.password {
            "***"
        } else {
            text
        };
        self.record(format!("fill:{selector}={shown}"));
        Ok(())
    }

    async fn click(&self, selector: &str) -> HarnessResult<()> {
        self.record(format!("click:{selector}"));
        if selector == self.selectors.submit && self.script.login_succeeds {
            self.signed_in.store(true, Ordering::SeqCst);
        }
        if selector == self.selectors.call {
            self.start_backend();
        }
        Ok(())
    }

    async fn is_present(&self, selector: &str) -> HarnessResult<bool> {
        if selector == self.selectors.ready {
            return Ok(self.signed_in.load(Ordering::SeqCst));
        }
        Ok(self.navigated.load(Ordering::SeqCst))
    }

    async fn evaluate(&self, script: &str) -> HarnessResult<Value> {
        if script == SPEECH_SNAPSHOT_SCRIPT {
            return Ok(Value::Array(self.page_log.lock().clone()));
        }
        Ok(Value::Null)
    }

    async fn close(&self) -> HarnessResult<()> {
        self.record("close".to_string());
        Ok(())
    }
}

/// Config with short deadlines rooted in `root`
pub fn test_config(root: &std::path::Path, sessions: usize) -> HarnessConfig {
    HarnessConfig {
        app_url: "http://webui.test".to_string(),
        credentials: (0..sessions)
            .map(|i| Credential::new(format!("user{i}@example.com"), format!("pw{i}")))
            .collect(),
        transcription_dir: root.join("transcriptions"),
        speech_dir: root.join("speech"),
        timing_dir: root.join("timings"),
        artifact_timeout: Duration::from_secs(5),
        event_timeout: Duration::from_secs(2),
        session_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(10),
        ..HarnessConfig::default()
    }
}
