//! One simulated user's voice call.
//!
//! A [`SessionDriver`] walks a single, strictly sequential state machine:
//!
//! ```text
//! Init → Authenticate → StartCall → AwaitRecognitionArtifacts
//!      → AwaitPlaybackArtifacts | AwaitPlaybackEvents → PersistLog → Done
//! ```
//!
//! Any error moves the session to `Failed` and is returned to the caller; it
//! never reaches sibling sessions. The browser context is closed on every
//! exit path.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::bridge::SpeechBridge;
use super::browser::{BrowserFactory, BrowserSession, wait_for_selector};
use super::store::TimingStore;
use super::timing::{PlaybackSource, SessionTimingLog, SpeechEvent, SpeechEventKind};
use crate::config::{Credential, HarnessConfig};
use crate::errors::{HarnessError, HarnessResult};

/// How assistant speech reaches the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Backend TTS writes one audio file per utterance
    Api,
    /// The browser synthesizes speech itself via `speechSynthesis`
    #[default]
    Local,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Api => write!(f, "api"),
            PlaybackMode::Local => write!(f, "local"),
        }
    }
}

impl FromStr for PlaybackMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api" => Ok(PlaybackMode::Api),
            "local" | "browser" => Ok(PlaybackMode::Local),
            _ => Err(HarnessError::InvalidConfiguration(format!(
                "Unsupported playback mode: {s}. Supported modes: api, local"
            ))),
        }
    }
}

/// Position of a session in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Authenticate,
    StartCall,
    AwaitRecognitionArtifacts,
    AwaitPlaybackArtifacts,
    AwaitPlaybackEvents,
    PersistLog,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
struct BoardEntry {
    current: SessionState,
    last_active: SessionState,
}

/// Latest state of every session, readable while sessions run
#[derive(Debug, Clone, Default)]
pub struct StateBoard {
    states: Arc<RwLock<BTreeMap<usize, BoardEntry>>>,
}

impl StateBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session_index: usize, state: SessionState) {
        let mut states = self.states.write();
        let entry = states.entry(session_index).or_insert(BoardEntry {
            current: state,
            last_active: SessionState::Init,
        });
        entry.current = state;
        if !state.is_terminal() {
            entry.last_active = state;
        }
    }

    pub fn get(&self, session_index: usize) -> Option<SessionState> {
        self.states.read().get(&session_index).map(|e| e.current)
    }

    /// The last non-terminal state, i.e. where a failed session stopped
    pub fn last_active(&self, session_index: usize) -> Option<SessionState> {
        self.states.read().get(&session_index).map(|e| e.last_active)
    }

    pub fn snapshot(&self) -> BTreeMap<usize, SessionState> {
        self.states
            .read()
            .iter()
            .map(|(index, entry)| (*index, entry.current))
            .collect()
    }
}

/// Number of sessions that have placed their call in the current run
///
/// The artifact directories are shared, so a session can only know how many
/// files to expect once it knows how many calls are producing them.
#[derive(Debug, Clone, Default)]
pub struct CallTally {
    started: Arc<AtomicUsize>,
}

impl CallTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more placed call and return the new total.
    pub fn record(&self) -> usize {
        self.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

/// Summary of a session that completed and persisted its log
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_index: usize,
    pub username: String,
    pub recognition_wait: Duration,
    pub events: usize,
    pub log_path: PathBuf,
}

/// Drives one simulated user through a voice call
pub struct SessionDriver {
    index: usize,
    credential: Credential,
    config: Arc<HarnessConfig>,
    store: TimingStore,
    board: StateBoard,
    calls: CallTally,
}

impl SessionDriver {
    pub fn new(
        index: usize,
        credential: Credential,
        config: Arc<HarnessConfig>,
        store: TimingStore,
        board: StateBoard,
        calls: CallTally,
    ) -> Self {
        Self {
            index,
            credential,
            config,
            store,
            board,
            calls,
        }
    }

    /// Run the whole call inside the session deadline.
    ///
    /// Opens a dedicated browser context, drives it, and closes it whether or
    /// not the call succeeded.
    pub async fn run(self, factory: &dyn BrowserFactory) -> HarnessResult<SessionReport> {
        self.enter(SessionState::Init);
        let started = Instant::now();

        let browser = match factory.open(self.index).await {
            Ok(browser) => browser,
            Err(e) => return Err(self.fail(e)),
        };

        let result =
            match tokio::time::timeout(self.config.session_timeout, self.drive(browser.as_ref()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(HarnessError::SessionDeadline {
                    session_index: self.index,
                    state: self
                        .board
                        .get(self.index)
                        .unwrap_or(SessionState::Init)
                        .to_string(),
                    elapsed: started.elapsed(),
                }),
            };

        if let Err(e) = browser.close().await {
            warn!(session_index = self.index, "Failed to close browser: {}", e);
        }

        match result {
            Ok(report) => {
                self.enter(SessionState::Done);
                Ok(report)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn drive(&self, browser: &dyn BrowserSession) -> HarnessResult<SessionReport> {
        let bridge = SpeechBridge::new(self.config.poll_interval);

        // The wrapper must exist before the first document loads.
        if self.config.playback_mode == PlaybackMode::Local {
            bridge.install(browser).await?;
        }

        self.enter(SessionState::Authenticate);
        self.authenticate(browser).await?;

        self.enter(SessionState::StartCall);
        browser.click(&self.config.selectors.call).await?;
        let calls = self.calls.record();
        info!(session_index = self.index, calls, "Call started");

        // Every placed call owes its own recognition artifacts, so a session
        // whose call was never transcribed cannot ride on a sibling's files.
        self.enter(SessionState::AwaitRecognitionArtifacts);
        let per_call = self.config.recognition_target;
        let recognition = self
            .config
            .transcriptions()
            .await_target(
                || per_call * self.calls.started(),
                self.config.artifact_timeout,
                self.config.poll_interval,
            )
            .await?;
        info!(
            session_index = self.index,
            count = recognition.count,
            wait_ms = recognition.elapsed.as_millis() as u64,
            "Recognition artifacts observed"
        );

        let (source, events) = match self.config.playback_mode {
            // Speech files carry no session identity: wait until every placed
            // call has its clips and record the whole shared arrival order.
            // The serial phase attributes arrivals to sessions by rank.
            PlaybackMode::Api => {
                self.enter(SessionState::AwaitPlaybackArtifacts);
                let per_call = self.config.playback_target;
                let arrivals = self
                    .config
                    .speech()
                    .await_arrivals(
                        || per_call * self.calls.started(),
                        self.config.artifact_timeout,
                        self.config.poll_interval,
                    )
                    .await?;
                let events = arrivals
                    .into_iter()
                    .map(|arrival| SpeechEvent {
                        session_index: self.index,
                        kind: SpeechEventKind::Start,
                        text: arrival.name,
                        timestamp_ms: arrival.seen_at_ms,
                    })
                    .collect();
                (PlaybackSource::Artifacts, events)
            }
            PlaybackMode::Local => {
                self.enter(SessionState::AwaitPlaybackEvents);
                let events = bridge
                    .await_events(
                        browser,
                        SpeechEventKind::End,
                        self.config.playback_target,
                        self.config.event_timeout,
                    )
                    .await?;
                (PlaybackSource::Bridge, events)
            }
        };

        self.enter(SessionState::PersistLog);
        let log = SessionTimingLog::new(
            self.index,
            &self.credential.username,
            source,
            recognition.elapsed.as_millis() as u64,
            events,
        );
        let log_path = self.store.persist(self.index, &log).await?;

        Ok(SessionReport {
            session_index: self.index,
            username: self.credential.username.clone(),
            recognition_wait: recognition.elapsed,
            events: log.events.len(),
            log_path,
        })
    }

    /// Sign in through the UI. No retry: a failed login ends the session.
    async fn authenticate(&self, browser: &dyn BrowserSession) -> HarnessResult<()> {
        let selectors = &self.config.selectors;
        let ui_timeout = self.config.event_timeout;

        browser.navigate(&self.config.auth_url()).await?;
        wait_for_selector(browser, &selectors.email, ui_timeout, self.config.poll_interval)
            .await?;
        browser
            .fill(&selectors.email, &self.credential.username)
            .await?;
        browser
            .fill(&selectors.password, &self.credential.password)
            .await?;
        browser.click(&selectors.submit).await?;

        wait_for_selector(browser, &selectors.ready, ui_timeout, self.config.poll_interval)
            .await
            .map_err(|e| {
                HarnessError::Authentication(format!("{}: {e}", self.credential.username))
            })?;

        info!(
            session_index = self.index,
            username = %self.credential.username,
            "Signed in"
        );
        Ok(())
    }

    fn enter(&self, state: SessionState) {
        self.board.set(self.index, state);
        info!(session_index = self.index, %state, "Session state");
    }

    fn fail(&self, e: HarnessError) -> HarnessError {
        let state = self.board.get(self.index).unwrap_or(SessionState::Init);
        error!(session_index = self.index, %state, "Session failed: {}", e);
        self.board.set(self.index, SessionState::Failed);
        e
    }
}
