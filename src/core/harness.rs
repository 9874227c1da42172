//! Harness orchestration.
//!
//! ```text
//! PREPARE (clear shared directories once)
//!   → PARALLEL_PHASE (one SessionDriver task per account)
//!   → BARRIER (every task finished)
//!   → SERIAL_PHASE (load persisted logs, compare)
//!   → REPORT
//! ```
//!
//! The comparator reads logs back from the timing store rather than from the
//! in-memory session results, so a session that never persisted is always
//! seen as missing.

use futures::future::join_all;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::browser::{BrowserFactory, WebDriverFactory};
use super::comparator::{ConcurrencyVerdict, VerdictMode, attribute_shared_arrivals, compare};
use super::session::{CallTally, SessionDriver, SessionReport, SessionState, StateBoard};
use super::store::TimingStore;
use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessResult};

/// How one session ended
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(SessionReport),
    Failed {
        session_index: usize,
        username: String,
        state: SessionState,
        error: HarnessError,
    },
}

impl SessionOutcome {
    pub fn session_index(&self) -> usize {
        match self {
            SessionOutcome::Completed(report) => report.session_index,
            SessionOutcome::Failed { session_index, .. } => *session_index,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }
}

/// Everything a harness run produced
#[derive(Debug)]
pub struct HarnessReport {
    pub outcomes: Vec<SessionOutcome>,
    pub verdict: HarnessResult<ConcurrencyVerdict>,
}

impl HarnessReport {
    pub fn failed_sessions(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_completed())
            .map(SessionOutcome::session_index)
            .collect()
    }

    /// Turn the report into the run's final result under `mode`.
    ///
    /// A comparison error fails the run in either mode; a negative verdict
    /// only fails it in assert mode.
    pub fn conclude(self, mode: VerdictMode) -> HarnessResult<ConcurrencyVerdict> {
        let verdict = self.verdict?;
        verdict.enforce(mode)?;
        Ok(verdict)
    }
}

impl fmt::Display for HarnessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sessions:")?;
        for outcome in &self.outcomes {
            match outcome {
                SessionOutcome::Completed(report) => writeln!(
                    f,
                    "  session {} ({}): completed, {} speech events, recognition after {}ms",
                    report.session_index,
                    report.username,
                    report.events,
                    report.recognition_wait.as_millis()
                )?,
                SessionOutcome::Failed {
                    session_index,
                    username,
                    state,
                    error,
                } => {
                    let cause = if error.is_timeout() { "timed out" } else { "failed" };
                    writeln!(
                        f,
                        "  session {session_index} ({username}): {cause} in {state}: {error}"
                    )?
                }
            }
        }
        match &self.verdict {
            Ok(verdict) => write!(f, "{verdict}"),
            Err(e) => write!(f, "Comparison aborted: {e}"),
        }
    }
}

/// Runs N sessions in parallel and compares their speech timing
pub struct Harness {
    config: Arc<HarnessConfig>,
    factory: Arc<dyn BrowserFactory>,
    store: TimingStore,
    board: StateBoard,
}

impl Harness {
    pub fn new(config: HarnessConfig, factory: Arc<dyn BrowserFactory>) -> Self {
        let store = TimingStore::new(&config.timing_dir);
        Self {
            config: Arc::new(config),
            factory,
            store,
            board: StateBoard::new(),
        }
    }

    /// Harness backed by chromedriver at `config.webdriver_url`
    pub fn with_webdriver(config: HarnessConfig) -> HarnessResult<Self> {
        let factory = WebDriverFactory::new(&config.webdriver_url, config.browser_options())?;
        Ok(Self::new(config, Arc::new(factory)))
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn store(&self) -> &TimingStore {
        &self.store
    }

    pub fn board(&self) -> &StateBoard {
        &self.board
    }

    /// Clear the shared artifact directories and stale timing logs.
    ///
    /// Runs exactly once per harness run, before any session exists.
    pub async fn prepare(&self) -> HarnessResult<()> {
        self.config.transcriptions().clear().await?;
        self.config.speech().clear().await?;
        self.store.clear().await?;
        Ok(())
    }

    /// Run every session in parallel and wait for all of them.
    ///
    /// Returns only once every session task has finished, successfully or
    /// not, so the caller can never observe a partial parallel phase.
    pub async fn run_sessions(&self) -> Vec<SessionOutcome> {
        let calls = CallTally::new();
        let handles: Vec<_> = self
            .config
            .credentials
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, credential)| {
                let driver = SessionDriver::new(
                    index,
                    credential,
                    Arc::clone(&self.config),
                    self.store.clone(),
                    self.board.clone(),
                    calls.clone(),
                );
                let factory = Arc::clone(&self.factory);
                tokio::spawn(async move { driver.run(factory.as_ref()).await })
            })
            .collect();

        info!(sessions = handles.len(), "Parallel phase started");
        let joined = join_all(handles).await;
        info!(
            calls = calls.started(),
            states = ?self.board.snapshot(),
            "Parallel phase finished"
        );

        joined
            .into_iter()
            .enumerate()
            .map(|(session_index, joined)| {
                let username = self.config.credentials[session_index].username.clone();
                let state = self
                    .board
                    .last_active(session_index)
                    .unwrap_or(SessionState::Init);
                match joined {
                    Ok(Ok(report)) => SessionOutcome::Completed(report),
                    Ok(Err(error)) => SessionOutcome::Failed {
                        session_index,
                        username,
                        state,
                        error,
                    },
                    Err(join_error) => {
                        error!(session_index, "Session task aborted: {}", join_error);
                        self.board.set(session_index, SessionState::Failed);
                        SessionOutcome::Failed {
                            session_index,
                            username,
                            state,
                            error: HarnessError::SessionPanicked { session_index },
                        }
                    }
                }
            })
            .collect()
    }

    /// Serial phase: load every persisted log and compare first starts.
    pub async fn compare(&self) -> HarnessResult<ConcurrencyVerdict> {
        let logs = self.store.load_all(self.config.session_count()).await?;
        let logs = attribute_shared_arrivals(logs);

        if self.config.validate_event_order {
            for log in &logs {
                log.validate_ordering()?;
            }
        }

        let verdict = compare(&logs, self.config.concurrency_threshold)?;
        if verdict.concurrent {
            info!(
                difference_ms = verdict.difference_ms,
                threshold_ms = verdict.threshold_ms,
                "Sessions were serviced concurrently"
            );
        } else {
            warn!(
                difference_ms = verdict.difference_ms,
                threshold_ms = verdict.threshold_ms,
                "Sessions were not serviced concurrently"
            );
        }
        Ok(verdict)
    }

    /// Prepare, run all sessions, then compare.
    pub async fn run(&self) -> HarnessResult<HarnessReport> {
        self.prepare().await?;

        let outcomes = self.run_sessions().await;
        let failed = outcomes.iter().filter(|o| !o.is_completed()).count();
        if failed > 0 {
            warn!(failed, "Some sessions failed; comparison will report them missing");
        }

        let verdict = self.compare().await;
        if let Err(e) = &verdict {
            error!("Comparison aborted: {}", e);
        }

        Ok(HarnessReport { outcomes, verdict })
    }
}
