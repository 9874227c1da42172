//! Artifact directory watcher.
//!
//! The backend writes one file per recognized utterance and one per
//! synthesized clip and offers no push notification, so sessions synchronize
//! on file counts by polling. The poll interval bounds how precisely two
//! sessions' arrival times can be compared; comparison thresholds must stay
//! well above it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::fs;
use tracing::{debug, warn};

use super::timing::now_ms;
use crate::errors::{HarnessError, HarnessResult};

/// Default polling granularity
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A directory plus the file suffix that identifies an artifact in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDirectory {
    path: PathBuf,
    suffix: String,
}

/// Result of a successful wait
#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub count: usize,
    pub elapsed: Duration,
}

/// When an artifact was first seen by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactArrival {
    pub name: String,
    pub seen_at_ms: u64,
}

impl ArtifactDirectory {
    pub fn new(path: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            suffix: suffix.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Names of the artifact files currently present, sorted.
    ///
    /// A directory that does not exist yet holds no artifacts.
    pub async fn list(&self) -> HarnessResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // The backend may still be renaming a file into place.
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&self.suffix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn count(&self) -> HarnessResult<usize> {
        Ok(self.list().await?.len())
    }

    /// Remove every regular file in the directory, whatever its extension.
    ///
    /// Creates the directory if it is missing. Must run once, before any
    /// session starts; clearing while sessions are live corrupts their counts.
    pub async fn clear(&self) -> HarnessResult<usize> {
        fs::create_dir_all(&self.path).await?;

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            directory = %self.path.display(),
            removed,
            "Cleared artifact directory"
        );
        Ok(removed)
    }

    /// Block until at least `target` artifacts exist or `timeout` elapses.
    ///
    /// Fails with [`HarnessError::Timeout`] no earlier than `timeout`.
    pub async fn await_count(
        &self,
        target: usize,
        timeout: Duration,
        poll_interval: Duration,
    ) -> HarnessResult<WatchOutcome> {
        self.poll_until(|| target, timeout, poll_interval, |_| {}).await
    }

    /// Like [`await_count`](Self::await_count), but re-reads the target on
    /// every poll.
    ///
    /// Used on shared directories where the number of expected artifacts
    /// grows as more sessions start producing them.
    pub async fn await_target<T>(
        &self,
        target: T,
        timeout: Duration,
        poll_interval: Duration,
    ) -> HarnessResult<WatchOutcome>
    where
        T: Fn() -> usize,
    {
        self.poll_until(target, timeout, poll_interval, |_| {}).await
    }

    /// Like [`await_count`](Self::await_count), also recording the time each
    /// artifact was first observed. Arrivals are ordered by observation time.
    pub async fn await_arrivals<T>(
        &self,
        target: T,
        timeout: Duration,
        poll_interval: Duration,
    ) -> HarnessResult<Vec<ArtifactArrival>>
    where
        T: Fn() -> usize,
    {
        let mut seen: HashMap<String, u64> = HashMap::new();
        self.poll_until(target, timeout, poll_interval, |names| {
            let now = now_ms();
            for name in names {
                seen.entry(name.clone()).or_insert(now);
            }
        })
        .await?;

        let mut arrivals: Vec<ArtifactArrival> = seen
            .into_iter()
            .map(|(name, seen_at_ms)| ArtifactArrival { name, seen_at_ms })
            .collect();
        arrivals.sort_by(|a, b| a.seen_at_ms.cmp(&b.seen_at_ms).then(a.name.cmp(&b.name)));
        Ok(arrivals)
    }

    async fn poll_until<T, F>(
        &self,
        target: T,
        timeout: Duration,
        poll_interval: Duration,
        mut on_listing: F,
    ) -> HarnessResult<WatchOutcome>
    where
        T: Fn() -> usize,
        F: FnMut(&[String]),
    {
        let started = Instant::now();
        loop {
            let names = self.list().await?;
            on_listing(&names);

            let target = target();
            let count = names.len();
            let elapsed = started.elapsed();
            if count >= target {
                debug!(
                    directory = %self.path.display(),
                    count,
                    target,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Artifact target reached"
                );
                return Ok(WatchOutcome { count, elapsed });
            }

            if elapsed >= timeout {
                return Err(HarnessError::Timeout {
                    directory: self.path.clone(),
                    target,
                    actual: count,
                    elapsed,
                });
            }

            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }
}
