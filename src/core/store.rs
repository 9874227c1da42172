//! Durable per-session timing logs.
//!
//! Each session writes `session_<index>.json` exactly once, after its
//! interaction completes. Writes go to a temp file that is renamed into place,
//! so a reader never observes a partially written log.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::timing::SessionTimingLog;
use crate::errors::{HarnessError, HarnessResult};

/// Directory of persisted session timing logs
#[derive(Debug, Clone)]
pub struct TimingStore {
    base_path: PathBuf,
}

impl TimingStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn log_path(&self, session_index: usize) -> PathBuf {
        self.base_path.join(format!("session_{session_index}.json"))
    }

    /// Write `log` under `session_index`, replacing any earlier log.
    pub async fn persist(
        &self,
        session_index: usize,
        log: &SessionTimingLog,
    ) -> HarnessResult<PathBuf> {
        fs::create_dir_all(&self.base_path).await?;

        let path = self.log_path(session_index);
        let temp_path = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(log)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;

        info!(
            session_index,
            events = log.events.len(),
            path = %path.display(),
            "Persisted session timing log"
        );
        Ok(path)
    }

    /// Load one session's log; absence is a hard error naming the session.
    pub async fn load(&self, session_index: usize) -> HarnessResult<SessionTimingLog> {
        let path = self.log_path(session_index);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarnessError::MissingArtifact {
                    session_index,
                    path,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let log: SessionTimingLog = serde_json::from_slice(&data)?;
        debug!(session_index, events = log.events.len(), "Loaded session timing log");
        Ok(log)
    }

    /// Load the logs of sessions `0..session_count`, failing on the first
    /// missing one.
    pub async fn load_all(&self, session_count: usize) -> HarnessResult<Vec<SessionTimingLog>> {
        let mut logs = Vec::with_capacity(session_count);
        for session_index in 0..session_count {
            logs.push(self.load(session_index).await?);
        }
        Ok(logs)
    }

    /// Remove every persisted log so a stale run can never stand in for a
    /// session that failed this time.
    pub async fn clear(&self) -> HarnessResult<usize> {
        fs::create_dir_all(&self.base_path).await?;

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_log = name.starts_with("session_")
                && (name.ends_with(".json") || name.ends_with(".json.tmp"));
            if is_log && entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        warn!(path = %self.base_path.display(), removed, "Cleared timing logs");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timing::{PlaybackSource, SpeechEvent, SpeechEventKind};
    use tempfile::TempDir;

    fn sample_log(session_index: usize, start: u64) -> SessionTimingLog {
        SessionTimingLog::new(
            session_index,
            format!("user{session_index}@example.com"),
            PlaybackSource::Bridge,
            800,
            vec![
                SpeechEvent {
                    session_index,
                    kind: SpeechEventKind::Start,
                    text: "Hello".to_string(),
                    timestamp_ms: start,
                },
                SpeechEvent {
                    session_index,
                    kind: SpeechEventKind::End,
                    text: "Hello".to_string(),
                    timestamp_ms: start + 900,
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = TimingStore::new(temp_dir.path().join("timings"));

        let log = sample_log(0, 1000);
        let path = store.persist(0, &log).await.unwrap();
        assert_eq!(path, store.log_path(0));
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = store.load(0).await.unwrap();
        assert_eq!(loaded, log);
    }

    #[tokio::test]
    async fn test_persist_overwrites_previous_log() {
        let temp_dir = TempDir::new().unwrap();
        let store = TimingStore::new(temp_dir.path());

        store.persist(1, &sample_log(1, 1000)).await.unwrap();
        store.persist(1, &sample_log(1, 5000)).await.unwrap();

        let loaded = store.load(1).await.unwrap();
        assert_eq!(loaded.first_start_ms(), Some(5000));
        assert_eq!(loaded.events.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_names_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = TimingStore::new(temp_dir.path());
        store.persist(0, &sample_log(0, 1000)).await.unwrap();

        match store.load_all(2).await {
            Err(HarnessError::MissingArtifact { session_index, path }) => {
                assert_eq!(session_index, 1);
                assert_eq!(path, store.log_path(1));
            }
            other => panic!("expected MissingArtifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clear_removes_only_session_logs() {
        let temp_dir = TempDir::new().unwrap();
        let store = TimingStore::new(temp_dir.path());
        store.persist(0, &sample_log(0, 1000)).await.unwrap();
        store.persist(1, &sample_log(1, 1000)).await.unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(temp_dir.path().join("notes.txt").exists());
        assert!(store.load(0).await.is_err());
    }
}
