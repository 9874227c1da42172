//! Browser automation boundary.
//!
//! Sessions are driven through [`BrowserSession`], which exposes only what the
//! harness needs: pre-navigation script injection, navigation, form input,
//! clicks, and script evaluation returning plain JSON. Page state never
//! crosses the boundary by reference; everything comes back as a serialized
//! snapshot.

pub mod webdriver;

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::errors::{HarnessError, HarnessResult};

pub use webdriver::{WebDriverFactory, WebDriverSession};

/// One isolated browser context
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Register a script that runs in every new document before page scripts.
    async fn add_init_script(&self, source: &str) -> HarnessResult<()>;

    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Replace the value of the first element matching `selector`.
    async fn fill(&self, selector: &str, text: &str) -> HarnessResult<()>;

    async fn click(&self, selector: &str) -> HarnessResult<()>;

    /// Whether an element matching `selector` currently exists.
    async fn is_present(&self, selector: &str) -> HarnessResult<bool>;

    /// Evaluate a function body in the page and return its JSON result.
    ///
    /// The script must `return` the value it wants to hand back.
    async fn evaluate(&self, script: &str) -> HarnessResult<Value>;

    /// Tear the context down. Idempotent.
    async fn close(&self) -> HarnessResult<()>;
}

/// Creates one isolated [`BrowserSession`] per simulated user
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn open(&self, session_index: usize) -> HarnessResult<Box<dyn BrowserSession>>;
}

/// Launch options shared by every session
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub headless: bool,
    /// WAV file fed to the page as microphone input
    pub fake_audio_path: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

impl BrowserOptions {
    /// Chrome command-line switches for these options.
    ///
    /// Media permission prompts are always auto-accepted and a fake capture
    /// device is always present, so the call control never blocks on a
    /// microphone dialog.
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            "--use-fake-ui-for-media-stream".to_string(),
            "--use-fake-device-for-media-stream".to_string(),
            "--autoplay-policy=no-user-gesture-required".to_string(),
        ];
        if let Some(path) = &self.fake_audio_path {
            args.push(format!(
                "--use-file-for-fake-audio-capture={}",
                path.display()
            ));
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Poll until `selector` is present or `timeout` elapses.
pub async fn wait_for_selector(
    session: &dyn BrowserSession,
    selector: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> HarnessResult<()> {
    let started = Instant::now();
    loop {
        if session.is_present(selector).await? {
            return Ok(());
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(HarnessError::Browser(format!(
                "element '{selector}' did not appear within {elapsed:?}"
            )));
        }
        tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
    }
}
