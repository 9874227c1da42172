//! Configuration module for the callcheck harness
//!
//! This module handles harness configuration from YAML files and environment
//! variables. Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `accounts`: Simulated user credentials
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use callcheck::config::HarnessConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = HarnessConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = HarnessConfig::from_file(&PathBuf::from("callcheck.yaml"))?;
//! println!("Running {} sessions", config.session_count());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod accounts;
mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use accounts::Credential;

use crate::core::browser::BrowserOptions;
use crate::core::comparator::VerdictMode;
use crate::core::session::PlaybackMode;
use crate::core::watcher::ArtifactDirectory;

/// CSS selectors for the UI controls a session drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiSelectors {
    pub email: String,
    pub password: String,
    pub submit: String,
    /// Present once sign-in has completed
    pub ready: String,
    /// The voice call control
    pub call: String,
}

impl Default for UiSelectors {
    fn default() -> Self {
        Self {
            email: "input[type=email]".to_string(),
            password: "input[type=password]".to_string(),
            submit: "button[type=submit]".to_string(),
            ready: "#chat-input".to_string(),
            call: "#call-button".to_string(),
        }
    }
}

/// Harness configuration
///
/// Contains everything needed for one harness run:
/// - Browser automation settings (WebDriver endpoint, fake microphone input)
/// - The application under test and its UI selectors
/// - One credential pair per parallel session
/// - Artifact directories written by the backend
/// - Deadlines for every blocking wait
/// - Verdict threshold and mode
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    // Browser
    pub webdriver_url: String,
    pub headless: bool,
    pub fake_audio_path: Option<PathBuf>,
    pub browser_args: Vec<String>,

    // Application under test
    pub app_url: String,
    pub selectors: UiSelectors,

    // One session per credential pair
    pub credentials: Vec<Credential>,

    // Artifacts
    pub transcription_dir: PathBuf,
    pub transcription_suffix: String,
    pub speech_dir: PathBuf,
    pub speech_suffix: String,
    pub timing_dir: PathBuf,

    // Scenario
    pub playback_mode: PlaybackMode,
    pub recognition_target: usize,
    pub playback_target: usize,

    // Deadlines
    pub artifact_timeout: Duration,
    pub event_timeout: Duration,
    pub session_timeout: Duration,
    pub poll_interval: Duration,

    // Verdict
    pub concurrency_threshold: Duration,
    pub verdict_mode: VerdictMode,
    pub validate_event_order: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            fake_audio_path: None,
            browser_args: Vec::new(),
            app_url: "http://localhost:8080".to_string(),
            selectors: UiSelectors::default(),
            credentials: Vec::new(),
            transcription_dir: PathBuf::from("data/cache/audio/transcriptions"),
            transcription_suffix: ".json".to_string(),
            speech_dir: PathBuf::from("data/cache/audio/speech"),
            speech_suffix: ".mp3".to_string(),
            timing_dir: PathBuf::from("timings"),
            playback_mode: PlaybackMode::Local,
            recognition_target: 2,
            playback_target: 1,
            artifact_timeout: Duration::from_secs(30),
            event_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(50),
            concurrency_threshold: Duration::from_millis(500),
            verdict_mode: VerdictMode::Report,
            validate_event_order: false,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // No .env loading here: the YAML file is the source of truth and only
        // real environment variables override it.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Number of sessions run in parallel
    pub fn session_count(&self) -> usize {
        self.credentials.len()
    }

    pub fn transcriptions(&self) -> ArtifactDirectory {
        ArtifactDirectory::new(&self.transcription_dir, &self.transcription_suffix)
    }

    pub fn speech(&self) -> ArtifactDirectory {
        ArtifactDirectory::new(&self.speech_dir, &self.speech_suffix)
    }

    /// URL of the sign-in page
    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.app_url.trim_end_matches('/'))
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            fake_audio_path: self.fake_audio_path.clone(),
            extra_args: self.browser_args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_auth_url_trims_trailing_slash() {
        let config = HarnessConfig {
            app_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.auth_url(), "http://localhost:8080/auth");
    }

    #[test]
    fn test_artifact_directories_use_configured_suffixes() {
        let config = HarnessConfig {
            speech_suffix: ".wav".to_string(),
            ..Default::default()
        };
        assert_eq!(config.transcriptions().suffix(), ".json");
        assert_eq!(config.speech().suffix(), ".wav");
        assert_eq!(config.speech().path(), config.speech_dir.as_path());
    }

    #[test]
    fn test_browser_options_carry_audio_fixture() {
        let config = HarnessConfig {
            fake_audio_path: Some(PathBuf::from("fixtures/hello.wav")),
            headless: false,
            ..Default::default()
        };
        let options = config.browser_options();
        assert!(!options.headless);
        assert_eq!(
            options.fake_audio_path,
            Some(PathBuf::from("fixtures/hello.wav"))
        );
    }

    #[test]
    #[serial]
    fn test_from_file_validates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("callcheck.yaml");
        fs::write(
            &path,
            r#"
accounts:
  - username: "alice@example.com"
    password: "a"
"#,
        )
        .unwrap();

        unsafe {
            std::env::remove_var("HARNESS_CREDENTIALS");
        }
        let err = HarnessConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("At least two accounts"));
    }

    #[test]
    #[serial]
    fn test_from_file_two_accounts() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("callcheck.yaml");
        fs::write(
            &path,
            r#"
accounts:
  - username: "alice@example.com"
    password: "a"
  - username: "bob@example.com"
    password: "b"
scenario:
  playback_mode: "api"
"#,
        )
        .unwrap();

        unsafe {
            std::env::remove_var("HARNESS_CREDENTIALS");
            std::env::remove_var("PLAYBACK_MODE");
        }
        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.session_count(), 2);
        assert_eq!(config.playback_mode, PlaybackMode::Api);
    }
}
