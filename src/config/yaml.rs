use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// browser:
///   webdriver_url: "http://localhost:9515"
///   headless: true
///   fake_audio_path: "fixtures/two_questions.wav"
///   args: ["--no-sandbox"]
///
/// app:
///   url: "http://localhost:8080"
///   selectors:
///     email: "input[type=email]"
///     password: "input[type=password]"
///     submit: "button[type=submit]"
///     ready: "#chat-input"
///     call: "#call-button"
///
/// accounts:
///   - username: "alice@example.com"
///     password: "alice-password"
///   - username: "bob@example.com"
///     password: "bob-password"
///
/// artifacts:
///   transcription_dir: "backend/data/cache/audio/transcriptions"
///   transcription_suffix: ".json"
///   speech_dir: "backend/data/cache/audio/speech"
///   speech_suffix: ".mp3"
///   timing_dir: "timings"
///
/// scenario:
///   playback_mode: "local"
///   recognition_target: 2
///   playback_target: 1
///
/// timeouts:
///   artifact_ms: 30000
///   event_ms: 30000
///   session_ms: 120000
///   poll_interval_ms: 50
///
/// verdict:
///   threshold_ms: 500
///   mode: "assert"
///   validate_event_order: true
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub browser: Option<BrowserYaml>,
    pub app: Option<AppYaml>,
    pub accounts: Vec<AccountYaml>,
    pub artifacts: Option<ArtifactsYaml>,
    pub scenario: Option<ScenarioYaml>,
    pub timeouts: Option<TimeoutsYaml>,
    pub verdict: Option<VerdictYaml>,
}

/// Browser automation settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BrowserYaml {
    pub webdriver_url: Option<String>,
    pub headless: Option<bool>,
    pub fake_audio_path: Option<String>,
    pub args: Option<Vec<String>>,
}

/// Application under test from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppYaml {
    pub url: Option<String>,
    pub selectors: Option<SelectorsYaml>,
}

/// CSS selectors for the sign-in form and call control
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SelectorsYaml {
    pub email: Option<String>,
    pub password: Option<String>,
    pub submit: Option<String>,
    pub ready: Option<String>,
    pub call: Option<String>,
}

/// One simulated user from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct AccountYaml {
    pub username: String,
    pub password: String,
}

/// Artifact and timing-log locations from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ArtifactsYaml {
    pub transcription_dir: Option<String>,
    pub transcription_suffix: Option<String>,
    pub speech_dir: Option<String>,
    pub speech_suffix: Option<String>,
    pub timing_dir: Option<String>,
}

/// Call scenario from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ScenarioYaml {
    /// "api" (backend TTS writes audio files) or "local" (browser synthesis)
    pub playback_mode: Option<String>,
    pub recognition_target: Option<usize>,
    pub playback_target: Option<usize>,
}

/// Deadlines from YAML, in milliseconds
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub artifact_ms: Option<u64>,
    pub event_ms: Option<u64>,
    pub session_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

/// Verdict settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VerdictYaml {
    pub threshold_ms: Option<u64>,
    /// "report" or "assert"
    pub mode: Option<String>,
    pub validate_event_order: Option<bool>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
