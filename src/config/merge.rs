use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::accounts::{Credential, parse_credentials};
use super::utils::{parse_bool, parse_list, parse_millis};
use super::yaml::YamlConfig;
use super::{HarnessConfig, UiSelectors};
use crate::core::comparator::VerdictMode;
use crate::core::session::PlaybackMode;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration providing base values
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<HarnessConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // ENV > YAML > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env::var($env_var)
                .ok()
                .or($yaml_value)
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // ENV > YAML
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            env::var($env_var).ok().or($yaml_value)
        };
    }

    // ENV (milliseconds) > YAML > Default
    macro_rules! get_millis {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match env::var($env_var) {
                Ok(v) => parse_millis($env_var, &v)?,
                Err(_) => Duration::from_millis($yaml_value.unwrap_or($default)),
            }
        };
    }

    // ENV (count) > YAML > Default
    macro_rules! get_count {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match env::var($env_var) {
                Ok(v) => v
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| format!("Invalid {} '{v}': {e}", $env_var))?,
                Err(_) => $yaml_value.unwrap_or($default),
            }
        };
    }

    // ENV (bool) > YAML > Default
    macro_rules! get_bool {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env::var($env_var)
                .ok()
                .and_then(|v| parse_bool(&v))
                .or($yaml_value)
                .unwrap_or($default)
        };
    }

    let browser = yaml.browser.unwrap_or_default();
    let app = yaml.app.unwrap_or_default();
    let selectors_yaml = app.selectors.unwrap_or_default();
    let artifacts = yaml.artifacts.unwrap_or_default();
    let scenario = yaml.scenario.unwrap_or_default();
    let timeouts = yaml.timeouts.unwrap_or_default();
    let verdict = yaml.verdict.unwrap_or_default();

    // Browser
    let webdriver_url = get_value!(
        "WEBDRIVER_URL",
        browser.webdriver_url,
        "http://localhost:9515"
    );
    let headless = get_bool!("HEADLESS", browser.headless, true);
    let fake_audio_path =
        get_optional!("FAKE_AUDIO_PATH", browser.fake_audio_path).map(PathBuf::from);
    let browser_args = match env::var("BROWSER_ARGS") {
        Ok(v) => parse_list(&v),
        Err(_) => browser.args.unwrap_or_default(),
    };

    // Application under test
    let app_url = get_value!("APP_URL", app.url, "http://localhost:8080");
    let defaults = UiSelectors::default();
    let selectors = UiSelectors {
        email: get_value!("EMAIL_SELECTOR", selectors_yaml.email, defaults.email),
        password: get_value!(
            "PASSWORD_SELECTOR",
            selectors_yaml.password,
            defaults.password
        ),
        submit: get_value!("SUBMIT_SELECTOR", selectors_yaml.submit, defaults.submit),
        ready: get_value!("READY_SELECTOR", selectors_yaml.ready, defaults.ready),
        call: get_value!("CALL_SELECTOR", selectors_yaml.call, defaults.call),
    };

    // Accounts
    let credentials = match env::var("HARNESS_CREDENTIALS") {
        Ok(v) => parse_credentials(&v)?,
        Err(_) => yaml
            .accounts
            .into_iter()
            .map(|a| Credential::new(a.username, a.password))
            .collect(),
    };

    // Artifacts
    let transcription_dir = PathBuf::from(get_value!(
        "TRANSCRIPTION_DIR",
        artifacts.transcription_dir,
        "data/cache/audio/transcriptions"
    ));
    let transcription_suffix = get_value!(
        "TRANSCRIPTION_SUFFIX",
        artifacts.transcription_suffix,
        ".json"
    );
    let speech_dir = PathBuf::from(get_value!(
        "SPEECH_DIR",
        artifacts.speech_dir,
        "data/cache/audio/speech"
    ));
    let speech_suffix = get_value!("SPEECH_SUFFIX", artifacts.speech_suffix, ".mp3");
    let timing_dir = PathBuf::from(get_value!("TIMING_DIR", artifacts.timing_dir, "timings"));

    // Scenario
    let playback_mode = get_value!("PLAYBACK_MODE", scenario.playback_mode, "local")
        .parse::<PlaybackMode>()?;
    let recognition_target = get_count!("RECOGNITION_TARGET", scenario.recognition_target, 2);
    let playback_target = get_count!("PLAYBACK_TARGET", scenario.playback_target, 1);

    // Deadlines
    let artifact_timeout = get_millis!("ARTIFACT_TIMEOUT_MS", timeouts.artifact_ms, 30_000);
    let event_timeout = get_millis!("EVENT_TIMEOUT_MS", timeouts.event_ms, 30_000);
    let session_timeout = get_millis!("SESSION_TIMEOUT_MS", timeouts.session_ms, 120_000);
    let poll_interval = get_millis!("POLL_INTERVAL_MS", timeouts.poll_interval_ms, 50);

    // Verdict
    let concurrency_threshold = get_millis!(
        "CONCURRENCY_THRESHOLD_MS",
        verdict.threshold_ms,
        500
    );
    let verdict_mode = get_value!("VERDICT_MODE", verdict.mode, "report").parse::<VerdictMode>()?;
    let validate_event_order = get_bool!(
        "VALIDATE_EVENT_ORDER",
        verdict.validate_event_order,
        false
    );

    Ok(HarnessConfig {
        webdriver_url,
        headless,
        fake_audio_path,
        browser_args,
        app_url,
        selectors,
        credentials,
        transcription_dir,
        transcription_suffix,
        speech_dir,
        speech_suffix,
        timing_dir,
        playback_mode,
        recognition_target,
        playback_target,
        artifact_timeout,
        event_timeout,
        session_timeout,
        poll_interval,
        concurrency_threshold,
        verdict_mode,
        validate_event_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{AccountYaml, ScenarioYaml, TimeoutsYaml, VerdictYaml};
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("HARNESS_CREDENTIALS");
            env::remove_var("PLAYBACK_MODE");
            env::remove_var("POLL_INTERVAL_MS");
            env::remove_var("CONCURRENCY_THRESHOLD_MS");
            env::remove_var("VERDICT_MODE");
            env::remove_var("RECOGNITION_TARGET");
        }
    }

    #[test]
    #[serial]
    fn test_merge_defaults() {
        cleanup_env_vars();

        let config = merge_config(None).unwrap();
        assert_eq!(config.playback_mode, PlaybackMode::Local);
        assert_eq!(config.recognition_target, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.concurrency_threshold, Duration::from_millis(500));
        assert_eq!(config.verdict_mode, VerdictMode::Report);
        assert!(config.credentials.is_empty());
    }

    #[test]
    #[serial]
    fn test_merge_yaml_values() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            accounts: vec![
                AccountYaml {
                    username: "a".to_string(),
                    password: "1".to_string(),
                },
                AccountYaml {
                    username: "b".to_string(),
                    password: "2".to_string(),
                },
            ],
            scenario: Some(ScenarioYaml {
                playback_mode: Some("api".to_string()),
                ..Default::default()
            }),
            verdict: Some(VerdictYaml {
                threshold_ms: Some(1000),
                mode: Some("assert".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.credentials.len(), 2);
        assert_eq!(config.playback_mode, PlaybackMode::Api);
        assert_eq!(config.concurrency_threshold, Duration::from_millis(1000));
        assert_eq!(config.verdict_mode, VerdictMode::Assert);
    }

    #[test]
    #[serial]
    fn test_env_overrides_yaml() {
        cleanup_env_vars();
        unsafe {
            env::set_var("POLL_INTERVAL_MS", "20");
            env::set_var("HARNESS_CREDENTIALS", "x:1,y:2,z:3");
        }

        let yaml = YamlConfig {
            accounts: vec![AccountYaml {
                username: "a".to_string(),
                password: "1".to_string(),
            }],
            timeouts: Some(TimeoutsYaml {
                poll_interval_ms: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.credentials.len(), 3);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_errors() {
        cleanup_env_vars();

        unsafe {
            env::set_var("RECOGNITION_TARGET", "two");
        }
        assert!(merge_config(None).is_err());
        cleanup_env_vars();

        unsafe {
            env::set_var("PLAYBACK_MODE", "speaker");
        }
        assert!(merge_config(None).is_err());

        cleanup_env_vars();
    }
}
