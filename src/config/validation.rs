use super::HarnessConfig;

/// Validate a fully merged configuration
///
/// Checks that:
/// - at least two accounts are configured (a verdict needs two sessions)
/// - account usernames are unique
/// - every deadline is finite and longer than the poll interval
/// - the concurrency threshold is coarser than the poll interval
/// - artifact suffixes are non-empty
/// - the timing directory is not one of the artifact directories
pub fn validate_config(config: &HarnessConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.credentials.len() < 2 {
        return Err(format!(
            "At least two accounts are required to verify concurrency, got {}",
            config.credentials.len()
        )
        .into());
    }

    let mut usernames: Vec<&str> = config
        .credentials
        .iter()
        .map(|c| c.username.as_str())
        .collect();
    usernames.sort_unstable();
    if let Some(pair) = usernames.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(format!("Duplicate account username: {}", pair[0]).into());
    }

    if config.poll_interval.is_zero() {
        return Err("POLL_INTERVAL_MS must be greater than zero".into());
    }

    for (name, timeout) in [
        ("ARTIFACT_TIMEOUT_MS", config.artifact_timeout),
        ("EVENT_TIMEOUT_MS", config.event_timeout),
        ("SESSION_TIMEOUT_MS", config.session_timeout),
    ] {
        if timeout <= config.poll_interval {
            return Err(format!(
                "{name} ({}ms) must be longer than POLL_INTERVAL_MS ({}ms)",
                timeout.as_millis(),
                config.poll_interval.as_millis()
            )
            .into());
        }
    }

    // Arrival times are only known to within one poll interval.
    if config.concurrency_threshold <= config.poll_interval {
        return Err(format!(
            "CONCURRENCY_THRESHOLD_MS ({}ms) must be coarser than POLL_INTERVAL_MS ({}ms)",
            config.concurrency_threshold.as_millis(),
            config.poll_interval.as_millis()
        )
        .into());
    }

    if config.recognition_target == 0 {
        return Err("RECOGNITION_TARGET must be at least 1".into());
    }
    if config.playback_target == 0 {
        return Err("PLAYBACK_TARGET must be at least 1".into());
    }

    if config.transcription_suffix.is_empty() || config.speech_suffix.is_empty() {
        return Err("Artifact suffixes cannot be empty".into());
    }

    if config.timing_dir == config.transcription_dir || config.timing_dir == config.speech_dir {
        return Err(format!(
            "TIMING_DIR {} must differ from the artifact directories",
            config.timing_dir.display()
        )
        .into());
    }

    Ok(())
}
