//! Server settings read from `nango-config.yaml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ServerError};
use crate::runtime::context::ACTION_LOG_TARGET;

pub const NANGO_CONFIG_FILE: &str = "nango-config.yaml";
pub const INTEGRATIONS_FILE: &str = "integrations.yaml";

/// Largest accepted `max_in_flight`.
pub const MAX_IN_FLIGHT_LIMIT: usize = 65_536;

/// Slack on top of the worst-case handling time before the transport redelivers.
const ACK_WAIT_MARGIN: Duration = Duration::from_secs(30);

/// Ack wait when actions have no time limit; progress acks keep long handlings alive.
const UNBOUNDED_ACK_WAIT: Duration = Duration::from_secs(300);

/// Settings for the server process. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub main_server_log_level: String,
    pub default_action_log_level: String,
    /// Upper bound on inbound messages handled concurrently
    pub max_in_flight: usize,
    /// Per-action execution limit in seconds; 0 disables it
    pub action_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            main_server_log_level: "info".to_string(),
            default_action_log_level: "info".to_string(),
            max_in_flight: 64,
            action_timeout_secs: 60,
        }
    }
}

impl ServerSettings {
    /// Load `nango-config.yaml` from an integrations directory.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::load_from_file(dir.as_ref().join(NANGO_CONFIG_FILE))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut settings: Self = serde_yaml::from_str(contents)
            .map_err(|e| ServerError::Config(format!("Failed to parse {}: {}", NANGO_CONFIG_FILE, e)))?;
        settings.max_in_flight = settings.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT);
        Ok(settings)
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        match self.action_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// How long the transport waits for a delivered message to be settled.
    ///
    /// Execute and finalize are each bounded by the action timeout, so a
    /// handling can take up to twice that before its reply is published.
    pub fn ack_wait(&self) -> Duration {
        match self.action_timeout() {
            Some(limit) => limit * 2 + ACK_WAIT_MARGIN,
            None => UNBOUNDED_ACK_WAIT,
        }
    }

    /// Interval between in-progress acks for a handling that is still running.
    pub fn progress_interval(&self) -> Duration {
        self.ack_wait() / 3
    }

    /// `tracing_subscriber::EnvFilter` directives for the configured levels.
    pub fn log_directives(&self) -> String {
        format!(
            "{},{}={}",
            self.main_server_log_level, ACTION_LOG_TARGET, self.default_action_log_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_empty_file() {
        let settings = ServerSettings::from_yaml_str("").unwrap();
        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.action_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = ServerSettings::from_yaml_str(
            "main_server_log_level: debug\naction_timeout_secs: 0\nunrelated_key: true\n",
        )
        .unwrap();

        assert_eq!(settings.main_server_log_level, "debug");
        assert_eq!(settings.default_action_log_level, "info");
        assert_eq!(settings.action_timeout(), None);
        assert_eq!(settings.log_directives(), "debug,nango_server::action=info");
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let settings = ServerSettings::from_yaml_str("max_in_flight: 0\n").unwrap();
        assert_eq!(settings.max_in_flight, 1);
    }

    #[test]
    fn test_oversized_concurrency_clamped() {
        let settings = ServerSettings::from_yaml_str("max_in_flight: 99999999999\n").unwrap();
        assert_eq!(settings.max_in_flight, MAX_IN_FLIGHT_LIMIT);
        assert!(u32::try_from(settings.max_in_flight).is_ok());
    }

    #[test]
    fn test_ack_wait_outlasts_action_timeout() {
        let settings = ServerSettings::default();
        let timeout = settings.action_timeout().unwrap();

        // Execute plus finalize must settle before the transport redelivers
        assert!(settings.ack_wait() > timeout * 2);
        assert!(settings.progress_interval() < settings.ack_wait());

        let slow = ServerSettings::from_yaml_str("action_timeout_secs: 600\n").unwrap();
        assert!(slow.ack_wait() > Duration::from_secs(1200));
    }

    #[test]
    fn test_ack_wait_without_action_timeout() {
        let settings = ServerSettings::from_yaml_str("action_timeout_secs: 0\n").unwrap();
        assert_eq!(settings.ack_wait(), UNBOUNDED_ACK_WAIT);
        assert_eq!(settings.progress_interval(), Duration::from_secs(100));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ServerSettings::from_yaml_str("max_in_flight: lots\n");
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ServerSettings::load_from_dir(dir.path());
        assert!(matches!(result, Err(ServerError::Config(msg)) if msg.contains(NANGO_CONFIG_FILE)));
    }
}
