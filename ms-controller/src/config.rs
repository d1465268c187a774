use std::path::PathBuf;
use std::time::Duration;

use script::SandboxConfig;

pub const ENV_STATE_DIR: &str = "MS_CONTROLLER_STATE_DIR";
pub const ENV_SCRIPT_TIMEOUT_MS: &str = "MS_SCRIPT_TIMEOUT_MS";
pub const ENV_STATUS_TIMEOUT_MS: &str = "MS_STATUS_TIMEOUT_MS";
pub const ENV_RECONCILE_INTERVAL_MS: &str = "MS_RECONCILE_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Directory of the file-backed store; `None` keeps definitions in memory.
    pub state_dir: Option<PathBuf>,
    /// Limit for output and input adaptation scripts.
    pub script_timeout: Duration,
    /// Limit for status check scripts.
    pub status_check_timeout: Duration,
    pub reconcile_interval: Duration,
    pub sandbox: SandboxConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            script_timeout: Duration::from_secs(5),
            status_check_timeout: Duration::from_secs(2),
            reconcile_interval: Duration::from_secs(30),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            state_dir: parse_state_dir(lookup(ENV_STATE_DIR)),
            script_timeout: parse_millis(
                ENV_SCRIPT_TIMEOUT_MS,
                lookup(ENV_SCRIPT_TIMEOUT_MS),
                defaults.script_timeout,
            )?,
            status_check_timeout: parse_millis(
                ENV_STATUS_TIMEOUT_MS,
                lookup(ENV_STATUS_TIMEOUT_MS),
                defaults.status_check_timeout,
            )?,
            reconcile_interval: parse_millis(
                ENV_RECONCILE_INTERVAL_MS,
                lookup(ENV_RECONCILE_INTERVAL_MS),
                defaults.reconcile_interval,
            )?,
            sandbox: defaults.sandbox,
        })
    }
}

fn parse_u64(key: &str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    value.trim().parse().map_err(|err: std::num::ParseIntError| ConfigError::Invalid {
        key: key.to_string(),
        value: value.clone(),
        reason: err.to_string(),
    })
}

fn parse_millis(key: &str, value: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    let millis = parse_u64(key, value.clone(), default_ms)?;
    if millis == 0 {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.unwrap_or_default(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

fn parse_state_dir(value: Option<String>) -> Option<PathBuf> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_keys_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn reads_durations_and_state_dir() {
        let config = ControllerConfig::from_lookup(lookup(&[
            (ENV_STATE_DIR, " /var/lib/ms "),
            (ENV_SCRIPT_TIMEOUT_MS, "1500"),
            (ENV_STATUS_TIMEOUT_MS, "250"),
            (ENV_RECONCILE_INTERVAL_MS, "60000"),
        ]))
        .expect("valid config");
        assert_eq!(config.state_dir, Some(PathBuf::from("/var/lib/ms")));
        assert_eq!(config.script_timeout, Duration::from_millis(1500));
        assert_eq!(config.status_check_timeout, Duration::from_millis(250));
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
    }

    #[test]
    fn blank_state_dir_means_in_memory() {
        let config =
            ControllerConfig::from_lookup(lookup(&[(ENV_STATE_DIR, "  ")])).expect("valid");
        assert_eq!(config.state_dir, None);
    }

    #[test]
    fn rejects_garbage_and_zero_durations() {
        let err = ControllerConfig::from_lookup(lookup(&[(ENV_SCRIPT_TIMEOUT_MS, "soon")]))
            .expect_err("not a number");
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == ENV_SCRIPT_TIMEOUT_MS));

        let err = ControllerConfig::from_lookup(lookup(&[(ENV_RECONCILE_INTERVAL_MS, "0")]))
            .expect_err("zero interval");
        assert_eq!(
            err.to_string(),
            "invalid value for MS_RECONCILE_INTERVAL_MS: '0' (must be greater than zero)"
        );
    }
}
