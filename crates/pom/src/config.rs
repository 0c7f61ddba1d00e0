//! Per-App configuration.
//!
//! Defaults are a 5 s timeout polled every 100 ms. They can be overridden in
//! code, from JSON, or from the environment:
//!
//! | Variable               | Field              |
//! |------------------------|--------------------|
//! | `POM_TIMEOUT_MS`       | `timeout_ms`       |
//! | `POM_POLL_INTERVAL_MS` | `poll_interval_ms` |

use crate::result::{PomError, PomResult};
use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the wait timeout
pub const ENV_TIMEOUT_MS: &str = "POM_TIMEOUT_MS";

/// Environment variable overriding the poll interval
pub const ENV_POLL_INTERVAL_MS: &str = "POM_POLL_INTERVAL_MS";

/// Defaults applied to every wait issued by one [`App`](crate::App)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Wait timeout in milliseconds
    pub timeout_ms: u64,
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl AppConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default wait timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the default poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Parse from JSON; missing fields keep their defaults
    ///
    /// # Errors
    ///
    /// Returns error on malformed JSON or invalid values
    pub fn from_json(json: &str) -> PomResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `POM_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but not a valid number
    pub fn from_env() -> PomResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `POM_*` keys
    ///
    /// # Errors
    ///
    /// Returns error if a value is not a valid number
    pub fn from_lookup<F>(lookup: F) -> PomResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ms) = parse_ms(&lookup, ENV_TIMEOUT_MS)? {
            config.timeout_ms = ms;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll_interval_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the wait loop cannot work with
    ///
    /// # Errors
    ///
    /// Returns error if the poll interval is zero
    pub fn validate(&self) -> PomResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(PomError::InvalidConfig {
                message: "poll_interval_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Wait options derived from this config
    #[must_use]
    pub const fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.timeout_ms,
            poll_interval_ms: self.poll_interval_ms,
        }
    }
}

fn parse_ms<F>(lookup: &F, key: &str) -> PomResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| PomError::InvalidConfig {
                message: format!("{key}={raw:?}: {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.wait_options(), WaitOptions::default());
    }

    #[test]
    fn test_from_json_partial() {
        let config = AppConfig::from_json(r#"{"timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        assert!(matches!(
            AppConfig::from_json(r#"{"timeout": 1}"#),
            Err(PomError::Json(_))
        ));
    }

    #[test]
    fn test_zero_poll_interval_is_invalid() {
        assert!(matches!(
            AppConfig::from_json(r#"{"poll_interval_ms": 0}"#),
            Err(PomError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> =
            [(ENV_TIMEOUT_MS, "250"), (ENV_POLL_INTERVAL_MS, " 25 ")].into_iter().collect();
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config, AppConfig::new().with_timeout(250).with_poll_interval(25));
    }

    #[test]
    fn test_from_lookup_invalid_number() {
        let err = AppConfig::from_lookup(|k| (k == ENV_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("POM_TIMEOUT_MS"));
    }

    #[test]
    fn test_from_lookup_nothing_set() {
        assert_eq!(AppConfig::from_lookup(|_| None).unwrap(), AppConfig::default());
    }
}
