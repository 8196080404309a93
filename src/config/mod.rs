use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Prefix of every environment variable the runtime reads
pub const ENV_PREFIX: &str = "KEYSTONE_";

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },

    #[error("malformed runtime config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Seeded with every environment variable of the process
    pub fn new() -> Self {
        Self::from_env("")
    }

    /// Seeded with the environment variables starting with `prefix`
    pub fn from_env(prefix: &str) -> Self {
        let service = Self::default();
        for (key, value) in env::vars().filter(|(key, _)| key.starts_with(prefix)) {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// `None` when unset, an error when set but unparseable
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::Invalid {
                    key: key.to_string(),
                    value,
                }),
        }
    }
}

/// Timeouts the application shell applies to start and stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub start_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: DEFAULT_TIMEOUT_MS,
            stop_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RuntimeConfig {
    /// Read `KEYSTONE_START_TIMEOUT_MS` and `KEYSTONE_STOP_TIMEOUT_MS`,
    /// falling back to the defaults for whichever is unset
    pub fn from_service(config: &ConfigService) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            start_timeout_ms: config
                .get_parsed(&format!("{ENV_PREFIX}START_TIMEOUT_MS"))?
                .unwrap_or(defaults.start_timeout_ms),
            stop_timeout_ms: config
                .get_parsed(&format!("{ENV_PREFIX}STOP_TIMEOUT_MS"))?
                .unwrap_or(defaults.stop_timeout_ms),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_service(&ConfigService::from_env(ENV_PREFIX))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = duration_ms(timeout);
        self
    }
}

fn duration_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = RuntimeConfig::from_service(&ConfigService::default()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.start_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_reads_prefixed_keys() {
        let service = ConfigService::default();
        service.set("KEYSTONE_START_TIMEOUT_MS", " 2500 ");
        let config = RuntimeConfig::from_service(&service).unwrap();
        assert_eq!(config.start_timeout(), Duration::from_millis(2500));
        assert_eq!(config.stop_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_rejects_malformed_values() {
        let service = ConfigService::default();
        service.set("KEYSTONE_STOP_TIMEOUT_MS", "soon");
        let err = RuntimeConfig::from_service(&service).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_from_json() {
        let config = RuntimeConfig::from_json(r#"{"stop_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.stop_timeout(), Duration::from_millis(500));
        assert_eq!(config.start_timeout_ms, 15_000);

        assert!(RuntimeConfig::from_json(r#"{"start_timeout": 1}"#).is_err());
    }
}
