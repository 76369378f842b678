// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the service manager and its subsystems.
//!
//! ## Sources
//!
//! 1. **Defaults** - hard-coded below
//! 2. **Environment variables** - `AGENT_*` (highest priority)
//! 3. **Programmatic** - [`AgentConfig::with_setting`], mostly for tests
//!
//! ## Key mapping
//!
//! Subsystem settings are dotted keys such as `jmx.enabled`. An environment
//! variable maps to a key by dropping the `AGENT_` prefix, lowercasing, and
//! turning `__` into `.`:
//!
//! - `AGENT_JMX__ENABLED=false` sets `jmx.enabled`
//! - `AGENT_TRANSACTION_TRACER__ENABLED=false` sets `transaction_tracer.enabled`
//!
//! `AGENT_APP_NAME` and `AGENT_LOG_LEVEL` populate the typed fields instead.
//!
//! Configuration is read-only once the manager is built. Unparseable values
//! fall back to the caller's default with a warning.

pub mod log_level;

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ManagerError, ServiceError};
use crate::service::{Lifecycle, Service, ServiceState};
use log_level::LogLevel;

const ENV_PREFIX: &str = "AGENT_";
const DEFAULT_APP_NAME: &str = "My Application";

/// Read-only key/value access used by subsystems at construction time.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    warn!("Invalid boolean '{raw}' for {key}, using {default}");
                    default
                }
            },
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid integer '{raw}' for {key}, using {default}");
                default
            }),
        }
    }

    /// Reads a millisecond value. Zero is treated as unset.
    fn get_duration_ms(&self, key: &str, default: Duration) -> Duration {
        let millis = self.get_u64(key, 0);
        if millis == 0 {
            default
        } else {
            Duration::from_millis(millis)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Application name reported with every payload.
    pub app_name: String,
    pub log_level: LogLevel,
    settings: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            log_level: LogLevel::default(),
            settings: HashMap::new(),
        }
    }
}

impl AgentConfig {
    /// Create configuration from `AGENT_*` environment variables.
    pub fn from_env() -> Result<Self, ManagerError> {
        Self::from_vars(env::vars())
    }

    /// Same as [`AgentConfig::from_env`] over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Result<Self, ManagerError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();
        for (name, value) in vars {
            let Some(stripped) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match stripped {
                "APP_NAME" => config.app_name = value.trim().to_string(),
                "LOG_LEVEL" => {
                    config.log_level =
                        LogLevel::from_str(&value).map_err(ManagerError::InvalidConfig)?;
                }
                _ => {
                    let key = stripped.to_lowercase().replace("__", ".");
                    config.settings.insert(key, value.trim().to_string());
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.app_name.trim().is_empty() {
            return Err(ManagerError::InvalidConfig(
                "AGENT_APP_NAME cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl ConfigProvider for AgentConfig {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            "app_name" => Some(self.app_name.clone()),
            _ => self.settings.get(key).cloned(),
        }
    }
}

/// The configuration collaborator as a lifecycle participant.
///
/// It is readable from the moment it is built; starting it only marks the
/// point after which the local configuration is considered final.
pub struct ConfigService {
    config: Arc<AgentConfig>,
    lifecycle: Lifecycle,
}

impl ConfigService {
    pub const NAME: &'static str = "ConfigService";

    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config: Arc::new(config),
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

impl ConfigProvider for ConfigService {
    fn get(&self, key: &str) -> Option<String> {
        self.config.get(key)
    }
}

#[async_trait]
impl Service for ConfigService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_start(Self::NAME)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_stop(Self::NAME).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_env_key_mapping() {
        let config = AgentConfig::from_vars(vars(&[
            ("AGENT_APP_NAME", "checkout"),
            ("AGENT_LOG_LEVEL", "DEBUG"),
            ("AGENT_JMX__ENABLED", "false"),
            ("AGENT_TRANSACTION_TRACER__ENABLED", " off "),
            ("AGENT_SAMPLER__INTERVAL_MS", "250"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();

        assert_eq!(config.app_name, "checkout");
        assert_eq!(config.get("app_name").as_deref(), Some("checkout"));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(!config.get_bool("jmx.enabled", true));
        assert!(!config.get_bool("transaction_tracer.enabled", true));
        assert_eq!(
            config.get_duration_ms("sampler.interval_ms", Duration::from_secs(5)),
            Duration::from_millis(250)
        );
        assert_eq!(config.get("unrelated"), None);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = AgentConfig::default()
            .with_setting("jmx.enabled", "maybe")
            .with_setting("harvest.interval_ms", "soon");
        assert!(config.get_bool("jmx.enabled", true));
        assert_eq!(config.get_u64("harvest.interval_ms", 60_000), 60_000);
        assert_eq!(
            config.get_duration_ms("sampler.interval_ms", Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_validate_empty_app_name() {
        let result = AgentConfig::from_vars(vars(&[("AGENT_APP_NAME", "   ")]));
        assert!(matches!(result, Err(ManagerError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let result = AgentConfig::from_vars(vars(&[("AGENT_LOG_LEVEL", "loud")]));
        assert!(matches!(result, Err(ManagerError::InvalidConfig(_))));
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_defaults() {
        for (key, _) in env::vars().filter(|(k, _)| k.starts_with(ENV_PREFIX)) {
            env::remove_var(key);
        }
        env::set_var("AGENT_JMX__ENABLED", "false");

        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert!(!config.get_bool("jmx.enabled", true));

        env::remove_var("AGENT_JMX__ENABLED");
    }

    #[tokio::test]
    async fn test_config_service_lifecycle() {
        let service = ConfigService::new(AgentConfig::default().with_setting("a.b", "1"));
        assert_eq!(service.get_u64("a.b", 0), 1);
        service.start().await.unwrap();
        assert_eq!(service.state(), ServiceState::Started);
        service.stop().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }
}
