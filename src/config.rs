//! Configuration of the dispatch manager.
//!
//! Values can be given explicitly, deserialized with serde, or read from
//! the environment via [`TelemetryConfig::from_env`].

use crate::error::ConfigError;
use crate::scope::DEFAULT_BREADCRUMB_LIMIT;
use crate::severity::Severity;
use serde::Deserialize;

/// Project DSN; empty disables remote submission.
pub const TELEMETRY_DSN_ENV: &str = "TELEMETRY_DSN";

/// Environment tag attached to every event.
pub const TELEMETRY_ENVIRONMENT_ENV: &str = "TELEMETRY_ENVIRONMENT";

/// Release tag attached to every event.
pub const TELEMETRY_RELEASE_ENV: &str = "TELEMETRY_RELEASE";

/// Comma-separated severities forwarded to the service.
pub const TELEMETRY_LOG_LEVELS_ENV: &str = "TELEMETRY_LOG_LEVELS";

/// Minimum severity emitted by loggers at all.
pub const TELEMETRY_MIN_LEVEL_ENV: &str = "TELEMETRY_MIN_LEVEL";

/// Breadcrumbs kept per submission context.
pub const TELEMETRY_BREADCRUMB_LIMIT_ENV: &str = "TELEMETRY_BREADCRUMB_LIMIT";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub dsn: String,
    pub environment: String,
    pub release: String,
    /// Severity names forwarded to the remote service.
    pub log_levels: Vec<String>,
    /// Minimum severity name the loggers emit.
    pub log_level: String,
    pub breadcrumb_limit: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            environment: String::new(),
            release: String::new(),
            log_levels: vec!["error".to_string(), "fatal".to_string(), "panic".to_string()],
            log_level: "info".to_string(),
            breadcrumb_limit: DEFAULT_BREADCRUMB_LIMIT,
        }
    }
}

impl TelemetryConfig {
    /// Build a configuration from `TELEMETRY_*` variables, falling back to
    /// the defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dsn) = lookup(TELEMETRY_DSN_ENV) {
            config.dsn = dsn;
        }
        if let Some(environment) = lookup(TELEMETRY_ENVIRONMENT_ENV) {
            config.environment = environment;
        }
        if let Some(release) = lookup(TELEMETRY_RELEASE_ENV) {
            config.release = release;
        }
        if let Some(levels) = lookup(TELEMETRY_LOG_LEVELS_ENV) {
            config.log_levels = levels
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(level) = lookup(TELEMETRY_MIN_LEVEL_ENV) {
            config.log_level = level;
        }
        if let Some(limit) = lookup(TELEMETRY_BREADCRUMB_LIMIT_ENV) {
            config.breadcrumb_limit =
                limit
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: TELEMETRY_BREADCRUMB_LIMIT_ENV.to_string(),
                        value: limit.clone(),
                    })?;
        }
        Ok(config)
    }

    /// Parse [`TelemetryConfig::log_levels`].
    pub fn dispatch_levels(&self) -> Result<Vec<Severity>, ConfigError> {
        let mut levels = Vec::with_capacity(self.log_levels.len());
        for name in &self.log_levels {
            let level: Severity = name.parse().map_err(ConfigError::DispatchLevel)?;
            if !levels.contains(&level) {
                levels.push(level);
            }
        }
        Ok(levels)
    }

    /// Parse [`TelemetryConfig::log_level`].
    pub fn min_level(&self) -> Result<Severity, ConfigError> {
        self.log_level.parse().map_err(ConfigError::LogLevel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_forward_errors_and_above() {
        let config = TelemetryConfig::default();
        assert_eq!(
            config.dispatch_levels().unwrap(),
            vec![Severity::Error, Severity::Fatal, Severity::Panic]
        );
        assert_eq!(config.min_level().unwrap(), Severity::Info);
    }

    #[test]
    fn reads_environment() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            (TELEMETRY_ENVIRONMENT_ENV, "staging"),
            (TELEMETRY_LOG_LEVELS_ENV, "warn, error,,"),
            (TELEMETRY_MIN_LEVEL_ENV, "debug"),
            (TELEMETRY_BREADCRUMB_LIMIT_ENV, "10"),
        ]))
        .unwrap();

        assert_eq!(config.environment, "staging");
        assert_eq!(config.dispatch_levels().unwrap(), vec![Severity::Warn, Severity::Error]);
        assert_eq!(config.min_level().unwrap(), Severity::Debug);
        assert_eq!(config.breadcrumb_limit, 10);
    }

    #[test]
    fn rejects_bad_breadcrumb_limit() {
        let err = TelemetryConfig::from_lookup(lookup(&[(TELEMETRY_BREADCRUMB_LIMIT_ENV, "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_bad_level_names() {
        let config = TelemetryConfig {
            log_levels: vec!["error".to_string(), "severe".to_string()],
            ..TelemetryConfig::default()
        };
        let err = config.dispatch_levels().unwrap_err();
        assert!(err.to_string().contains("severe"));

        let config = TelemetryConfig {
            log_level: "chatty".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(config.min_level(), Err(ConfigError::LogLevel(_))));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: TelemetryConfig =
            serde_json::from_str(r#"{"dsn":"https://k@host/1","release":"r1"}"#).unwrap();
        assert_eq!(config.release, "r1");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.breadcrumb_limit, DEFAULT_BREADCRUMB_LIMIT);
    }
}
