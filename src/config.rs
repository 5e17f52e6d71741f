//! Operator configuration read from the environment at startup.

use std::time::Duration;

use thiserror::Error;

/// Environment variable that raises log verbosity when set to a non-empty value.
pub const LOG_LEVEL_ENV: &str = "PRO_LOGLEVEL";
/// Environment variable naming the namespace to watch. Empty means all.
pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";
/// Environment variable overriding the resync period, in seconds.
pub const RESYNC_PERIOD_ENV: &str = "RESYNC_PERIOD_SECS";

/// Resync period used when none is configured.
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(5);

/// Errors raised while reading configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: expected a positive number of seconds")]
    InvalidDuration { name: &'static str, value: String },
}

/// Settings handed to the engine and the logging setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Emit debug logs for this crate.
    pub verbose: bool,
    /// Namespace scope of the controller. `None` watches cluster wide.
    pub watch_namespace: Option<String>,
    /// Requeue interval after a successful pass.
    pub resync_period: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            watch_namespace: None,
            resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }
}

impl OperatorConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which returns `None` for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let verbose = lookup(LOG_LEVEL_ENV).is_some_and(|v| !v.is_empty());
        let watch_namespace = watch_namespace_from(lookup(WATCH_NAMESPACE_ENV))?;
        let resync_period = match lookup(RESYNC_PERIOD_ENV) {
            None => DEFAULT_RESYNC_PERIOD,
            Some(value) => parse_seconds(RESYNC_PERIOD_ENV, &value)?,
        };

        Ok(Self {
            verbose,
            watch_namespace,
            resync_period,
        })
    }

    /// Default tracing directive for this crate.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "prometheus_replica_operator=debug"
        } else {
            "prometheus_replica_operator=info"
        }
    }
}

/// Namespace to watch. Fails when unset; an empty value means cluster wide.
fn watch_namespace_from(value: Option<String>) -> Result<Option<String>, ConfigError> {
    match value {
        None => Err(ConfigError::Missing(WATCH_NAMESPACE_ENV)),
        Some(ns) if ns.trim().is_empty() => Ok(None),
        Some(ns) => Ok(Some(ns.trim().to_string())),
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidDuration {
            name,
            value: value.to_string(),
        }),
    }
}
