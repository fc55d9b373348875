//! Tracing subscriber setup
//!
//! Logs go to stderr so stdout carries only envelopes.

use crate::constants::{DEFAULT_LOG_FILTER, JSON_LOG_FORMAT};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives
    pub filter: String,
    /// Emit one JSON object per log line
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Read `RUST_LOG` and `STRATA_LOG_FORMAT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = lookup("RUST_LOG")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let json = lookup("STRATA_LOG_FORMAT")
            .map(|s| s.trim().eq_ignore_ascii_case(JSON_LOG_FORMAT))
            .unwrap_or(false);
        Self { filter, json }
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed. Invalid filter directives
/// fall back to [`DEFAULT_LOG_FILTER`].
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = TelemetryConfig::from_lookup(|_| None);
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "RUST_LOG" => Some("strata_storage=debug".to_string()),
            "STRATA_LOG_FORMAT" => Some("JSON".to_string()),
            _ => None,
        });
        assert_eq!(config.filter, "strata_storage=debug");
        assert!(config.json);
    }

    #[test]
    fn test_blank_filter_falls_back() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "RUST_LOG" => Some("  ".to_string()),
            "STRATA_LOG_FORMAT" => Some("pretty".to_string()),
            _ => None,
        });
        assert_eq!(config.filter, DEFAULT_LOG_FILTER);
        assert!(!config.json);
    }
}
