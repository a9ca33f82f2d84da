//! services/package_generator/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables once at cold start.
//! The `.env` file is used for local development.

use std::time::Duration;

use conversation_package_core::pipeline::{
    PipelineSettings, DEFAULT_ANALYSIS_HISTORY_LIMIT, DEFAULT_FRESHNESS_WINDOW_SECS,
};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub generation_model: String,
    pub generation_temperature: f32,
    pub generation_timeout: Duration,
    pub analysis_history_limit: usize,
    pub freshness_window: chrono::Duration,
    /// When unset, no completion notifications are published.
    pub package_generated_topic_arn: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &str| var(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()));

        // --- Database ---
        let database_url = required("DATABASE_URL")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", var("DATABASE_MAX_CONNECTIONS"), 5u32)?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generation model ---
        let openai_api_key = required("OPENAI_API_KEY")?;
        let openai_api_base = var("OPENAI_API_BASE");
        let generation_model = var("GENERATION_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let generation_temperature = parse_or("GENERATION_TEMPERATURE", var("GENERATION_TEMPERATURE"), 0.4f32)?;
        let timeout_secs = parse_or("GENERATION_TIMEOUT_SECS", var("GENERATION_TIMEOUT_SECS"), 60u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "GENERATION_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // --- Pipeline ---
        let analysis_history_limit = parse_or(
            "ANALYSIS_HISTORY_LIMIT",
            var("ANALYSIS_HISTORY_LIMIT"),
            DEFAULT_ANALYSIS_HISTORY_LIMIT,
        )?;
        if analysis_history_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_HISTORY_LIMIT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let freshness_window_secs = parse_or(
            "FRESHNESS_WINDOW_SECS",
            var("FRESHNESS_WINDOW_SECS"),
            DEFAULT_FRESHNESS_WINDOW_SECS,
        )?;
        if freshness_window_secs < 0 {
            return Err(ConfigError::InvalidValue(
                "FRESHNESS_WINDOW_SECS".to_string(),
                "must not be negative".to_string(),
            ));
        }
        let freshness_window = chrono::Duration::try_seconds(freshness_window_secs).ok_or_else(|| {
            ConfigError::InvalidValue(
                "FRESHNESS_WINDOW_SECS".to_string(),
                format!("{} seconds is out of range", freshness_window_secs),
            )
        })?;

        let package_generated_topic_arn = var("PACKAGE_GENERATED_TOPIC_ARN");

        Ok(Self {
            database_url,
            database_max_connections,
            log_level,
            openai_api_key,
            openai_api_base,
            generation_model,
            generation_temperature,
            generation_timeout: Duration::from_secs(timeout_secs),
            analysis_history_limit,
            freshness_window,
            package_generated_topic_arn,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            freshness_window: self.freshness_window,
            analysis_history_limit: self.analysis_history_limit,
        }
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/packages"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn applies_defaults() {
        let config = load(&REQUIRED).expect("config");

        assert_eq!(config.generation_model, "gpt-4o");
        assert_eq!(config.generation_timeout, Duration::from_secs(60));
        assert_eq!(config.analysis_history_limit, 500);
        assert_eq!(config.freshness_window, chrono::Duration::hours(1));
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.package_generated_topic_arn.is_none());
        assert_eq!(
            config.pipeline_settings().freshness_window,
            chrono::Duration::hours(1)
        );
    }

    #[test]
    fn missing_required_variable_is_reported() {
        let err = load(&[("DATABASE_URL", "postgres://localhost/packages")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "OPENAI_API_KEY"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = load(&[("DATABASE_URL", "  "), ("OPENAI_API_KEY", "sk-test")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "DATABASE_URL"));
    }

    #[test]
    fn rejects_invalid_numbers() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("GENERATION_TIMEOUT_SECS", "soon"));
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "GENERATION_TIMEOUT_SECS"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("GENERATION_TIMEOUT_SECS", "0"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn reads_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("GENERATION_MODEL", "gpt-4o-mini"),
            ("FRESHNESS_WINDOW_SECS", "120"),
            ("PACKAGE_GENERATED_TOPIC_ARN", "arn:aws:sns:us-east-1:000000000000:package-generated"),
            ("RUST_LOG", "debug"),
        ]);
        let config = load(&vars).expect("config");

        assert_eq!(config.generation_model, "gpt-4o-mini");
        assert_eq!(config.freshness_window, chrono::Duration::minutes(2));
        assert_eq!(
            config.package_generated_topic_arn.as_deref(),
            Some("arn:aws:sns:us-east-1:000000000000:package-generated")
        );
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn rejects_out_of_range_freshness_window() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FRESHNESS_WINDOW_SECS", "9223372036854775807"));
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "FRESHNESS_WINDOW_SECS"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("FRESHNESS_WINDOW_SECS", "-1"));
        assert!(load(&vars).is_err());
    }
}
