//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
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
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub generation_model: String,
    pub light_model: String,
    pub search_api_key: String,
    pub search_api_base: String,
    pub search_model: String,
    pub allowed_origins: Vec<String>,
    pub fetch_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generation Provider ---
        let openai_api_key = required("OPENAI_API_KEY")?;
        let openai_api_base = lookup("OPENAI_API_BASE").filter(|v| !v.trim().is_empty());
        let generation_model = or_default("GENERATION_MODEL", "gpt-4o");
        let light_model = or_default("LIGHT_MODEL", "gpt-4o-mini");

        // --- Search Provider ---
        let search_api_key = required("SEARCH_API_KEY")?;
        let search_api_base = or_default("SEARCH_API_BASE", "https://api.perplexity.ai");
        let search_model = or_default("SEARCH_MODEL", "sonar");

        // --- HTTP Surface ---
        let allowed_origins: Vec<String> = or_default("ALLOWED_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if allowed_origins.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ALLOWED_ORIGINS".to_string(),
                "at least one origin is required".to_string(),
            ));
        }

        let timeout_str = or_default("FETCH_TIMEOUT_SECS", "15");
        let fetch_timeout = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "FETCH_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            openai_api_base,
            generation_model,
            light_model,
            search_api_key,
            search_api_base,
            search_model,
            allowed_origins,
            fetch_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/pipeline"),
        ("OPENAI_API_KEY", "sk-test"),
        ("SEARCH_API_KEY", "pplx-test"),
    ];

    #[test]
    fn defaults_fill_optional_settings() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.generation_model, "gpt-4o");
        assert_eq!(config.light_model, "gpt-4o-mini");
        assert_eq!(config.search_api_base, "https://api.perplexity.ai");
        assert_eq!(config.allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.openai_api_base, None);
    }

    #[test]
    fn missing_provider_key_is_a_hard_failure() {
        let vars = [REQUIRED[0], REQUIRED[2]];
        match Config::from_lookup(lookup(&vars)) {
            Err(ConfigError::MissingVar(key)) => assert_eq!(key, "OPENAI_API_KEY"),
            other => panic!("expected missing var, got {other:?}"),
        }
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("ALLOWED_ORIGINS", " https://a.example , https://b.example ,"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FETCH_TIMEOUT_SECS", "soon"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidValue(key, _)) if key == "FETCH_TIMEOUT_SECS"
        ));
    }
}
