//! Environment Variable Configuration Provider
//!
//! Provides read-only access to configuration via environment variables.
//! Environment variables are immutable at runtime for thread-safety.

use std::str::FromStr;

use super::{ConfigError, ConfigResult};

/// Read-only environment variable configuration provider.
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    prefix: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment provider with no prefix
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Create an environment provider with a prefix
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    pub fn name(&self) -> &str {
        "env"
    }

    /// Get the full environment variable name
    pub fn env_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key.to_uppercase().replace('.', "_")),
            None => key.to_uppercase().replace('.', "_"),
        }
    }

    pub fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        let env_key = self.env_key(key);
        match std::env::var(&env_key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    /// Parse a value with `FromStr`, reporting the full variable name on failure.
    pub fn get<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_raw(key)? {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: self.env_key(key),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}
