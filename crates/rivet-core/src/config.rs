//! Server configuration from the environment.
//!
//! Variables are read with the `RIVET_` prefix after loading a `.env` file
//! when one is present:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RIVET_ADDR` | `127.0.0.1:8080` |
//! | `RIVET_BODY_LIMIT` | `1048576` |
//! | `RIVET_ENV` | `development` |
//! | `RIVET_SPEC_DIR` | unset |

use crate::error::Environment;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use thiserror::Error;

/// Default body limit (1 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

const PREFIX: &str = "RIVET_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    #[serde(default = "default_body_limit")]
    pub body_limit: usize,

    #[serde(rename = "env", default, deserialize_with = "environment")]
    pub environment: Environment,

    /// Directory the OpenAPI artifacts are written to on startup.
    #[serde(default)]
    pub spec_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            body_limit: DEFAULT_BODY_LIMIT,
            environment: Environment::default(),
            spec_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load `.env` if present, then read `RIVET_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(envy::prefixed(PREFIX).from_env::<ServerConfig>()?)
    }

    /// Read from explicit `(name, value)` pairs, names including the prefix.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(PREFIX).from_iter::<_, ServerConfig>(vars)?)
    }

    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn spec_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec_dir = Some(dir.into());
        self
    }
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT
}

fn environment<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Environment, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(Environment::parse(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ServerConfig::from_vars(vars(&[("PATH", "/usr/bin")])).unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.body_limit, 1024 * 1024);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.spec_dir.is_none());
    }

    #[test]
    fn prefixed_variables_are_read() {
        let config = ServerConfig::from_vars(vars(&[
            ("RIVET_ADDR", "0.0.0.0:9000"),
            ("RIVET_BODY_LIMIT", "2048"),
            ("RIVET_ENV", "prod"),
            ("RIVET_SPEC_DIR", "target/spec"),
        ]))
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.body_limit, 2048);
        assert!(config.environment.is_production());
        assert_eq!(config.spec_dir, Some(PathBuf::from("target/spec")));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = ServerConfig::from_vars(vars(&[("RIVET_BODY_LIMIT", "lots")])).unwrap_err();
        assert!(err.to_string().contains("configuration error"));
    }
}
