// Configuration module - validates plugin options before any network call
//
// This module is responsible for:
// 1. Enforcing both-or-neither basic-auth credentials
// 2. Compiling the application id patterns
// 3. Loading the default check config (builtin, inline JSON or file)
//    and merging the per-invocation overrides on top of it

use regex::Regex;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::marathon::overlay::Overlay;

/// Errors that can occur while validating plugin options
///
/// Every variant ends up as an UNKNOWN verdict.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("You must provide both username and password to authenticate on Marathon API")]
    PartialCredentials,

    #[error("{0}")]
    InvalidSetting(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to read check config file {path}: {source}")]
    ReadCheckConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON: {message}\nJSON => {json}")]
    InvalidCheckConfig { message: String, json: String },
}

/// Basic-auth credentials for the orchestrator API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Accepts both or neither of username and password.
    pub fn from_options(
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        match (username, password) {
            (Some(username), Some(password)) => Ok(Some(Credentials { username, password })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::PartialCredentials),
        }
    }
}

/// Compiles an optional application id pattern.
pub fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()
}

/// Check config applied when neither inline JSON nor a file is given.
///
/// Values under `_` are defaults for every deeper level.
pub const DEFAULT_CHECK_CONFIG: &str = r#"{
  "_": {"ttl": 70},
  "status": {
    "running":   {"status": 0},
    "delayed":   {"status": 1},
    "deploying": {"status": 1},
    "suspended": {"status": 1},
    "waiting":   {"status": 1}
  },
  "health": {
    "healthy":      {"status": 0},
    "overcapacity": {"status": 1},
    "staged":       {"status": 1},
    "unhealthy":    {"status": 2},
    "unscheduled":  {"status": 2},
    "unknown":      {"status": 0}
  }
}"#;

/// Where the default check config comes from, plus the overrides blob
#[derive(Debug, Clone, Default)]
pub struct CheckConfigOptions {
    /// Inline JSON, takes precedence over `file`
    pub inline: Option<String>,

    /// Path to a JSON file
    pub file: Option<PathBuf>,

    /// JSON merged field by field on top of the default config
    pub overrides: Option<String>,
}

impl CheckConfigOptions {
    /// Resolves the effective check config overlay.
    pub fn load(&self) -> Result<Overlay, ConfigError> {
        let base_json = match (&self.inline, &self.file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => {
                debug!("Reading default check config from {}", path.display());
                fs::read_to_string(path).map_err(|source| ConfigError::ReadCheckConfig {
                    path: path.clone(),
                    source,
                })?
            }
            (None, None) => DEFAULT_CHECK_CONFIG.to_string(),
        };

        let mut overlay = Overlay::from_json(&base_json)?;
        if let Some(overrides) = &self.overrides {
            overlay.merge(Overlay::from_json(overrides)?);
        }

        Ok(overlay)
    }
}
