//! Logging configuration

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
const FORMATS: [&str; 3] = ["human", "json", "logfmt"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Env: CG_LOG_LEVEL
    pub level: String,
    /// `human`, `json` or `logfmt`
    /// Env: CG_LOG_FORMAT
    pub format: String,
    /// Also append to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "human".to_string(), file: None }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("CG_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(format) = lookup("CG_LOG_FORMAT") {
            self.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            bail!("Invalid log level: {:?} (expected one of {})", self.level, LEVELS.join(", "));
        }
        if !FORMATS.contains(&self.format.to_ascii_lowercase().as_str()) {
            bail!("Invalid log format: {:?} (expected one of {})", self.format, FORMATS.join(", "));
        }
        Ok(())
    }
}
