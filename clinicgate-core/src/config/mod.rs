//! Configuration for the console
//!
//! Values are resolved in this order (later wins):
//!
//! 1. **Defaults**
//! 2. **Config file** (`clinicgate.toml`, or an explicit path)
//! 3. **Environment variables** (`CG_*`)
//!
//! # Example
//!
//! ```no_run
//! use clinicgate_core::config::ConsoleConfig;
//!
//! let config = ConsoleConfig::load()?;
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod access;
pub mod database;
pub mod logging;
pub mod server;

pub use access::AccessConfig;
pub use database::DatabaseConfig;
pub use logging::LoggingConfig;
pub use server::ServerConfig;

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "clinicgate.toml";

/// Complete console configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub access: AccessConfig,
    pub logging: LoggingConfig,
}

impl ConsoleConfig {
    /// Defaults, then `clinicgate.toml` if present, then the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Same as [`ConsoleConfig::load`] with an explicit file; a missing file is skipped
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();

        if path.exists() {
            let file_config = Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.merge(file_config);
        }

        config.apply_env_vars();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.as_ref().display()))
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.server.merge(other.server);
        self.database.merge(other.database);
        self.access.merge(other.access);
        self.logging.merge(other.logging);
    }

    pub fn apply_env_vars(&mut self) {
        self.apply_env(&|key: &str| env::var(key).ok());
    }

    /// Apply `CG_*` overrides from an arbitrary lookup
    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        self.server.apply_env(lookup);
        self.database.apply_env(lookup);
        self.access.apply_env(lookup);
        self.logging.apply_env(lookup);
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.database.validate()?;
        self.access.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Schema the grant script is filtered on
    pub fn grant_schema(&self) -> &str {
        self.access.schema(&self.database.name)
    }
}
