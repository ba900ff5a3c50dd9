pub mod check_config;
pub mod grants;
pub mod serve;

use std::path::Path;

use anyhow::{bail, Result};
use clinicgate_core::config::{ConsoleConfig, DEFAULT_CONFIG_FILE};

/// Load configuration; an explicitly named file must exist
pub fn load_config(path: Option<&Path>) -> Result<ConsoleConfig> {
    match path {
        Some(path) if !path.exists() => bail!("Config file not found: {}", path.display()),
        Some(path) => ConsoleConfig::load_from(path),
        None => ConsoleConfig::load_from(DEFAULT_CONFIG_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
