use std::path::Path;

use anyhow::{Context, Result};
use clinicgate_core::config::ConsoleConfig;

use super::load_config;

/// Validate and print the effective configuration as TOML.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate().context("Invalid configuration")?;
    println!("{}", effective_toml(&config)?);
    println!("# configuration OK");
    Ok(())
}

/// The resolved configuration with the database password masked
fn effective_toml(config: &ConsoleConfig) -> Result<String> {
    let mut shown = config.clone();
    if !shown.database.password.is_empty() {
        shown.database.password = "***".to_string();
    }
    toml::to_string_pretty(&shown).context("Failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn password_is_masked() {
        let mut config = ConsoleConfig::default();
        config.database.password = "s3cret".to_string();
        let rendered = effective_toml(&config).unwrap();
        assert!(rendered.contains("password = \"***\""));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("[access]"));
    }

    #[test]
    fn invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 0").unwrap();
        let err = run(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid port"));
    }
}
