//! HTTP server configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening address
    /// Env: CG_HOST
    /// Default: "127.0.0.1"
    pub host: String,

    /// Listening port
    /// Env: CG_PORT
    /// Default: 3000
    pub port: u16,

    /// Maximum request body size in bytes
    /// Env: CG_MAX_BODY_SIZE
    /// Default: 1048576 (1MiB)
    pub max_body_size: usize,

    /// Page size when the request has none
    /// Default: 20
    pub default_page_size: u32,

    /// Upper bound for `pageSize`
    /// Env: CG_MAX_PAGE_SIZE
    /// Default: 500
    pub max_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_body_size: 1024 * 1024,
            default_page_size: 20,
            max_page_size: 500,
        }
    }
}

impl ServerConfig {
    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    /// Apply overrides from `lookup` (environment variables in production)
    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("CG_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("CG_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(size) = lookup("CG_MAX_BODY_SIZE").and_then(|s| s.parse().ok()) {
            self.max_body_size = size;
        }
        if let Some(size) = lookup("CG_MAX_PAGE_SIZE").and_then(|s| s.parse().ok()) {
            self.max_page_size = size;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("Invalid port: port must be between 1 and 65535");
        }
        if self.host.is_empty() {
            bail!("Invalid host: host cannot be empty");
        }
        if self.max_body_size == 0 {
            bail!("Invalid max_body_size: must be greater than 0");
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            bail!(
                "Invalid page sizes: default_page_size ({}) must be between 1 and max_page_size ({})",
                self.default_page_size,
                self.max_page_size
            );
        }
        Ok(())
    }

    /// `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = ServerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_inverted_page_bounds_fail() {
        let cfg = ServerConfig { default_page_size: 50, max_page_size: 10, ..Default::default() };
        assert!(cfg.validate().unwrap_err().to_string().contains("page sizes"));
    }

    #[test]
    fn test_env_overrides_ignore_garbage() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env(&|key: &str| match key {
            "CG_PORT" => Some("not-a-port".to_string()),
            "CG_HOST" => Some("0.0.0.0".to_string()),
            "CG_MAX_PAGE_SIZE" => Some("100".to_string()),
            _ => None,
        });
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.max_page_size, 100);
    }
}
