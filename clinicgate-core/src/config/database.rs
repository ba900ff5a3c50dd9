//! MySQL connection configuration

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Env: CG_DB_HOST, default "127.0.0.1"
    pub host: String,
    /// Env: CG_DB_PORT, default 3306
    pub port: u16,
    /// Env: CG_DB_USER, default "root"
    pub user: String,
    /// Env: CG_DB_PASSWORD, default empty
    pub password: String,
    /// Schema name; also the schema grants are read for
    /// Env: CG_DB_NAME, default "hospital_test"
    pub name: String,
    /// Env: CG_DB_MAX_CONNECTIONS, default 5
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            name: "hospital_test".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("CG_DB_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("CG_DB_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(user) = lookup("CG_DB_USER") {
            self.user = user;
        }
        if let Some(password) = lookup("CG_DB_PASSWORD") {
            self.password = password;
        }
        if let Some(name) = lookup("CG_DB_NAME") {
            self.name = name;
        }
        if let Some(max) = lookup("CG_DB_MAX_CONNECTIONS").and_then(|m| m.parse().ok()) {
            self.max_connections = max;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            bail!("Invalid database host: cannot be empty");
        }
        if self.port == 0 {
            bail!("Invalid database port: must be between 1 and 65535");
        }
        if self.name.trim().is_empty() {
            bail!("Invalid database name: cannot be empty");
        }
        if self.user.is_empty() {
            bail!("Invalid database user: cannot be empty");
        }
        if self.max_connections == 0 {
            bail!("Invalid max_connections: must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_defaults() {
        let cfg = DatabaseConfig::default();
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.acquire_timeout_secs, 30);
        assert_eq!(cfg.idle_timeout_secs, 10);
        assert_eq!(cfg.name, "hospital_test");
    }

    #[test]
    fn test_debug_hides_password() {
        let cfg = DatabaseConfig { password: "s3cret".to_string(), ..Default::default() };
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let cfg = DatabaseConfig { name: " ".to_string(), ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
