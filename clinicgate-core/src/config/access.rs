//! Access-control configuration

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::sql;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Grant script the privilege table is parsed from
    /// Env: CG_GRANTS_FILE
    /// Default: "database/sql/security/4_grants.sql"
    pub grants_file: PathBuf,

    /// Schema named in the grant lines; `None` means the database name
    pub grant_schema: Option<String>,

    /// Reserved application role with unrestricted access
    pub super_role: String,

    /// Database role assumed for the super-role
    pub super_db_role: String,

    /// Database roles the connecting user must hold (quoted in remediation hints)
    pub managed_roles: Vec<String>,

    /// Fail startup on grant lines that cannot be parsed
    /// Env: CG_STRICT_GRANTS
    /// Default: false
    pub strict_grants: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            grants_file: PathBuf::from("database/sql/security/4_grants.sql"),
            grant_schema: None,
            super_role: "super_admin".to_string(),
            super_db_role: "role_admin".to_string(),
            managed_roles: [
                "role_admin",
                "role_reception",
                "role_doctor",
                "role_nurse",
                "role_pharmacist",
                "role_lab_tech",
                "role_cashier",
                "role_patient",
            ]
            .iter()
            .map(|r| r.to_string())
            .collect(),
            strict_grants: false,
        }
    }
}

impl AccessConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("CG_GRANTS_FILE") {
            self.grants_file = PathBuf::from(path);
        }
        if let Some(strict) = lookup("CG_STRICT_GRANTS") {
            self.strict_grants = matches!(strict.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Schema the grant lines must name
    pub fn schema<'a>(&'a self, database_name: &'a str) -> &'a str {
        self.grant_schema.as_deref().unwrap_or(database_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.super_role.trim().is_empty() {
            bail!("Invalid super_role: cannot be empty");
        }
        if sql::sanitize(&self.super_db_role).is_none() {
            bail!("Invalid super_db_role: {:?} is not a plain identifier", self.super_db_role);
        }
        if let Some(role) = self.managed_roles.iter().find(|r| sql::sanitize(r).is_none()) {
            bail!("Invalid managed role: {:?} is not a plain identifier", role);
        }
        Ok(())
    }
}
