//! Role names and the reserved super-role

use crate::config::AccessConfig;
use crate::sql;
use crate::{Error, Result};

/// How application roles map onto database roles
#[derive(Debug, Clone)]
pub struct RoleSpec {
    /// Reserved application role with unrestricted access
    pub super_role: String,

    /// Database role assumed when the super-role is active
    pub super_db_role: String,
}

impl Default for RoleSpec {
    fn default() -> Self {
        Self { super_role: "super_admin".to_string(), super_db_role: "role_admin".to_string() }
    }
}

impl RoleSpec {
    pub fn from_config(access: &AccessConfig) -> Self {
        Self { super_role: access.super_role.clone(), super_db_role: access.super_db_role.clone() }
    }

    /// Blank or missing roles act as the super-role
    pub fn normalize(&self, role: Option<&str>) -> String {
        match role.map(str::trim) {
            Some(r) if !r.is_empty() => r.to_string(),
            _ => self.super_role.clone(),
        }
    }

    pub fn is_super(&self, role: &str) -> bool {
        role == self.super_role
    }

    /// Database role to `SET ROLE` to, already sanitized
    pub fn database_role(&self, role: &str) -> Result<String> {
        let target = if self.is_super(role) { &self.super_db_role } else { role };
        sql::sanitize(target)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidIdentifier(format!("Invalid role name: {:?}", role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_role_is_super() {
        let spec = RoleSpec::default();
        assert_eq!(spec.normalize(None), "super_admin");
        assert_eq!(spec.normalize(Some("   ")), "super_admin");
        assert_eq!(spec.normalize(Some(" role_doctor ")), "role_doctor");
    }

    #[test]
    fn test_super_role_maps_to_database_role() {
        let spec = RoleSpec::default();
        assert_eq!(spec.database_role("super_admin").unwrap(), "role_admin");
        assert_eq!(spec.database_role("role_nurse").unwrap(), "role_nurse");
        assert!(spec.database_role("role_nurse; DROP").is_err());
    }
}
