//! Caller context for request processing

use super::roles::RoleSpec;

/// Who a request acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    /// Application role, already normalized (blank means the super-role)
    pub role: String,

    /// Audit username bound to `@current_username`, if the caller sent one
    pub username: Option<String>,
}

impl AccessContext {
    pub fn new(roles: &RoleSpec, role: Option<&str>, username: Option<&str>) -> Self {
        let username = username.map(str::trim).filter(|u| !u.is_empty()).map(str::to_string);
        Self { role: roles.normalize(role), username }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_normalization() {
        let roles = RoleSpec::default();
        let ctx = AccessContext::new(&roles, None, Some("  "));
        assert_eq!(ctx.role, "super_admin");
        assert_eq!(ctx.username(), None);

        let ctx = AccessContext::new(&roles, Some("role_nurse"), Some(" wang "));
        assert_eq!(ctx.role, "role_nurse");
        assert_eq!(ctx.username(), Some("wang"));
    }
}
