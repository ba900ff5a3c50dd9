//! Role-scoped database sessions
//!
//! A session is one transaction: begin, `SET ROLE`, bind the audit username,
//! run the body, reset the role, then commit or roll back. The role never
//! outlives the transaction, and the pool's `after_release` hook resets it
//! again if the transaction was dropped mid-flight.

use futures::future::BoxFuture;
use sqlx::mysql::{MySqlConnection, MySqlPool};

use crate::rbac::RoleSpec;
use crate::{Error, Result};

pub(crate) const RESET_SESSION_SQL: &str = "SET ROLE DEFAULT; SET @current_username = NULL";

/// Opens role-scoped transactions on a shared pool
#[derive(Clone)]
pub struct RoleSessions {
    pool: MySqlPool,
    roles: RoleSpec,
    grant_hint: String,
}

impl RoleSessions {
    pub fn new(pool: MySqlPool, roles: RoleSpec, grant_hint: String) -> Self {
        Self { pool, roles, grant_hint }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn roles(&self) -> &RoleSpec {
        &self.roles
    }

    /// Run `body` inside a transaction acting as `role`
    ///
    /// The body gets the transaction's connection. Its error rolls the
    /// transaction back and is returned unchanged.
    pub async fn with_role<T, F>(&self, role: &str, username: Option<&str>, body: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let db_role = self.roles.database_role(role)?;
        let mut tx = self.pool.begin().await?;

        let set_role = format!("SET ROLE {}", db_role);
        if let Err(source) = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&set_role)).await {
            log::error!("SET ROLE {} failed: {}", db_role, source);
            return Err(Error::RoleSwitch { role: db_role, source, hint: self.grant_hint.clone() });
        }
        sqlx::query("SET @current_username = ?").bind(username).execute(&mut *tx).await?;
        log::debug!("Session role '{}' (db role {}) user {:?}", role, db_role, username);

        let outcome = body(&mut *tx).await;
        let reset = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(RESET_SESSION_SQL)).await;

        match outcome {
            Ok(value) => {
                reset?;
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = reset {
                    log::warn!("Role reset after failed session: {}", e);
                }
                if let Err(e) = tx.rollback().await {
                    log::warn!("Rollback failed: {}", e);
                }
                Err(err)
            }
        }
    }
}

/// Remediation text attached to role-switch failures
pub fn grant_hint(db_user: &str, db_host: &str, managed_roles: &[String]) -> String {
    format!(
        "The database user needs the role grants, e.g.: GRANT {roles} TO '{user}'@'{host}'; \
         SET DEFAULT ROLE ALL TO '{user}'@'{host}';",
        roles = managed_roles.join(", "),
        user = db_user,
        host = db_host,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_hint_names_every_role() {
        let roles = vec!["role_admin".to_string(), "role_doctor".to_string()];
        let hint = grant_hint("app", "10.0.0.2", &roles);
        assert!(hint.contains("GRANT role_admin, role_doctor TO 'app'@'10.0.0.2';"));
        assert!(hint.contains("SET DEFAULT ROLE ALL TO 'app'@'10.0.0.2';"));
    }

    #[tokio::test]
    async fn test_invalid_role_rejected_before_connecting() {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .connect_lazy("mysql://nobody@127.0.0.1:9/none")
            .unwrap();
        let sessions = RoleSessions::new(pool, RoleSpec::default(), String::new());
        let err = sessions
            .with_role("role x", None, |_conn| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }
}
