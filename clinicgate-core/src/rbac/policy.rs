//! Access policy: privilege table + schema catalog
//!
//! Every data operation needs an [`Authorized`] token for the capability it
//! exercises. Tokens can only be minted by [`AccessPolicy::authorize`], so the
//! row gateway cannot be reached without going through the policy first.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

use super::display::resolve_display_name;
use super::grants::GrantStore;
use super::permissions::{AccessDecision, AccessMode};
use super::roles::RoleSpec;
use crate::db::{ObjectCatalog, ObjectKind, SchemaObject};
use crate::{sql, Error, Result};

mod sealed {
    pub trait Sealed {}
}

/// Something a role may be allowed to do with an object
pub trait Capability: sealed::Sealed + Send + Sync + 'static {
    /// Short name used in logs
    const NAME: &'static str;
    /// Message returned when the decision does not grant the capability
    const DENIED: &'static str;

    fn permits(decision: &AccessDecision) -> bool;
}

/// Read rows and column metadata
#[derive(Debug)]
pub enum Read {}

/// Update existing rows
#[derive(Debug)]
pub enum Write {}

/// Insert new rows (and request insert examples)
#[derive(Debug)]
pub enum Insert {}

impl sealed::Sealed for Read {}
impl sealed::Sealed for Write {}
impl sealed::Sealed for Insert {}

impl Capability for Read {
    const NAME: &'static str = "read";
    const DENIED: &'static str = "Object not permitted for this role";

    fn permits(decision: &AccessDecision) -> bool {
        decision.visible
    }
}

impl Capability for Write {
    const NAME: &'static str = "write";
    const DENIED: &'static str = "Object is read-only for this role";

    fn permits(decision: &AccessDecision) -> bool {
        decision.visible && decision.access_mode.is_writable()
    }
}

impl Capability for Insert {
    const NAME: &'static str = "insert";
    const DENIED: &'static str = "Object is not insertable for this role";

    fn permits(decision: &AccessDecision) -> bool {
        decision.visible && decision.insertable
    }
}

/// Proof that `role` passed the policy gate for capability `C` on one catalog object
///
/// The object name inside has been sanitized and found in the catalog.
pub struct Authorized<C: Capability> {
    role: String,
    object: SchemaObject,
    decision: AccessDecision,
    _capability: PhantomData<fn() -> C>,
}

impl<C: Capability> Authorized<C> {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn object(&self) -> &SchemaObject {
        &self.object
    }

    /// Sanitized object name, safe to quote into SQL
    pub fn object_name(&self) -> &str {
        &self.object.name
    }

    pub fn decision(&self) -> AccessDecision {
        self.decision
    }
}

impl<C: Capability> fmt::Debug for Authorized<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorized")
            .field("capability", &C::NAME)
            .field("role", &self.role)
            .field("object", &self.object.name)
            .finish()
    }
}

/// Menu entry for one visible object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub display_name: String,
    pub access_mode: AccessMode,
}

/// Answers visibility and access-level questions for (role, object) pairs
pub struct AccessPolicy {
    grants: Arc<GrantStore>,
    catalog: Arc<dyn ObjectCatalog>,
    roles: RoleSpec,
}

impl AccessPolicy {
    pub fn new(grants: Arc<GrantStore>, catalog: Arc<dyn ObjectCatalog>, roles: RoleSpec) -> Self {
        Self { grants, catalog, roles }
    }

    pub fn roles(&self) -> &RoleSpec {
        &self.roles
    }

    pub fn catalog(&self) -> &Arc<dyn ObjectCatalog> {
        &self.catalog
    }

    /// Every role in the privilege table plus the super-role
    pub fn list_roles(&self) -> Result<Vec<String>> {
        Ok(self.grants.table()?.list_roles(&self.roles.super_role))
    }

    fn unrestricted(&self, role: &str) -> Result<bool> {
        Ok(self.roles.is_super(role) || self.grants.table()?.role_has_all(role))
    }

    /// Access decision for one pair, computed fresh from the privilege table
    pub fn decide(&self, role: &str, object: &str) -> Result<AccessDecision> {
        if self.unrestricted(role)? {
            return Ok(AccessDecision::unrestricted());
        }
        let table = self.grants.table()?;
        Ok(match table.object_privileges(role, object) {
            Some(privileges) => AccessDecision::from_privileges(privileges),
            None => AccessDecision::hidden(),
        })
    }

    pub fn is_allowed(&self, role: &str, object: &str) -> Result<bool> {
        Ok(self.decide(role, object)?.visible)
    }

    pub fn access_mode_for(&self, role: &str, object: &str) -> Result<AccessMode> {
        Ok(self.decide(role, object)?.access_mode)
    }

    pub fn can_insert(&self, role: &str, object: &str) -> Result<bool> {
        Ok(self.decide(role, object)?.insertable)
    }

    /// Objects visible to `role`, sorted by name
    pub async fn build_menu(&self, role: &str) -> Result<Vec<MenuItem>> {
        let objects = self.catalog.list_objects().await?;

        let mut items: Vec<MenuItem> = if self.unrestricted(role)? {
            objects
                .iter()
                .map(|obj| MenuItem {
                    name: obj.name.clone(),
                    kind: obj.kind,
                    display_name: resolve_display_name(&obj.name, Some(&obj.comment)),
                    access_mode: AccessMode::ReadWrite,
                })
                .collect()
        } else {
            self.grants
                .table()?
                .privileges_for(role)
                .into_iter()
                .map(|(name, privileges)| {
                    let known = objects.iter().find(|o| o.name == name);
                    MenuItem {
                        kind: known.map(|o| o.kind).unwrap_or(ObjectKind::Table),
                        display_name: resolve_display_name(&name, known.map(|o| o.comment.as_str())),
                        access_mode: AccessMode::from_privileges(&privileges),
                        name,
                    }
                })
                .collect()
        };

        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    /// Gate an operation on `object`: 400 bad name, 403 denied, 404 not in catalog
    pub async fn authorize<C: Capability>(&self, role: &str, object: &str) -> Result<Authorized<C>> {
        let name = sql::require(object, "object name")?;

        let decision = self.decide(role, &name)?;
        if !decision.visible {
            log::debug!("Denied {} on '{}' for role '{}': not visible", C::NAME, name, role);
            return Err(Error::Forbidden(Read::DENIED.to_string()));
        }
        if !C::permits(&decision) {
            log::debug!("Denied {} on '{}' for role '{}'", C::NAME, name, role);
            return Err(Error::Forbidden(C::DENIED.to_string()));
        }

        let object = self
            .catalog
            .find_object(&name)
            .await?
            .ok_or_else(|| Error::NotFound("Object not found in schema".to_string()))?;

        Ok(Authorized { role: role.to_string(), object, decision, _capability: PhantomData })
    }

    /// Drop cached grants and catalog objects
    pub fn reload(&self) {
        self.grants.invalidate();
        self.catalog.invalidate();
        log::info!("Access policy caches invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StaticCatalog;

    const GRANTS: &str = "
GRANT SELECT ON hospital_test.v_doctor_my_schedule TO role_doctor;
GRANT SELECT, UPDATE ON hospital_test.encounter TO role_doctor;
GRANT SELECT, INSERT ON hospital_test.patient TO role_reception;
GRANT SELECT ON hospital_test.ghost_view TO role_reception;
GRANT ALL PRIVILEGES ON hospital_test.* TO role_auditor;
";

    fn policy() -> AccessPolicy {
        let catalog = StaticCatalog::new(vec![
            SchemaObject::new("patient", ObjectKind::Table, "患者"),
            SchemaObject::new("encounter", ObjectKind::Table, ""),
            SchemaObject::new("v_doctor_my_schedule", ObjectKind::View, ""),
            SchemaObject::new("bed", ObjectKind::Table, "床位"),
        ]);
        AccessPolicy::new(
            Arc::new(GrantStore::inline(GRANTS, "hospital_test")),
            Arc::new(catalog),
            RoleSpec::default(),
        )
    }

    #[tokio::test]
    async fn test_super_and_wildcard_roles_see_everything() {
        let policy = policy();
        for role in ["super_admin", "role_auditor"] {
            let menu = policy.build_menu(role).await.unwrap();
            let names: Vec<_> = menu.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["bed", "encounter", "patient", "v_doctor_my_schedule"]);
            assert!(menu.iter().all(|m| m.access_mode == AccessMode::ReadWrite));
        }
    }

    #[tokio::test]
    async fn test_menu_only_lists_granted_objects() {
        let policy = policy();
        let menu = policy.build_menu("role_doctor").await.unwrap();
        assert_eq!(menu.len(), 2);
        assert_eq!(menu[0].name, "encounter");
        assert_eq!(menu[0].access_mode, AccessMode::ReadWrite);
        assert_eq!(menu[1].name, "v_doctor_my_schedule");
        assert_eq!(menu[1].kind, ObjectKind::View);
        assert_eq!(menu[1].access_mode, AccessMode::Read);
        assert_eq!(menu[1].display_name, "我的排班");

        // granted but absent from the catalog still shows, as a base table
        let reception = policy.build_menu("role_reception").await.unwrap();
        let ghost = reception.iter().find(|m| m.name == "ghost_view").unwrap();
        assert_eq!(ghost.kind, ObjectKind::Table);
    }

    #[tokio::test]
    async fn test_unknown_role_gets_empty_menu() {
        assert!(policy().build_menu("role_nobody").await.unwrap().is_empty());
    }

    #[test]
    fn test_access_mode_implies_visibility() {
        let policy = policy();
        for role in ["super_admin", "role_doctor", "role_reception", "role_nobody"] {
            for object in ["patient", "encounter", "bed", "v_doctor_my_schedule", "ghost_view"] {
                if policy.access_mode_for(role, object).unwrap() == AccessMode::ReadWrite {
                    assert!(policy.is_allowed(role, object).unwrap(), "{role} {object}");
                }
            }
        }
        assert!(!policy.is_allowed("role_doctor", "patient").unwrap());
        assert!(policy.can_insert("role_reception", "patient").unwrap());
        assert!(!policy.can_insert("role_doctor", "encounter").unwrap());
    }

    #[test]
    fn test_list_roles_includes_super_role() {
        let roles = policy().list_roles().unwrap();
        assert!(roles.contains(&"super_admin".to_string()));
        assert!(roles.contains(&"role_doctor".to_string()));
    }

    #[tokio::test]
    async fn test_authorize_error_order() {
        let policy = policy();

        let err = policy.authorize::<Read>("role_doctor", "patient; DROP").await.unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));

        let err = policy.authorize::<Read>("role_doctor", "patient").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(ref m) if m == "Object not permitted for this role"));

        let err = policy.authorize::<Write>("role_doctor", "v_doctor_my_schedule").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(ref m) if m == "Object is read-only for this role"));

        let err = policy.authorize::<Insert>("role_doctor", "encounter").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(ref m) if m == "Object is not insertable for this role"));

        let err = policy.authorize::<Read>("role_reception", "ghost_view").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = policy.authorize::<Read>("super_admin", "nothing_here").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_authorize_grants_token() {
        let policy = policy();
        let token = policy.authorize::<Write>("role_doctor", "encounter").await.unwrap();
        assert_eq!(token.object_name(), "encounter");
        assert_eq!(token.role(), "role_doctor");
        assert!(!token.decision().insertable);

        let token = policy.authorize::<Insert>("super_admin", "bed").await.unwrap();
        assert_eq!(token.object().comment, "床位");
    }
}
