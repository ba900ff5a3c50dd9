//! Privilege table parsed from a static GRANT script
//!
//! Each relevant line has the shape
//! `GRANT <verbs> ON <schema>.<object> TO <role>;` (case-insensitive, backticks allowed).
//! A `*` object marks the role as having every object. Lines that are not GRANT
//! statements are ignored; GRANT lines naming an object that do not fit the grammar
//! are reported as skipped and warn-logged (or rejected in strict mode).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::sql;
use crate::{Error, Result};

/// Grants held by one role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGrants {
    /// Wildcard grant on `<schema>.*`; wins over per-object entries
    pub all: bool,
    /// Object name -> ordered, de-duplicated verbs
    pub objects: BTreeMap<String, Vec<String>>,
}

/// A GRANT line that could not be represented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGrant {
    pub line_no: usize,
    pub line: String,
    pub reason: String,
}

/// Per-role privilege map
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    roles: BTreeMap<String, RoleGrants>,
    skipped: Vec<SkippedGrant>,
}

struct ParsedGrant {
    verbs: Vec<String>,
    schema: String,
    object: String,
    role: String,
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches('`').trim()
}

/// Byte offset of `keyword` surrounded by whitespace, searching from `from`
fn find_keyword(upper: &str, keyword: &str, from: usize) -> Option<usize> {
    let bytes = upper.as_bytes();
    let mut start = from;
    while let Some(pos) = upper[start..].find(keyword) {
        let at = start + pos;
        let before_ok = at == 0 || bytes[at - 1].is_ascii_whitespace();
        let end = at + keyword.len();
        let after_ok = end >= bytes.len() || bytes[end].is_ascii_whitespace();
        if before_ok && after_ok {
            return Some(at);
        }
        start = at + keyword.len();
    }
    None
}

fn parse_line(line: &str) -> std::result::Result<ParsedGrant, String> {
    let statement = line
        .strip_suffix(';')
        .ok_or_else(|| "statement is not terminated by ';'".to_string())?
        .trim_end();
    let upper = statement.to_ascii_uppercase();

    let statement = match upper.strip_suffix("WITH GRANT OPTION") {
        Some(rest) => statement[..rest.len()].trim_end(),
        None => statement,
    };
    let upper = &upper[..statement.len()];

    let on = find_keyword(upper, "ON", 5).ok_or_else(|| "missing ON clause".to_string())?;
    let to = find_keyword(upper, "TO", on + 2).ok_or_else(|| "missing TO clause".to_string())?;

    let verbs: Vec<String> = statement["GRANT".len()..on]
        .split(',')
        .map(|v| v.trim().to_ascii_uppercase())
        .filter(|v| !v.is_empty())
        .collect();
    if verbs.is_empty() {
        return Err("no privileges listed".to_string());
    }

    let target = statement[on + 2..to].trim();
    let (schema, object) =
        target.split_once('.').ok_or_else(|| format!("target '{}' is not schema-qualified", target))?;
    let (schema, object) = (strip_quotes(schema), strip_quotes(object));
    if object != "*" && sql::sanitize(object).is_none() {
        return Err(format!("invalid object name '{}'", object));
    }

    let role = strip_quotes(&statement[to + 2..]);
    if sql::sanitize(role).is_none() {
        return Err(format!("invalid role '{}'", role));
    }

    Ok(ParsedGrant {
        verbs,
        schema: schema.to_string(),
        object: object.to_string(),
        role: role.to_string(),
    })
}

impl GrantTable {
    /// Parse a grant script, keeping only grants on `schema`
    pub fn parse(content: &str, schema: &str) -> Self {
        let mut table = GrantTable::default();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            let upper = line.to_ascii_uppercase();
            if !upper.starts_with("GRANT") {
                continue;
            }
            // Role-membership grants (`GRANT role_x TO 'user'@'host';`) carry no object
            if find_keyword(&upper, "ON", 5).is_none() {
                log::debug!("Ignoring role-membership grant on line {}", idx + 1);
                continue;
            }

            match parse_line(line) {
                Ok(grant) if !grant.schema.eq_ignore_ascii_case(schema) => {
                    log::debug!(
                        "Ignoring grant on schema '{}' (line {}), expected '{}'",
                        grant.schema,
                        idx + 1,
                        schema
                    );
                }
                Ok(grant) => table.insert(grant),
                Err(reason) => {
                    log::warn!("Skipping unparseable grant on line {}: {} ({})", idx + 1, line, reason);
                    table.skipped.push(SkippedGrant {
                        line_no: idx + 1,
                        line: line.to_string(),
                        reason,
                    });
                }
            }
        }

        table
    }

    fn insert(&mut self, grant: ParsedGrant) {
        let entry = self.roles.entry(grant.role).or_default();
        if grant.object == "*" {
            entry.all = true;
            return;
        }
        let verbs = entry.objects.entry(grant.object).or_default();
        for verb in grant.verbs {
            if !verbs.contains(&verb) {
                verbs.push(verb);
            }
        }
    }

    /// Roles named in the table plus the super-role
    pub fn list_roles(&self, super_role: &str) -> Vec<String> {
        let mut roles: BTreeSet<String> = self.roles.keys().cloned().collect();
        roles.insert(super_role.to_string());
        roles.into_iter().collect()
    }

    pub fn role_has_all(&self, role: &str) -> bool {
        self.roles.get(role).map(|g| g.all).unwrap_or(false)
    }

    /// Object -> verbs for `role`; empty for unknown roles
    pub fn privileges_for(&self, role: &str) -> BTreeMap<String, Vec<String>> {
        self.roles.get(role).map(|g| g.objects.clone()).unwrap_or_default()
    }

    /// Verbs `role` holds on `object`, if any
    pub fn object_privileges(&self, role: &str, object: &str) -> Option<&[String]> {
        self.roles.get(role).and_then(|g| g.objects.get(object)).map(Vec::as_slice)
    }

    pub fn skipped(&self) -> &[SkippedGrant] {
        &self.skipped
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }
}

/// Where the grant script comes from
#[derive(Debug, Clone)]
pub enum GrantSource {
    File(PathBuf),
    Inline(String),
}

/// Lazily parsed, process-lifetime privilege table
///
/// The table is read on first use and then shared read-only.
/// [`GrantStore::invalidate`] drops it so the next access re-reads the source.
#[derive(Debug)]
pub struct GrantStore {
    source: GrantSource,
    schema: String,
    strict: bool,
    cached: RwLock<Option<Arc<GrantTable>>>,
}

impl GrantStore {
    pub fn new(source: GrantSource, schema: impl Into<String>, strict: bool) -> Self {
        Self { source, schema: schema.into(), strict, cached: RwLock::new(None) }
    }

    pub fn from_file(path: impl Into<PathBuf>, schema: impl Into<String>, strict: bool) -> Self {
        Self::new(GrantSource::File(path.into()), schema, strict)
    }

    pub fn inline(content: impl Into<String>, schema: impl Into<String>) -> Self {
        Self::new(GrantSource::Inline(content.into()), schema, false)
    }

    /// The parsed table, loading it on first access
    pub fn table(&self) -> Result<Arc<GrantTable>> {
        if let Some(table) = self.cached.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(table.clone());
        }

        let mut slot = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = slot.as_ref() {
            return Ok(table.clone());
        }

        let table = Arc::new(self.load()?);
        *slot = Some(table.clone());
        Ok(table)
    }

    fn load(&self) -> Result<GrantTable> {
        let content = match &self.source {
            GrantSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::GrantSource(format!("cannot read grant file {}: {}", path.display(), e))
            })?,
            GrantSource::Inline(content) => content.clone(),
        };

        let table = GrantTable::parse(&content, &self.schema);
        if self.strict && !table.skipped.is_empty() {
            let first = &table.skipped[0];
            return Err(Error::GrantSource(format!(
                "{} unparseable grant line(s); first at line {}: {} ({})",
                table.skipped.len(),
                first.line_no,
                first.line,
                first.reason
            )));
        }

        log::info!(
            "Loaded privilege table: {} role(s), {} skipped line(s)",
            table.role_count(),
            table.skipped.len()
        );
        Ok(table)
    }

    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
-- role setup
CREATE ROLE IF NOT EXISTS role_doctor;
GRANT SELECT ON hospital_test.v_doctor_my_schedule TO role_doctor;
GRANT SELECT, INSERT, UPDATE ON hospital_test.encounter TO role_doctor;
grant select on `hospital_test`.`patient` to `role_reception`;
GRANT ALL PRIVILEGES ON hospital_test.* TO role_admin;
GRANT SELECT ON other_db.secret TO role_doctor;
GRANT role_doctor TO 'app'@'localhost';
GRANT SELECT ON hospital_test.bad-name TO role_doctor;
GRANT SELECT ON hospital_test.invoice TO role_cashier WITH GRANT OPTION;
GRANT UPDATE ON hospital_test.encounter TO role_doctor;
"#;

    #[test]
    fn test_parse_per_object_grants() {
        let table = GrantTable::parse(SCRIPT, "hospital_test");
        let doctor = table.privileges_for("role_doctor");
        assert_eq!(doctor.len(), 2);
        assert_eq!(doctor["v_doctor_my_schedule"], vec!["SELECT"]);
        assert_eq!(doctor["encounter"], vec!["SELECT", "INSERT", "UPDATE"]);
        assert!(!doctor.contains_key("secret"));
        assert_eq!(table.privileges_for("role_reception")["patient"], vec!["SELECT"]);
        assert_eq!(table.privileges_for("role_cashier")["invoice"], vec!["SELECT"]);
    }

    #[test]
    fn test_wildcard_sets_has_all() {
        let table = GrantTable::parse(SCRIPT, "hospital_test");
        assert!(table.role_has_all("role_admin"));
        assert!(table.privileges_for("role_admin").is_empty());
        assert!(!table.role_has_all("role_doctor"));
        assert!(!table.role_has_all("nobody"));
    }

    #[test]
    fn test_list_roles_always_includes_super_role() {
        let table = GrantTable::parse(SCRIPT, "hospital_test");
        let roles = table.list_roles("super_admin");
        assert!(roles.contains(&"super_admin".to_string()));
        assert!(roles.contains(&"role_doctor".to_string()));
        assert!(roles.contains(&"role_reception".to_string()));

        let empty = GrantTable::parse("", "hospital_test");
        assert_eq!(empty.list_roles("super_admin"), vec!["super_admin".to_string()]);
    }

    #[test]
    fn test_malformed_lines_are_reported_not_fatal() {
        let table = GrantTable::parse(SCRIPT, "hospital_test");
        assert_eq!(table.skipped().len(), 1);
        assert_eq!(table.skipped()[0].line_no, 10);
        assert!(table.skipped()[0].reason.contains("bad-name"));
    }

    #[test]
    fn test_strict_store_rejects_malformed_lines() {
        let store = GrantStore::new(GrantSource::Inline(SCRIPT.to_string()), "hospital_test", true);
        assert!(matches!(store.table(), Err(Error::GrantSource(_))));

        let lenient = GrantStore::inline(SCRIPT, "hospital_test");
        assert!(lenient.table().is_ok());
    }

    #[test]
    fn test_store_loads_once_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.sql");
        std::fs::write(&path, "GRANT SELECT ON hospital_test.patient TO role_nurse;\n").unwrap();

        let store = GrantStore::from_file(&path, "hospital_test", false);
        assert!(store.table().unwrap().object_privileges("role_nurse", "patient").is_some());

        std::fs::write(&path, "GRANT SELECT ON hospital_test.bed TO role_nurse;\n").unwrap();
        assert!(store.table().unwrap().object_privileges("role_nurse", "bed").is_none());

        store.invalidate();
        assert!(store.table().unwrap().object_privileges("role_nurse", "bed").is_some());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let store = GrantStore::from_file("/nonexistent/grants.sql", "hospital_test", false);
        assert!(matches!(store.table(), Err(Error::GrantSource(_))));
    }
}
