use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clinicgate_core::rbac::{GrantStore, GrantTable};

use super::load_config;

/// Parse the configured grant script and print what each role may do.
pub fn run(config_path: Option<&Path>, role: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = GrantStore::from_file(
        &config.access.grants_file,
        config.grant_schema(),
        config.access.strict_grants,
    );
    let table = store
        .table()
        .with_context(|| format!("Failed to load {}", config.access.grants_file.display()))?;

    if let Some(role) = role {
        if !table.list_roles(&config.access.super_role).iter().any(|r| r == role) {
            bail!("Role '{}' has no grants in {}", role, config.access.grants_file.display());
        }
    }

    print!("{}", render(&table, &config.access.super_role, role));
    Ok(())
}

fn render(table: &GrantTable, super_role: &str, only: Option<&str>) -> String {
    let mut out = String::new();
    for role in table.list_roles(super_role) {
        if only.is_some_and(|r| r != role) {
            continue;
        }
        if role == super_role {
            let _ = writeln!(out, "{} (super role): all objects, RW", role);
            continue;
        }
        if table.role_has_all(&role) {
            let _ = writeln!(out, "{}: ALL PRIVILEGES on every object", role);
            continue;
        }
        let privileges = table.privileges_for(&role);
        let _ = writeln!(out, "{}: {} object(s)", role, privileges.len());
        for (object, verbs) in privileges {
            let _ = writeln!(out, "  {:<40} {}", object, verbs.join(", "));
        }
    }

    if only.is_none() && !table.skipped().is_empty() {
        let _ = writeln!(out, "\n{} grant line(s) skipped:", table.skipped().len());
        for skipped in table.skipped() {
            let _ = writeln!(out, "  line {}: {} ({})", skipped.line_no, skipped.line, skipped.reason);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "
GRANT SELECT ON hospital_test.v_doctor_my_schedule TO role_doctor;
GRANT SELECT, UPDATE ON hospital_test.encounter TO role_doctor;
GRANT ALL PRIVILEGES ON hospital_test.* TO role_admin;
GRANT SELEKT ON hospital_test.patient TO;
";

    #[test]
    fn render_lists_roles_and_skips() {
        let table = GrantTable::parse(SCRIPT, "hospital_test");
        let out = render(&table, "super_admin", None);

        assert!(out.contains("super_admin (super role)"));
        assert!(out.contains("role_admin: ALL PRIVILEGES"));
        assert!(out.contains("role_doctor: 2 object(s)"));
        assert!(out.contains("encounter"));
        assert!(out.contains("1 grant line(s) skipped"));
    }

    #[test]
    fn render_single_role() {
        let table = GrantTable::parse(SCRIPT, "hospital_test");
        let out = render(&table, "super_admin", Some("role_doctor"));
        assert!(out.starts_with("role_doctor"));
        assert!(!out.contains("role_admin"));
        assert!(!out.contains("skipped"));
    }
}
