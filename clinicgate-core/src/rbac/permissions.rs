//! Privilege verbs and the access levels derived from them

use serde::{Deserialize, Serialize};

/// Generic markers that stand for every privilege
const ALL_MARKERS: [&str; 2] = ["ALL", "ALL PRIVILEGES"];

/// Verbs that make an object writable
const WRITE_VERBS: [&str; 3] = ["INSERT", "UPDATE", "DELETE"];

fn has_all(privileges: &[String]) -> bool {
    privileges.iter().any(|p| ALL_MARKERS.contains(&p.as_str()))
}

/// True iff the verbs include an "all" marker or any of INSERT/UPDATE/DELETE
pub fn is_writable(privileges: &[String]) -> bool {
    has_all(privileges) || privileges.iter().any(|p| WRITE_VERBS.contains(&p.as_str()))
}

/// True iff the verbs include an "all" marker or INSERT
pub fn is_insertable(privileges: &[String]) -> bool {
    has_all(privileges) || privileges.iter().any(|p| p == "INSERT")
}

/// Access level of a role on one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    #[serde(rename = "R")]
    Read,
    #[serde(rename = "RW")]
    ReadWrite,
}

impl AccessMode {
    pub fn from_privileges(privileges: &[String]) -> Self {
        if is_writable(privileges) {
            AccessMode::ReadWrite
        } else {
            AccessMode::Read
        }
    }

    pub fn is_writable(self) -> bool {
        self == AccessMode::ReadWrite
    }
}

/// Derived, never stored: what a role may do with one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub visible: bool,
    pub access_mode: AccessMode,
    pub insertable: bool,
}

impl AccessDecision {
    /// Unrestricted access (super-role and wildcard grants)
    pub fn unrestricted() -> Self {
        Self { visible: true, access_mode: AccessMode::ReadWrite, insertable: true }
    }

    /// Object absent from the role's privilege map
    pub fn hidden() -> Self {
        Self { visible: false, access_mode: AccessMode::Read, insertable: false }
    }

    pub fn from_privileges(privileges: &[String]) -> Self {
        Self {
            visible: true,
            access_mode: AccessMode::from_privileges(privileges),
            insertable: is_insertable(privileges),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_writable_verbs() {
        assert!(!is_writable(&verbs(&["SELECT"])));
        assert!(!is_writable(&[]));
        assert!(is_writable(&verbs(&["SELECT", "UPDATE"])));
        assert!(is_writable(&verbs(&["DELETE"])));
        assert!(is_writable(&verbs(&["INSERT"])));
        assert!(is_writable(&verbs(&["ALL"])));
        assert!(is_writable(&verbs(&["ALL PRIVILEGES"])));
    }

    #[test]
    fn test_insertable_verbs() {
        assert!(!is_insertable(&verbs(&["SELECT", "UPDATE", "DELETE"])));
        assert!(is_insertable(&verbs(&["SELECT", "INSERT"])));
        assert!(is_insertable(&verbs(&["ALL PRIVILEGES"])));
    }

    #[test]
    fn test_access_mode_serializes_short_form() {
        assert_eq!(serde_json::to_string(&AccessMode::Read).unwrap(), "\"R\"");
        assert_eq!(serde_json::to_string(&AccessMode::ReadWrite).unwrap(), "\"RW\"");
    }

    #[test]
    fn test_hidden_decision_is_never_writable() {
        let decision = AccessDecision::hidden();
        assert!(!decision.visible);
        assert!(!decision.access_mode.is_writable());
        assert!(!decision.insertable);
    }
}
