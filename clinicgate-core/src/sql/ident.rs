//! SQL identifier sanitizer
//!
//! Placeholders can carry values but never identifiers, so every table, column,
//! role or routine name that ends up as raw SQL text goes through [`sanitize`] first.

use crate::{Error, Result};

/// Return the name unchanged when it matches `^[A-Za-z0-9_]+$`, otherwise `None`.
pub fn sanitize(name: &str) -> Option<&str> {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        Some(name)
    } else {
        None
    }
}

/// Same as [`sanitize`] but turns a rejection into [`Error::InvalidIdentifier`].
///
/// `what` names the kind of identifier in the error message ("object name", "column", ...).
pub fn require(name: &str, what: &str) -> Result<String> {
    sanitize(name)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidIdentifier(format!("Invalid {}: {:?}", what, name)))
}

/// Backtick-quote an identifier that already passed [`sanitize`].
pub fn quote(name: &str) -> String {
    format!("`{}`", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        assert_eq!(sanitize("patient_id"), Some("patient_id"));
        assert_eq!(sanitize("v_lab_worklist"), Some("v_lab_worklist"));
        assert_eq!(sanitize("Table2"), Some("Table2"));
    }

    #[test]
    fn test_rejects_everything_else() {
        assert_eq!(sanitize("patient; DROP TABLE x"), None);
        assert_eq!(sanitize(""), None);
        assert_eq!(sanitize("a-b"), None);
        assert_eq!(sanitize("`patient`"), None);
        assert_eq!(sanitize("patient id"), None);
        assert_eq!(sanitize("患者"), None);
        assert_eq!(sanitize("a\nb"), None);
    }

    #[test]
    fn test_require_reports_kind() {
        let err = require("x y", "object name").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
        assert!(err.to_string().contains("object name"));
        assert_eq!(require("staff", "object name").unwrap(), "staff");
    }
}
