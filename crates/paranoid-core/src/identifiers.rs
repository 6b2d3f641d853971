//! SQL identifier quoting and validation utilities.

use std::sync::OnceLock;

use regex::Regex;

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// # Examples
///
/// ```
/// use paranoid_core::quote_ident;
///
/// assert_eq!(quote_ident("user"), "\"user\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(IDENTIFIER_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(error = %e, "identifier pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Whether `name` is a plain identifier (letters, digits, underscore; not
/// starting with a digit).
///
/// Registered tables and columns must satisfy this so the `<table>__<column>`
/// result aliases stay unambiguous.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.contains("__") && identifier_pattern().is_some_and(|re| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_simple() {
        assert_eq!(quote_ident("users"), "\"users\"");
    }

    #[test]
    fn test_quote_ident_sql_keyword() {
        assert_eq!(quote_ident("group"), "\"group\"");
        assert_eq!(quote_ident("user"), "\"user\"");
    }

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("user_group"));
        assert!(is_valid_identifier("_hidden"));
        assert!(is_valid_identifier("deleted_at"));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1user"));
        assert!(!is_valid_identifier("user name"));
        assert!(!is_valid_identifier("user;DROP"));
        assert!(!is_valid_identifier("user__name"));
    }
}
