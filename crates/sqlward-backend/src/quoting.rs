//! Identifier and literal quoting per dialect.
//!
//! Object names cannot be bind parameters in DDL, so every identifier that
//! reaches a statement goes through [`Dialect::quote_identifier`] and every
//! inline value through [`Dialect::quote_literal`]. The exact escaping here
//! is compatibility-significant: tools inspecting audit logs depend on it.

use crate::config::Dialect;

impl Dialect {
    /// Quote an identifier (database, role, schema, extension name).
    ///
    /// Postgres-wire dialects double-quote and double embedded quotes;
    /// `MySQL` backticks and doubles embedded backticks.
    #[must_use]
    pub fn quote_identifier(&self, identifier: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Cockroach => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
            Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
        }
    }

    /// Quote a literal value (password, enumerated option value).
    ///
    /// Postgres-wire dialects double embedded single quotes; if the value
    /// contains a backslash the `E''` escape-string form is used with
    /// backslashes doubled, matching the libpq quoting rules. `MySQL`
    /// backslash-escapes both quote characters and backslashes.
    #[must_use]
    pub fn quote_literal(&self, value: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Cockroach => {
                let escaped = value.replace('\'', "''");
                if escaped.contains('\\') {
                    format!("E'{}'", escaped.replace('\\', "\\\\"))
                } else {
                    format!("'{escaped}'")
                }
            }
            Dialect::MySql => {
                let escaped = value
                    .replace('\\', "\\\\")
                    .replace('\'', "\\'")
                    .replace('"', "\\\"");
                format!("'{escaped}'")
            }
        }
    }
}
