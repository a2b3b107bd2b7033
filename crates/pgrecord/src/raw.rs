//! Opt-in raw SQL fragments.
//!
//! Structured predicates always bind their values. When a caller really needs
//! to splice SQL text into a WHERE clause, they wrap it in [`RawSql::trusted`],
//! which states that the text contains no untrusted input. Every execution of
//! a raw fragment logs an [`UnsafeQueryWarning`].

use crate::log::truncate_sql;
use std::fmt;

/// A SQL fragment inserted verbatim, without parameter binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSql(String);

impl RawSql {
    /// Wrap `sql`. The caller vouches that it contains no user input.
    pub fn trusted(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Diagnostic raised when a raw fragment is about to run. Not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeQueryWarning {
    /// The operation that received the fragment, e.g. `User::where_raw`.
    pub origin: String,
    pub fragment: String,
}

impl UnsafeQueryWarning {
    pub fn new(origin: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            fragment: fragment.into(),
        }
    }

    /// Log the warning on the `pgrecord.unsafe` target.
    pub fn emit(&self) {
        tracing::warn!(
            target: "pgrecord.unsafe",
            origin = %self.origin,
            fragment = %truncate_sql(&self.fragment, 200),
            "{self}",
        );
    }
}

impl fmt::Display for UnsafeQueryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executes a raw SQL fragment without parameter binding",
            self.origin
        )
    }
}
