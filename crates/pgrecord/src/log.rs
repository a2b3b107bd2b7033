//! `tracing` events emitted around statement execution.
//!
//! Targets:
//! - `pgrecord.sql`: every statement, at `DEBUG`, before dispatch; failures at `WARN`.
//! - `pgrecord.unsafe`: raw fragments executed without parameter binding, at `WARN`.
//! - `pgrecord.migrate`: migration progress, at `INFO`.

use crate::error::OrmError;

/// Longest SQL text (in bytes) included in an event.
const MAX_SQL_LENGTH: usize = 200;

/// Truncate to at most `max` bytes on a char boundary.
pub(crate) fn truncate_sql(sql: &str, max: usize) -> std::borrow::Cow<'_, str> {
    if sql.len() <= max {
        return sql.into();
    }
    let mut end = max;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end]).into()
}

pub(crate) fn statement(sql: &str, param_count: usize) {
    tracing::debug!(
        target: "pgrecord.sql",
        param_count,
        sql = %truncate_sql(sql, MAX_SQL_LENGTH),
    );
}

pub(crate) fn failure(sql: &str, err: &OrmError) {
    tracing::warn!(
        target: "pgrecord.sql",
        error = %err,
        sql = %truncate_sql(sql, MAX_SQL_LENGTH),
        "statement failed",
    );
}
