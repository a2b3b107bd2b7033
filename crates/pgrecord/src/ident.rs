//! Column and table name checks.
//!
//! Postgres cannot bind identifiers as parameters, so every column name that
//! reaches generated SQL goes through these checks first. A name is one or
//! more dot-separated segments, each matching `[A-Za-z_][A-Za-z0-9_$]*`.

use crate::error::{OrmError, OrmResult};

fn check_segment(full: &str, segment: &str) -> OrmResult<()> {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return Err(OrmError::invalid_statement(format!(
            "empty identifier segment in `{full}`"
        )));
    };
    if !(first == '_' || first.is_ascii_alphabetic()) {
        return Err(OrmError::invalid_statement(format!(
            "invalid identifier start character '{first}' in `{full}`"
        )));
    }
    if let Some(bad) = chars.find(|c| !(*c == '_' || *c == '$' || c.is_ascii_alphanumeric())) {
        return Err(OrmError::invalid_statement(format!(
            "invalid character '{bad}' in identifier `{full}`"
        )));
    }
    Ok(())
}

/// Validate a (possibly dotted) column or table name.
pub fn check_ident(name: &str) -> OrmResult<()> {
    if name.is_empty() {
        return Err(OrmError::invalid_statement("identifier cannot be empty"));
    }
    for segment in name.split('.') {
        check_segment(name, segment)?;
    }
    Ok(())
}

/// Validate a select-list entry: an identifier, `*`, or `<table>.*`.
pub fn check_select_column(name: &str) -> OrmResult<()> {
    if name == "*" {
        return Ok(());
    }
    match name.strip_suffix(".*") {
        Some(table) => check_ident(table),
        None => check_ident(name),
    }
}
