//! Column/placeholder/value triples for parameterized statements.
//!
//! Every generated statement starts here: [`build_statement`] turns an
//! [`Attrs`] map into the pieces of `INSERT (cols) VALUES (…)`,
//! `(cols) = (…)` and `SET (cols) = ROW(…)` clauses. The start index lets
//! several predicate groups share one `$n` sequence.

use crate::error::OrmResult;
use crate::ident::check_ident;
use crate::value::{Attrs, Value};
use std::fmt::Write as _;

/// The pieces of a statement built from one attribute map.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Keys joined with `, `.
    pub columns: String,
    /// `$start, …, $(start + n - 1)` joined with `, `.
    pub placeholders: String,
    /// Values in key order.
    pub values: Vec<Value>,
    keys: Vec<String>,
    start: usize,
}

impl Statement {
    /// Build with placeholders starting at `$1`.
    pub fn from_attrs(attrs: &Attrs) -> Self {
        build_statement(attrs, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// The placeholder index following the last one of this statement.
    pub fn next_index(&self) -> usize {
        self.start + self.values.len()
    }

    /// `column = $n` pairs, one per attribute, in order.
    pub fn equalities(&self) -> Vec<String> {
        self.keys
            .iter()
            .zip(self.start..)
            .map(|(column, idx)| format!("{column} = ${idx}"))
            .collect()
    }
}

/// Build the column list, placeholder list and value list for `attrs`.
///
/// Pure: the output depends only on `attrs` (in insertion order) and `start`.
/// An empty map yields empty strings and no values.
pub fn build_statement(attrs: &Attrs, start: usize) -> Statement {
    let mut columns = String::new();
    let mut placeholders = String::new();
    let mut values = Vec::with_capacity(attrs.len());
    let mut keys = Vec::with_capacity(attrs.len());

    for (i, (key, value)) in attrs.iter().enumerate() {
        if i > 0 {
            columns.push_str(", ");
            placeholders.push_str(", ");
        }
        columns.push_str(key);
        let _ = write!(placeholders, "${}", start + i);
        values.push(value.clone());
        keys.push(key.to_string());
    }

    Statement {
        columns,
        placeholders,
        values,
        keys,
        start,
    }
}

/// Render `$start, …` for an `IN (…)` list of `count` values, or `NULL` when
/// there are none so the list stays valid SQL.
pub fn in_list_placeholders(count: usize, start: usize) -> String {
    if count == 0 {
        return "NULL".to_string();
    }
    (start..start + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reject any key of `attrs` that is not a plain (or dotted) identifier.
pub fn check_columns(attrs: &Attrs) -> OrmResult<()> {
    attrs.keys().try_for_each(check_ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;

    #[test]
    fn numbers_placeholders_from_one() {
        let st = Statement::from_attrs(&attrs! { "a" => 1, "b" => "x", "c" => true });
        assert_eq!(st.columns, "a, b, c");
        assert_eq!(st.placeholders, "$1, $2, $3");
        assert_eq!(
            st.values,
            vec![Value::Int(1), Value::Text("x".into()), Value::Bool(true)]
        );
        assert_eq!(st.next_index(), 4);
    }

    #[test]
    fn honours_start_index() {
        for start in [1usize, 2, 5, 10] {
            let st = build_statement(&attrs! { "x" => 1, "y" => 2 }, start);
            assert_eq!(st.placeholders, format!("${}, ${}", start, start + 1));
            assert_eq!(st.next_index(), start + 2);
        }
    }

    #[test]
    fn empty_attrs_build_empty_statement() {
        let st = build_statement(&Attrs::new(), 3);
        assert!(st.is_empty());
        assert_eq!(st.columns, "");
        assert_eq!(st.placeholders, "");
        assert_eq!(st.next_index(), 3);
        assert!(st.equalities().is_empty());
    }

    #[test]
    fn equalities_follow_start_index() {
        let st = build_statement(&attrs! { "a" => 1, "b" => 2 }, 4);
        assert_eq!(st.equalities(), ["a = $4", "b = $5"]);
    }

    #[test]
    fn equalities_pair_each_key_with_its_own_placeholder() {
        // Unchecked keys may contain the column separator.
        let st = build_statement(&attrs! { "a, b" => 1, "c" => 2 }, 1);
        assert_eq!(st.equalities(), ["a, b = $1", "c = $2"]);
        assert_eq!(st.equalities().len(), st.values.len());
    }

    #[test]
    fn in_list_uses_null_sentinel_when_empty() {
        assert_eq!(in_list_placeholders(0, 1), "NULL");
        assert_eq!(in_list_placeholders(3, 1), "$1, $2, $3");
    }

    #[test]
    fn check_columns_rejects_unsafe_keys() {
        assert!(check_columns(&attrs! { "name" => 1, "users.id" => 2 }).is_ok());
        let err = check_columns(&attrs! { "name = name OR 1" => 1 }).unwrap_err();
        assert!(err.is_invalid_statement());
    }
}
