//! Table, foreign-key and join-table names derived from model names.

use heck::ToSnakeCase;

/// `UserPhoto` -> `user_photo`.
pub fn to_underscore(name: &str) -> String {
    name.to_snake_case()
}

/// Pluralize the last underscore-delimited segment of `word`; the rest is
/// left unchanged. Irregular and uncountable words follow `pluralizer`.
pub fn pluralize(word: &str) -> String {
    match word.rsplit_once('_') {
        Some((head, last)) => format!("{head}_{}", pluralizer::pluralize(last, 2, false)),
        None => pluralizer::pluralize(word, 2, false),
    }
}

/// Table name for a model name: snake case with a pluralized last segment.
pub fn table_name(model_name: &str) -> String {
    pluralize(&to_underscore(model_name))
}

/// Foreign-key column pointing at `model_name`: `Customer` -> `customer_id`.
pub fn foreign_key(model_name: &str) -> String {
    format!("{}_id", to_underscore(model_name))
}

/// Join table for a many-to-many pair: the two table names sorted and
/// joined with `_`, so both sides agree on it.
pub fn join_table_name(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}
