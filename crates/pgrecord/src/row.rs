//! Row mapping traits and utilities

use crate::error::{OrmError, OrmResult};
use crate::value::{Attrs, FromValue};

/// Trait for converting a result row into a Rust struct.
///
/// # Example
///
/// ```ignore
/// use pgrecord::{Attrs, FromRow, OrmResult, RowExt};
///
/// struct User {
///     id: i64,
///     username: String,
///     email: Option<String>,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Attrs) -> OrmResult<Self> {
///         Ok(Self {
///             id: row.try_get_column("id")?,
///             username: row.try_get_column("username")?,
///             email: row.try_get_column("email")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a row into Self
    fn from_row(row: &Attrs) -> OrmResult<Self>;
}

impl FromRow for Attrs {
    fn from_row(row: &Attrs) -> OrmResult<Self> {
        Ok(row.clone())
    }
}

/// Extension trait for rows to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning OrmError::Decode on failure
    fn try_get_column<T: FromValue>(&self, column: &str) -> OrmResult<T>;
}

impl RowExt for Attrs {
    fn try_get_column<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column not present in row"))?;
        T::from_value(value).ok_or_else(|| {
            OrmError::decode(
                column,
                format!(
                    "cannot read {} value as {}",
                    value.kind(),
                    std::any::type_name::<T>()
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;

    struct User {
        id: i64,
        email: Option<String>,
    }

    impl FromRow for User {
        fn from_row(row: &Attrs) -> OrmResult<Self> {
            Ok(Self {
                id: row.try_get_column("id")?,
                email: row.try_get_column("email")?,
            })
        }
    }

    #[test]
    fn maps_row_into_struct() {
        let row = attrs! { "id" => 3, "email" => None::<String> };
        let user = User::from_row(&row).unwrap();
        assert_eq!(user.id, 3);
        assert_eq!(user.email, None);
    }

    #[test]
    fn reports_missing_and_mismatched_columns() {
        let row = attrs! { "id" => "three" };
        match User::from_row(&row) {
            Err(OrmError::Decode { column, .. }) => assert_eq!(column, "id"),
            other => panic!("expected decode error, got {:?}", other.err()),
        }

        let row = attrs! { "id" => 3 };
        match User::from_row(&row) {
            Err(OrmError::Decode { column, message }) => {
                assert_eq!(column, "email");
                assert!(message.contains("not present"));
            }
            other => panic!("expected decode error, got {:?}", other.err()),
        }
    }
}
