//! Model trait and record instances.
//!
//! A model is a marker type with a fixed name; everything else (table name,
//! relation joins, accessor names) is derived from that name on demand.
//!
//! ```ignore
//! use pgrecord::{attrs, ColumnType, Model, Relation};
//!
//! struct Customer;
//! struct Order;
//!
//! impl Model for Customer {
//!     const NAME: &'static str = "Customer";
//!     fn relations() -> Vec<Relation> {
//!         vec![Relation::has_many::<Order>()]
//!     }
//! }
//!
//! impl Model for Order {
//!     const NAME: &'static str = "Order";
//!     fn columns() -> Vec<(&'static str, ColumnType)> {
//!         vec![("customer_id", ColumnType::Int), ("total", ColumnType::Int)]
//!     }
//!     fn relations() -> Vec<Relation> {
//!         vec![Relation::belongs_to::<Customer>()]
//!     }
//! }
//!
//! let order = Order::create(&pool, attrs! { "customer_id" => 7, "total" => 40 }).await?;
//! let customer = order.accessor("customer")?.first::<Customer>(&pool).await?;
//! ```

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::execute::{self, Cast, Fetched};
use crate::gather::Gathered;
use crate::ident::check_ident;
use crate::naming;
use crate::query::Query;
use crate::raw::{RawSql, UnsafeQueryWarning};
use crate::relation::Relation;
use crate::row::RowExt;
use crate::statement::{Statement, check_columns};
use crate::value::{Attrs, ColumnType, FromValue, Value};
use serde::{Serialize, Serializer};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// A table-backed model.
///
/// Only [`Model::NAME`] is required. Every finder and constructor is a
/// provided method; override `columns` to enable [`Model::create_table`] and
/// `relations` to enable accessors and joins.
pub trait Model: Sized + Send + Sync + 'static {
    /// Model name in upper camel case, e.g. `"UserPhoto"`.
    const NAME: &'static str;

    /// Declared columns, excluding the implicit `id` primary key.
    fn columns() -> Vec<(&'static str, ColumnType)> {
        Vec::new()
    }

    fn relations() -> Vec<Relation> {
        Vec::new()
    }

    /// `UserPhoto` -> `user_photos`. Recomputed on every call.
    fn table_name() -> String {
        naming::table_name(Self::NAME)
    }

    /// `INSERT INTO t (cols) VALUES ($1, …) RETURNING *`.
    fn create(
        conn: &impl GenericClient,
        attrs: Attrs,
    ) -> impl Future<Output = OrmResult<Record<Self>>> + Send {
        async move {
            let (sql, values) = insert_sql::<Self>(&attrs)?;
            let mut records = execute::execute_records::<Self>(conn, &sql, &values).await?;
            if records.is_empty() {
                return Err(OrmError::Other(format!(
                    "INSERT INTO {} returned no row",
                    Self::table_name()
                )));
            }
            Ok(records.swap_remove(0))
        }
    }

    /// [`Model::create`], returning raw rows when `cast` is [`Cast::Rows`].
    fn create_with(
        conn: &impl GenericClient,
        attrs: Attrs,
        cast: Cast,
    ) -> impl Future<Output = OrmResult<Fetched<Self>>> + Send {
        async move {
            let (sql, values) = insert_sql::<Self>(&attrs)?;
            execute::execute_with::<Self>(conn, &sql, &values, cast).await
        }
    }

    /// `SELECT * FROM t WHERE (k1, …) = ($1, …)`; no attributes match every row.
    fn where_eq(
        conn: &impl GenericClient,
        attrs: Attrs,
    ) -> impl Future<Output = OrmResult<Vec<Record<Self>>>> + Send {
        async move {
            let (sql, values) = where_sql::<Self>(&attrs, false)?;
            execute::execute_records::<Self>(conn, &sql, &values).await
        }
    }

    fn where_eq_with(
        conn: &impl GenericClient,
        attrs: Attrs,
        cast: Cast,
    ) -> impl Future<Output = OrmResult<Fetched<Self>>> + Send {
        async move {
            let (sql, values) = where_sql::<Self>(&attrs, false)?;
            execute::execute_with::<Self>(conn, &sql, &values, cast).await
        }
    }

    /// `SELECT * FROM t WHERE NOT (k1, …) = ($1, …)`.
    fn where_not(
        conn: &impl GenericClient,
        attrs: Attrs,
    ) -> impl Future<Output = OrmResult<Vec<Record<Self>>>> + Send {
        async move {
            let (sql, values) = where_sql::<Self>(&attrs, true)?;
            execute::execute_records::<Self>(conn, &sql, &values).await
        }
    }

    /// `SELECT * FROM t WHERE <fragment>`, with no parameter binding.
    fn where_raw(
        conn: &impl GenericClient,
        fragment: RawSql,
    ) -> impl Future<Output = OrmResult<Vec<Record<Self>>>> + Send {
        async move {
            UnsafeQueryWarning::new(format!("{}::where_raw", Self::NAME), fragment.as_str()).emit();
            let sql = format!("SELECT * FROM {} WHERE {}", Self::table_name(), fragment);
            execute::execute_records::<Self>(conn, &sql, &[]).await
        }
    }

    /// `SELECT * FROM t WHERE (<left>) = (<right>)`, with no parameter binding.
    fn where_pair_raw(
        conn: &impl GenericClient,
        left: RawSql,
        right: RawSql,
    ) -> impl Future<Output = OrmResult<Vec<Record<Self>>>> + Send {
        async move {
            UnsafeQueryWarning::new(
                format!("{}::where_pair_raw", Self::NAME),
                format!("({left}) = ({right})"),
            )
            .emit();
            let sql = format!(
                "SELECT * FROM {} WHERE ({}) = ({})",
                Self::table_name(),
                left,
                right
            );
            execute::execute_records::<Self>(conn, &sql, &[]).await
        }
    }

    /// The record with `id`, or `None`.
    fn find(
        conn: &impl GenericClient,
        id: impl Into<Value> + Send,
    ) -> impl Future<Output = OrmResult<Option<Record<Self>>>> + Send {
        async move {
            let records = Self::where_eq(conn, Attrs::new().with("id", id)).await?;
            Ok(records.into_iter().next())
        }
    }

    /// Like [`Model::find`] but a missing row is [`OrmError::NotFound`].
    fn find_or_fail(
        conn: &impl GenericClient,
        id: impl Into<Value> + Send,
    ) -> impl Future<Output = OrmResult<Record<Self>>> + Send {
        async move {
            let id = id.into();
            let label = id.to_string();
            Self::find(conn, id)
                .await?
                .ok_or_else(|| OrmError::not_found(format!("{} with id {}", Self::NAME, label)))
        }
    }

    fn all(conn: &impl GenericClient) -> impl Future<Output = OrmResult<Vec<Record<Self>>>> + Send {
        Self::where_eq(conn, Attrs::new())
    }

    /// `CREATE TABLE IF NOT EXISTS` from [`Model::columns`], with a serial `id`.
    fn create_table(conn: &impl GenericClient) -> impl Future<Output = OrmResult<()>> + Send {
        async move {
            let sql = create_table_sql::<Self>()?;
            execute::execute_command(conn, &sql, &[]).await?;
            Ok(())
        }
    }

    /// A fresh fluent query for this model.
    fn query() -> Query<Self> {
        Query::new()
    }

    /// A fresh gathering accumulator for this model.
    fn gather() -> Gathered<Self> {
        Gathered::new()
    }
}

fn insert_sql<M: Model>(attrs: &Attrs) -> OrmResult<(String, Vec<Value>)> {
    check_columns(attrs)?;
    if attrs.is_empty() {
        return Ok((
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", M::table_name()),
            Vec::new(),
        ));
    }
    let st = Statement::from_attrs(attrs);
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        M::table_name(),
        st.columns,
        st.placeholders
    );
    Ok((sql, st.values))
}

fn where_sql<M: Model>(attrs: &Attrs, negate: bool) -> OrmResult<(String, Vec<Value>)> {
    check_columns(attrs)?;
    let table = M::table_name();
    if attrs.is_empty() {
        return Ok((format!("SELECT * FROM {table} WHERE 1 = 1"), Vec::new()));
    }
    let st = Statement::from_attrs(attrs);
    let not = if negate { "NOT " } else { "" };
    let sql = format!(
        "SELECT * FROM {table} WHERE {not}({}) = ({})",
        st.columns, st.placeholders
    );
    Ok((sql, st.values))
}

fn create_table_sql<M: Model>() -> OrmResult<String> {
    let mut defs = vec!["id SERIAL PRIMARY KEY".to_string()];
    for (name, ty) in M::columns() {
        if name == "id" {
            continue;
        }
        check_ident(name)?;
        defs.push(format!("{name} {}", ty.sql_type()));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        M::table_name(),
        defs.join(", ")
    ))
}

/// One row of `M`'s table.
pub struct Record<M> {
    attrs: Attrs,
    _model: PhantomData<fn() -> M>,
}

impl<M> Record<M> {
    pub fn new(attrs: Attrs) -> Self {
        Self {
            attrs,
            _model: PhantomData,
        }
    }

    /// The `id` attribute, if present and not null.
    pub fn id(&self) -> Option<&Value> {
        self.attrs.get("id").filter(|v| !v.is_null())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attrs.get(column)
    }

    /// Typed read of one attribute.
    pub fn get_as<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        self.attrs.try_get_column(column)
    }

    /// Set an attribute locally; nothing is written until
    /// [`Record::update_attributes`].
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.attrs.insert(column, value);
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn into_attrs(self) -> Attrs {
        self.attrs
    }
}

impl<M: Model> Record<M> {
    /// Write `new_attrs` to this record's row and merge the returned row back.
    ///
    /// Fails with [`OrmError::Precondition`] before any query when the record
    /// has no `id`, and with [`OrmError::NotFound`] when no row has that `id`
    /// any more; the local attributes are left untouched in both cases. An
    /// empty map is a no-op.
    pub async fn update_attributes(
        &mut self,
        conn: &impl GenericClient,
        new_attrs: Attrs,
    ) -> OrmResult<()> {
        let Some(id) = self.id().cloned() else {
            return Err(OrmError::precondition(format!(
                "{} must have id to update attributes",
                M::NAME
            )));
        };
        if new_attrs.is_empty() {
            return Ok(());
        }
        check_columns(&new_attrs)?;

        let st = Statement::from_attrs(&new_attrs);
        let sql = format!(
            "UPDATE {} SET ({}) = ROW({}) WHERE id = ${} RETURNING *",
            M::table_name(),
            st.columns,
            st.placeholders,
            st.next_index()
        );
        let mut values = st.values;
        values.push(id.clone());

        let rows = execute::execute_rows(conn, &sql, &values).await?;
        let Some(row) = rows.into_iter().next() else {
            return Err(OrmError::not_found(format!(
                "{} with id {id} to update",
                M::NAME
            )));
        };
        self.attrs.merge(new_attrs);
        self.attrs.merge(row);
        Ok(())
    }
}

// Manual impls: the model marker type needs none of these traits.
impl<M> fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Record").field(&self.attrs).finish()
    }
}

impl<M> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self::new(self.attrs.clone())
    }
}

impl<M> PartialEq for Record<M> {
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }
}

impl<M> Serialize for Record<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.attrs.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use crate::test_client::{MemoryClient, capture_events};

    struct UserPhoto;

    impl Model for UserPhoto {
        const NAME: &'static str = "UserPhoto";

        fn columns() -> Vec<(&'static str, ColumnType)> {
            vec![
                ("caption", ColumnType::String),
                ("taken_on", ColumnType::Date),
                ("public", ColumnType::Bool),
            ]
        }
    }

    #[test]
    fn table_name_from_model_name() {
        assert_eq!(UserPhoto::table_name(), "user_photos");
    }

    #[tokio::test]
    async fn create_inserts_and_returns_row() {
        let client = MemoryClient::new();
        client.push_rows(vec![attrs! { "id" => 1, "caption" => "sunset" }]);

        let photo = UserPhoto::create(&client, attrs! { "caption" => "sunset" })
            .await
            .unwrap();
        assert_eq!(photo.id(), Some(&Value::Int(1)));

        let calls = client.calls();
        assert_eq!(
            calls[0].sql,
            "INSERT INTO user_photos (caption) VALUES ($1) RETURNING *"
        );
        assert_eq!(calls[0].values, vec![Value::from("sunset")]);
    }

    #[tokio::test]
    async fn create_without_attributes_uses_defaults() {
        let client = MemoryClient::new();
        client.push_rows(vec![attrs! { "id" => 5 }]);

        UserPhoto::create(&client, Attrs::new()).await.unwrap();
        assert_eq!(
            client.sqls(),
            ["INSERT INTO user_photos DEFAULT VALUES RETURNING *"]
        );
    }

    #[tokio::test]
    async fn create_with_rows_cast() {
        let client = MemoryClient::new();
        client.push_rows(vec![attrs! { "id" => 2, "caption" => "a" }]);

        let fetched = UserPhoto::create_with(&client, attrs! { "caption" => "a" }, Cast::Rows)
            .await
            .unwrap();
        assert_eq!(fetched.into_rows(), vec![attrs! { "id" => 2, "caption" => "a" }]);
    }

    #[tokio::test]
    async fn where_eq_uses_tuple_equality() {
        let client = MemoryClient::new();
        UserPhoto::where_eq(&client, attrs! { "caption" => "x", "public" => true })
            .await
            .unwrap();
        UserPhoto::where_eq(&client, Attrs::new()).await.unwrap();

        let calls = client.calls();
        assert_eq!(
            calls[0].sql,
            "SELECT * FROM user_photos WHERE (caption, public) = ($1, $2)"
        );
        assert_eq!(calls[0].values, vec![Value::from("x"), Value::Bool(true)]);
        assert_eq!(calls[1].sql, "SELECT * FROM user_photos WHERE 1 = 1");
    }

    #[tokio::test]
    async fn where_not_negates_tuple() {
        let client = MemoryClient::new();
        UserPhoto::where_not(&client, attrs! { "public" => false })
            .await
            .unwrap();
        assert_eq!(
            client.sqls(),
            ["SELECT * FROM user_photos WHERE NOT (public) = ($1)"]
        );
    }

    #[tokio::test]
    async fn raw_finders_splice_fragments() {
        let client = MemoryClient::new();
        UserPhoto::where_raw(&client, RawSql::trusted("taken_on > now() - interval '1 day'"))
            .await
            .unwrap();
        UserPhoto::where_pair_raw(&client, RawSql::trusted("lower(caption)"), RawSql::trusted("'x'"))
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(
            calls[0].sql,
            "SELECT * FROM user_photos WHERE taken_on > now() - interval '1 day'"
        );
        assert!(calls[0].values.is_empty());
        assert_eq!(
            calls[1].sql,
            "SELECT * FROM user_photos WHERE (lower(caption)) = ('x')"
        );
    }

    #[tokio::test]
    async fn raw_finders_warn_before_dispatch() {
        let client = MemoryClient::new();
        let (_guard, events) = capture_events();

        UserPhoto::where_raw(&client, RawSql::trusted("public"))
            .await
            .unwrap();
        assert_eq!(events.warnings_on("pgrecord.unsafe"), 1);
        assert_eq!(events.targets(), ["pgrecord.unsafe", "pgrecord.sql"]);

        UserPhoto::where_pair_raw(&client, RawSql::trusted("id"), RawSql::trusted("1"))
            .await
            .unwrap();
        assert_eq!(events.warnings_on("pgrecord.unsafe"), 2);
        assert_eq!(
            events.targets()[2..],
            ["pgrecord.unsafe", "pgrecord.sql"]
        );
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn structured_finders_emit_no_unsafe_warning() {
        let client = MemoryClient::new();
        client.push_rows(vec![attrs! { "id" => 1 }]);
        let (_guard, events) = capture_events();

        UserPhoto::create(&client, attrs! { "caption" => "a" }).await.unwrap();
        UserPhoto::where_eq(&client, attrs! { "public" => true }).await.unwrap();
        UserPhoto::where_not(&client, attrs! { "public" => true }).await.unwrap();
        UserPhoto::find(&client, 1).await.unwrap();

        assert_eq!(events.warnings_on("pgrecord.unsafe"), 0);
        assert_eq!(events.targets().len(), 4);
    }

    #[tokio::test]
    async fn rejects_unsafe_column_names_before_querying() {
        let client = MemoryClient::new();
        let err = UserPhoto::where_eq(&client, attrs! { "1 = 1 OR caption" => "x" })
            .await
            .unwrap_err();
        assert!(err.is_invalid_statement());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn find_returns_first_row() {
        let client = MemoryClient::new();
        client.push_rows(vec![attrs! { "id" => 9, "caption" => "c" }]);

        let found = UserPhoto::find(&client, 9).await.unwrap().unwrap();
        assert_eq!(found.get_as::<String>("caption").unwrap(), "c");
        assert_eq!(
            client.calls()[0].sql,
            "SELECT * FROM user_photos WHERE (id) = ($1)"
        );
        assert_eq!(client.calls()[0].values, vec![Value::Int(9)]);
    }

    #[tokio::test]
    async fn find_or_fail_reports_not_found() {
        let client = MemoryClient::new();
        let err = UserPhoto::find_or_fail(&client, 3).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("UserPhoto with id 3"));
    }

    #[tokio::test]
    async fn update_without_id_issues_no_query() {
        let client = MemoryClient::new();
        let mut photo = Record::<UserPhoto>::new(attrs! { "caption" => "old" });

        let err = photo
            .update_attributes(&client, attrs! { "caption" => "new" })
            .await
            .unwrap_err();
        assert!(err.is_precondition());
        assert!(client.calls().is_empty());

        let mut photo = Record::<UserPhoto>::new(attrs! { "id" => Value::Null });
        assert!(
            photo
                .update_attributes(&client, attrs! { "caption" => "new" })
                .await
                .unwrap_err()
                .is_precondition()
        );
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn update_numbers_id_after_attributes() {
        let client = MemoryClient::new();
        client.push_rows(vec![
            attrs! { "id" => 4, "caption" => "new", "public" => true },
        ]);
        let mut photo = Record::<UserPhoto>::new(attrs! { "id" => 4, "caption" => "old" });

        photo
            .update_attributes(&client, attrs! { "caption" => "new", "public" => true })
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(
            calls[0].sql,
            "UPDATE user_photos SET (caption, public) = ROW($1, $2) WHERE id = $3 RETURNING *"
        );
        assert_eq!(
            calls[0].values,
            vec![Value::from("new"), Value::Bool(true), Value::Int(4)]
        );
        assert_eq!(photo.get("caption"), Some(&Value::from("new")));
        assert_eq!(photo.get("public"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn update_of_deleted_row_is_not_found() {
        let client = MemoryClient::new();
        let mut photo = Record::<UserPhoto>::new(attrs! { "id" => 99, "caption" => "old" });

        let err = photo
            .update_attributes(&client, attrs! { "caption" => "new" })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("UserPhoto with id 99"));
        assert_eq!(client.calls().len(), 1);
        assert_eq!(photo.get("caption"), Some(&Value::from("old")));
    }

    #[tokio::test]
    async fn empty_update_is_a_no_op() {
        let client = MemoryClient::new();
        let mut photo = Record::<UserPhoto>::new(attrs! { "id" => 4 });
        photo.update_attributes(&client, Attrs::new()).await.unwrap();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn create_table_from_columns() {
        let client = MemoryClient::new();
        UserPhoto::create_table(&client).await.unwrap();
        assert_eq!(
            client.sqls(),
            ["CREATE TABLE IF NOT EXISTS user_photos (id SERIAL PRIMARY KEY, caption TEXT, taken_on DATE, public BOOLEAN)"]
        );
    }

    #[test]
    fn record_serializes_as_its_attributes() {
        let photo = Record::<UserPhoto>::new(attrs! { "id" => 1, "caption" => "c" });
        let json = serde_json::to_string(&photo).unwrap();
        assert_eq!(json, r#"{"id":1,"caption":"c"}"#);
    }
}
