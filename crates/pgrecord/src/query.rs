//! Fluent query builder for one model.
//!
//! ```ignore
//! use pgrecord::{attrs, Model, RawSql};
//!
//! let adults = User::query()
//!     .where_attrs(attrs! { "active" => true })
//!     .where_raw(RawSql::trusted("age >= 18"))
//!     .select(["id", "name"])
//!     .execute(&pool)
//!     .await?;
//! ```

use crate::client::GenericClient;
use crate::error::OrmResult;
use crate::execute::{self, Cast, Fetched};
use crate::ident::check_select_column;
use crate::model::{Model, Record};
use crate::raw::{RawSql, UnsafeQueryWarning};
use crate::row::FromRow;
use crate::statement::check_columns;
use crate::value::{Attrs, Value};
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Attrs(Attrs),
    Raw(RawSql),
}

#[derive(Debug, Clone, PartialEq)]
enum SelectItem {
    Column(String),
    Raw(RawSql),
}

/// An instance-scoped `SELECT` against `M`'s table.
pub struct Query<M> {
    clauses: Vec<Clause>,
    select: Vec<SelectItem>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Default for Query<M> {
    fn default() -> Self {
        Self {
            clauses: Vec::new(),
            select: Vec::new(),
            _model: PhantomData,
        }
    }
}

impl<M> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            clauses: self.clauses.clone(),
            select: self.select.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("clauses", &self.clauses)
            .field("select", &self.select)
            .finish()
    }
}

impl<M: Model> Query<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key = $n` predicates, one per attribute.
    pub fn where_attrs(mut self, attrs: Attrs) -> Self {
        self.clauses.push(Clause::Attrs(attrs));
        self
    }

    /// Add several attribute maps at once, in order.
    pub fn where_all(mut self, list: impl IntoIterator<Item = Attrs>) -> Self {
        self.clauses.extend(list.into_iter().map(Clause::Attrs));
        self
    }

    /// Add a raw predicate. It is logged as unsafe each time the query runs.
    pub fn where_raw(mut self, fragment: RawSql) -> Self {
        self.clauses.push(Clause::Raw(fragment));
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select
            .extend(columns.into_iter().map(|c| SelectItem::Column(c.into())));
        self
    }

    /// Add a select expression verbatim, e.g. `count(*) AS n`.
    pub fn select_raw(mut self, expr: RawSql) -> Self {
        self.select.push(SelectItem::Raw(expr));
        self
    }

    fn raw_fragments(&self) -> Vec<&str> {
        let clauses = self.clauses.iter().filter_map(|c| match c {
            Clause::Raw(raw) => Some(raw.as_str()),
            Clause::Attrs(_) => None,
        });
        let selects = self.select.iter().filter_map(|s| match s {
            SelectItem::Raw(raw) => Some(raw.as_str()),
            SelectItem::Column(_) => None,
        });
        clauses.chain(selects).collect()
    }

    /// Render the statement and its bound values.
    ///
    /// Attribute predicates number their placeholders consecutively in call
    /// order; raw fragments keep a leading space. No predicates render as
    /// `WHERE 1 = 1`.
    pub fn build(&self) -> OrmResult<(String, Vec<Value>)> {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        for clause in &self.clauses {
            match clause {
                Clause::Attrs(attrs) => {
                    check_columns(attrs)?;
                    for (key, value) in attrs.iter() {
                        values.push(value.clone());
                        conditions.push(format!("{key} = ${}", values.len()));
                    }
                }
                Clause::Raw(raw) => conditions.push(format!(" {raw}")),
            }
        }

        let mut columns = Vec::with_capacity(self.select.len());
        for item in &self.select {
            match item {
                SelectItem::Column(column) => {
                    check_select_column(column)?;
                    columns.push(column.as_str());
                }
                SelectItem::Raw(raw) => columns.push(raw.as_str()),
            }
        }
        let select = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        let conditions = if conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let sql = format!(
            "SELECT {select} FROM {} WHERE {conditions}",
            M::table_name()
        );
        Ok((sql, values))
    }

    fn prepare(&self) -> OrmResult<(String, Vec<Value>)> {
        let built = self.build()?;
        let raw = self.raw_fragments();
        if !raw.is_empty() {
            UnsafeQueryWarning::new(format!("Query<{}>::execute", M::NAME), raw.join(" AND "))
                .emit();
        }
        Ok(built)
    }

    pub async fn execute(&self, conn: &impl GenericClient) -> OrmResult<Vec<Record<M>>> {
        let (sql, values) = self.prepare()?;
        execute::execute_records::<M>(conn, &sql, &values).await
    }

    pub async fn execute_with(&self, conn: &impl GenericClient, cast: Cast) -> OrmResult<Fetched<M>> {
        let (sql, values) = self.prepare()?;
        execute::execute_with::<M>(conn, &sql, &values, cast).await
    }

    /// Run the query and map rows into `T`.
    pub async fn fetch_as<T: FromRow>(&self, conn: &impl GenericClient) -> OrmResult<Vec<T>> {
        let (sql, values) = self.prepare()?;
        execute::execute_as::<T>(conn, &sql, &values).await
    }

    /// First record, if any. No `LIMIT` is added.
    pub async fn first(&self, conn: &impl GenericClient) -> OrmResult<Option<Record<M>>> {
        Ok(self.execute(conn).await?.into_iter().next())
    }
}
