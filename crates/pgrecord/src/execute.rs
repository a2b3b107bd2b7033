//! Execution adapter: run one parameterized statement and shape its rows.
//!
//! This is the only place record and query code reaches the database. SQL
//! text and values are handed to the client untouched; the adapter never
//! formats a value into SQL.

use crate::client::GenericClient;
use crate::error::OrmResult;
use crate::log;
use crate::model::{Model, Record};
use crate::row::FromRow;
use crate::value::{Attrs, Value};

/// Whether result rows are wrapped in records or returned as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cast {
    /// One [`Record`] per row.
    #[default]
    Records,
    /// Raw attribute maps.
    Rows,
}

/// Rows produced by an operation that takes a [`Cast`].
pub enum Fetched<M> {
    Records(Vec<Record<M>>),
    Rows(Vec<Attrs>),
}

// Manual impls: the model marker type needs none of these traits.
impl<M> std::fmt::Debug for Fetched<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fetched::Records(records) => f.debug_tuple("Records").field(records).finish(),
            Fetched::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
        }
    }
}

impl<M> Clone for Fetched<M> {
    fn clone(&self) -> Self {
        match self {
            Fetched::Records(records) => Fetched::Records(records.clone()),
            Fetched::Rows(rows) => Fetched::Rows(rows.clone()),
        }
    }
}

impl<M> PartialEq for Fetched<M> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Fetched::Records(a), Fetched::Records(b)) => a == b,
            (Fetched::Rows(a), Fetched::Rows(b)) => a == b,
            _ => false,
        }
    }
}

impl<M: Model> Fetched<M> {
    pub fn len(&self) -> usize {
        match self {
            Fetched::Records(records) => records.len(),
            Fetched::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records, wrapping raw rows if needed.
    pub fn into_records(self) -> Vec<Record<M>> {
        match self {
            Fetched::Records(records) => records,
            Fetched::Rows(rows) => rows.into_iter().map(Record::new).collect(),
        }
    }

    /// Raw rows, unwrapping records if needed.
    pub fn into_rows(self) -> Vec<Attrs> {
        match self {
            Fetched::Records(records) => records.into_iter().map(Record::into_attrs).collect(),
            Fetched::Rows(rows) => rows,
        }
    }
}

/// Run `sql` with `values` bound and return the raw rows.
///
/// A driver failure is returned as is; nothing else happens on that path.
pub async fn execute_rows(
    conn: &impl GenericClient,
    sql: &str,
    values: &[Value],
) -> OrmResult<Vec<Attrs>> {
    log::statement(sql, values.len());
    match conn.query(sql, values).await {
        Ok(rows) => Ok(rows),
        Err(err) => {
            log::failure(sql, &err);
            Err(err)
        }
    }
}

/// Run `sql` and construct one `Record<M>` per row, in row order.
pub async fn execute_records<M: Model>(
    conn: &impl GenericClient,
    sql: &str,
    values: &[Value],
) -> OrmResult<Vec<Record<M>>> {
    let rows = execute_rows(conn, sql, values).await?;
    Ok(rows.into_iter().map(Record::new).collect())
}

/// Run `sql` and shape the rows according to `cast`.
pub async fn execute_with<M: Model>(
    conn: &impl GenericClient,
    sql: &str,
    values: &[Value],
    cast: Cast,
) -> OrmResult<Fetched<M>> {
    let rows = execute_rows(conn, sql, values).await?;
    Ok(match cast {
        Cast::Records => Fetched::Records(rows.into_iter().map(Record::new).collect()),
        Cast::Rows => Fetched::Rows(rows),
    })
}

/// Run `sql` and map every row with [`FromRow`].
pub async fn execute_as<T: FromRow>(
    conn: &impl GenericClient,
    sql: &str,
    values: &[Value],
) -> OrmResult<Vec<T>> {
    let rows = execute_rows(conn, sql, values).await?;
    rows.iter().map(T::from_row).collect()
}

/// Run a statement that returns no rows; yields the affected row count.
pub async fn execute_command(
    conn: &impl GenericClient,
    sql: &str,
    values: &[Value],
) -> OrmResult<u64> {
    log::statement(sql, values.len());
    match conn.execute(sql, values).await {
        Ok(n) => Ok(n),
        Err(err) => {
            log::failure(sql, &err);
            Err(err)
        }
    }
}
