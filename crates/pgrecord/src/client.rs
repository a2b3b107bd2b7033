//! Generic client trait for unified database access.

use crate::error::{OrmError, OrmResult};
use crate::value::{Attrs, Value};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// The database surface every record and query operation runs against.
///
/// Implemented for plain connections, transactions and pooled clients, so
/// the same model code works inside or outside a transaction. SQL text and
/// values are always passed separately; values travel as bound parameters.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all rows as ordered attribute maps.
    fn query(
        &self,
        sql: &str,
        values: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<Vec<Attrs>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        values: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send;

    /// Execute one or more statements with no parameters (used for SQL migrations).
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<()>> + Send;
}

pub(crate) fn params_ref(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

/// Decode every column of `row` into a [`Value`], keeping column order.
pub fn row_to_attrs(row: &Row) -> OrmResult<Attrs> {
    let mut attrs = Attrs::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value: Value = row
            .try_get(idx)
            .map_err(|e| OrmError::decode(column.name(), e.to_string()))?;
        attrs.insert(column.name(), value);
    }
    Ok(attrs)
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, values: &[Value]) -> OrmResult<Vec<Attrs>> {
        let params = params_ref(values);
        let rows = tokio_postgres::Client::query(self, sql, &params)
            .await
            .map_err(OrmError::from_db_error)?;
        rows.iter().map(row_to_attrs).collect()
    }

    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<u64> {
        let params = params_ref(values);
        tokio_postgres::Client::execute(self, sql, &params)
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(OrmError::from_db_error)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, values: &[Value]) -> OrmResult<Vec<Attrs>> {
        let params = params_ref(values);
        let rows = tokio_postgres::Transaction::query(self, sql, &params)
            .await
            .map_err(OrmError::from_db_error)?;
        rows.iter().map(row_to_attrs).collect()
    }

    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<u64> {
        let params = params_ref(values);
        tokio_postgres::Transaction::execute(self, sql, &params)
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(OrmError::from_db_error)
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, values: &[Value]) -> OrmResult<Vec<Attrs>> {
        let client: &tokio_postgres::Client = self;
        GenericClient::query(client, sql, values).await
    }

    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<u64> {
        let client: &tokio_postgres::Client = self;
        GenericClient::execute(client, sql, values).await
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        let client: &tokio_postgres::Client = self;
        GenericClient::batch_execute(client, sql).await
    }
}

/// A pool checks out one connection per call. When every connection is busy
/// the call waits for one to be released; that queueing belongs to deadpool.
#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Pool {
    async fn query(&self, sql: &str, values: &[Value]) -> OrmResult<Vec<Attrs>> {
        let client = self.get().await?;
        GenericClient::query(&client, sql, values).await
    }

    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<u64> {
        let client = self.get().await?;
        GenericClient::execute(&client, sql, values).await
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        let client = self.get().await?;
        GenericClient::batch_execute(&client, sql).await
    }
}

// ===== Reference implementations =====

impl<C: GenericClient> GenericClient for &C {
    async fn query(&self, sql: &str, values: &[Value]) -> OrmResult<Vec<Attrs>> {
        (**self).query(sql, values).await
    }

    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<u64> {
        (**self).execute(sql, values).await
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        (**self).batch_execute(sql).await
    }
}
