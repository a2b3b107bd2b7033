//! Relation descriptors and per-record relation accessors.
//!
//! A model lists its relations in [`Model::relations`]. Accessors are never
//! stored on a record: each call to [`Record::accessor`] derives a fresh
//! [`RelationQuery`] from the record's current attributes, and every
//! `fetch` on it issues a new query.

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::execute;
use crate::ident::check_ident;
use crate::model::{Model, Record};
use crate::naming;
use crate::value::{Attrs, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
    HasAndBelongsToMany,
}

/// A declared relation from one model to a target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    kind: RelationKind,
    target_name: &'static str,
    target_table: String,
    foreign_key: Option<String>,
    join_table: Option<String>,
}

impl Relation {
    fn to<T: Model>(kind: RelationKind) -> Self {
        Self {
            kind,
            target_name: T::NAME,
            target_table: T::table_name(),
            foreign_key: None,
            join_table: None,
        }
    }

    /// `T` rows whose `<this>_id` equals this record's `id`.
    pub fn has_many<T: Model>() -> Self {
        Self::to::<T>(RelationKind::HasMany)
    }

    /// Like `has_many`, limited to one row.
    pub fn has_one<T: Model>() -> Self {
        Self::to::<T>(RelationKind::HasOne)
    }

    /// The `T` row whose `id` equals this record's `<t>_id`.
    pub fn belongs_to<T: Model>() -> Self {
        Self::to::<T>(RelationKind::BelongsTo)
    }

    /// `T` rows linked through a join table named after both tables.
    pub fn has_and_belongs_to_many<T: Model>() -> Self {
        Self::to::<T>(RelationKind::HasAndBelongsToMany)
    }

    /// Override the foreign-key column. For `belongs_to` it lives on this
    /// model's table, for many-to-many it is the join-table column pointing
    /// at this model, otherwise it lives on the target's table.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Override the many-to-many join table name.
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn target_name(&self) -> &'static str {
        self.target_name
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    /// `orders` for has-many/many-to-many, `customer` for has-one/belongs-to.
    pub fn accessor_name(&self) -> String {
        match self.kind {
            RelationKind::HasMany | RelationKind::HasAndBelongsToMany => {
                naming::pluralize(&naming::to_underscore(self.target_name))
            }
            RelationKind::HasOne | RelationKind::BelongsTo => {
                naming::to_underscore(self.target_name)
            }
        }
    }

    /// Whether `target` names this relation by accessor, model or table name.
    pub(crate) fn matches(&self, target: &str) -> bool {
        target == self.accessor_name() || target == self.target_name || target == self.target_table
    }

    /// The foreign-key column for a relation declared on `M`.
    pub(crate) fn foreign_key_for<M: Model>(&self) -> OrmResult<String> {
        let column = match (&self.foreign_key, self.kind) {
            (Some(column), _) => column.clone(),
            (None, RelationKind::BelongsTo) => naming::foreign_key(self.target_name),
            (None, _) => naming::foreign_key(M::NAME),
        };
        check_ident(&column)?;
        Ok(column)
    }

    pub(crate) fn join_table_for<M: Model>(&self) -> OrmResult<String> {
        let table = match &self.join_table {
            Some(table) => table.clone(),
            None => naming::join_table_name(&M::table_name(), &self.target_table),
        };
        check_ident(&table)?;
        Ok(table)
    }

    /// Build the accessor query for `record`.
    pub fn query_for<M: Model>(&self, record: &Record<M>) -> OrmResult<RelationQuery> {
        let target = &self.target_table;
        let (sql, value) = match self.kind {
            RelationKind::HasMany | RelationKind::HasOne => {
                let fk = self.foreign_key_for::<M>()?;
                let limit = if self.kind == RelationKind::HasOne { " LIMIT 1" } else { "" };
                (
                    format!("SELECT * FROM {target} WHERE ({fk}) = ($1){limit}"),
                    record_id(record)?,
                )
            }
            RelationKind::BelongsTo => {
                let fk = self.foreign_key_for::<M>()?;
                let value = record
                    .get(&fk)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .ok_or_else(|| {
                        OrmError::precondition(format!(
                            "{} must have {fk} to load {}",
                            M::NAME,
                            self.accessor_name()
                        ))
                    })?;
                (format!("SELECT * FROM {target} WHERE (id) = ($1)"), value)
            }
            RelationKind::HasAndBelongsToMany => {
                let join = self.join_table_for::<M>()?;
                let this_fk = self.foreign_key_for::<M>()?;
                let target_fk = naming::foreign_key(self.target_name);
                (
                    format!(
                        "SELECT {target}.* FROM {target} \
                         INNER JOIN {join} ON {join}.{target_fk} = {target}.id \
                         WHERE ({join}.{this_fk}) = ($1)"
                    ),
                    record_id(record)?,
                )
            }
        };
        Ok(RelationQuery {
            name: self.accessor_name(),
            sql,
            values: vec![value],
        })
    }
}

fn record_id<M: Model>(record: &Record<M>) -> OrmResult<Value> {
    record.id().cloned().ok_or_else(|| {
        OrmError::precondition(format!("{} must have id to load relations", M::NAME))
    })
}

/// A ready-to-run relation lookup for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationQuery {
    name: String,
    sql: String,
    values: Vec<Value>,
}

impl RelationQuery {
    /// Accessor name this query was built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub async fn fetch_rows(&self, conn: &impl GenericClient) -> OrmResult<Vec<Attrs>> {
        execute::execute_rows(conn, &self.sql, &self.values).await
    }

    pub async fn fetch<T: Model>(&self, conn: &impl GenericClient) -> OrmResult<Vec<Record<T>>> {
        execute::execute_records::<T>(conn, &self.sql, &self.values).await
    }

    pub async fn first<T: Model>(&self, conn: &impl GenericClient) -> OrmResult<Option<Record<T>>> {
        Ok(self.fetch::<T>(conn).await?.into_iter().next())
    }
}

impl<M: Model> Record<M> {
    /// Accessor names of every declared relation, in declaration order.
    pub fn accessors(&self) -> Vec<String> {
        M::relations().iter().map(Relation::accessor_name).collect()
    }

    /// The relation query for accessor `name`.
    pub fn accessor(&self, name: &str) -> OrmResult<RelationQuery> {
        M::relations()
            .iter()
            .find(|r| r.accessor_name() == name)
            .ok_or_else(|| {
                OrmError::invalid_statement(format!("{} has no relation `{name}`", M::NAME))
            })?
            .query_for(self)
    }

    /// The relation query for the first declared relation targeting `T`.
    pub fn related<T: Model>(&self) -> OrmResult<RelationQuery> {
        M::relations()
            .iter()
            .find(|r| r.target_name == T::NAME)
            .ok_or_else(|| {
                OrmError::invalid_statement(format!(
                    "{} declares no relation to {}",
                    M::NAME,
                    T::NAME
                ))
            })?
            .query_for(self)
    }
}
