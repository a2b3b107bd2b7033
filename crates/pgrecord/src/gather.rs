//! Gathering query: collect predicates over several calls, run them once.
//!
//! [`Gathered`] is owned by the caller, so two tasks can never mix their
//! predicates. [`Gathered::execute`] always leaves the accumulator empty,
//! whether the query succeeds or not.

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::execute::{self, Cast, Fetched};
use crate::ident::check_select_column;
use crate::model::{Model, Record};
use crate::relation::{Relation, RelationKind};
use crate::statement::{build_statement, check_columns};
use crate::value::{Attrs, Value};
use std::marker::PhantomData;

/// Accumulated `where` / `where not` / `select` / `join` state for `M`.
pub struct Gathered<M> {
    where_eq: Attrs,
    where_not: Attrs,
    select: Vec<String>,
    joins: Vec<String>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Default for Gathered<M> {
    fn default() -> Self {
        Self {
            where_eq: Attrs::new(),
            where_not: Attrs::new(),
            select: Vec::new(),
            joins: Vec::new(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> Gathered<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge equality predicates; a repeated key keeps the latest value.
    pub fn gather_where(&mut self, attrs: Attrs) -> &mut Self {
        self.where_eq.merge(attrs);
        self
    }

    /// Merge negated predicates; a repeated key keeps the latest value.
    pub fn gather_where_not(&mut self, attrs: Attrs) -> &mut Self {
        self.where_not.merge(attrs);
        self
    }

    /// Replace the select list.
    pub fn gather_select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append one join per target. A target is a declared relation's
    /// accessor name, model name or table name; anything else fails and
    /// leaves the joins unchanged.
    pub fn joins(&mut self, targets: &[&str]) -> OrmResult<&mut Self> {
        let relations = M::relations();
        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            let relation = relations.iter().find(|r| r.matches(target)).ok_or_else(|| {
                OrmError::invalid_statement(format!(
                    "{} has no relation to join on `{target}`",
                    M::NAME
                ))
            })?;
            resolved.push(join_sql::<M>(relation)?);
        }
        self.joins.extend(resolved);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.where_eq.is_empty()
            && self.where_not.is_empty()
            && self.select.is_empty()
            && self.joins.is_empty()
    }

    /// Render the accumulated query without running it or clearing state.
    pub fn to_sql(&self) -> OrmResult<(String, Vec<Value>)> {
        check_columns(&self.where_eq)?;
        check_columns(&self.where_not)?;
        for column in &self.select {
            check_select_column(column)?;
        }

        let table = M::table_name();
        let eq = build_statement(&self.where_eq, 1);
        let not = build_statement(&self.where_not, eq.next_index());

        let mut conditions = eq.equalities();
        if !not.is_empty() {
            conditions.push(format!("NOT ({}) = ({})", not.columns, not.placeholders));
        }
        let conditions = if conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let select = if !self.select.is_empty() {
            self.select.join(", ")
        } else if self.joins.is_empty() {
            "*".to_string()
        } else {
            format!("{table}.*")
        };

        let mut sql = format!("SELECT {select} FROM {table}");
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);

        let mut values = eq.values;
        values.extend(not.values);
        Ok((sql, values))
    }

    pub async fn execute(&mut self, conn: &impl GenericClient) -> OrmResult<Vec<Record<M>>> {
        Ok(self.execute_with(conn, Cast::Records).await?.into_records())
    }

    /// Run the accumulated query and reset the accumulator.
    pub async fn execute_with(
        &mut self,
        conn: &impl GenericClient,
        cast: Cast,
    ) -> OrmResult<Fetched<M>> {
        let state = std::mem::take(self);
        let (sql, values) = state.to_sql()?;
        execute::execute_with::<M>(conn, &sql, &values, cast).await
    }
}

fn join_sql<M: Model>(relation: &Relation) -> OrmResult<String> {
    let this = M::table_name();
    let target = relation.target_table();
    Ok(match relation.kind() {
        RelationKind::HasMany | RelationKind::HasOne => {
            let fk = relation.foreign_key_for::<M>()?;
            format!("INNER JOIN {target} ON {target}.{fk} = {this}.id")
        }
        RelationKind::BelongsTo => {
            let fk = relation.foreign_key_for::<M>()?;
            format!("INNER JOIN {target} ON {target}.id = {this}.{fk}")
        }
        RelationKind::HasAndBelongsToMany => {
            let join = relation.join_table_for::<M>()?;
            let this_fk = relation.foreign_key_for::<M>()?;
            let target_fk = crate::naming::foreign_key(relation.target_name());
            format!(
                "INNER JOIN {join} ON {join}.{this_fk} = {this}.id \
                 INNER JOIN {target} ON {target}.id = {join}.{target_fk}"
            )
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use crate::test_client::MemoryClient;

    struct Customer;
    struct Order;
    struct Tag;

    impl Model for Customer {
        const NAME: &'static str = "Customer";
        fn relations() -> Vec<Relation> {
            vec![Relation::has_many::<Order>()]
        }
    }

    impl Model for Order {
        const NAME: &'static str = "Order";
        fn relations() -> Vec<Relation> {
            vec![
                Relation::belongs_to::<Customer>(),
                Relation::has_and_belongs_to_many::<Tag>(),
            ]
        }
    }

    impl Model for Tag {
        const NAME: &'static str = "Tag";
    }

    #[tokio::test]
    async fn gathers_then_clears() {
        let client = MemoryClient::new();
        let mut q = Order::gather();
        q.gather_where(attrs! { "a" => 1 });
        q.gather_where(attrs! { "b" => 2 });
        q.execute(&client).await.unwrap();
        q.execute(&client).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls[0].sql, "SELECT * FROM orders WHERE a = $1 AND b = $2");
        assert_eq!(calls[0].values, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(calls[1].sql, "SELECT * FROM orders WHERE 1 = 1");
        assert!(calls[1].values.is_empty());
    }

    #[test]
    fn later_keys_win_and_select_is_replaced() {
        let mut q = Order::gather();
        q.gather_where(attrs! { "a" => 1 })
            .gather_where(attrs! { "a" => 3 })
            .gather_select(["id"])
            .gather_select(["id", "total"]);

        let (sql, values) = q.to_sql().unwrap();
        assert_eq!(sql, "SELECT id, total FROM orders WHERE a = $1");
        assert_eq!(values, vec![Value::Int(3)]);
    }

    #[test]
    fn where_not_continues_numbering() {
        let mut q = Order::gather();
        q.gather_where(attrs! { "a" => 1, "b" => 2 })
            .gather_where_not(attrs! { "c" => 3, "d" => 4 });

        let (sql, values) = q.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM orders WHERE a = $1 AND b = $2 AND NOT (c, d) = ($3, $4)"
        );
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn joins_follow_relation_kind() {
        let mut q = Order::gather();
        q.joins(&["customer", "tags"]).unwrap();
        let (sql, _) = q.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT orders.* FROM orders \
             INNER JOIN customers ON customers.id = orders.customer_id \
             INNER JOIN orders_tags ON orders_tags.order_id = orders.id \
             INNER JOIN tags ON tags.id = orders_tags.tag_id \
             WHERE 1 = 1"
        );

        let mut q = Customer::gather();
        q.joins(&["Order"]).unwrap();
        q.gather_where(attrs! { "orders.total" => 40 });
        let (sql, _) = q.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT customers.* FROM customers \
             INNER JOIN orders ON orders.customer_id = customers.id \
             WHERE orders.total = $1"
        );
    }

    #[test]
    fn many_to_many_join_honours_foreign_key_override() {
        struct Article;

        impl Model for Article {
            const NAME: &'static str = "Article";
            fn relations() -> Vec<Relation> {
                vec![
                    Relation::has_and_belongs_to_many::<Tag>()
                        .join_table("taggings")
                        .foreign_key("taggable_id"),
                ]
            }
        }

        let mut q = Article::gather();
        q.joins(&["tags"]).unwrap();
        let (sql, _) = q.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT articles.* FROM articles \
             INNER JOIN taggings ON taggings.taggable_id = articles.id \
             INNER JOIN tags ON tags.id = taggings.tag_id \
             WHERE 1 = 1"
        );
    }

    #[test]
    fn unresolved_join_fails_fast() {
        let mut q = Order::gather();
        let err = q.joins(&["customer", "invoices"]).err().unwrap();
        assert!(err.is_invalid_statement());
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn failed_execute_still_clears() {
        let client = MemoryClient::new();
        client.push_error(OrmError::Other("boom".into()));

        let mut q = Order::gather();
        q.gather_where(attrs! { "a" => 1 }).gather_select(["id"]);
        assert!(q.execute(&client).await.is_err());
        assert!(q.is_empty());

        let mut q = Order::gather();
        q.gather_where(attrs! { "bad key" => 1 });
        assert!(q.execute(&client).await.unwrap_err().is_invalid_statement());
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn rows_cast_returns_raw_maps() {
        let client = MemoryClient::new();
        client.push_rows(vec![attrs! { "id" => 1 }]);
        let fetched = Order::gather()
            .gather_where(attrs! { "id" => 1 })
            .execute_with(&client, Cast::Rows)
            .await
            .unwrap();
        assert_eq!(fetched.into_rows(), vec![attrs! { "id" => 1 }]);
    }
}
