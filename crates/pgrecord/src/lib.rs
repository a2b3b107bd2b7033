//! # pgrecord
//!
//! A small active-record style mapper for PostgreSQL, with a sequential
//! migration runner.
//!
//! ## Features
//!
//! - **Bound values only**: every structured predicate sends its values as
//!   `$n` parameters; raw SQL needs an explicit [`RawSql::trusted`] and is
//!   logged as unsafe when it runs
//! - **Derived names**: `UserPhoto` maps to `user_photos`, relations map to
//!   `<model>_id` foreign keys and sorted join tables
//! - **Typed relations**: has-many, has-one, belongs-to and many-to-many,
//!   declared with [`Relation`] and loaded on demand
//! - **Two query styles**: the caller-owned [`Gathered`] accumulator and the
//!   fluent [`Query`] builder
//! - **Transaction-friendly**: anything implementing [`GenericClient`] works,
//!   including pools, pooled clients and transactions
//! - **Migrations**: ordered scripts with a `migrations` ledger table
//!
//! ## Example
//!
//! ```ignore
//! use pgrecord::{attrs, create_pool, Model, Relation};
//!
//! struct User;
//! struct Post;
//!
//! impl Model for User {
//!     const NAME: &'static str = "User";
//!     fn relations() -> Vec<Relation> {
//!         vec![Relation::has_many::<Post>()]
//!     }
//! }
//!
//! impl Model for Post {
//!     const NAME: &'static str = "Post";
//! }
//!
//! let pool = create_pool(&std::env::var("DATABASE_URL")?)?;
//!
//! let mut user = User::create(&pool, attrs! { "name" => "ada" }).await?;
//! user.update_attributes(&pool, attrs! { "name" => "Ada" }).await?;
//!
//! let posts = user.accessor("posts")?.fetch::<Post>(&pool).await?;
//!
//! let mut q = Post::gather();
//! q.gather_where(attrs! { "published" => true });
//! q.gather_where(attrs! { "user_id" => 1 });
//! let published = q.execute(&pool).await?;
//! ```

pub mod client;
pub mod error;
pub mod execute;
pub mod gather;
pub mod ident;
mod log;
pub mod migrate;
pub mod model;
pub mod naming;
pub mod query;
pub mod raw;
pub mod relation;
pub mod row;
pub mod statement;
pub mod value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(test)]
mod test_client;

pub use client::{GenericClient, row_to_attrs};
pub use error::{OrmError, OrmResult};
pub use execute::{Cast, Fetched, execute_as, execute_command, execute_records, execute_rows, execute_with};
pub use gather::Gathered;
pub use migrate::{MigrationReport, ProcessRunner, SchemaMigration, ScriptRunner};
pub use model::{Model, Record};
pub use query::Query;
pub use raw::{RawSql, UnsafeQueryWarning};
pub use relation::{Relation, RelationKind, RelationQuery};
pub use row::{FromRow, RowExt};
pub use statement::{Statement, build_statement, in_list_placeholders};
pub use value::{Attrs, ColumnType, FromValue, Value};

#[cfg(feature = "pool")]
pub use pool::{connect, create_pool, create_pool_with_config, create_pool_with_tls};
