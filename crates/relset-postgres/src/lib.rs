//! Relation-algebra object-relational layer over PostgreSQL.
//!
//! Tables and views are discovered from the live catalog and exposed as
//! [`Relation`] values. A relation instance is "this relation, filtered
//! thus": filters and the set operators (intersection, union, symmetric
//! difference, complement, difference) build new instances, and the
//! instance's constraint tree is compiled to a parameterized WHERE clause
//! only when a statement runs.
//!
//! # Architecture
//!
//! ```text
//!   Model ── ConnectionManager (one PgConnection, savepoint-aware)
//!     │
//!     ├── SchemaInspector (pg_catalog) ──▶ MetadataCache
//!     │
//!   Relation { RelationMetadata, ConstraintTree, SelectOptions }
//!     │
//!   QueryBuilder + SqlWriter ──▶ (SQL text, positional parameters)
//!     │
//!   QueryExecutor ──▶ sqlx
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use relset_postgres::{Model, ModelConfig, Operator};
//!
//! # async fn example() -> relset_postgres::Result<()> {
//! let model = Model::connect(ModelConfig::from_env()?).await?;
//! let person = model.relation("actor.person").await?;
//!
//! let an = person.filter_op("name", Operator::Like, "%an%")?;
//! let older = person.filter_op("age", Operator::Gt, 30)?;
//! let rows = (&an | &older)?.fetch_all(&model, &[]).await?;
//!
//! // writes outside a filter must be asked for explicitly
//! person.filter("id", 1)?.update(&model, [("age", 31)], false).await?;
//!
//! model
//!     .transaction(|m| async move {
//!         person.insert(&m, [("name", "Ann")]).await?;
//!         person.filter("name", "Bob")?.delete(&m, false).await?;
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! A [`Model`] owns exactly one connection and issues statements one at a
//! time. Clones of a Model share that connection; use one Model per worker
//! to run statements in parallel.

/// Connection configuration and retry policy of the initial connect.
pub mod config;

/// The single live connection of a Model.
pub mod connection;

/// Constraint trees: the algebra, its normal form and its SQL compilation.
pub mod constraint;

/// Statement execution with slow-statement logging.
pub mod executor;

/// The database connection context.
pub mod model;

/// Statement builder for SELECT, INSERT, UPDATE and DELETE.
pub mod query;

/// Relation instances and their execution methods.
pub mod relation;

/// Result rows.
pub mod row;

/// Relation metadata: catalog introspection, cache and description.
pub mod schema;

/// Transaction scopes with savepoint nesting.
pub mod transaction;

/// Value type and conversions between Rust and PostgreSQL types.
pub mod types;

pub use config::{ModelConfig, RetryConfig};
pub use connection::{ConnectionGuard, ConnectionManager};
pub use constraint::{BoolOp, ConstraintNode, ConstraintTree, Predicate, Semijoin, SqlWriter};
pub use executor::{ExecutorConfig, QueryExecutor};
pub use model::Model;
pub use query::{Operator, OrderDirection, QueryBuilder, SelectOptions};
pub use relation::Relation;
pub use row::Row;
pub use schema::{
    describe, ColumnInfo, ForeignKeyAction, ForeignKeyInfo, MetadataCache, QualifiedName,
    RelationKind, RelationMetadata, RelationSummary, SchemaInspector, UniqueConstraint,
};
pub use transaction::{AccessMode, IsolationLevel, TransactionOptions};
pub use types::Value;

pub use relset_common::{RelsetError, Result};
