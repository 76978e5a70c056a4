//! Statement builder.
//!
//! Turns a relation's metadata, constraint tree and read options into SQL
//! text plus a positional parameter list.
//!
//! # Examples
//!
//! ```ignore
//! use relset_postgres::{ConstraintTree, Operator, OrderDirection, Predicate, QueryBuilder};
//!
//! let qb = QueryBuilder::new(meta)
//!     .filter(ConstraintTree::leaf(Predicate::new("age", Operator::Gte, 18)?))
//!     .select(&["id", "name"])?
//!     .order_by("name", OrderDirection::Asc)?
//!     .limit(10);
//!
//! let (sql, params) = qb.build()?;
//! // SELECT "id", "name" FROM "public"."person" WHERE "age" >= $1::int4 ORDER BY "name" ASC LIMIT $2
//! ```

mod builder;
mod helpers;
mod modify;
mod select;
mod types;

#[cfg(test)]
mod tests;

pub use builder::QueryBuilder;
pub use helpers::{quote_column_list, quote_identifier, validate_column, validate_columns};
pub use types::{Operator, OrderDirection, SelectOptions};
