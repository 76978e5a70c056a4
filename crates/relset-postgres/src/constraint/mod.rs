//! Constraint algebra.
//!
//! A relation instance's filter is a `ConstraintTree`. Trees combine with
//! AND / OR / XOR / NOT, compare semantically through a normal form, and
//! compile to a parameterized boolean SQL expression through `SqlWriter`.

mod compile;
mod node;
mod normalize;

pub use compile::SqlWriter;
pub use node::{BoolOp, ConstraintNode, ConstraintTree, Predicate, Semijoin};
