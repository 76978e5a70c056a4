//! QueryBuilder struct and core implementation.

use std::sync::Arc;

use super::helpers::{validate_column, validate_columns};
use super::types::{OrderDirection, SelectOptions};
use crate::constraint::ConstraintTree;
use crate::schema::RelationMetadata;
use crate::{Result, Value};

/// Statement builder for one relation.
///
/// Column names are checked against the relation's metadata as they are
/// added; values never reach the SQL text, they are returned alongside it as
/// positional parameters.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    pub(crate) meta: Arc<RelationMetadata>,
    /// WHERE clause
    pub(crate) tree: ConstraintTree,
    /// SELECT columns (empty means SELECT *)
    pub(crate) select_columns: Vec<String>,
    /// ORDER BY clauses (field, direction)
    pub(crate) order_by_clauses: Vec<(String, OrderDirection)>,
    pub(crate) limit_value: Option<i64>,
    pub(crate) offset_value: Option<i64>,
    pub(crate) distinct: bool,
    /// `FROM ONLY` / `UPDATE ONLY` / `DELETE FROM ONLY`
    pub(crate) only: bool,
    /// Columns to return from UPDATE/DELETE (RETURNING clause)
    pub(crate) returning: Vec<String>,
}

impl QueryBuilder {
    pub fn new(meta: Arc<RelationMetadata>) -> Self {
        Self {
            meta,
            tree: ConstraintTree::all(),
            select_columns: Vec::new(),
            order_by_clauses: Vec::new(),
            limit_value: None,
            offset_value: None,
            distinct: false,
            only: false,
            returning: Vec::new(),
        }
    }

    /// Builder preloaded with a relation instance's filter and read options.
    pub fn for_relation(meta: Arc<RelationMetadata>, tree: &ConstraintTree, options: &SelectOptions) -> Self {
        Self {
            tree: tree.clone(),
            order_by_clauses: options.order_by.clone(),
            limit_value: options.limit,
            offset_value: options.offset,
            distinct: options.distinct,
            only: options.only,
            ..Self::new(meta)
        }
    }

    pub fn metadata(&self) -> &RelationMetadata {
        &self.meta
    }

    /// Replaces the WHERE clause.
    pub fn filter(mut self, tree: ConstraintTree) -> Self {
        self.tree = tree;
        self
    }

    /// Sets the projection; an empty list selects every column.
    pub fn select<S: AsRef<str>>(mut self, columns: &[S]) -> Result<Self> {
        validate_columns(&self.meta, columns)?;
        self.select_columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        Ok(self)
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Result<Self> {
        validate_column(&self.meta, column)?;
        self.order_by_clauses.push((column.to_string(), direction));
        Ok(self)
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit_value = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset_value = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn only(mut self) -> Self {
        self.only = true;
        self
    }

    /// Builds a SELECT and returns (SQL, parameters).
    pub fn build(&self) -> Result<(String, Vec<Value>)> {
        self.build_select()
    }

    /// Relation reference as it appears after FROM / UPDATE / DELETE FROM.
    pub(crate) fn target_sql(&self) -> String {
        if self.only {
            format!("ONLY {}", self.meta.name.to_sql())
        } else {
            self.meta.name.to_sql()
        }
    }
}
