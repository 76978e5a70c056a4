//! Constraint tree: the filter state of a relation instance.

use std::fmt;
use std::sync::Arc;

use super::normalize::{canonical_key, implies_node, normalize};
use crate::query::Operator;
use crate::schema::RelationMetadata;
use crate::{RelsetError, Result, Value};

/// A single comparison `column <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    /// `Value::Null` for the nullary operators, `Value::Array` for `In`
    pub value: Value,
    /// Both sides go through `unaccent()` (extension `unaccent`)
    pub unaccent: bool,
}

impl Predicate {
    /// Builds a predicate, rewriting `= NULL` / `!= NULL` into
    /// `IS NULL` / `IS NOT NULL`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when NULL is compared with an ordering or
    /// pattern operator, or when `In` is not given an array.
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Result<Self> {
        let column = column.into();
        let value = value.into();

        let (operator, value) = match (operator, value) {
            (op, _) if op.is_nullary() => (op, Value::Null),
            (Operator::Eq, Value::Null) => (Operator::IsNull, Value::Null),
            (Operator::Ne, Value::Null) => (Operator::IsNotNull, Value::Null),
            (op, Value::Null) => {
                return Err(RelsetError::Validation(format!(
                    "NULL cannot be compared with '{}' on column '{}'; use IS NULL / IS NOT NULL",
                    op.to_sql(),
                    column
                )))
            }
            (Operator::In, Value::Array(items)) => (Operator::In, Value::Array(items)),
            (Operator::In, other) => {
                return Err(RelsetError::Validation(format!(
                    "IN on column '{}' expects a list, got {}",
                    column,
                    other.pg_type_name()
                )))
            }
            (op, value) => (op, value),
        };

        Ok(Self {
            column,
            operator,
            value,
            unaccent: false,
        })
    }

    /// Compares accent-insensitively. No effect on the nullary operators.
    pub fn unaccented(mut self) -> Self {
        self.unaccent = !self.operator.is_nullary();
        self
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(column, Operator::Eq, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: Operator::IsNull,
            value: Value::Null,
            unaccent: false,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operator.is_nullary() {
            write!(f, "{} {}", self.column, self.operator.to_sql())
        } else if self.unaccent {
            write!(
                f,
                "unaccent({}) {} unaccent({:?})",
                self.column,
                self.operator.to_sql(),
                self.value
            )
        } else {
            write!(f, "{} {} {:?}", self.column, self.operator.to_sql(), self.value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoolOp {
    And,
    Or,
    Xor,
}

impl BoolOp {
    /// Value of the empty group.
    pub fn identity(&self) -> bool {
        matches!(self, BoolOp::And)
    }
}

/// `(columns) IN (SELECT source_columns FROM source WHERE source_tree)`.
///
/// Produced by following a foreign key; `columns` and `source_columns` are
/// paired by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Semijoin {
    pub columns: Vec<String>,
    pub source: Arc<RelationMetadata>,
    pub source_columns: Vec<String>,
    pub source_tree: Box<ConstraintTree>,
}

/// Node of a constraint tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintNode {
    Literal(bool),
    Leaf(Predicate),
    Semijoin(Semijoin),
    Group { op: BoolOp, children: Vec<ConstraintNode> },
    Not(Box<ConstraintNode>),
}

impl ConstraintNode {
    /// Joins two nodes under `op`, splicing in the children of operands that
    /// already are `op` groups.
    pub(crate) fn join(op: BoolOp, left: ConstraintNode, right: ConstraintNode) -> ConstraintNode {
        let mut children = Vec::new();
        for node in [left, right] {
            match node {
                ConstraintNode::Group { op: inner, children: nested } if inner == op => {
                    children.extend(nested)
                }
                other => children.push(other),
            }
        }
        ConstraintNode::Group { op, children }
    }

    pub(crate) fn negate(node: ConstraintNode) -> ConstraintNode {
        ConstraintNode::Not(Box::new(node))
    }

    /// Local columns the node refers to, left to right.
    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConstraintNode::Literal(_) => {}
            ConstraintNode::Leaf(p) => out.push(p.column.as_str()),
            ConstraintNode::Semijoin(s) => out.extend(s.columns.iter().map(String::as_str)),
            ConstraintNode::Group { children, .. } => {
                children.iter().for_each(|c| c.collect_columns(out))
            }
            ConstraintNode::Not(inner) => inner.collect_columns(out),
        }
    }
}

/// The boolean filter of a relation instance.
///
/// An empty tree (no root) is the unconstrained relation: every row. Trees
/// are immutable; every combinator returns a new tree. Equality is semantic
/// up to the rewrites applied by normalization (ordering of AND/OR/XOR
/// operands, nesting, duplicates, double negation, boolean literals).
#[derive(Debug, Clone, Default)]
pub struct ConstraintTree {
    root: Option<ConstraintNode>,
}

impl ConstraintTree {
    /// The unconstrained tree.
    pub fn all() -> Self {
        Self { root: None }
    }

    /// The tree matching no row.
    pub fn none() -> Self {
        Self::from_node(ConstraintNode::Literal(false))
    }

    pub fn from_node(node: ConstraintNode) -> Self {
        Self { root: Some(node) }
    }

    pub fn leaf(predicate: Predicate) -> Self {
        Self::from_node(ConstraintNode::Leaf(predicate))
    }

    pub fn root(&self) -> Option<&ConstraintNode> {
        self.root.as_ref()
    }

    /// True when no constraint was ever applied. A tree that merely
    /// normalizes to TRUE still counts as constrained for the safety gates.
    pub fn is_unconstrained(&self) -> bool {
        self.root.is_none()
    }

    /// Rows matching both trees.
    pub fn intersect(&self, other: &ConstraintTree) -> ConstraintTree {
        match (&self.root, &other.root) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(a), Some(b)) => {
                Self::from_node(ConstraintNode::join(BoolOp::And, a.clone(), b.clone()))
            }
        }
    }

    /// Rows matching either tree.
    pub fn union(&self, other: &ConstraintTree) -> ConstraintTree {
        match (&self.root, &other.root) {
            (None, _) | (_, None) => Self::all(),
            (Some(a), Some(b)) => {
                Self::from_node(ConstraintNode::join(BoolOp::Or, a.clone(), b.clone()))
            }
        }
    }

    /// Rows matching exactly one of the trees.
    pub fn symmetric_difference(&self, other: &ConstraintTree) -> ConstraintTree {
        match (&self.root, &other.root) {
            (None, None) => Self::none(),
            (None, Some(_)) => other.complement(),
            (Some(_), None) => self.complement(),
            (Some(a), Some(b)) => {
                Self::from_node(ConstraintNode::join(BoolOp::Xor, a.clone(), b.clone()))
            }
        }
    }

    /// Rows of the relation not matching this tree.
    pub fn complement(&self) -> ConstraintTree {
        match &self.root {
            None => Self::none(),
            Some(node) => Self::from_node(ConstraintNode::negate(node.clone())),
        }
    }

    /// Rows matching this tree but not `other`.
    pub fn difference(&self, other: &ConstraintTree) -> ConstraintTree {
        self.intersect(&other.complement())
    }

    /// Normal form of the tree. `None` means every row.
    pub fn normalized(&self) -> Option<ConstraintNode> {
        match self.root.as_ref().map(normalize) {
            None | Some(ConstraintNode::Literal(true)) => None,
            other => other,
        }
    }

    /// Sound but incomplete subset test: `true` guarantees that every row
    /// matching `self` matches `other`. `false` means "not provable without
    /// the data".
    pub fn implies(&self, other: &ConstraintTree) -> bool {
        match (self.normalized(), other.normalized()) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => implies_node(&a, &b),
        }
    }

    /// Columns referenced by the tree, in traversal order, with duplicates.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        if let Some(root) = &self.root {
            root.collect_columns(&mut columns);
        }
        columns
    }

    /// Deterministic text of the normal form, usable as a map key.
    pub fn canonical_key(&self) -> String {
        self.normalized()
            .as_ref()
            .map(canonical_key)
            .unwrap_or_else(|| "ALL".to_string())
    }
}

impl PartialEq for ConstraintTree {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl From<Predicate> for ConstraintTree {
    fn from(predicate: Predicate) -> Self {
        Self::leaf(predicate)
    }
}
