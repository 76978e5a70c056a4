//! Compilation of constraint trees into parameterized SQL.

use super::node::{BoolOp, ConstraintNode, ConstraintTree, Predicate, Semijoin};
use crate::query::{quote_column_list, quote_identifier, validate_columns, Operator};
use crate::schema::{ColumnInfo, RelationMetadata};
use crate::{RelsetError, Result, Value};

/// Accumulates positional parameters while SQL text is being built.
///
/// One writer is shared by every fragment of a statement so that `$n`
/// numbering continues across SET lists, WHERE clauses and subqueries.
#[derive(Debug, Default)]
pub struct SqlWriter {
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter and returns its placeholder.
    pub fn push_param(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    /// Registers a parameter and returns its placeholder annotated with the
    /// type it is bound as (`$3::int8`).
    ///
    /// Prepared statements are cached by SQL text and keep the parameter
    /// types of their first execution, so the text must change whenever the
    /// bound types do.
    pub fn push_typed(&mut self, value: Value) -> String {
        let sql_type = value.sql_type();
        format!("{}::{}", self.push_param(value), sql_type)
    }

    /// Placeholder for `value` as an operand of `column`. NULL is emitted
    /// inline. A value whose type the column does not take implicitly is
    /// cast to the column type after its own (`$1::text::date`).
    pub fn push_operand(&mut self, column: &ColumnInfo, value: &Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        let fits = accepts(column, value);
        let placeholder = self.push_typed(value.clone());
        if fits {
            placeholder
        } else {
            format!("{}::{}", placeholder, column.data_type)
        }
    }

    /// Placeholder for `value` read as text, for pattern matching and
    /// `unaccent`.
    fn push_text(&mut self, value: &Value) -> String {
        match value {
            Value::String(_) => self.push_typed(value.clone()),
            other => format!("{}::text", self.push_typed(other.clone())),
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }

    /// Compiles `tree` to a boolean SQL expression, or `None` when the tree
    /// is unconstrained.
    pub fn write_where(&mut self, tree: &ConstraintTree, meta: &RelationMetadata) -> Result<Option<String>> {
        tree.root().map(|node| self.write_node(node, meta)).transpose()
    }

    pub fn write_node(&mut self, node: &ConstraintNode, meta: &RelationMetadata) -> Result<String> {
        match node {
            ConstraintNode::Literal(true) => Ok("TRUE".to_string()),
            ConstraintNode::Literal(false) => Ok("FALSE".to_string()),
            ConstraintNode::Leaf(predicate) => self.write_predicate(predicate, meta),
            ConstraintNode::Semijoin(semijoin) => self.write_semijoin(semijoin, meta),
            ConstraintNode::Not(inner) => {
                let inner = self.write_node(inner, meta)?;
                Ok(format!("({}) IS NOT TRUE", inner))
            }
            ConstraintNode::Group { op, children } => self.write_group(*op, children, meta),
        }
    }

    fn write_group(&mut self, op: BoolOp, children: &[ConstraintNode], meta: &RelationMetadata) -> Result<String> {
        let parts = children
            .iter()
            .map(|child| self.write_node(child, meta))
            .collect::<Result<Vec<_>>>()?;

        if parts.is_empty() {
            return Ok(if op.identity() { "TRUE" } else { "FALSE" }.to_string());
        }

        let sql = match op {
            BoolOp::And | BoolOp::Or => {
                let joiner = if op == BoolOp::And { " AND " } else { " OR " };
                parts
                    .iter()
                    .map(|p| format!("({})", p))
                    .collect::<Vec<_>>()
                    .join(joiner)
            }
            // NULL operands count as false so that membership stays two-valued
            BoolOp::Xor => {
                let mut parts = parts.into_iter();
                let first = parts.next().unwrap_or_else(|| "FALSE".to_string());
                parts.fold(first, |acc, next| {
                    format!("COALESCE(({}), FALSE) <> COALESCE(({}), FALSE)", acc, next)
                })
            }
        };
        Ok(sql)
    }

    fn write_semijoin(&mut self, semijoin: &Semijoin, meta: &RelationMetadata) -> Result<String> {
        validate_columns(meta, &semijoin.columns)?;
        validate_columns(&semijoin.source, &semijoin.source_columns)?;

        let mut sql = format!(
            "({}) IN (SELECT {} FROM {}",
            quote_column_list(&semijoin.columns),
            quote_column_list(&semijoin.source_columns),
            semijoin.source.name.to_sql()
        );
        if let Some(clause) = self.write_where(&semijoin.source_tree, &semijoin.source)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        sql.push(')');
        Ok(sql)
    }

    fn write_predicate(&mut self, predicate: &Predicate, meta: &RelationMetadata) -> Result<String> {
        let column = meta
            .get_column(&predicate.column)
            .ok_or_else(|| RelsetError::UnknownColumn {
                relation: meta.name.to_string(),
                column: predicate.column.clone(),
            })?;
        let quoted = quote_identifier(&column.name);
        let as_text = if column.is_textual() {
            quoted.clone()
        } else {
            format!("{}::text", quoted)
        };

        let sql = match (predicate.operator, &predicate.value) {
            (op, _) if op.is_nullary() => format!("{} {}", quoted, op.to_sql()),
            (Operator::Eq, Value::Null) => format!("{} IS NULL", quoted),
            (Operator::Ne, Value::Null) => format!("{} IS NOT NULL", quoted),
            (Operator::In, Value::Array(items)) => {
                if items.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let placeholders: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::Null => "NULL".to_string(),
                        _ if predicate.unaccent => format!("unaccent({})", self.push_text(item)),
                        _ => self.push_operand(column, item),
                    })
                    .collect();
                let subject = if predicate.unaccent {
                    format!("unaccent({})", as_text)
                } else {
                    quoted
                };
                format!("{} IN ({})", subject, placeholders.join(", "))
            }
            (op, value) if predicate.unaccent => {
                let placeholder = self.push_text(value);
                format!("unaccent({}) {} unaccent({})", as_text, op.to_sql(), placeholder)
            }
            (op, value) if op.is_pattern() => {
                let placeholder = self.push_text(value);
                format!("{} {} {}", as_text, op.to_sql(), placeholder)
            }
            (op, value) => {
                let placeholder = self.push_operand(column, value);
                format!("{} {} {}", quoted, op.to_sql(), placeholder)
            }
        };
        Ok(sql)
    }
}

// The column takes a parameter of the value's type without a cast.
fn accepts(column: &ColumnInfo, value: &Value) -> bool {
    let sql_type = value.sql_type();
    column.type_name == sql_type
        || column.data_type == sql_type
        || (value.is_numeric() && column.is_numeric())
        || (matches!(value, Value::String(_)) && column.is_textual())
        || sql_type
            .strip_suffix("[]")
            .is_some_and(|element| column.type_name.strip_prefix('_') == Some(element))
}
