//! SELECT query building methods for QueryBuilder.

use super::builder::QueryBuilder;
use super::helpers::{quote_column_list, quote_identifier};
use crate::constraint::SqlWriter;
use crate::{Result, Value};

impl QueryBuilder {
    /// Builds a SELECT SQL query string with parameter placeholders.
    pub fn build_select(&self) -> Result<(String, Vec<Value>)> {
        let mut writer = SqlWriter::new();
        let sql = self.write_select(&mut writer)?;
        Ok((sql, writer.into_params()))
    }

    /// Writes the SELECT into a shared writer, so it can be embedded in an
    /// enclosing statement.
    pub(crate) fn write_select(&self, writer: &mut SqlWriter) -> Result<String> {
        let mut sql = String::from("SELECT ");

        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.select_columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&quote_column_list(&self.select_columns));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.target_sql());

        if let Some(clause) = writer.write_where(&self.tree, &self.meta)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if !self.order_by_clauses.is_empty() {
            let parts: Vec<String> = self
                .order_by_clauses
                .iter()
                .map(|(col, dir)| format!("{} {}", quote_identifier(col), dir.to_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        if let Some(limit) = self.limit_value {
            sql.push_str(" LIMIT ");
            sql.push_str(&writer.push_param(Value::BigInt(limit)));
        }

        if let Some(offset) = self.offset_value {
            sql.push_str(" OFFSET ");
            sql.push_str(&writer.push_param(Value::BigInt(offset)));
        }

        Ok(sql)
    }

    fn is_plain(&self) -> bool {
        !self.distinct && self.limit_value.is_none() && self.offset_value.is_none()
    }

    /// Builds `SELECT COUNT(*)` over the rows the SELECT would return.
    pub fn build_count(&self) -> Result<(String, Vec<Value>)> {
        let mut writer = SqlWriter::new();

        let sql = if self.is_plain() {
            let mut sql = format!("SELECT COUNT(*) FROM {}", self.target_sql());
            if let Some(clause) = writer.write_where(&self.tree, &self.meta)? {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
            sql
        } else {
            format!(
                "SELECT COUNT(*) FROM ({}) AS relset_count",
                self.write_select(&mut writer)?
            )
        };

        Ok((sql, writer.into_params()))
    }

    /// Builds `SELECT EXISTS (...)`, true when the SELECT would return a row.
    pub fn build_exists(&self) -> Result<(String, Vec<Value>)> {
        let mut writer = SqlWriter::new();

        let inner = if self.is_plain() {
            let mut sql = format!("SELECT 1 FROM {}", self.target_sql());
            if let Some(clause) = writer.write_where(&self.tree, &self.meta)? {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
            sql
        } else {
            self.write_select(&mut writer)?
        };

        Ok((format!("SELECT EXISTS ({})", inner), writer.into_params()))
    }
}
