//! INSERT, UPDATE, DELETE query building methods for QueryBuilder.

use super::builder::QueryBuilder;
use super::helpers::{quote_column_list, quote_identifier, validate_column, validate_columns};
use crate::constraint::SqlWriter;
use crate::{RelsetError, Result, Value};

impl QueryBuilder {
    /// Add columns to the RETURNING clause for UPDATE/DELETE queries
    pub fn returning<S: AsRef<str>>(mut self, columns: &[S]) -> Result<Self> {
        for col in columns {
            let col = col.as_ref();
            if col != "*" {
                validate_column(&self.meta, col)?;
            }
            self.returning.push(col.to_string());
        }
        Ok(self)
    }

    /// Return all columns from UPDATE/DELETE
    pub fn returning_all(mut self) -> Self {
        self.returning = vec!["*".to_string()];
        self
    }

    fn returning_sql(&self) -> Option<String> {
        if self.returning.is_empty() {
            None
        } else if self.returning.iter().any(|c| c == "*") {
            Some(" RETURNING *".to_string())
        } else {
            Some(format!(" RETURNING {}", quote_column_list(&self.returning)))
        }
    }

    /// Builds an INSERT returning the primary key, or the whole row when the
    /// relation has none.
    ///
    /// # Errors
    ///
    /// `UnknownColumn` for a field the relation lacks, `Validation` for a
    /// repeated field or when NOT NULL columns without default are missing.
    pub fn build_insert(&self, values: &[(String, Value)]) -> Result<(String, Vec<Value>)> {
        for (i, (col, _)) in values.iter().enumerate() {
            validate_column(&self.meta, col)?;
            if values[..i].iter().any(|(prev, _)| prev == col) {
                return Err(RelsetError::Validation(format!(
                    "Column '{}' given twice",
                    col
                )));
            }
        }

        let missing: Vec<&str> = self
            .meta
            .required_columns()
            .into_iter()
            .filter(|req| !values.iter().any(|(col, v)| col == req && !v.is_null()))
            .collect();
        if !missing.is_empty() {
            return Err(RelsetError::Validation(format!(
                "Missing value for NOT NULL column(s) of {}: {}",
                self.meta.name,
                missing.join(", ")
            )));
        }

        let mut writer = SqlWriter::new();
        let mut sql = format!("INSERT INTO {}", self.meta.name.to_sql());

        if values.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = values.iter().map(|(col, _)| col.as_str()).collect();
            let placeholders = self.write_operands(values, &mut writer)?;
            sql.push_str(&format!(
                " ({}) VALUES ({})",
                quote_column_list(&columns),
                placeholders.join(", ")
            ));
        }

        if self.meta.has_primary_key() {
            sql.push_str(&format!(" RETURNING {}", quote_column_list(&self.meta.primary_key)));
        } else {
            sql.push_str(" RETURNING *");
        }

        Ok((sql, writer.into_params()))
    }

    /// Builds an UPDATE of every row matching the filter.
    ///
    /// The safety gate for unconstrained updates is enforced by the caller.
    pub fn build_update(&self, values: &[(String, Value)]) -> Result<(String, Vec<Value>)> {
        if values.is_empty() {
            return Err(RelsetError::Query("Cannot update with no values".to_string()));
        }
        validate_columns(
            &self.meta,
            &values.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>(),
        )?;

        let mut writer = SqlWriter::new();
        let operands = self.write_operands(values, &mut writer)?;
        let set_parts: Vec<String> = values
            .iter()
            .zip(operands)
            .map(|((col, _), operand)| format!("{} = {}", quote_identifier(col), operand))
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.target_sql(), set_parts.join(", "));

        if let Some(clause) = writer.write_where(&self.tree, &self.meta)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if let Some(returning) = self.returning_sql() {
            sql.push_str(&returning);
        }

        Ok((sql, writer.into_params()))
    }

    /// Builds a DELETE of every row matching the filter.
    ///
    /// The safety gate for unconstrained deletes is enforced by the caller.
    pub fn build_delete(&self) -> Result<(String, Vec<Value>)> {
        let mut writer = SqlWriter::new();
        let mut sql = format!("DELETE FROM {}", self.target_sql());

        if let Some(clause) = writer.write_where(&self.tree, &self.meta)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if let Some(returning) = self.returning_sql() {
            sql.push_str(&returning);
        }

        Ok((sql, writer.into_params()))
    }

    fn write_operands(&self, values: &[(String, Value)], writer: &mut SqlWriter) -> Result<Vec<String>> {
        values
            .iter()
            .map(|(col, value)| {
                let column = self.meta.get_column(col).ok_or_else(|| RelsetError::UnknownColumn {
                    relation: self.meta.name.to_string(),
                    column: col.clone(),
                })?;
                Ok(writer.push_operand(column, value))
            })
            .collect()
    }
}
