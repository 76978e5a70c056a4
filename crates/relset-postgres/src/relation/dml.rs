//! Running relation instances against a Model: reads, writes and the
//! safety gates of unconstrained writes.

use std::sync::Arc;
use std::time::Instant;

use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use tracing::{debug, instrument};

use super::Relation;
use crate::constraint::{ConstraintTree, Predicate};
use crate::executor::QueryExecutor;
use crate::model::Model;
use crate::query::QueryBuilder;
use crate::types::bind_all;
use crate::{RelsetError, Result, Row, Value};

fn collect_values<I, K, V>(values: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|(column, value)| (column.into(), value.into()))
        .collect()
}

async fn fetch_rows(model: &Model, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let mut conn = model.connection().acquire().await?;
    QueryExecutor::new(&mut conn, model.executor_config())
        .fetch_all(sql, params)
        .await
}

async fn execute(model: &Model, sql: &str, params: &[Value]) -> Result<u64> {
    let mut conn = model.connection().acquire().await?;
    QueryExecutor::new(&mut conn, model.executor_config())
        .execute(sql, params)
        .await
}

impl Relation {
    /// Streams the matching rows, restricted to `columns` (every column when
    /// empty). Nothing runs until the stream is polled; each call runs the
    /// statement again. The connection stays locked until the stream is
    /// exhausted or dropped.
    ///
    /// ```rust,ignore
    /// let rows = person.select(&model, &["id", "name"]);
    /// futures::pin_mut!(rows);
    /// while let Some(row) = rows.try_next().await? {
    ///     println!("{}", row.to_json());
    /// }
    /// ```
    pub fn select<'a>(&'a self, model: &'a Model, columns: &[&str]) -> impl Stream<Item = Result<Row>> + 'a {
        let statement = self.to_sql(columns);
        try_stream! {
            let (sql, params) = statement?;
            let args = bind_all(&params)?;
            let mut conn = model.connection().acquire().await?;
            let start = Instant::now();
            let mut produced = 0u64;
            {
                let mut rows = sqlx::query_with(&sql, args).fetch(&mut *conn);
                while let Some(row) = rows.try_next().await? {
                    produced += 1;
                    yield Row::from_sqlx(&row)?;
                }
            }
            model
                .executor_config()
                .log_query_completion(&sql, start.elapsed(), produced);
        }
    }

    /// Materialized `select`.
    pub async fn fetch_all(&self, model: &Model, columns: &[&str]) -> Result<Vec<Row>> {
        let (sql, params) = self.to_sql(columns)?;
        fetch_rows(model, &sql, &params).await
    }

    /// The single matching row.
    ///
    /// # Errors
    ///
    /// `NoRow` when nothing matches, `MultipleRows` (with the number of
    /// matching rows) when more than one does.
    pub async fn fetch_one(&self, model: &Model, columns: &[&str]) -> Result<Row> {
        let probe = match self.options.limit {
            Some(limit) if limit < 2 => self.clone(),
            _ => self.limit(2),
        };
        let mut rows = probe.fetch_all(model, columns).await?;
        match rows.len() {
            0 => Err(RelsetError::NoRow(self.meta.name.to_string())),
            1 => Ok(rows.remove(0)),
            _ => Err(RelsetError::MultipleRows {
                relation: self.meta.name.to_string(),
                count: self.count(model).await?,
            }),
        }
    }

    /// Number of matching rows, honouring DISTINCT / LIMIT / OFFSET.
    pub async fn count(&self, model: &Model) -> Result<u64> {
        let (sql, params) = self.query_builder().build_count()?;
        let mut conn = model.connection().acquire().await?;
        let count: i64 = QueryExecutor::new(&mut conn, model.executor_config())
            .fetch_scalar(&sql, &params)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self, model: &Model) -> Result<bool> {
        let (sql, params) = self.query_builder().build_exists()?;
        let mut conn = model.connection().acquire().await?;
        let exists: bool = QueryExecutor::new(&mut conn, model.executor_config())
            .fetch_scalar(&sql, &params)
            .await?;
        Ok(!exists)
    }

    /// One instance per matching row, each constrained by that row's
    /// primary key (by all of its columns when the relation has none).
    #[instrument(skip(self, model), fields(relation = %self.meta.name))]
    pub async fn get(&self, model: &Model) -> Result<Vec<Relation>> {
        let identity = self.meta.identity_columns();
        let rows = self.fetch_all(model, &identity).await?;
        rows.iter().map(|row| self.bind_row(&identity, row)).collect()
    }

    /// The instance of the single matching row.
    ///
    /// # Errors
    ///
    /// `NoRow` / `MultipleRows` as for `fetch_one`.
    #[instrument(skip(self, model), fields(relation = %self.meta.name))]
    pub async fn getone(&self, model: &Model) -> Result<Relation> {
        let identity = self.meta.identity_columns();
        let row = self.fetch_one(model, &identity).await?;
        self.bind_row(&identity, &row)
    }

    fn bind_row(&self, identity: &[&str], row: &Row) -> Result<Relation> {
        let mut tree = ConstraintTree::all();
        for column in identity {
            let predicate = Predicate::eq(*column, row.get(column)?.clone())?;
            tree = tree.intersect(&predicate.into());
        }
        Ok(Relation::new(Arc::clone(&self.meta)).derive(tree))
    }

    /// Inserts one row and returns its primary key columns (the whole row
    /// when the relation has no primary key). The instance's own filter is
    /// not involved.
    ///
    /// # Errors
    ///
    /// `Validation` when a NOT NULL column without default is missing,
    /// `UnknownColumn` for a field the relation lacks, `ConstraintViolation`
    /// when the database rejects the row.
    #[instrument(skip(self, model, values), fields(relation = %self.meta.name))]
    pub async fn insert<I, K, V>(&self, model: &Model, values: I) -> Result<Row>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let values = collect_values(values);
        let (sql, params) = QueryBuilder::new(Arc::clone(&self.meta)).build_insert(&values)?;
        let mut conn = model.connection().acquire().await?;
        let row = QueryExecutor::new(&mut conn, model.executor_config())
            .fetch_optional(&sql, &params)
            .await?;
        // a rule or INSTEAD OF trigger on a view may swallow the row
        Ok(row.unwrap_or_default())
    }

    fn check_update_gate(&self, update_all: bool) -> Result<()> {
        if self.is_constrained() || update_all {
            Ok(())
        } else {
            Err(RelsetError::UnsafeUpdate(format!(
                "{} has no constraint; pass update_all = true to update every row",
                self.meta.name
            )))
        }
    }

    fn check_delete_gate(&self, delete_all: bool) -> Result<()> {
        if self.is_constrained() || delete_all {
            Ok(())
        } else {
            Err(RelsetError::UnsafeDelete(format!(
                "{} has no constraint; pass delete_all = true to delete every row",
                self.meta.name
            )))
        }
    }

    /// Assigns `values` to every matching row and returns the number of rows
    /// updated. An empty assignment list updates nothing.
    ///
    /// # Errors
    ///
    /// `UnsafeUpdate` when the instance is unconstrained and `update_all` is
    /// false; nothing is sent to the database in that case.
    #[instrument(skip(self, model, values), fields(relation = %self.meta.name))]
    pub async fn update<I, K, V>(&self, model: &Model, values: I, update_all: bool) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.check_update_gate(update_all)?;
        let values = collect_values(values);
        if values.is_empty() {
            debug!("Empty assignment list, nothing to update");
            return Ok(0);
        }
        let (sql, params) = self.query_builder().build_update(&values)?;
        execute(model, &sql, &params).await
    }

    /// `update` returning the updated rows restricted to `returning` (every
    /// column when empty).
    #[instrument(skip(self, model, values, returning), fields(relation = %self.meta.name))]
    pub async fn update_returning<I, K, V>(
        &self,
        model: &Model,
        values: I,
        update_all: bool,
        returning: &[&str],
    ) -> Result<Vec<Row>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.check_update_gate(update_all)?;
        let values = collect_values(values);
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let builder = if returning.is_empty() {
            self.query_builder().returning_all()
        } else {
            self.query_builder().returning(returning)?
        };
        let (sql, params) = builder.build_update(&values)?;
        fetch_rows(model, &sql, &params).await
    }

    /// Deletes every matching row and returns how many were deleted.
    ///
    /// # Errors
    ///
    /// `UnsafeDelete` when the instance is unconstrained and `delete_all` is
    /// false; nothing is sent to the database in that case.
    #[instrument(skip(self, model), fields(relation = %self.meta.name))]
    pub async fn delete(&self, model: &Model, delete_all: bool) -> Result<u64> {
        self.check_delete_gate(delete_all)?;
        let (sql, params) = self.query_builder().build_delete()?;
        execute(model, &sql, &params).await
    }

    /// `delete` returning the deleted rows.
    #[instrument(skip(self, model), fields(relation = %self.meta.name))]
    pub async fn delete_returning(&self, model: &Model, delete_all: bool) -> Result<Vec<Row>> {
        self.check_delete_gate(delete_all)?;
        let (sql, params) = self.query_builder().returning_all().build_delete()?;
        fetch_rows(model, &sql, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::tests::person;

    #[test]
    fn test_safety_gates() {
        let everyone = Relation::new(person());
        assert!(matches!(
            everyone.check_update_gate(false),
            Err(RelsetError::UnsafeUpdate(_))
        ));
        assert!(matches!(
            everyone.check_delete_gate(false),
            Err(RelsetError::UnsafeDelete(_))
        ));
        assert!(everyone.check_update_gate(true).is_ok());
        assert!(everyone.check_delete_gate(true).is_ok());

        let one = everyone.filter("id", 1).unwrap();
        assert!(one.check_update_gate(false).is_ok());
        assert!(one.check_delete_gate(false).is_ok());
    }

    #[test]
    fn test_read_options_do_not_open_the_gate() {
        let page = Relation::new(person()).limit(1);
        assert!(page.check_delete_gate(false).unwrap_err().is_safety_gate());
    }

    #[test]
    fn test_bind_row_uses_primary_key() {
        let base = Relation::new(person());
        let row = Row::new(vec![("id".to_string(), Value::Int(7))]);
        let bound = base.bind_row(&["id"], &row).unwrap();
        assert_eq!(bound, base.filter("id", 7).unwrap());
        assert_eq!(bound.options(), &Default::default());
    }

    #[test]
    fn test_bind_row_null_identity() {
        let base = Relation::new(person());
        let row = Row::new(vec![
            ("name".to_string(), Value::String("Ann".into())),
            ("age".to_string(), Value::Null),
        ]);
        let bound = base.bind_row(&["name", "age"], &row).unwrap();
        let (sql, params) = bound.to_sql::<&str>(&[]).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"actor\".\"person\" WHERE (\"name\" = $1::text) AND (\"age\" IS NULL)"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_collect_values() {
        let values = collect_values([("name", Value::from("Ann")), ("age", Value::Int(3))]);
        assert_eq!(values[0], ("name".to_string(), Value::String("Ann".into())));
        assert_eq!(values.len(), 2);
    }
}
