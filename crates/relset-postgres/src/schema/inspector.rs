//! Catalog introspection.
//!
//! The only place where catalog SQL is emitted. Everything is read from
//! `pg_catalog`; `information_schema` hides relations the current role
//! cannot write to and loses the ordering of composite keys.

use std::collections::HashMap;

use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row as SqlxRow;
use tracing::{debug, instrument};

use super::metadata::{
    ColumnInfo, ForeignKeyAction, ForeignKeyInfo, QualifiedName, RelationKind, RelationMetadata,
    UniqueConstraint,
};
use crate::{RelsetError, Result};

const RELATIONS_SQL: &str = "\
SELECT c.oid::int8 AS oid, \
       n.nspname::text AS schema_name, \
       c.relname::text AS relation_name, \
       c.relkind::text AS relkind, \
       pg_catalog.obj_description(c.oid, 'pg_class') AS comment \
FROM pg_catalog.pg_class c \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f') \
  AND n.nspname <> 'information_schema' \
  AND n.nspname NOT LIKE 'pg\\_%'";

const COLUMNS_SQL: &str = "\
SELECT a.attrelid::int8 AS relid, \
       a.attname::text AS name, \
       pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type, \
       t.typname::text AS type_name, \
       a.attnotnull AS not_null, \
       pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_expr, \
       a.attidentity::text <> '' AS is_identity, \
       a.attgenerated::text <> '' AS is_generated, \
       pg_catalog.col_description(a.attrelid, a.attnum) AS comment \
FROM pg_catalog.pg_attribute a \
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid \
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
WHERE a.attrelid::int8 = ANY($1) AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attrelid, a.attnum";

// conkey / confkey are resolved to names in key order, so composite keys
// keep their column pairing.
const CONSTRAINTS_SQL: &str = "\
SELECT con.conrelid::int8 AS relid, \
       con.conname::text AS name, \
       con.contype::text AS kind, \
       ARRAY(SELECT a.attname::text \
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
             ORDER BY k.ord) AS columns, \
       rn.nspname::text AS ref_schema, \
       rc.relname::text AS ref_relation, \
       ARRAY(SELECT a.attname::text \
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum \
             ORDER BY k.ord) AS ref_columns, \
       con.confupdtype::text AS on_update, \
       con.confdeltype::text AS on_delete \
FROM pg_catalog.pg_constraint con \
LEFT JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid \
LEFT JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace \
WHERE con.conrelid::int8 = ANY($1) AND con.contype IN ('p', 'u', 'f') \
ORDER BY con.conrelid, con.contype, con.conname";

// Foreign keys pointing at the inspected relations, seen from the
// referenced side: `columns` are the referenced (local) columns and
// `ref_columns` the referencing ones.
const INCOMING_KEYS_SQL: &str = "\
SELECT con.confrelid::int8 AS relid, \
       con.conname::text AS name, \
       pg_catalog.current_database()::text AS db_name, \
       ARRAY(SELECT a.attname::text \
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum \
             ORDER BY k.ord) AS columns, \
       sn.nspname::text AS ref_schema, \
       sc.relname::text AS ref_relation, \
       ARRAY(SELECT a.attname::text \
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
             ORDER BY k.ord) AS ref_columns, \
       con.confupdtype::text AS on_update, \
       con.confdeltype::text AS on_delete \
FROM pg_catalog.pg_constraint con \
JOIN pg_catalog.pg_class sc ON sc.oid = con.conrelid \
JOIN pg_catalog.pg_namespace sn ON sn.oid = sc.relnamespace \
WHERE con.confrelid::int8 = ANY($1) AND con.contype = 'f' \
ORDER BY con.confrelid, sn.nspname, sc.relname, con.conname";

/// Kind and name of a relation, as listed by `SchemaInspector::list_relations`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSummary {
    pub oid: i64,
    pub name: QualifiedName,
    pub kind: RelationKind,
    pub comment: Option<String>,
}

/// Schema introspection over one connection.
pub struct SchemaInspector<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> SchemaInspector<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Lists every user relation, ordered by schema then name.
    #[instrument(skip(self))]
    pub async fn list_relations(&mut self) -> Result<Vec<RelationSummary>> {
        let sql = format!("{} ORDER BY n.nspname, c.relname", RELATIONS_SQL);
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(catalog_error)?;

        let relations = rows
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = relations.len(), "Listed relations");
        Ok(relations)
    }

    async fn find(&mut self, name: &QualifiedName) -> Result<Option<RelationSummary>> {
        let sql = format!("{} AND n.nspname = $1 AND c.relname = $2", RELATIONS_SQL);
        let row = sqlx::query(&sql)
            .bind(&name.schema)
            .bind(&name.name)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(catalog_error)?;
        row.as_ref().map(summary_from_row).transpose()
    }

    pub async fn relation_exists(&mut self, name: &QualifiedName) -> Result<bool> {
        Ok(self.find(name).await?.is_some())
    }

    /// Reads the full metadata of one relation.
    ///
    /// # Errors
    ///
    /// `RelationNotFound` if the catalog has no such relation, `Connection`
    /// if the catalog cannot be queried.
    #[instrument(skip(self, name), fields(relation = %name))]
    pub async fn inspect(&mut self, name: &QualifiedName) -> Result<RelationMetadata> {
        let summary = self
            .find(name)
            .await?
            .ok_or_else(|| RelsetError::RelationNotFound(name.to_string()))?;

        let meta = self
            .inspect_summaries(vec![summary])
            .await?
            .pop()
            .ok_or_else(|| RelsetError::RelationNotFound(name.to_string()))?;
        debug!(
            columns = meta.columns.len(),
            primary_key = ?meta.primary_key,
            foreign_keys = meta.foreign_keys.len(),
            incoming_keys = meta.reverse_foreign_keys.len(),
            "Relation introspected"
        );
        Ok(meta)
    }

    /// Reads the full metadata of every user relation, ordered by schema
    /// then name. Issues one query per catalog table, whatever the number
    /// of relations.
    #[instrument(skip(self))]
    pub async fn inspect_all(&mut self) -> Result<Vec<RelationMetadata>> {
        let summaries = self.list_relations().await?;
        let all = self.inspect_summaries(summaries).await?;
        debug!(count = all.len(), "Relations introspected");
        Ok(all)
    }

    async fn inspect_summaries(
        &mut self,
        summaries: Vec<RelationSummary>,
    ) -> Result<Vec<RelationMetadata>> {
        let oids: Vec<i64> = summaries.iter().map(|s| s.oid).collect();
        let slots: HashMap<i64, usize> =
            oids.iter().enumerate().map(|(i, oid)| (*oid, i)).collect();
        let mut metas: Vec<RelationMetadata> = summaries
            .into_iter()
            .map(|summary| {
                let mut meta = RelationMetadata::new(summary.name, summary.kind);
                meta.comment = summary.comment;
                meta
            })
            .collect();
        if metas.is_empty() {
            return Ok(metas);
        }

        for row in self.fetch_catalog(COLUMNS_SQL, &oids).await? {
            if let Some(meta) = slot(&mut metas, &slots, &row)? {
                meta.columns.push(column_from_row(&row)?);
            }
        }
        for row in self.fetch_catalog(CONSTRAINTS_SQL, &oids).await? {
            if let Some(meta) = slot(&mut metas, &slots, &row)? {
                apply_constraint(meta, &row)?;
            }
        }
        for row in self.fetch_catalog(INCOMING_KEYS_SQL, &oids).await? {
            if let Some(meta) = slot(&mut metas, &slots, &row)? {
                let database: String = get(&row, "db_name")?;
                let mut fkey = foreign_key_from_row(&row)?;
                fkey.name = reverse_key_name(&database, &fkey);
                meta.reverse_foreign_keys.push(fkey);
            }
        }
        Ok(metas)
    }

    async fn fetch_catalog(&mut self, sql: &str, oids: &[i64]) -> Result<Vec<PgRow>> {
        sqlx::query(sql)
            .bind(oids)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(catalog_error)
    }
}

fn slot<'m>(
    metas: &'m mut [RelationMetadata],
    slots: &HashMap<i64, usize>,
    row: &PgRow,
) -> Result<Option<&'m mut RelationMetadata>> {
    let relid: i64 = get(row, "relid")?;
    Ok(slots.get(&relid).and_then(|&i| metas.get_mut(i)))
}

fn column_from_row(row: &PgRow) -> Result<ColumnInfo> {
    Ok(ColumnInfo {
        name: get(row, "name")?,
        data_type: get(row, "data_type")?,
        type_name: get(row, "type_name")?,
        not_null: get(row, "not_null")?,
        default: get(row, "default_expr")?,
        identity: get(row, "is_identity")?,
        generated: get(row, "is_generated")?,
        comment: get(row, "comment")?,
    })
}

fn apply_constraint(meta: &mut RelationMetadata, row: &PgRow) -> Result<()> {
    let name: String = get(row, "name")?;
    let kind: String = get(row, "kind")?;
    match kind.as_str() {
        "p" => {
            meta.primary_key = get(row, "columns")?;
            meta.primary_key_name = Some(name);
        }
        "u" => meta.unique_constraints.push(UniqueConstraint {
            name,
            columns: get(row, "columns")?,
        }),
        "f" => meta.foreign_keys.push(foreign_key_from_row(row)?),
        _ => {}
    }
    Ok(())
}

fn foreign_key_from_row(row: &PgRow) -> Result<ForeignKeyInfo> {
    let name: String = get(row, "name")?;
    let schema: Option<String> = get(row, "ref_schema")?;
    let relation: Option<String> = get(row, "ref_relation")?;
    let (Some(schema), Some(relation)) = (schema, relation) else {
        return Err(RelsetError::Internal(format!(
            "Foreign key {} has no referenced relation",
            name
        )));
    };
    let on_update: String = get(row, "on_update")?;
    let on_delete: String = get(row, "on_delete")?;
    Ok(ForeignKeyInfo {
        name,
        columns: get(row, "columns")?,
        referenced: QualifiedName::new(schema, relation),
        referenced_columns: get(row, "ref_columns")?,
        on_update: ForeignKeyAction::from_code(&on_update),
        on_delete: ForeignKeyAction::from_code(&on_delete),
    })
}

/// `_reverse_fkey_<database>_<schema>_<relation>_<referencing columns>`,
/// dots folded to underscores.
pub(crate) fn reverse_key_name(database: &str, incoming: &ForeignKeyInfo) -> String {
    format!(
        "_reverse_fkey_{}_{}_{}_{}",
        database,
        incoming.referenced.schema,
        incoming.referenced.name,
        incoming.referenced_columns.join("_")
    )
    .replace('.', "_")
}

fn summary_from_row(row: &PgRow) -> Result<RelationSummary> {
    let relkind: String = get(row, "relkind")?;
    let kind = RelationKind::from_relkind(&relkind).ok_or_else(|| {
        RelsetError::Internal(format!("Unexpected relkind '{}'", relkind))
    })?;
    Ok(RelationSummary {
        oid: get(row, "oid")?,
        name: QualifiedName::new(
            get::<String>(row, "schema_name")?,
            get::<String>(row, "relation_name")?,
        ),
        kind,
        comment: get(row, "comment")?,
    })
}

fn get<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| {
        RelsetError::Deserialization(format!("Catalog column '{}': {}", column, e))
    })
}

// Failing to read the catalog leaves the Model unusable.
fn catalog_error(err: sqlx::Error) -> RelsetError {
    match RelsetError::from(err) {
        e @ (RelsetError::Connection(_) | RelsetError::Timeout(_)) => e,
        other => RelsetError::Connection(format!("Catalog query failed: {}", other)),
    }
}
