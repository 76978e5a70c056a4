//! Structural description of a relation, as read from the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::query::quote_identifier;
use crate::{RelsetError, Result};

/// Schema-qualified relation name (`blog.post`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parses `schema.relation`, splitting on the last dot outside double
    /// quotes so that dotted schema names and quoted dotted relation names
    /// both resolve. A bare name lives in `public`.
    pub fn parse(qualified: &str) -> Result<Self> {
        let (schema, name) = match last_unquoted_dot(qualified) {
            Some(at) => (unquote(&qualified[..at]), unquote(&qualified[at + 1..])),
            None => ("public".to_string(), unquote(qualified)),
        };
        if schema.is_empty() || name.is_empty() {
            return Err(RelsetError::Validation(format!(
                "Invalid relation name '{}': expected 'schema.relation'",
                qualified
            )));
        }
        Ok(Self { schema, name })
    }

    /// Quoted form used in statements: `"schema"."name"`.
    pub fn to_sql(&self) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(&self.name))
    }
}

fn last_unquoted_dot(qualified: &str) -> Option<usize> {
    let mut quoted = false;
    let mut last = None;
    // A doubled quote inside an identifier toggles twice.
    for (at, ch) in qualified.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '.' if !quoted => last = Some(at),
            _ => {}
        }
    }
    last
}

// `"blog.view"` -> `blog.view`; unquoted input is taken verbatim.
fn unquote(part: &str) -> String {
    let part = part.trim();
    match part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => part.to_string(),
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl FromStr for QualifiedName {
    type Err = RelsetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// `pg_class.relkind` values the core exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    Table,
    PartitionedTable,
    View,
    MaterializedView,
    ForeignTable,
}

impl RelationKind {
    pub fn from_relkind(relkind: &str) -> Option<Self> {
        match relkind {
            "r" => Some(RelationKind::Table),
            "p" => Some(RelationKind::PartitionedTable),
            "v" => Some(RelationKind::View),
            "m" => Some(RelationKind::MaterializedView),
            "f" => Some(RelationKind::ForeignTable),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Table => "TABLE",
            RelationKind::PartitionedTable => "PARTITIONED TABLE",
            RelationKind::View => "VIEW",
            RelationKind::MaterializedView => "MATERIALIZED VIEW",
            RelationKind::ForeignTable => "FOREIGN TABLE",
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, RelationKind::View | RelationKind::MaterializedView)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Represents a column of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Formatted SQL type, e.g. `character varying(64)` or `integer[]`
    pub data_type: String,
    /// Base type name from `pg_type.typname`, e.g. `varchar`, `_int4`
    pub type_name: String,
    pub not_null: bool,
    /// Default value expression
    pub default: Option<String>,
    /// `GENERATED ... AS IDENTITY`
    pub identity: bool,
    /// `GENERATED ALWAYS AS (...) STORED`
    pub generated: bool,
    pub comment: Option<String>,
}

impl ColumnInfo {
    /// Create a nullable column without default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            type_name: data_type.clone(),
            data_type,
            not_null: false,
            default: None,
            identity: false,
            generated: false,
            comment: None,
        }
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.not_null = true;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// `_int4` / `integer[]`.
    pub fn is_array(&self) -> bool {
        self.type_name.starts_with('_') || self.data_type.ends_with("[]")
    }

    /// Text-like columns accept a string parameter without a cast.
    pub fn is_textual(&self) -> bool {
        if self.is_array() {
            return false;
        }
        matches!(
            self.type_name.as_str(),
            "text" | "varchar" | "bpchar" | "char" | "name" | "citext" | "unknown"
        ) || self.data_type.starts_with("character")
            || self.data_type == "text"
    }

    /// Integer, floating point and numeric columns. Either name form is
    /// accepted since hand-built metadata often only carries one.
    pub fn is_numeric(&self) -> bool {
        if self.is_array() {
            return false;
        }
        let numeric = |t: &str| {
            matches!(
                t,
                "int2" | "int4" | "int8" | "float4" | "float8" | "numeric" | "smallint"
                    | "integer" | "bigint" | "real" | "double precision" | "decimal"
            ) || t.starts_with("numeric(")
        };
        numeric(&self.type_name) || numeric(&self.data_type)
    }

    /// An INSERT must supply this column.
    pub fn is_required(&self) -> bool {
        self.not_null && self.default.is_none() && !self.identity && !self.generated
    }
}

/// Referential action (`pg_constraint.confupdtype` / `confdeltype`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn from_code(code: &str) -> Self {
        match code {
            "r" => ForeignKeyAction::Restrict,
            "c" => ForeignKeyAction::Cascade,
            "n" => ForeignKeyAction::SetNull,
            "d" => ForeignKeyAction::SetDefault,
            _ => ForeignKeyAction::NoAction,
        }
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Represents a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name
    pub name: String,
    /// Local columns, in key order
    pub columns: Vec<String>,
    pub referenced: QualifiedName,
    /// Referenced columns, paired with `columns` by position
    pub referenced_columns: Vec<String>,
    pub on_update: ForeignKeyAction,
    pub on_delete: ForeignKeyAction,
}

/// Represents a UNIQUE constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

/// Immutable description of one relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    pub name: QualifiedName,
    pub kind: RelationKind,
    /// `COMMENT ON TABLE/VIEW`
    pub comment: Option<String>,
    /// Columns in `attnum` order
    pub columns: Vec<ColumnInfo>,
    /// Primary key columns in key order; empty when there is none
    pub primary_key: Vec<String>,
    pub primary_key_name: Option<String>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    /// Foreign keys of other relations pointing here, seen from this side:
    /// `columns` are the local referenced columns, `referenced` is the
    /// referencing relation and `referenced_columns` its key columns.
    #[serde(default)]
    pub reverse_foreign_keys: Vec<ForeignKeyInfo>,
}

impl RelationMetadata {
    pub fn new(name: QualifiedName, kind: RelationKind) -> Self {
        Self {
            name,
            kind,
            comment: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            primary_key_name: None,
            unique_constraints: Vec::new(),
            foreign_keys: Vec::new(),
            reverse_foreign_keys: Vec::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key columns.
    pub fn primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn unique<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.unique_constraints.push(UniqueConstraint {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn foreign_key(mut self, fkey: ForeignKeyInfo) -> Self {
        self.foreign_keys.push(fkey);
        self
    }

    pub fn reverse_foreign_key(mut self, fkey: ForeignKeyInfo) -> Self {
        self.reverse_foreign_keys.push(fkey);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Columns identifying a row: the primary key, or every column when the
    /// relation has none (views, key-less tables).
    pub fn identity_columns(&self) -> Vec<&str> {
        if self.has_primary_key() {
            self.primary_key.iter().map(String::as_str).collect()
        } else {
            self.column_names()
        }
    }

    /// NOT NULL columns with neither default nor generator.
    pub fn required_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_required())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Looks a key up by name among outgoing then incoming keys. Either
    /// direction reads the same way: `columns` here, `referenced_columns`
    /// on `referenced`.
    pub fn get_foreign_key(&self, name: &str) -> Option<&ForeignKeyInfo> {
        self.foreign_keys
            .iter()
            .chain(&self.reverse_foreign_keys)
            .find(|fk| fk.name == name)
    }

    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }
}
