//! Relation instances: "this relation, filtered thus".
//!
//! A `Relation` is a value. It pairs the shared metadata of a table or view
//! with a constraint tree and the read options of `select`. Filtering and
//! the set operators return new instances; nothing is sent to the database
//! until one of the execution methods (which take the `Model` to run on) is
//! awaited.
//!
//! ```rust,ignore
//! let person = model.relation("actor.person").await?;
//! let an = person.filter_op("name", Operator::Like, "%an%")?;
//! let older = person.filter_op("age", Operator::Gt, 30)?;
//!
//! let either = (&an | &older)?;
//! for row in either.order_by("name", OrderDirection::Asc)?.fetch_all(&model, &["id", "name"]).await? {
//!     println!("{}", row.to_json());
//! }
//! ```

mod dml;
mod ops;

use std::fmt;
use std::sync::Arc;

use crate::constraint::{ConstraintTree, Predicate};
use crate::query::{validate_column, Operator, OrderDirection, QueryBuilder, SelectOptions};
use crate::schema::{QualifiedName, RelationMetadata};
use crate::{Result, Value};

#[derive(Debug, Clone)]
pub struct Relation {
    meta: Arc<RelationMetadata>,
    tree: ConstraintTree,
    options: SelectOptions,
    /// Columns later filters compare through `unaccent()`
    unaccented: Vec<String>,
}

impl Relation {
    /// The unconstrained instance of `meta`.
    pub fn new(meta: Arc<RelationMetadata>) -> Self {
        Self {
            meta,
            tree: ConstraintTree::all(),
            options: SelectOptions::default(),
            unaccented: Vec::new(),
        }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.meta.name
    }

    pub fn metadata(&self) -> &Arc<RelationMetadata> {
        &self.meta
    }

    pub fn constraint(&self) -> &ConstraintTree {
        &self.tree
    }

    pub fn options(&self) -> &SelectOptions {
        &self.options
    }

    pub fn is_constrained(&self) -> bool {
        !self.tree.is_unconstrained()
    }

    fn derive(&self, tree: ConstraintTree) -> Self {
        Self {
            meta: Arc::clone(&self.meta),
            tree,
            options: self.options.clone(),
            unaccented: self.unaccented.clone(),
        }
    }

    /// Narrows the instance to rows where `column = value`. `Value::Null`
    /// compiles to `IS NULL`.
    pub fn filter(&self, column: &str, value: impl Into<Value>) -> Result<Self> {
        self.filter_op(column, Operator::Eq, value)
    }

    /// Narrows the instance to rows where `column <op> value`.
    ///
    /// `Like`/`ILike` take the pattern as given: wildcards are the caller's.
    ///
    /// # Errors
    ///
    /// `UnknownColumn` if the relation has no such column, `Validation` for
    /// NULL with an ordering or pattern operator.
    pub fn filter_op(&self, column: &str, op: Operator, value: impl Into<Value>) -> Result<Self> {
        validate_column(&self.meta, column)?;
        let mut predicate = Predicate::new(column, op, value)?;
        if self.unaccented.iter().any(|c| c == column) {
            predicate = predicate.unaccented();
        }
        Ok(self.derive(self.tree.intersect(&predicate.into())))
    }

    /// Makes filters applied from now on compare `columns`
    /// accent-insensitively: `unaccent(col) = unaccent($1)`. Existing
    /// filters are left as they are. Needs the `unaccent` extension.
    pub fn unaccent(&self, columns: &[&str]) -> Result<Self> {
        let mut next = self.clone();
        for column in columns {
            validate_column(&self.meta, column)?;
            if !next.unaccented.iter().any(|c| c == column) {
                next.unaccented.push((*column).to_string());
            }
        }
        Ok(next)
    }

    pub fn where_null(&self, column: &str) -> Result<Self> {
        self.filter_op(column, Operator::IsNull, Value::Null)
    }

    pub fn where_not_null(&self, column: &str) -> Result<Self> {
        self.filter_op(column, Operator::IsNotNull, Value::Null)
    }

    /// Narrows the instance by an arbitrary tree, whose columns must all
    /// belong to the relation.
    pub fn with_constraint(&self, tree: &ConstraintTree) -> Result<Self> {
        for column in tree.columns() {
            validate_column(&self.meta, column)?;
        }
        Ok(self.derive(self.tree.intersect(tree)))
    }

    pub fn distinct(&self) -> Self {
        let mut next = self.clone();
        next.options.distinct = true;
        next
    }

    /// Excludes rows of inheriting relations (`FROM ONLY`).
    pub fn only(&self) -> Self {
        let mut next = self.clone();
        next.options.only = true;
        next
    }

    /// Appends a sort key; earlier keys take precedence.
    pub fn order_by(&self, column: &str, direction: OrderDirection) -> Result<Self> {
        validate_column(&self.meta, column)?;
        let mut next = self.clone();
        next.options.order_by.push((column.to_string(), direction));
        Ok(next)
    }

    pub fn limit(&self, limit: i64) -> Self {
        let mut next = self.clone();
        next.options.limit = Some(limit);
        next
    }

    pub fn offset(&self, offset: i64) -> Self {
        let mut next = self.clone();
        next.options.offset = Some(offset);
        next
    }

    pub(crate) fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::for_relation(Arc::clone(&self.meta), &self.tree, &self.options)
    }

    /// The SELECT this instance would run, without running it. An empty
    /// projection selects every column.
    pub fn to_sql<S: AsRef<str>>(&self, columns: &[S]) -> Result<(String, Vec<Value>)> {
        self.query_builder().select(columns)?.build()
    }
}

/// Same relation and semantically equal filters. Read options are not
/// part of the set an instance denotes and are ignored.
impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        ops::same_relation(&self.meta, &other.meta) && self.tree == other.tree
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.meta.name)?;
        if self.is_constrained() {
            write!(f, " [{}]", self.tree.canonical_key())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnInfo, RelationKind};
    use crate::RelsetError;

    pub(super) fn person() -> Arc<RelationMetadata> {
        Arc::new(
            RelationMetadata::new(QualifiedName::new("actor", "person"), RelationKind::Table)
                .column(ColumnInfo::new("id", "integer").type_name("int4").identity())
                .column(ColumnInfo::new("name", "text").type_name("text").not_null())
                .column(ColumnInfo::new("age", "integer").type_name("int4"))
                .primary_key(["id"]),
        )
    }

    #[test]
    fn test_new_is_unconstrained() {
        let relation = Relation::new(person());
        assert!(!relation.is_constrained());
        let (sql, params) = relation.to_sql::<&str>(&[]).unwrap();
        assert_eq!(sql, "SELECT * FROM \"actor\".\"person\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_unknown_column() {
        let err = Relation::new(person()).filter("lost", 1).unwrap_err();
        assert!(matches!(err, RelsetError::UnknownColumn { column, .. } if column == "lost"));
    }

    #[test]
    fn test_filters_accumulate_as_intersection() {
        let relation = Relation::new(person())
            .filter("name", "Ann")
            .unwrap()
            .filter_op("age", Operator::Gte, 18)
            .unwrap();
        let (sql, params) = relation.to_sql(&["id"]).unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\" FROM \"actor\".\"person\" WHERE (\"name\" = $1::text) AND (\"age\" >= $2::int4)"
        );
        assert_eq!(params, vec![Value::String("Ann".into()), Value::Int(18)]);
    }

    #[test]
    fn test_filter_null_is_null_test() {
        let relation = Relation::new(person()).filter("age", Value::Null).unwrap();
        let (sql, params) = relation.to_sql::<&str>(&[]).unwrap();
        assert_eq!(sql, "SELECT * FROM \"actor\".\"person\" WHERE \"age\" IS NULL");
        assert!(params.is_empty());
        assert_eq!(relation, Relation::new(person()).where_null("age").unwrap());
    }

    #[test]
    fn test_read_options_leave_original_untouched() {
        let base = Relation::new(person());
        let page = base
            .order_by("age", OrderDirection::Desc)
            .unwrap()
            .limit(10)
            .offset(20)
            .distinct()
            .only();
        assert_eq!(base.options(), &SelectOptions::default());
        let (sql, _) = page.to_sql(&["age"]).unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT \"age\" FROM ONLY \"actor\".\"person\" ORDER BY \"age\" DESC LIMIT $1 OFFSET $2"
        );
        // options do not change the denoted set
        assert_eq!(base, page);
    }

    #[test]
    fn test_with_constraint_validates_columns() {
        let tree = ConstraintTree::leaf(Predicate::eq("lost", 1).unwrap());
        assert!(Relation::new(person()).with_constraint(&tree).is_err());
    }

    #[test]
    fn test_unaccent_applies_to_later_filters() {
        let plain = Relation::new(person()).filter("name", "Eve").unwrap();
        let folded = plain.unaccent(&["name"]).unwrap();
        // the existing filter is unchanged
        assert_eq!(plain, folded);

        let both = folded.filter("name", "Ève").unwrap();
        let (sql, _) = both.to_sql(&["id"]).unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\" FROM \"actor\".\"person\" \
             WHERE (\"name\" = $1::text) AND (unaccent(\"name\") = unaccent($2::text))"
        );
        let (sql, _) = folded.where_null("name").unwrap().to_sql(&["id"]).unwrap();
        assert!(sql.ends_with("\"name\" IS NULL"));
    }

    #[test]
    fn test_display() {
        let relation = Relation::new(person());
        assert_eq!(relation.to_string(), "\"actor\".\"person\"");
        let filtered = relation.filter("id", 1).unwrap();
        assert!(filtered.to_string().starts_with("\"actor\".\"person\" ["));
    }
}
