//! Relation algebra and SQL compilation through the public API.
//!
//! No database needed: metadata is built by hand and statements are checked
//! with `Relation::to_sql`.

use std::sync::Arc;

use relset_postgres::{
    ColumnInfo, ConstraintTree, Operator, OrderDirection, Predicate, QualifiedName, Relation,
    RelationKind, RelationMetadata, RelsetError, Value,
};

fn person() -> Relation {
    Relation::new(Arc::new(
        RelationMetadata::new(QualifiedName::new("actor", "person"), RelationKind::Table)
            .column(ColumnInfo::new("id", "integer").type_name("int4").identity())
            .column(ColumnInfo::new("name", "text").type_name("text").not_null())
            .column(ColumnInfo::new("age", "integer").type_name("int4"))
            .column(ColumnInfo::new("birth", "date").type_name("date"))
            .primary_key(["id"]),
    ))
}

fn where_clause(relation: &Relation) -> (String, Vec<Value>) {
    let (sql, params) = relation.to_sql::<&str>(&[]).unwrap();
    let clause = sql
        .split_once(" WHERE ")
        .map(|(_, w)| w.to_string())
        .unwrap_or_default();
    (clause, params)
}

// =============================================================================
// Compilation
// =============================================================================

#[test]
fn test_like_or_greater_than() {
    let person = person();
    let an = person.filter_op("name", Operator::Like, "%an%").unwrap();
    let older = person.filter_op("age", Operator::Gt, 30).unwrap();

    let (clause, params) = where_clause(&(&an | &older).unwrap());
    assert_eq!(clause, "(\"name\" LIKE $1::text) OR (\"age\" > $2::int4)");
    assert_eq!(params, vec![Value::String("%an%".into()), Value::Int(30)]);
}

#[test]
fn test_parameters_follow_traversal_order() {
    let person = person();
    let a = person.filter("name", "a").unwrap();
    let b = person.filter_op("age", Operator::Lt, 10).unwrap();
    let c = person.filter_op("name", Operator::ILike, "c%").unwrap();

    let tree = (&(&a & &b).unwrap() | &c).unwrap();
    let (clause, params) = where_clause(&tree);
    assert_eq!(
        clause,
        "((\"name\" = $1::text) AND (\"age\" < $2::int4)) OR (\"name\" ILIKE $3::text)"
    );
    assert_eq!(
        params,
        vec![
            Value::String("a".into()),
            Value::Int(10),
            Value::String("c%".into())
        ]
    );
}

#[test]
fn test_complement_and_xor_are_null_safe() {
    let person = person();
    let older = person.filter_op("age", Operator::Gt, 30).unwrap();
    let (clause, _) = where_clause(&!&older);
    assert_eq!(clause, "(\"age\" > $1::int4) IS NOT TRUE");

    let ann = person.filter("name", "Ann").unwrap();
    let (clause, params) = where_clause(&(&older ^ &ann).unwrap());
    assert_eq!(
        clause,
        "COALESCE((\"age\" > $1::int4), FALSE) <> COALESCE((\"name\" = $2::text), FALSE)"
    );
    assert_eq!(params.len(), 2);
}

#[test]
fn test_null_compiles_to_is_null() {
    let person = person();
    let (clause, params) = where_clause(&person.filter("age", Value::Null).unwrap());
    assert_eq!(clause, "\"age\" IS NULL");
    assert!(params.is_empty());

    let (clause, _) = where_clause(&person.filter_op("age", Operator::Ne, Value::Null).unwrap());
    assert_eq!(clause, "\"age\" IS NOT NULL");

    let err = person.filter_op("age", Operator::Gt, Value::Null).unwrap_err();
    assert!(matches!(err, RelsetError::Validation(_)));
}

#[test]
fn test_in_list() {
    let person = person();
    let (clause, params) = where_clause(&person.filter_op("id", Operator::In, vec![1, 2, 3]).unwrap());
    assert_eq!(clause, "\"id\" IN ($1::int4, $2::int4, $3::int4)");
    assert_eq!(params.len(), 3);

    let (clause, params) =
        where_clause(&person.filter_op("id", Operator::In, Vec::<i32>::new()).unwrap());
    assert_eq!(clause, "FALSE");
    assert!(params.is_empty());
}

#[test]
fn test_string_against_date_is_cast() {
    let (clause, _) = where_clause(&person().filter_op("birth", Operator::Gte, "2000-01-01").unwrap());
    assert_eq!(clause, "\"birth\" >= $1::text::date");
}

#[test]
fn test_values_never_reach_sql_text() {
    let hostile = "'; DROP TABLE person; --";
    let relation = person().filter("name", hostile).unwrap();
    let (sql, params) = relation.to_sql(&["id"]).unwrap();
    assert!(!sql.contains("DROP"));
    assert_eq!(params, vec![Value::String(hostile.to_string())]);
}

#[test]
fn test_projection_and_ordering() {
    let relation = person()
        .filter_op("age", Operator::Gte, 18)
        .unwrap()
        .order_by("name", OrderDirection::Asc)
        .unwrap()
        .limit(5);
    let (sql, params) = relation.to_sql(&["id", "name"]).unwrap();
    assert_eq!(
        sql,
        "SELECT \"id\", \"name\" FROM \"actor\".\"person\" WHERE \"age\" >= $1::int4 \
         ORDER BY \"name\" ASC LIMIT $2"
    );
    assert_eq!(params, vec![Value::Int(18), Value::BigInt(5)]);
    assert!(relation.to_sql(&["lost"]).is_err());
}

// =============================================================================
// Semantic equality
// =============================================================================

#[test]
fn test_reordered_operands_compare_equal() {
    let person = person();
    let a = person.filter("name", "Ann").unwrap();
    let b = person.filter_op("age", Operator::Gt, 30).unwrap();
    let c = person.filter_op("birth", Operator::Lt, "1990-01-01").unwrap();

    assert_eq!((&a & &b).unwrap(), (&b & &a).unwrap());
    assert_eq!((&a | &b).unwrap(), (&b | &a).unwrap());
    assert_eq!((&a ^ &b).unwrap(), (&b ^ &a).unwrap());

    let left = (&(&a & &b).unwrap() & &c).unwrap();
    let right = (&a & &(&c & &b).unwrap()).unwrap();
    assert_eq!(left, right);
}

#[test]
fn test_algebraic_identities() {
    let person = person();
    let a = person.filter("name", "Ann").unwrap();

    assert_eq!(!&!&a, a);
    assert_eq!((&a & &a).unwrap(), a);
    assert_eq!((&a | &a).unwrap(), a);
    assert_eq!((&a & &person).unwrap(), a);
    assert_eq!((&a | &person).unwrap(), person);
    assert_eq!((&a ^ &person).unwrap(), !&a);

    // a XOR a is the empty set
    assert_eq!((&a ^ &a).unwrap().constraint(), &ConstraintTree::none());
}

#[test]
fn test_integer_width_does_not_change_the_set() {
    let person = person();
    let narrow = person.filter("id", 7).unwrap();
    let wide = person.filter("id", 7_i64).unwrap();
    assert_eq!(narrow, wide);
    assert!(narrow.implies(&wide).unwrap());

    // each width gets its own statement text
    let (narrow_sql, _) = narrow.to_sql(&["id"]).unwrap();
    let (wide_sql, _) = wide.to_sql(&["id"]).unwrap();
    assert!(narrow_sql.ends_with("\"id\" = $1::int4"));
    assert!(wide_sql.ends_with("\"id\" = $1::int8"));
}

#[test]
fn test_unaccented_columns() {
    let person = person().unaccent(&["name"]).unwrap();
    let (clause, params) = where_clause(&person.filter("name", "Hélène").unwrap());
    assert_eq!(clause, "unaccent(\"name\") = unaccent($1::text)");
    assert_eq!(params, vec![Value::String("Hélène".into())]);

    // other columns compare as usual
    let (clause, _) = where_clause(&person.filter_op("age", Operator::Gt, 3).unwrap());
    assert_eq!(clause, "\"age\" > $1::int4");

    assert_ne!(person.filter("name", "Ann").unwrap(), self::person().filter("name", "Ann").unwrap());
    assert!(person.unaccent(&["lost"]).is_err());
}

#[test]
fn test_different_values_are_not_equal() {
    let person = person();
    assert_ne!(person.filter("age", 30).unwrap(), person.filter("age", 31).unwrap());
    assert_ne!(
        person.filter_op("age", Operator::Gt, 30).unwrap(),
        person.filter_op("age", Operator::Gte, 30).unwrap()
    );
}

#[test]
fn test_structural_implication() {
    let person = person();
    let a = person.filter("name", "Ann").unwrap();
    let b = person.filter_op("age", Operator::Gt, 30).unwrap();
    let both = (&a & &b).unwrap();
    let either = (&a | &b).unwrap();

    assert!(both.implies(&a).unwrap());
    assert!(a.implies(&either).unwrap());
    assert!(both.implies(&either).unwrap());
    assert!(!either.implies(&both).unwrap());
}

#[test]
fn test_with_constraint_tree() {
    let tree = ConstraintTree::leaf(Predicate::new("age", Operator::Lte, 65).unwrap())
        .intersect(&ConstraintTree::leaf(Predicate::eq("name", "Ann").unwrap()));
    let relation = person().with_constraint(&tree).unwrap();
    let (clause, _) = where_clause(&relation);
    assert_eq!(clause, "(\"age\" <= $1::int4) AND (\"name\" = $2::text)");
}

// =============================================================================
// Compatibility
// =============================================================================

#[test]
fn test_combining_different_relations_fails() {
    let post = Relation::new(Arc::new(
        RelationMetadata::new(QualifiedName::new("blog", "post"), RelationKind::Table)
            .column(ColumnInfo::new("id", "integer")),
    ));
    let person = person();
    for result in [&person & &post, &person | &post, &person ^ &post, &person - &post] {
        assert!(matches!(result, Err(RelsetError::IncompatibleRelation { .. })));
    }
}
