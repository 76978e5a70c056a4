//! Tests for query builder module.

use std::sync::Arc;

use super::*;
use crate::constraint::{ConstraintTree, Predicate};
use crate::schema::{ColumnInfo, QualifiedName, RelationKind, RelationMetadata};
use crate::{RelsetError, Value};

    fn person() -> Arc<RelationMetadata> {
        Arc::new(
            RelationMetadata::new(QualifiedName::new("actor", "person"), RelationKind::Table)
                .column(ColumnInfo::new("id", "integer").type_name("int4").identity())
                .column(ColumnInfo::new("name", "text").type_name("text").not_null())
                .column(ColumnInfo::new("age", "integer").type_name("int4"))
                .column(ColumnInfo::new("birth", "date").type_name("date"))
                .primary_key(["id"]),
        )
    }

    fn keyless_view() -> Arc<RelationMetadata> {
        Arc::new(
            RelationMetadata::new(QualifiedName::new("actor", "adults"), RelationKind::View)
                .column(ColumnInfo::new("name", "text"))
                .column(ColumnInfo::new("age", "integer").type_name("int4")),
        )
    }

    fn leaf(column: &str, op: Operator, value: impl Into<Value>) -> ConstraintTree {
        ConstraintTree::leaf(Predicate::new(column, op, value).unwrap())
    }

    #[test]
    fn test_simple_select() {
        let (sql, params) = QueryBuilder::new(person()).build_select().unwrap();
        assert_eq!(sql, "SELECT * FROM \"actor\".\"person\"");
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn test_select_with_columns() {
        let qb = QueryBuilder::new(person()).select(&["id", "name"]).unwrap();
        let (sql, params) = qb.build_select().unwrap();
        assert_eq!(sql, "SELECT \"id\", \"name\" FROM \"actor\".\"person\"");
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn test_select_unknown_column() {
        let err = QueryBuilder::new(person()).select(&["lost_name"]).unwrap_err();
        assert_eq!(
            err,
            RelsetError::UnknownColumn {
                relation: "\"actor\".\"person\"".to_string(),
                column: "lost_name".to_string(),
            }
        );
        assert!(QueryBuilder::new(person()).order_by("nope", OrderDirection::Asc).is_err());
    }

    #[test]
    fn test_select_with_where() {
        let qb = QueryBuilder::new(person()).filter(leaf("id", Operator::Eq, 42));
        let (sql, params) = qb.build_select().unwrap();
        assert_eq!(sql, "SELECT * FROM \"actor\".\"person\" WHERE \"id\" = $1::int4");
        assert_eq!(params, vec![Value::Int(42)]);
    }

    #[test]
    fn test_select_with_intersection() {
        let tree = leaf("age", Operator::Gt, 18).intersect(&leaf("name", Operator::ILike, "a%"));
        let (sql, params) = QueryBuilder::new(person()).filter(tree).build_select().unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"actor\".\"person\" WHERE (\"age\" > $1::int4) AND (\"name\" ILIKE $2::text)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_select_full() {
        let qb = QueryBuilder::new(person())
            .filter(leaf("age", Operator::Gte, 18))
            .select(&["name"])
            .unwrap()
            .order_by("name", OrderDirection::Asc)
            .unwrap()
            .order_by("age", OrderDirection::Desc)
            .unwrap()
            .distinct()
            .limit(10)
            .offset(20);
        let (sql, params) = qb.build().unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT \"name\" FROM \"actor\".\"person\" WHERE \"age\" >= $1::int4 \
             ORDER BY \"name\" ASC, \"age\" DESC LIMIT $2 OFFSET $3"
        );
        assert_eq!(params, vec![Value::Int(18), Value::BigInt(10), Value::BigInt(20)]);
    }

    #[test]
    fn test_select_only() {
        let (sql, _) = QueryBuilder::new(person()).only().build_select().unwrap();
        assert_eq!(sql, "SELECT * FROM ONLY \"actor\".\"person\"");
    }

    #[test]
    fn test_for_relation_applies_options() {
        let options = SelectOptions {
            distinct: true,
            only: true,
            order_by: vec![("id".to_string(), OrderDirection::Desc)],
            limit: Some(1),
            offset: None,
        };
        let qb = QueryBuilder::for_relation(person(), &ConstraintTree::all(), &options);
        let (sql, _) = qb.build().unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT * FROM ONLY \"actor\".\"person\" ORDER BY \"id\" DESC LIMIT $1"
        );
    }

    #[test]
    fn test_count_plain() {
        let qb = QueryBuilder::new(person()).filter(leaf("age", Operator::Lt, 30));
        let (sql, params) = qb.build_count().unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"actor\".\"person\" WHERE \"age\" < $1::int4");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_count_wraps_limited_select() {
        let qb = QueryBuilder::new(person()).limit(5);
        let (sql, params) = qb.build_count().unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT * FROM \"actor\".\"person\" LIMIT $1) AS relset_count"
        );
        assert_eq!(params, vec![Value::BigInt(5)]);
    }

    #[test]
    fn test_exists() {
        let (sql, _) = QueryBuilder::new(person())
            .filter(leaf("id", Operator::Eq, 1))
            .build_exists()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT EXISTS (SELECT 1 FROM \"actor\".\"person\" WHERE \"id\" = $1::int4)"
        );
    }

    #[test]
    fn test_insert_returns_primary_key() {
        let values = vec![
            ("name".to_string(), Value::String("Ann".to_string())),
            ("age".to_string(), Value::Int(30)),
        ];
        let (sql, params) = QueryBuilder::new(person()).build_insert(&values).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"actor\".\"person\" (\"name\", \"age\") VALUES ($1::text, $2::int4) RETURNING \"id\""
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_insert_without_primary_key_returns_row() {
        let values = vec![("name".to_string(), Value::String("Ann".to_string()))];
        let (sql, _) = QueryBuilder::new(keyless_view()).build_insert(&values).unwrap();
        assert!(sql.ends_with("RETURNING *"));
    }

    #[test]
    fn test_insert_null_and_cast() {
        let values = vec![
            ("name".to_string(), Value::String("Ann".to_string())),
            ("age".to_string(), Value::Null),
            ("birth".to_string(), Value::String("1990-01-01".to_string())),
        ];
        let (sql, params) = QueryBuilder::new(person()).build_insert(&values).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"actor\".\"person\" (\"name\", \"age\", \"birth\") VALUES ($1::text, NULL, $2::text::date) RETURNING \"id\""
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_insert_missing_required() {
        let values = vec![("age".to_string(), Value::Int(3))];
        let err = QueryBuilder::new(person()).build_insert(&values).unwrap_err();
        match err {
            RelsetError::Validation(msg) => assert!(msg.contains("name")),
            other => panic!("unexpected error {:?}", other),
        }

        // explicit NULL does not satisfy NOT NULL
        let values = vec![("name".to_string(), Value::Null)];
        assert!(QueryBuilder::new(person()).build_insert(&values).is_err());
    }

    #[test]
    fn test_insert_unknown_or_repeated_column() {
        let values = vec![
            ("name".to_string(), Value::String("a".into())),
            ("lost".to_string(), Value::Int(1)),
        ];
        assert!(matches!(
            QueryBuilder::new(person()).build_insert(&values),
            Err(RelsetError::UnknownColumn { .. })
        ));

        let values = vec![
            ("name".to_string(), Value::String("a".into())),
            ("name".to_string(), Value::String("b".into())),
        ];
        assert!(matches!(
            QueryBuilder::new(person()).build_insert(&values),
            Err(RelsetError::Validation(_))
        ));
    }

    #[test]
    fn test_insert_default_values() {
        let (sql, params) = QueryBuilder::new(keyless_view()).build_insert(&[]).unwrap();
        assert_eq!(sql, "INSERT INTO \"actor\".\"adults\" DEFAULT VALUES RETURNING *");
        assert!(params.is_empty());
    }

    #[test]
    fn test_update_params_in_order() {
        let qb = QueryBuilder::new(person()).filter(leaf("id", Operator::Eq, 42));
        let values = vec![
            ("name".to_string(), Value::String("Bob".to_string())),
            ("age".to_string(), Value::Int(35)),
        ];
        let (sql, params) = qb.build_update(&values).unwrap();
        assert_eq!(
            sql,
            "UPDATE \"actor\".\"person\" SET \"name\" = $1::text, \"age\" = $2::int4 WHERE \"id\" = $3::int4"
        );
        assert_eq!(
            params,
            vec![Value::String("Bob".to_string()), Value::Int(35), Value::Int(42)]
        );
    }

    #[test]
    fn test_update_set_null_and_returning() {
        let qb = QueryBuilder::new(person())
            .filter(leaf("id", Operator::Eq, 1))
            .returning(&["id", "age"])
            .unwrap();
        let values = vec![("age".to_string(), Value::Null)];
        let (sql, params) = qb.build_update(&values).unwrap();
        assert_eq!(
            sql,
            "UPDATE \"actor\".\"person\" SET \"age\" = NULL WHERE \"id\" = $1::int4 RETURNING \"id\", \"age\""
        );
        assert_eq!(params, vec![Value::Int(1)]);
    }

    #[test]
    fn test_update_empty_values() {
        assert!(QueryBuilder::new(person()).build_update(&[]).is_err());
    }

    #[test]
    fn test_delete() {
        let qb = QueryBuilder::new(person()).filter(leaf("id", Operator::Eq, 42));
        let (sql, params) = qb.build_delete().unwrap();
        assert_eq!(sql, "DELETE FROM \"actor\".\"person\" WHERE \"id\" = $1::int4");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_delete_only_returning_all() {
        let qb = QueryBuilder::new(person()).only().returning_all();
        let (sql, _) = qb.build_delete().unwrap();
        assert_eq!(sql, "DELETE FROM ONLY \"actor\".\"person\" RETURNING *");
    }

    #[test]
    fn test_quoting_of_odd_identifiers() {
        let meta = Arc::new(
            RelationMetadata::new(QualifiedName::new("blog.view", "post comment"), RelationKind::View)
                .column(ColumnInfo::new("we\"ird", "text")),
        );
        let (sql, _) = QueryBuilder::new(meta)
            .select(&["we\"ird"])
            .unwrap()
            .build_select()
            .unwrap();
        assert_eq!(sql, "SELECT \"we\"\"ird\" FROM \"blog.view\".\"post comment\"");
    }
