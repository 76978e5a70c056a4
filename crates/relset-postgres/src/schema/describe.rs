//! Human-readable description of a relation.

use std::fmt::Write;

use super::metadata::{ColumnInfo, RelationMetadata};

/// Renders the description of `meta`:
///
/// ```text
/// TABLE: "actor"."person"
/// DESCRIPTION:
/// People of the blog
/// FIELDS:
/// - id:         (integer) NOT NULL PK
/// - first_name: (text) NOT NULL
///
/// PRIMARY KEY (id)
/// FOREIGN KEY:
/// - post_author_fkey: (author_id) -> "actor"."person"(id)
/// REVERSE FOREIGN KEY:
/// - _reverse_fkey_db_blog_comment_post_id: (id) <- "blog"."comment"(post_id)
/// ```
pub fn describe(meta: &RelationMetadata) -> String {
    let mut out = String::new();
    // writes to a String cannot fail
    let _ = write_description(&mut out, meta);
    out
}

fn write_description(out: &mut String, meta: &RelationMetadata) -> std::fmt::Result {
    writeln!(out, "{}: {}", meta.kind.label(), meta.name)?;
    if let Some(comment) = meta.comment.as_deref().filter(|c| !c.is_empty()) {
        writeln!(out, "DESCRIPTION:\n{}", comment)?;
    }

    writeln!(out, "FIELDS:")?;
    let width = meta.columns.iter().map(|c| c.name.chars().count()).max().unwrap_or(0);
    for column in &meta.columns {
        let pad = " ".repeat(width + 1 - column.name.chars().count());
        writeln!(out, "- {}:{}{}", column.name, pad, field_annotation(meta, column))?;
    }
    writeln!(out)?;

    if meta.has_primary_key() {
        writeln!(out, "PRIMARY KEY ({})", meta.primary_key.join(", "))?;
    }
    for unique in &meta.unique_constraints {
        writeln!(out, "UNIQUE CONSTRAINT ({})", unique.columns.join(", "))?;
    }

    if !meta.foreign_keys.is_empty() {
        let plural = if meta.foreign_keys.len() > 1 { "S" } else { "" };
        writeln!(out, "FOREIGN KEY{}:", plural)?;
        for fkey in &meta.foreign_keys {
            writeln!(
                out,
                "- {}: ({}) -> {}({})",
                fkey.name,
                fkey.columns.join(", "),
                fkey.referenced,
                fkey.referenced_columns.join(", ")
            )?;
        }
    }

    if !meta.reverse_foreign_keys.is_empty() {
        let plural = if meta.reverse_foreign_keys.len() > 1 { "S" } else { "" };
        writeln!(out, "REVERSE FOREIGN KEY{}:", plural)?;
        for fkey in &meta.reverse_foreign_keys {
            writeln!(
                out,
                "- {}: ({}) <- {}({})",
                fkey.name,
                fkey.columns.join(", "),
                fkey.referenced,
                fkey.referenced_columns.join(", ")
            )?;
        }
    }
    Ok(())
}

fn field_annotation(meta: &RelationMetadata, column: &ColumnInfo) -> String {
    let mut annotation = format!("({})", column.data_type);
    if column.not_null {
        annotation.push_str(" NOT NULL");
    }
    if meta.is_primary_key_column(&column.name) {
        annotation.push_str(" PK");
    }
    if let Some(comment) = column.comment.as_deref().filter(|c| !c.is_empty()) {
        annotation.push_str(" -- ");
        annotation.push_str(comment);
    }
    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyAction, ForeignKeyInfo, QualifiedName, RelationKind};

    #[test]
    fn test_describe_table() {
        let meta = RelationMetadata::new(QualifiedName::new("blog", "post"), RelationKind::Table)
            .comment("Blog posts")
            .column(ColumnInfo::new("id", "integer").identity())
            .column(ColumnInfo::new("title", "text").not_null().comment("headline"))
            .column(ColumnInfo::new("author_id", "integer"))
            .primary_key(["id"])
            .unique("post_title_key", ["title"])
            .foreign_key(ForeignKeyInfo {
                name: "post_author_fkey".to_string(),
                columns: vec!["author_id".to_string()],
                referenced: QualifiedName::new("actor", "person"),
                referenced_columns: vec!["id".to_string()],
                on_update: ForeignKeyAction::NoAction,
                on_delete: ForeignKeyAction::Cascade,
            })
            .reverse_foreign_key(ForeignKeyInfo {
                name: "_reverse_fkey_db_blog_comment_post_id".to_string(),
                columns: vec!["id".to_string()],
                referenced: QualifiedName::new("blog", "comment"),
                referenced_columns: vec!["post_id".to_string()],
                on_update: ForeignKeyAction::NoAction,
                on_delete: ForeignKeyAction::Cascade,
            });

        let text = describe(&meta);
        let expected = "TABLE: \"blog\".\"post\"\n\
                        DESCRIPTION:\n\
                        Blog posts\n\
                        FIELDS:\n\
                        - id:        (integer) NOT NULL PK\n\
                        - title:     (text) NOT NULL -- headline\n\
                        - author_id: (integer)\n\
                        \n\
                        PRIMARY KEY (id)\n\
                        UNIQUE CONSTRAINT (title)\n\
                        FOREIGN KEY:\n\
                        - post_author_fkey: (author_id) -> \"actor\".\"person\"(id)\n\
                        REVERSE FOREIGN KEY:\n\
                        - _reverse_fkey_db_blog_comment_post_id: (id) <- \"blog\".\"comment\"(post_id)\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_describe_view_without_keys() {
        let meta = RelationMetadata::new(QualifiedName::new("blog", "recent"), RelationKind::View)
            .column(ColumnInfo::new("title", "text"));
        let text = describe(&meta);
        assert!(text.starts_with("VIEW: \"blog\".\"recent\"\nFIELDS:\n"));
        assert!(!text.contains("PRIMARY KEY"));
        assert!(!text.contains("FOREIGN KEY"));
    }
}
