//! Query builder helper functions.

use crate::schema::RelationMetadata;
use crate::{RelsetError, Result};

/// Quotes a single SQL identifier, doubling embedded double quotes.
///
/// Catalog names may legitimately contain dots, spaces, quotes or reserved
/// words, so every identifier is quoted and none is rejected here. Whether a
/// column exists is checked against the relation metadata instead.
pub fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Quotes a comma separated column list.
pub fn quote_column_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rejects names that are not columns of `meta`.
pub fn validate_column(meta: &RelationMetadata, column: &str) -> Result<()> {
    if meta.has_column(column) {
        Ok(())
    } else {
        Err(RelsetError::UnknownColumn {
            relation: meta.name.to_string(),
            column: column.to_string(),
        })
    }
}

pub fn validate_columns<S: AsRef<str>>(meta: &RelationMetadata, columns: &[S]) -> Result<()> {
    columns
        .iter()
        .try_for_each(|c| validate_column(meta, c.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("user"), "\"user\"");
        assert_eq!(quote_identifier("a.b"), "\"a.b\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_identifier(""), "\"\"");
    }

    #[test]
    fn test_quote_column_list() {
        assert_eq!(quote_column_list(&["id", "name"]), "\"id\", \"name\"");
        assert_eq!(quote_column_list::<&str>(&[]), "");
    }
}
