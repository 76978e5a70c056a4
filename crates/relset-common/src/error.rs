//! Error types for relset

use thiserror::Error;

/// Result type alias for relset operations
pub type Result<T> = std::result::Result<T, RelsetError>;

/// Unified error type for all relset operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelsetError {
    /// Unreachable or lost connection. Only an explicit reconnect retries.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The qualified name is not present in the database catalog
    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    /// A constraint or field refers to a column the relation does not have
    #[error("Unknown column '{column}' in relation {relation}")]
    UnknownColumn { relation: String, column: String },

    /// An algebra combinator was applied to instances of different relations
    #[error("Incompatible relations: {left} and {right}")]
    IncompatibleRelation { left: String, right: String },

    /// Integrity violation reported by the engine (SQLSTATE class 23)
    #[error("Constraint violation ({code}): {message}")]
    ConstraintViolation {
        code: String,
        constraint: Option<String>,
        message: String,
    },

    /// UPDATE without constraint and without `update_all`
    #[error("Unsafe update: {0}")]
    UnsafeUpdate(String),

    /// DELETE without constraint and without `delete_all`
    #[error("Unsafe delete: {0}")]
    UnsafeDelete(String),

    #[error("Expected one row from {relation}, got {count}")]
    MultipleRows { relation: String, count: u64 },

    #[error("Expected one row from {0}, got none")]
    NoRow(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Misuse of the transaction scope (e.g. reconnecting inside one)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Statement cancelled by the server-side statement timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelsetError {
    /// Returns true if the connection is unusable and must be re-established
    /// with an explicit reconnect.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, RelsetError::Connection(_))
    }

    /// Returns true if this is an integrity violation surfaced by the engine
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, RelsetError::ConstraintViolation { .. })
    }

    /// Returns true for the two safety gates of UPDATE / DELETE
    pub fn is_safety_gate(&self) -> bool {
        matches!(self, RelsetError::UnsafeUpdate(_) | RelsetError::UnsafeDelete(_))
    }

    /// SQLSTATE of an engine-reported integrity violation, if any
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            RelsetError::ConstraintViolation { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RelsetError {
    fn from(err: serde_json::Error) -> Self {
        RelsetError::Serialization(err.to_string())
    }
}

// PostgreSQL-specific error conversions (when postgres-errors feature is enabled)
#[cfg(feature = "postgres-errors")]
impl From<sqlx::Error> for RelsetError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        match &err {
            Error::Configuration(_) => RelsetError::Connection(err.to_string()),
            Error::Database(db_err) => {
                // Classify based on PostgreSQL SQLSTATE codes
                // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
                if let Some(code) = db_err.code() {
                    let code_str: &str = &code;
                    match code_str {
                        // Integrity constraint violations: unique, foreign key,
                        // not null, check, exclusion
                        code if code.starts_with("23") => {
                            let mut message = db_err.message().to_string();
                            if let Some(detail) = db_err
                                .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                                .and_then(|pg| pg.detail())
                            {
                                message.push_str(" (");
                                message.push_str(detail);
                                message.push(')');
                            }
                            return RelsetError::ConstraintViolation {
                                code: code.to_string(),
                                constraint: db_err.constraint().map(str::to_string),
                                message,
                            };
                        }
                        // Undefined table
                        "42P01" => return RelsetError::RelationNotFound(db_err.message().to_string()),
                        // Query canceled (statement_timeout)
                        "57014" => return RelsetError::Timeout(db_err.message().to_string()),
                        // Connection errors (class 08)
                        code if code.starts_with("08") => {
                            return RelsetError::Connection(err.to_string())
                        }
                        // Operator intervention / admin shutdown (class 57)
                        "57P01" | "57P02" | "57P03" => {
                            return RelsetError::Connection(err.to_string())
                        }
                        _ => {}
                    }
                }
                RelsetError::Database(err.to_string())
            }
            Error::Io(_) => RelsetError::Connection(err.to_string()),
            Error::Tls(_) => RelsetError::Connection(err.to_string()),
            Error::Protocol(_) => RelsetError::Connection(err.to_string()),
            Error::RowNotFound => RelsetError::Query("Row not found".to_string()),
            Error::TypeNotFound { .. } => RelsetError::Deserialization(err.to_string()),
            Error::ColumnIndexOutOfBounds { .. } => RelsetError::Query(err.to_string()),
            Error::ColumnNotFound(_) => RelsetError::Query(err.to_string()),
            Error::ColumnDecode { .. } => RelsetError::Deserialization(err.to_string()),
            Error::Decode(_) => RelsetError::Deserialization(err.to_string()),
            Error::PoolTimedOut => RelsetError::Timeout("Connection pool timed out".to_string()),
            Error::PoolClosed => RelsetError::Connection("Connection pool closed".to_string()),
            Error::WorkerCrashed => RelsetError::Internal("Worker thread crashed".to_string()),
            _ => RelsetError::Database(err.to_string()),
        }
    }
}
