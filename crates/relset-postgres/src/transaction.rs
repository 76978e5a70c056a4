//! Transaction scopes.
//!
//! `Model::transaction` runs a unit of work inside a scope: the outermost
//! scope is a database transaction, nested scopes are savepoints. The scope
//! commits (or releases its savepoint) when the unit of work returns `Ok`,
//! and rolls back to its entry point when it returns `Err`, handing the
//! error back unchanged.

use std::fmt;
use std::future::Future;

use tracing::{debug, info, warn};

use crate::executor::QueryExecutor;
use crate::model::Model;
use crate::Result;

/// Isolation level requested by the outermost scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        })
    }
}

/// Options of the outermost scope. Nested scopes inherit the enclosing
/// transaction's settings and ignore their own.
///
/// ```rust,ignore
/// let options = TransactionOptions::new()
///     .isolation_level(IsolationLevel::Serializable)
///     .read_only()
///     .deferrable(true);
/// let total = model.transaction_with(options, |m| async move { report(&m).await }).await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    pub access: AccessMode,
    /// Only sent for SERIALIZABLE READ ONLY
    pub deferrable: bool,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(self, isolation: IsolationLevel) -> Self {
        Self { isolation, ..self }
    }

    pub fn read_only(self) -> Self {
        Self {
            access: AccessMode::ReadOnly,
            ..self
        }
    }

    pub fn read_write(self) -> Self {
        Self {
            access: AccessMode::ReadWrite,
            ..self
        }
    }

    pub fn deferrable(self, deferrable: bool) -> Self {
        Self { deferrable, ..self }
    }

    /// The `SET TRANSACTION` statement issued right after `BEGIN`.
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SET TRANSACTION ISOLATION LEVEL {}, {}",
            self.isolation, self.access
        );
        if self.isolation == IsolationLevel::Serializable && self.access == AccessMode::ReadOnly {
            sql.push_str(if self.deferrable {
                ", DEFERRABLE"
            } else {
                ", NOT DEFERRABLE"
            });
        }
        sql
    }
}

pub(crate) fn savepoint_name(depth: usize) -> String {
    format!("relset_sp_{}", depth)
}

/// Statements opening, closing and unwinding the scope at `depth`.
#[derive(Debug, Clone, PartialEq)]
struct ScopeStatements {
    begin: Vec<String>,
    commit: String,
    rollback: String,
}

impl ScopeStatements {
    fn new(depth: usize, options: &TransactionOptions) -> Self {
        if depth <= 1 {
            Self {
                begin: vec!["BEGIN".to_string(), options.to_sql()],
                commit: "COMMIT".to_string(),
                rollback: "ROLLBACK".to_string(),
            }
        } else {
            let name = savepoint_name(depth);
            Self {
                begin: vec![format!("SAVEPOINT {}", name)],
                commit: format!("RELEASE SAVEPOINT {}", name),
                rollback: format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"),
            }
        }
    }
}

/// Marks the scope abandoned if its future is dropped before it settles.
struct ScopeGuard<'m> {
    model: &'m Model,
    depth: usize,
    settled: bool,
}

impl ScopeGuard<'_> {
    fn settle(mut self) {
        self.settled = true;
        self.model
            .connection()
            .set_transaction_depth(self.depth - 1);
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.model.connection().mark_abandoned(self.depth);
        }
    }
}

pub(crate) async fn run<T, F, Fut>(model: &Model, options: TransactionOptions, f: F) -> Result<T>
where
    F: FnOnce(Model) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let depth = model.connection().transaction_depth() + 1;
    let statements = ScopeStatements::new(depth, &options);

    // The guard exists before BEGIN is sent so that a cancelled BEGIN still
    // gets unwound.
    model.connection().set_transaction_depth(depth);
    let guard = ScopeGuard {
        model,
        depth,
        settled: false,
    };

    if let Err(e) = execute_all(model, &statements.begin).await {
        // BEGIN may have gone through before SET TRANSACTION failed
        if depth == 1 {
            rollback(model, &statements, depth).await;
        }
        guard.settle();
        return Err(e);
    }
    debug!(
        depth = depth,
        isolation = %options.isolation,
        access = %options.access,
        "Transaction scope opened"
    );

    match f(model.clone()).await {
        Ok(value) => {
            let committed = execute_all(model, std::slice::from_ref(&statements.commit)).await;
            if committed.is_err() {
                rollback(model, &statements, depth).await;
            }
            guard.settle();
            committed?;
            if depth == 1 {
                info!("Transaction committed");
            } else {
                debug!(depth = depth, "Savepoint released");
            }
            Ok(value)
        }
        Err(e) => {
            rollback(model, &statements, depth).await;
            guard.settle();
            debug!(depth = depth, error = %e, "Transaction scope rolled back");
            Err(e)
        }
    }
}

async fn execute_all(model: &Model, statements: &[String]) -> Result<()> {
    let mut conn = model.connection().acquire().await?;
    let mut executor = QueryExecutor::new(&mut conn, model.executor_config());
    for sql in statements {
        executor.execute_control(sql).await?;
    }
    Ok(())
}

// The error that triggered the rollback is what the caller sees.
async fn rollback(model: &Model, statements: &ScopeStatements, depth: usize) {
    if let Err(e) = execute_all(model, std::slice::from_ref(&statements.rollback)).await {
        warn!(depth = depth, error = %e, "Rollback failed");
    }
}
