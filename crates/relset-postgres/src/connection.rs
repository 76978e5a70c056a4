//! Ownership of the single live connection of a `Model`.
//!
//! A Model talks to PostgreSQL over exactly one `PgConnection`. It sits behind
//! an async mutex so statements are issued one at a time, in issuance order.
//! Only the initial connect is retried (per `RetryConfig`); a connection lost
//! later stays lost until `reconnect` is called explicitly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection as _;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::{ModelConfig, RetryConfig};
use crate::transaction::savepoint_name;
use crate::{RelsetError, Result};

/// Exclusive access to the live connection for the duration of a statement
/// (or of a streamed result).
pub type ConnectionGuard<'a> = MappedMutexGuard<'a, PgConnection>;

pub struct ConnectionManager {
    conn: Mutex<Option<PgConnection>>,
    /// Depth of the innermost open transaction scope (0 = autocommit).
    depth: AtomicUsize,
    /// Depth of a scope whose future was dropped before it could roll back
    /// (0 = nothing pending).
    pending_rollback: AtomicUsize,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("depth", &self.depth.load(Ordering::SeqCst))
            .field("pending_rollback", &self.pending_rollback.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Opens the connection and verifies it with a ping.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the server cannot be reached after all
    /// configured attempts, or `Timeout` if `connect_timeout_secs` elapses.
    #[instrument(skip(config), fields(target = %config.display_target(), max_retries = config.retry.max_retries))]
    pub async fn connect(config: &ModelConfig) -> Result<Self> {
        let conn = open(config).await?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            depth: AtomicUsize::new(0),
            pending_rollback: AtomicUsize::new(0),
        })
    }

    /// Locks the connection for one statement.
    ///
    /// Settles a rollback left behind by a dropped transaction scope before
    /// handing the connection out.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the Model has been disconnected.
    pub async fn acquire(&self) -> Result<ConnectionGuard<'_>> {
        let guard = self.conn.lock().await;
        let mut conn = MutexGuard::try_map(guard, Option::as_mut).map_err(|_| {
            RelsetError::Connection("Model is not connected; call reconnect()".to_string())
        })?;

        let pending = self.pending_rollback.swap(0, Ordering::SeqCst);
        if pending > 0 {
            settle_abandoned_scope(&mut conn, pending).await?;
        }
        Ok(conn)
    }

    pub fn transaction_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_depth() > 0
    }

    pub(crate) fn set_transaction_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::SeqCst);
    }

    /// Records that the scope at `depth` was abandoned; the outermost
    /// abandoned scope wins.
    pub(crate) fn mark_abandoned(&self, depth: usize) {
        let _ = self
            .pending_rollback
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                if pending == 0 || depth < pending {
                    Some(depth)
                } else {
                    None
                }
            });
        self.set_transaction_depth(depth.saturating_sub(1));
    }

    /// Health check. Opens a connection only when none is present, and
    /// returns `true` in that case.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` inside an open scope, `Connection` if the
    /// server does not answer.
    pub async fn ping(&self, config: &ModelConfig) -> Result<bool> {
        self.ensure_no_transaction("ping")?;
        let mut slot = self.conn.lock().await;
        match slot.as_mut() {
            Some(conn) => conn
                .ping()
                .await
                .map(|()| false)
                .map_err(|e| RelsetError::Connection(format!("Ping failed: {}", e))),
            None => {
                debug!("Ping on a disconnected Model, opening a connection");
                *slot = Some(open(config).await?);
                Ok(true)
            }
        }
    }

    /// Drops the current connection (if any) and opens a new one.
    pub async fn reconnect(&self, config: &ModelConfig) -> Result<()> {
        self.ensure_no_transaction("reconnect")?;
        let mut slot = self.conn.lock().await;
        if let Some(old) = slot.take() {
            if let Err(e) = old.close().await {
                debug!(error = %e, "Closing the previous connection failed");
            }
        }
        self.pending_rollback.store(0, Ordering::SeqCst);
        *slot = Some(open(config).await?);
        info!(target = %config.display_target(), "Reconnected");
        Ok(())
    }

    /// Closes the connection. Further statements fail with `Connection`
    /// until `reconnect`.
    pub async fn disconnect(&self) -> Result<()> {
        self.ensure_no_transaction("disconnect")?;
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.take() {
            conn.close().await?;
            info!("Disconnected");
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    fn ensure_no_transaction(&self, operation: &str) -> Result<()> {
        match self.transaction_depth() {
            0 => Ok(()),
            depth => Err(RelsetError::Transaction(format!(
                "Cannot {} inside an open transaction (depth {})",
                operation, depth
            ))),
        }
    }
}

async fn settle_abandoned_scope(conn: &mut PgConnection, depth: usize) -> Result<()> {
    warn!(depth = depth, "Rolling back a transaction scope that was dropped");
    let sql = if depth <= 1 {
        "ROLLBACK".to_string()
    } else {
        let name = savepoint_name(depth);
        format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}")
    };
    sqlx::raw_sql(&sql).execute(&mut *conn).await?;
    Ok(())
}

async fn open(config: &ModelConfig) -> Result<PgConnection> {
    let options = config.connect_options()?;
    let timeout = Duration::from_secs(config.connect_timeout_secs);

    let mut conn = tokio::time::timeout(timeout, connect_with_retry(&options, &config.retry))
        .await
        .map_err(|_| {
            RelsetError::Timeout(format!(
                "Connecting to {} took longer than {}s",
                config.display_target(),
                config.connect_timeout_secs
            ))
        })??;

    conn.ping()
        .await
        .map_err(|e| RelsetError::Connection(format!("Failed to verify connection: {}", e)))?;

    info!(target = %config.display_target(), "Connection established");
    Ok(conn)
}

/// Attempts to connect with exponential backoff retry.
async fn connect_with_retry(options: &PgConnectOptions, retry: &RetryConfig) -> Result<PgConnection> {
    let mut last_error = None;

    for attempt in 0..=retry.max_retries {
        match PgConnection::connect_with(options).await {
            Ok(conn) => {
                if attempt > 0 {
                    info!(attempt = attempt, "Connection established after retry");
                }
                return Ok(conn);
            }
            Err(e) => {
                if attempt < retry.max_retries {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Connection failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    // every attempt failed
    Err(last_error
        .map(|e| match RelsetError::from(e) {
            err @ (RelsetError::Connection(_) | RelsetError::Timeout(_)) => err,
            other => RelsetError::Connection(other.to_string()),
        })
        .unwrap_or_else(|| RelsetError::Connection("Connection failed".to_string())))
}
