//! The database connection context.
//!
//! A `Model` owns one connection and the metadata cache of the relations it
//! has resolved. It is cheap to clone; clones share the connection, the
//! cache and the transaction state.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::ModelConfig;
use crate::connection::ConnectionManager;
use crate::executor::{ExecutorConfig, QueryExecutor};
use crate::relation::Relation;
use crate::schema::{
    describe, MetadataCache, QualifiedName, RelationMetadata, RelationSummary, SchemaInspector,
};
use crate::transaction::{self, TransactionOptions};
use crate::{Result, Row, Value};

#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    config: ModelConfig,
    connection: ConnectionManager,
    cache: MetadataCache,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("target", &self.inner.config.display_target())
            .field("connection", &self.inner.connection)
            .field("cached_relations", &self.inner.cache.len())
            .finish()
    }
}

impl Model {
    /// Connects to the database described by `config`.
    ///
    /// # Errors
    ///
    /// `Connection` when the server cannot be reached, `Timeout` when the
    /// connect timeout elapses.
    #[instrument(skip(config), fields(target = %config.display_target()))]
    pub async fn connect(config: ModelConfig) -> Result<Self> {
        let connection = ConnectionManager::connect(&config).await?;
        info!("Model connected");
        Ok(Self {
            inner: Arc::new(ModelInner {
                config,
                connection,
                cache: MetadataCache::new(),
            }),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    pub(crate) fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub(crate) fn executor_config(&self) -> &ExecutorConfig {
        &self.inner.config.executor
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.inner.cache
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.connection.in_transaction()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.connection.is_connected().await
    }

    /// Closes the connection. The Model can be brought back with `reconnect`.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.connection.disconnect().await
    }

    /// Checks that the server answers. Connects if the Model was
    /// disconnected; a broken connection is reported, not replaced. A
    /// freshly opened connection starts with an empty metadata cache.
    pub async fn ping(&self) -> Result<()> {
        if self.inner.connection.ping(&self.inner.config).await? {
            self.reload();
        }
        Ok(())
    }

    /// Replaces the connection and drops the cached metadata. With
    /// `reload`, every relation of the database is introspected again right
    /// away instead of on first use.
    #[instrument(skip(self))]
    pub async fn reconnect(&self, reload: bool) -> Result<()> {
        self.inner.connection.reconnect(&self.inner.config).await?;
        self.reload();
        if reload {
            self.inspect_all().await?;
        }
        Ok(())
    }

    /// Forgets every cached relation; the next access re-reads the catalog.
    pub fn reload(&self) {
        let dropped = self.inner.cache.len();
        self.inner.cache.invalidate();
        info!(dropped = dropped, "Relation metadata cache cleared");
    }

    /// Metadata of `name`, from the cache or from the catalog.
    pub async fn metadata(&self, name: &QualifiedName) -> Result<Arc<RelationMetadata>> {
        if let Some(meta) = self.inner.cache.get(name) {
            return Ok(meta);
        }
        let meta = {
            let mut conn = self.inner.connection.acquire().await?;
            SchemaInspector::new(&mut conn).inspect(name).await?
        };
        Ok(self.inner.cache.insert(meta))
    }

    /// An unconstrained instance of the relation `name`
    /// (`schema.relation`, or a bare name in `public`).
    ///
    /// # Errors
    ///
    /// `RelationNotFound` if the catalog has no such table or view.
    pub async fn relation(&self, name: &str) -> Result<Relation> {
        let name = QualifiedName::parse(name)?;
        Ok(Relation::new(self.metadata(&name).await?))
    }

    /// Asks the catalog, never the cache, whether `name` exists.
    pub async fn has_relation(&self, name: &str) -> Result<bool> {
        let name = QualifiedName::parse(name)?;
        let mut conn = self.inner.connection.acquire().await?;
        SchemaInspector::new(&mut conn).relation_exists(&name).await
    }

    /// Introspects every user relation in one pass and caches the result.
    /// Relations already cached keep their existing metadata, so instances
    /// built earlier stay compatible with the returned ones.
    #[instrument(skip(self))]
    pub async fn inspect_all(&self) -> Result<Vec<Arc<RelationMetadata>>> {
        let all = {
            let mut conn = self.inner.connection.acquire().await?;
            SchemaInspector::new(&mut conn).inspect_all().await?
        };
        let cached: Vec<_> = all.into_iter().map(|meta| self.inner.cache.insert(meta)).collect();
        info!(relations = cached.len(), "Relation metadata loaded");
        Ok(cached)
    }

    /// Every user relation of the database, ordered by schema then name.
    pub async fn relations(&self) -> Result<Vec<RelationSummary>> {
        let mut conn = self.inner.connection.acquire().await?;
        SchemaInspector::new(&mut conn).list_relations().await
    }

    /// Human-readable description of the relation `name`.
    pub async fn describe(&self, name: &str) -> Result<String> {
        let name = QualifiedName::parse(name)?;
        Ok(describe(&*self.metadata(&name).await?))
    }

    /// Runs a raw statement with positional parameters and returns its rows.
    pub async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut conn = self.inner.connection.acquire().await?;
        QueryExecutor::new(&mut conn, self.executor_config())
            .fetch_all(sql, params)
            .await
    }

    /// Runs `f` atomically with default options.
    ///
    /// Statements issued through the Model handed to `f` (or through any
    /// clone of this Model) while `f` runs belong to the scope. Calling
    /// `transaction` inside `f` opens a savepoint.
    ///
    /// ```rust,ignore
    /// let id = model
    ///     .transaction(|m| async move {
    ///         let person = m.relation("actor.person").await?;
    ///         let row = person.insert(&m, [("name", "Ann")]).await?;
    ///         Ok(row.get("id")?.clone())
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Model) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        transaction::run(self, TransactionOptions::default(), f).await
    }

    pub async fn transaction_with<T, F, Fut>(&self, options: TransactionOptions, f: F) -> Result<T>
    where
        F: FnOnce(Model) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        transaction::run(self, options, f).await
    }
}
