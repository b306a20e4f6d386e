//! The top-level entry point tying dialect, pool, and runner together behind
//! the ergonomic surface callers actually reach for (spec §4's `knex(config)`
//! equivalent).

use crate::ast::{QueryKind, QueryNode, RawFragment, Ref, RowValues};
use crate::builder::QueryBuilder;
use crate::compiler::{CompileOptions, CompiledQuery};
use crate::config::ClientConfig;
use crate::dialect::{self, Dialect};
use crate::error::Result;
use crate::pool::{AfterCreate, Pool, PoolStats};
use crate::runner::{PostProcessHook, QueryEvent, Row, RunOutcome, Runner};
use crate::transaction::{with_transaction, Transaction, TransactionOptions};
use crate::value::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A connected client: one dialect, one pool, one runner. Cheap to clone —
/// everything inside is reference-counted.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    dialect: Arc<dyn Dialect>,
    runner: Runner,
    config: Arc<ClientConfig>,
}

impl Client {
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with_hooks(config, None, None).await
    }

    pub async fn connect_with_hook(config: ClientConfig, after_create: Option<AfterCreate>) -> Result<Self> {
        Self::connect_with_hooks(config, after_create, None).await
    }

    /// Connects with both pool-level (`afterCreate`) and runner-level
    /// (`postProcessResponse`, spec §4.4 step 4) hooks. Neither hook is a
    /// `ClientConfig` field since a function value can't round-trip through
    /// the file/env-layered config loader; both are supplied here instead.
    pub async fn connect_with_hooks(
        config: ClientConfig,
        after_create: Option<AfterCreate>,
        post_process_response: Option<PostProcessHook>,
    ) -> Result<Self> {
        let dialect = dialect::resolve(&config.client)?;
        let pool = Pool::connect(&config.connection, dialect.clone(), &config.pool, after_create).await?;
        let config = Arc::new(config);
        let runner = Runner::new(pool, config.clone(), post_process_response);
        Ok(Client {
            inner: Arc::new(ClientInner {
                dialect,
                runner,
                config,
            }),
        })
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    /// The connection-level compile overrides (`searchPath`,
    /// `useNullAsDefault`, `wrapIdentifier`) every `Statement`/`TxStatement`
    /// compiles with, sourced from this client's `ClientConfig`.
    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            default_schema: self.inner.config.search_path.clone(),
            use_null_as_default: self.inner.config.use_null_as_default,
            wrap_identifier_raw: self.inner.config.wrap_identifier_raw,
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.runner.pool().stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.inner.runner.subscribe()
    }

    /// Starts a new SELECT builder targeting `table`.
    pub fn table(&self, table: impl Into<Ref>) -> Statement {
        Statement::new(self.clone(), QueryBuilder::new().from(table))
    }

    pub fn insert(&self, table: impl Into<Ref>, rows: Vec<RowValues>) -> Statement {
        Statement::new(self.clone(), QueryBuilder::insert(table, rows))
    }

    pub fn update(&self, table: impl Into<Ref>, values: RowValues) -> Statement {
        Statement::new(self.clone(), QueryBuilder::update(table, values))
    }

    pub fn delete(&self, table: impl Into<Ref>) -> Statement {
        Statement::new(self.clone(), QueryBuilder::delete(table))
    }

    /// A raw statement, spliced verbatim with `?`-style bindings (spec §4's
    /// `knex.raw(sql, bindings)`).
    pub fn raw(&self, sql: impl Into<String>, bindings: impl IntoIterator<Item = impl Into<Value>>) -> Statement {
        Statement::new(self.clone(), QueryBuilder::raw(sql, bindings))
    }

    /// Issues a standalone DDL statement (table creation, indexes, ...) built
    /// by the caller as a raw fragment, using `dialect.column_type_sql` for
    /// column declarations. Schema introspection and migrations are out of
    /// scope; this is the one hook into DDL this crate offers.
    pub fn schema_raw(&self, sql: impl Into<RawFragment>) -> Statement {
        let mut node = QueryNode::new(QueryKind::Ddl);
        node.raw = Some(sql.into());
        Statement::new(self.clone(), QueryBuilder::from_node(node))
    }

    /// Runs `scope` inside a transaction bound to one connection for its
    /// duration, committing on `Ok` and rolling back on `Err`.
    pub async fn transaction<F, T>(&self, scope: F) -> Result<Option<T>>
    where
        F: for<'c> FnOnce(TransactionHandle<'c>) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>,
    {
        self.transaction_with_options(TransactionOptions::default(), scope).await
    }

    pub async fn transaction_with_options<F, T>(&self, options: TransactionOptions, scope: F) -> Result<Option<T>>
    where
        F: for<'c> FnOnce(TransactionHandle<'c>) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>,
    {
        let client = self.clone();
        with_transaction(self.inner.runner.pool(), options, move |tx| {
            scope(TransactionHandle { client, tx })
        })
        .await
    }

    /// The non-scoped transaction provider (spec §4.6): begins a transaction
    /// and hands back a handle whose lifetime the caller manages manually —
    /// nothing commits or rolls back automatically, unlike `transaction`'s
    /// closure-scoped form. The caller must eventually call `commit` or
    /// `rollback` on the returned handle.
    pub async fn begin(&self) -> Result<OwnedTransactionHandle> {
        self.begin_with_options(TransactionOptions::default()).await
    }

    pub async fn begin_with_options(&self, options: TransactionOptions) -> Result<OwnedTransactionHandle> {
        let tx = Transaction::begin(self.inner.runner.pool(), &options).await?;
        Ok(OwnedTransactionHandle {
            client: self.clone(),
            tx,
        })
    }
}

/// A transaction handle returned by `Client::begin`, owning its `Transaction`
/// outright rather than borrowing one from a scoped closure. Otherwise a full
/// builder root, identical in shape to `TransactionHandle`: the caller drives
/// it with `table`/`insert`/`update`/`delete`/`raw` and resolves it itself
/// with `commit` or `rollback`.
pub struct OwnedTransactionHandle {
    client: Client,
    tx: Transaction,
}

impl OwnedTransactionHandle {
    pub fn dialect(&self) -> &dyn Dialect {
        self.tx.dialect()
    }

    pub fn table(&mut self, table: impl Into<Ref>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), &mut self.tx, QueryBuilder::new().from(table))
    }

    pub fn insert(&mut self, table: impl Into<Ref>, rows: Vec<RowValues>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), &mut self.tx, QueryBuilder::insert(table, rows))
    }

    pub fn update(&mut self, table: impl Into<Ref>, values: RowValues) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), &mut self.tx, QueryBuilder::update(table, values))
    }

    pub fn delete(&mut self, table: impl Into<Ref>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), &mut self.tx, QueryBuilder::delete(table))
    }

    pub fn raw(&mut self, sql: impl Into<String>, bindings: impl IntoIterator<Item = impl Into<Value>>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), &mut self.tx, QueryBuilder::raw(sql, bindings))
    }

    pub async fn savepoint(&mut self) -> Result<String> {
        self.tx.savepoint().await
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.tx.release_savepoint(name).await
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.tx.rollback_to_savepoint(name).await
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await
    }
}

/// A handle a transaction scope uses to issue statements bound to that
/// transaction's connection. Borrows the transaction rather than owning it,
/// since `with_transaction` retains ownership for the final commit/rollback.
pub struct TransactionHandle<'c> {
    client: Client,
    tx: &'c mut Transaction,
}

impl<'c> TransactionHandle<'c> {
    pub fn dialect(&self) -> &dyn Dialect {
        self.tx.dialect()
    }

    pub fn table(&mut self, table: impl Into<Ref>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), self.tx, QueryBuilder::new().from(table))
    }

    pub fn insert(&mut self, table: impl Into<Ref>, rows: Vec<RowValues>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), self.tx, QueryBuilder::insert(table, rows))
    }

    pub fn update(&mut self, table: impl Into<Ref>, values: RowValues) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), self.tx, QueryBuilder::update(table, values))
    }

    pub fn delete(&mut self, table: impl Into<Ref>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), self.tx, QueryBuilder::delete(table))
    }

    pub fn raw(&mut self, sql: impl Into<String>, bindings: impl IntoIterator<Item = impl Into<Value>>) -> TxStatement<'_> {
        TxStatement::new(self.client.clone(), self.tx, QueryBuilder::raw(sql, bindings))
    }

    /// Issues a `SAVEPOINT`, returning a handle name that can later be
    /// released or rolled back to (nested-transaction semantics).
    pub async fn savepoint(&mut self) -> Result<String> {
        self.tx.savepoint().await
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.tx.release_savepoint(name).await
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.tx.rollback_to_savepoint(name).await
    }
}

/// A builder bound to an open transaction's connection rather than the pool;
/// every terminal call runs through `Runner::run_in_transaction`.
pub struct TxStatement<'c> {
    client: Client,
    tx: &'c mut Transaction,
    builder: QueryBuilder,
}

impl<'c> TxStatement<'c> {
    fn new(client: Client, tx: &'c mut Transaction, builder: QueryBuilder) -> Self {
        TxStatement { client, tx, builder }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn map<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.builder = f(self.builder);
        self
    }

    pub fn to_sql(&self) -> Result<CompiledQuery> {
        self.builder
            .to_sql_with_options(self.client.dialect(), self.client.compile_options())
    }

    /// Bounds how long the runner will wait on this statement (spec §5
    /// "Cancellation"); delegates to the underlying builder.
    pub fn timeout(mut self, ms: u64) -> Self {
        self.builder = self.builder.timeout(ms);
        self
    }

    pub fn timeout_with_cancel(mut self, ms: u64) -> Self {
        self.builder = self.builder.timeout_with_cancel(ms);
        self
    }

    pub async fn run(self) -> Result<RunOutcome> {
        let compiled = self.to_sql()?;
        let exec = self.builder.exec_options();
        self.client
            .inner
            .runner
            .run_in_transaction_with_exec(self.tx, &compiled, exec)
            .await
    }

    pub async fn rows(self) -> Result<Vec<Row>> {
        match self.run().await? {
            RunOutcome::Rows(rows) => Ok(rows),
            RunOutcome::Affected { .. } => Ok(Vec::new()),
        }
    }

    pub async fn first(self) -> Result<Option<Row>> {
        Ok(crate::runner::first(self.rows().await?))
    }

    pub async fn pluck(self, column: &str) -> Result<Vec<Value>> {
        Ok(crate::runner::pluck(self.rows().await?, column))
    }

    pub async fn affected(self) -> Result<u64> {
        match self.run().await? {
            RunOutcome::Affected { count, .. } => Ok(count),
            RunOutcome::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    /// The dialect-provided `lastInsertRowid` for a single-row INSERT with no
    /// RETURNING clause (spec §4.4, §8 scenario 4). `None` on backends that
    /// don't track one (e.g. Postgres without RETURNING) or on any other
    /// statement shape.
    pub async fn last_insert_id(self) -> Result<Option<i64>> {
        match self.run().await? {
            RunOutcome::Affected { last_insert_id, .. } => Ok(last_insert_id),
            RunOutcome::Rows(_) => Ok(None),
        }
    }
}

/// A builder paired with the client (or transaction) it will execute
/// against. Everything before a terminal call is pure AST assembly; `await`
/// triggers compile + run.
pub struct Statement {
    client: Client,
    builder: QueryBuilder,
}

impl Statement {
    fn new(client: Client, builder: QueryBuilder) -> Self {
        Statement { client, builder }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn map<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.builder = f(self.builder);
        self
    }

    pub fn to_sql(&self) -> Result<CompiledQuery> {
        self.builder
            .to_sql_with_options(self.client.dialect(), self.client.compile_options())
    }

    /// Bounds how long the runner will wait on this statement (spec §5
    /// "Cancellation"); delegates to the underlying builder.
    pub fn timeout(mut self, ms: u64) -> Self {
        self.builder = self.builder.timeout(ms);
        self
    }

    pub fn timeout_with_cancel(mut self, ms: u64) -> Self {
        self.builder = self.builder.timeout_with_cancel(ms);
        self
    }

    pub async fn run(self) -> Result<RunOutcome> {
        let compiled = self.to_sql()?;
        let exec = self.builder.exec_options();
        self.client.inner.runner.run_with_exec(&compiled, exec).await
    }

    pub async fn rows(self) -> Result<Vec<Row>> {
        match self.run().await? {
            RunOutcome::Rows(rows) => Ok(rows),
            RunOutcome::Affected { .. } => Ok(Vec::new()),
        }
    }

    pub async fn first(self) -> Result<Option<Row>> {
        Ok(crate::runner::first(self.rows().await?))
    }

    pub async fn pluck(self, column: &str) -> Result<Vec<Value>> {
        Ok(crate::runner::pluck(self.rows().await?, column))
    }

    pub async fn affected(self) -> Result<u64> {
        match self.run().await? {
            RunOutcome::Affected { count, .. } => Ok(count),
            RunOutcome::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    /// The dialect-provided `lastInsertRowid` for a single-row INSERT with no
    /// RETURNING clause (spec §4.4, §8 scenario 4). `None` on backends that
    /// don't track one (e.g. Postgres without RETURNING) or on any other
    /// statement shape.
    pub async fn last_insert_id(self) -> Result<Option<i64>> {
        match self.run().await? {
            RunOutcome::Affected { last_insert_id, .. } => Ok(last_insert_id),
            RunOutcome::Rows(_) => Ok(None),
        }
    }
}
