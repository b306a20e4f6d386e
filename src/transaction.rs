//! Transaction state machine: idle → open → committed | rolled back, with a
//! savepoint stack for nested transactions (spec §4.6).

use crate::compiler::CompiledQuery;
use crate::dialect::Dialect;
use crate::driver::{bind_arguments, decode_row, transform_error};
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::value::Value;
use sqlx::{Any, Executor};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// Options controlling how a transaction is issued (spec §4.6: `readOnly`,
/// `isolationLevel`).
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub read_only: bool,
    pub isolation_level: Option<IsolationLevel>,
    /// When set, a rolled-back transaction resolves its `transaction(scope)`
    /// future as `Ok` instead of propagating the rollback as an error — the
    /// `doNotRejectOnRollback` escape hatch.
    pub do_not_reject_on_rollback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read uncommitted",
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::RepeatableRead => "repeatable read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

static SAVEPOINT_COUNTER: AtomicU32 = AtomicU32::new(0);

/// An open transaction bound exclusively to one connection for its lifetime.
/// Every query issued through a `Transaction` reuses that connection; the
/// connection is only returned to the pool once the transaction resolves.
pub struct Transaction {
    inner: Option<sqlx::Transaction<'static, Any>>,
    dialect: Arc<dyn Dialect>,
    state: TxState,
    savepoints: Vec<String>,
}

impl Transaction {
    pub(crate) async fn begin(pool: &Pool, options: &TransactionOptions) -> Result<Self> {
        let mut tx = pool.begin().await?;

        if let Some(level) = options.isolation_level {
            let sql = format!("set transaction isolation level {}", level.as_sql());
            tx.execute(sql.as_str())
                .await
                .map_err(|e| transform_error(pool.dialect().as_ref(), e))?;
        }
        if options.read_only {
            tx.execute("set transaction read only")
                .await
                .map_err(|e| transform_error(pool.dialect().as_ref(), e))?;
        }

        Ok(Transaction {
            inner: Some(tx),
            dialect: pool.dialect(),
            state: TxState::Open,
            savepoints: Vec::new(),
        })
    }

    fn require_open(&self) -> Result<()> {
        match self.state {
            TxState::Open => Ok(()),
            TxState::Committed => Err(Error::Transaction(
                "cannot operate on a transaction that has already committed".to_string(),
            )),
            TxState::RolledBack => Err(Error::Transaction(
                "cannot operate on a transaction that has already rolled back".to_string(),
            )),
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub async fn execute_raw(&mut self, compiled: &CompiledQuery) -> Result<Vec<Vec<(String, Value)>>> {
        self.require_open()?;
        let tx = self.inner.as_mut().expect("transaction open implies inner is Some");
        let args = bind_arguments(&compiled.bindings)?;
        let query = sqlx::query_with(&compiled.sql, args);
        let rows = tx
            .fetch_all(query)
            .await
            .map_err(|e| transform_error(self.dialect.as_ref(), e))?;
        rows.iter().map(decode_row).collect()
    }

    /// Runs an INSERT/UPDATE/DELETE with no RETURNING clause, returning the
    /// driver-reported affected-row count and, where the backend tracks one, a
    /// `lastInsertRowid` (spec §4.4 "method inference").
    pub async fn execute_affected(&mut self, compiled: &CompiledQuery) -> Result<(u64, Option<i64>)> {
        self.require_open()?;
        let tx = self.inner.as_mut().expect("transaction open implies inner is Some");
        let args = bind_arguments(&compiled.bindings)?;
        let query = sqlx::query_with(&compiled.sql, args);
        let result = tx
            .execute(query)
            .await
            .map_err(|e| transform_error(self.dialect.as_ref(), e))?;
        Ok((result.rows_affected(), result.last_insert_id()))
    }

    /// Issues a `SAVEPOINT`, returning a handle that can later be released or
    /// rolled back to, implementing nested-transaction semantics uniformly
    /// across backends that all speak the same SAVEPOINT syntax.
    pub async fn savepoint(&mut self) -> Result<String> {
        self.require_open()?;
        let name = format!("sqlkit_sp_{}", SAVEPOINT_COUNTER.fetch_add(1, Ordering::SeqCst));
        let tx = self.inner.as_mut().expect("transaction open implies inner is Some");
        tx.execute(format!("savepoint {name}").as_str())
            .await
            .map_err(|e| transform_error(self.dialect.as_ref(), e))?;
        self.savepoints.push(name.clone());
        Ok(name)
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.require_open()?;
        let tx = self.inner.as_mut().expect("transaction open implies inner is Some");
        tx.execute(format!("release savepoint {name}").as_str())
            .await
            .map_err(|e| transform_error(self.dialect.as_ref(), e))?;
        self.savepoints.retain(|s| s != name);
        Ok(())
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.require_open()?;
        let tx = self.inner.as_mut().expect("transaction open implies inner is Some");
        tx.execute(format!("rollback to savepoint {name}").as_str())
            .await
            .map_err(|e| transform_error(self.dialect.as_ref(), e))?;
        Ok(())
    }

    pub async fn commit(mut self) -> Result<()> {
        self.require_open()?;
        let tx = self.inner.take().expect("transaction open implies inner is Some");
        tx.commit()
            .await
            .map_err(|e| transform_error(self.dialect.as_ref(), e))?;
        self.state = TxState::Committed;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.require_open()?;
        let tx = self.inner.take().expect("transaction open implies inner is Some");
        tx.rollback()
            .await
            .map_err(|e| transform_error(self.dialect.as_ref(), e))?;
        self.state = TxState::RolledBack;
        Ok(())
    }
}

/// Runs `scope` inside a transaction: commits on `Ok`, rolls back on `Err`
/// (spec §4.6's scoped `transaction(scope)` form). With
/// `options.do_not_reject_on_rollback`, a rollback resolves as `Ok(None)`
/// instead of propagating the scope's error.
///
/// `scope` returns a boxed future tied to the borrow of the transaction it
/// receives, rather than an associated `Future` type, because no single
/// lifetime can name "the borrow this particular call happens to get" in an
/// ordinary `where` clause — the same shape transaction helpers in other
/// async ORMs converge on for this reason.
pub async fn with_transaction<F, T>(
    pool: &Pool,
    options: TransactionOptions,
    scope: F,
) -> Result<Option<T>>
where
    F: for<'c> FnOnce(&'c mut Transaction) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>,
{
    let mut tx = Transaction::begin(pool, &options).await?;
    match scope(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(Some(value))
        }
        Err(err) => {
            let reject = !options.do_not_reject_on_rollback;
            tx.rollback().await?;
            if reject {
                Err(err)
            } else {
                Ok(None)
            }
        }
    }
}
