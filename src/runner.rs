//! The runner: acquire → emit `query` event → execute → post-process →
//! release, plus a streaming path with caller-paced back-pressure (spec §4.4).

use crate::builder::ExecOptions;
use crate::compiler::{CompiledQuery, Method};
use crate::config::ClientConfig;
use crate::driver::{bind_arguments, decode_row, transform_error};
use crate::error::{Error, Result};
use crate::pool::{Pool, PooledConnection};
use crate::transaction::Transaction;
use crate::value::Value;
use futures::stream::{Stream, StreamExt};
use sqlx::Executor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// One decoded result row, as an ordered `(column, value)` list — the same
/// shape `crate::driver::decode_row` produces so the runner and the
/// transaction-bound execution path share one representation.
pub type Row = Vec<(String, Value)>;

/// What a finished query produced, before any `first()`/`pluck()` sugar the
/// builder layer applies on top.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Rows(Vec<Row>),
    /// An INSERT/UPDATE/DELETE with no RETURNING clause: the driver-reported
    /// affected-row count, plus a dialect-provided `lastInsertRowid` for
    /// single-row inserts where the backend tracks one (spec §4.4 "method
    /// inference" / §8 scenario 4).
    Affected {
        count: u64,
        last_insert_id: Option<i64>,
    },
}

/// The in-process event bus mirroring Knex's `query` / `query-response` /
/// `query-error` / `start` events (spec §4.4), independent of `tracing`
/// output — a caller can subscribe without installing a subscriber.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    Start,
    Query { sql: String, bindings: Vec<Value> },
    QueryResponse { sql: String, elapsed: std::time::Duration },
    /// `creation_backtrace` is populated only when `ClientConfig::async_stack_traces`
    /// is set: the native call stack captured at the point the error surfaced,
    /// since the `sqlx::Error` itself carries none of the caller's async chain.
    QueryError {
        sql: String,
        error: String,
        creation_backtrace: Option<String>,
    },
}

/// A read-only view of the query a `PostProcessHook` ran against (spec §4.4
/// step 4's `queryContext`).
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub sql: String,
    pub method: Method,
}

/// Caller-supplied row post-processor (spec §4.4 step 4,
/// `ClientConfig::post_process_response`'s Knex equivalent `postProcessResponse`):
/// runs once per finished query, before `first()`/`pluck()` sugar, and may
/// transform the outcome the caller ultimately sees. Registered at connect
/// time (`Client::connect_with_hooks`) rather than as a `ClientConfig` field,
/// since a function value isn't representable in a deserialized config file —
/// the same reasoning that already keeps `afterCreate` out of `PoolConfig`.
pub type PostProcessHook = Arc<dyn Fn(RunOutcome, &QueryContext) -> RunOutcome + Send + Sync>;

pub struct Runner {
    pool: Pool,
    config: Arc<ClientConfig>,
    events: broadcast::Sender<QueryEvent>,
    post_process: Option<PostProcessHook>,
}

impl Runner {
    pub fn new(pool: Pool, config: Arc<ClientConfig>, post_process: Option<PostProcessHook>) -> Self {
        let (events, _) = broadcast::channel(1024);
        Runner {
            pool,
            config,
            events,
            post_process,
        }
    }

    /// Runs the registered `postProcessResponse` hook, if any, over a finished
    /// outcome before it reaches `first()`/`pluck()`/`affected()` sugar.
    fn post_process(&self, outcome: RunOutcome, compiled: &CompiledQuery) -> RunOutcome {
        match &self.post_process {
            Some(hook) => hook(
                outcome,
                &QueryContext {
                    sql: compiled.sql.clone(),
                    method: compiled.method,
                },
            ),
            None => outcome,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: QueryEvent) {
        // A broadcast channel with no subscribers errors on send; that's an
        // expected, ignorable case here, not a failure of the query itself.
        let _ = self.events.send(event);
    }

    /// Runs `needs_rows`-shaped query execution against one already-acquired
    /// connection; factored out so `run` can race it against a timeout.
    async fn execute_on(
        &self,
        conn: &mut PooledConnection,
        compiled: &CompiledQuery,
        needs_rows: bool,
    ) -> Result<RunOutcome> {
        if needs_rows {
            let args = bind_arguments(&compiled.bindings)?;
            let query = sqlx::query_with(&compiled.sql, args);
            conn.fetch_all(query)
                .await
                .map_err(|e| transform_error(self.pool.dialect().as_ref(), e))
                .and_then(|rows| {
                    rows.iter()
                        .map(decode_row)
                        .collect::<Result<Vec<Row>>>()
                        .map(RunOutcome::Rows)
                })
        } else {
            let args = bind_arguments(&compiled.bindings)?;
            let query = sqlx::query_with(&compiled.sql, args);
            conn.execute(query)
                .await
                .map(|r| RunOutcome::Affected {
                    count: r.rows_affected(),
                    last_insert_id: r.last_insert_id(),
                })
                .map_err(|e| transform_error(self.pool.dialect().as_ref(), e))
        }
    }

    /// Runs a compiled query against the pool, outside any transaction.
    pub async fn run(&self, compiled: &CompiledQuery) -> Result<RunOutcome> {
        self.run_with_exec(compiled, ExecOptions::default()).await
    }

    /// Runs a compiled query against the pool, bounded by `exec`'s timeout
    /// (spec §5 "Cancellation"), if any.
    pub async fn run_with_exec(&self, compiled: &CompiledQuery, exec: ExecOptions) -> Result<RunOutcome> {
        self.emit(QueryEvent::Start);
        self.emit(QueryEvent::Query {
            sql: compiled.sql.clone(),
            bindings: compiled.bindings.clone(),
        });
        if self.config.log.debug {
            debug!(sql = %compiled.sql, bindings = ?compiled.bindings, "sqlkit: executing query");
        }

        let started = Instant::now();
        let mut conn = self.pool.acquire().await?;
        let needs_rows = matches!(compiled.method, Method::Select | Method::Raw) || compiled.returning.is_some();

        let result = race_exec(exec, self.execute_on(&mut conn, compiled, needs_rows)).await;

        match result {
            Ok(outcome) => {
                self.emit(QueryEvent::QueryResponse {
                    sql: compiled.sql.clone(),
                    elapsed: started.elapsed(),
                });
                Ok(self.post_process(outcome, compiled))
            }
            Err(err) => {
                let err = if self.config.compile_sql_on_error {
                    err.with_sql(compiled.sql.clone())
                } else {
                    err
                };
                let creation_backtrace = self
                    .config
                    .async_stack_traces
                    .then(|| std::backtrace::Backtrace::force_capture().to_string());
                self.emit(QueryEvent::QueryError {
                    sql: compiled.sql.clone(),
                    error: err.to_string(),
                    creation_backtrace: creation_backtrace.clone(),
                });
                match &creation_backtrace {
                    Some(bt) => warn!(sql = %compiled.sql, error = %err, backtrace = %bt, "sqlkit: query failed"),
                    None => warn!(sql = %compiled.sql, error = %err, "sqlkit: query failed"),
                }
                Err(err)
            }
        }
    }

    /// Runs a compiled query against an already-open transaction's connection.
    pub async fn run_in_transaction(&self, tx: &mut Transaction, compiled: &CompiledQuery) -> Result<RunOutcome> {
        self.run_in_transaction_with_exec(tx, compiled, ExecOptions::default()).await
    }

    /// Runs a compiled query against an already-open transaction's connection,
    /// bounded by `exec`'s timeout, if any.
    pub async fn run_in_transaction_with_exec(
        &self,
        tx: &mut Transaction,
        compiled: &CompiledQuery,
        exec: ExecOptions,
    ) -> Result<RunOutcome> {
        self.emit(QueryEvent::Query {
            sql: compiled.sql.clone(),
            bindings: compiled.bindings.clone(),
        });
        let needs_rows = matches!(compiled.method, Method::Select | Method::Raw) || compiled.returning.is_some();
        let body = async {
            if needs_rows {
                let rows = tx.execute_raw(compiled).await?;
                Ok(RunOutcome::Rows(rows))
            } else {
                let (count, last_insert_id) = tx.execute_affected(compiled).await?;
                Ok(RunOutcome::Affected { count, last_insert_id })
            }
        };
        let outcome = race_exec(exec, body).await?;
        Ok(self.post_process(outcome, compiled))
    }

    /// Streams rows one at a time; the caller's own poll rate is the only
    /// back-pressure signal, since nothing here buffers ahead of what's
    /// already been pulled from the driver.
    pub fn stream<'a>(
        &'a self,
        compiled: &'a CompiledQuery,
    ) -> impl Stream<Item = Result<Row>> + 'a {
        async_stream::try_stream! {
            let mut conn = self.pool.acquire().await?;
            let args = bind_arguments(&compiled.bindings)?;
            let query = sqlx::query_with(&compiled.sql, args);
            let mut rows = conn.fetch(query);
            while let Some(row) = rows.next().await {
                let row = row.map_err(|e| transform_error(self.pool.dialect().as_ref(), e))?;
                yield decode_row(&row)?;
            }
        }
    }
}

/// `first()` builder sugar: the head of a result set, if any.
pub fn first(rows: Vec<Row>) -> Option<Row> {
    rows.into_iter().next()
}

/// `pluck(column)` builder sugar: projects a single column out of every row.
pub fn pluck(rows: Vec<Row>, column: &str) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().find(|(c, _)| c == column).map(|(_, v)| v))
        .collect()
}

/// Races `fut` against `exec`'s timeout, if any (spec §5 "Cancellation").
/// Kept free of any I/O type so both execution paths above, and this
/// module's own tests, race the same logic against an arbitrary future.
async fn race_exec<F, T>(exec: ExecOptions, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match exec.timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), fut).await {
            Ok(result) => result,
            Err(_) if exec.cancel_on_timeout => Err(Error::Cancellation),
            Err(_) => Err(Error::Timeout(Duration::from_millis(ms))),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn race_exec_without_a_timeout_just_awaits_the_future() {
        let result = race_exec(ExecOptions::default(), async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn race_exec_lets_a_fast_future_beat_the_deadline() {
        let exec = ExecOptions {
            timeout_ms: Some(500),
            cancel_on_timeout: false,
        };
        let result = race_exec(exec, async { Ok::<_, Error>(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn race_exec_times_out_when_the_future_outlives_the_deadline() {
        let exec = ExecOptions {
            timeout_ms: Some(50),
            cancel_on_timeout: false,
        };
        let result = race_exec(exec, async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, Error>(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn race_exec_surfaces_cancellation_when_requested() {
        let exec = ExecOptions {
            timeout_ms: Some(50),
            cancel_on_timeout: true,
        };
        let result = race_exec(exec, async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, Error>(())
        })
        .await;
        assert!(matches!(result, Err(Error::Cancellation)));
    }
}
