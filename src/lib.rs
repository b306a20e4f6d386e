pub mod ast;
pub mod builder;
pub mod client;
pub mod compiler;
pub mod config;
pub mod dialect;
mod driver;
pub mod error;
pub mod pool;
pub mod runner;
pub mod transaction;
pub mod value;

pub use builder::{ExecOptions, QueryBuilder};
pub use client::{Client, OwnedTransactionHandle, Statement, TransactionHandle, TxStatement};
pub use compiler::{CompiledQuery, Method};
pub use config::{ClientConfig, LogConfig, PoolConfig};
pub use error::{Error, Result};
pub use pool::{Pool, PoolStats};
pub use runner::{PostProcessHook, QueryContext, QueryEvent, Row, RunOutcome};
pub use transaction::{IsolationLevel, Transaction, TransactionOptions};
pub use value::Value;
