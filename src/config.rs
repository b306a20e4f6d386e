//! Client configuration (spec §4 "Config"), loaded the way the rest of this
//! stack's services load theirs: a base file, an optional environment-named
//! override file, then environment variables, layered with the `config`
//! crate. The source file this repo's own `AppConfig::load` lived in wasn't
//! part of the pack this crate was built against; this loader reconstructs
//! the same layering contract from the `config` crate's documented usage.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

fn default_min() -> u32 {
    2
}
fn default_max() -> u32 {
    10
}
fn default_acquire_timeout_ms() -> u64 {
    30_000
}
fn default_idle_timeout_ms() -> u64 {
    10 * 60_000
}
fn default_max_lifetime_ms() -> u64 {
    30 * 60_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_min")]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: u32,
    #[serde(default = "default_acquire_timeout_ms", rename = "acquire_timeout_ms")]
    acquire_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_ms", rename = "idle_timeout_ms")]
    idle_timeout_ms: u64,
    #[serde(default = "default_max_lifetime_ms", rename = "max_lifetime_ms")]
    max_lifetime_ms: u64,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min: default_min(),
            max: default_max(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_lifetime_ms: default_max_lifetime_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Mirrors knex's `{warn, error, deprecate, debug}` log surface: when
    /// `debug` is set, every compiled statement is emitted as a `tracing`
    /// event in addition to the in-process `QueryEvent` bus.
    #[serde(default)]
    pub debug: bool,
}

/// Top-level client configuration, matching spec §4's named options.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Dialect name, resolved through `crate::dialect::resolve`.
    pub client: String,
    /// Driver connection string (`postgres://...`, `mysql://...`, a SQLite path, ...).
    pub connection: String,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Emulates Knex's `useNullAsDefault`: allows INSERT rows with missing
    /// columns to be padded with NULL even on dialects that don't do this by
    /// default (spec §4.3's `inserts_undefined_as_null` override).
    #[serde(default)]
    pub use_null_as_default: bool,
    pub search_path: Option<String>,
    /// When true, identifiers are passed through `wrap_identifier` unchanged
    /// instead of the dialect's default quoting — an escape hatch for
    /// generated column names that already carry their own quoting.
    #[serde(default)]
    pub wrap_identifier_raw: bool,
    /// Captures a native call stack on query failure and attaches it to the
    /// emitted `QueryEvent::QueryError` / `tracing::warn!` (spec §4's
    /// `asyncStackTraces`). Row post-processing (`postProcessResponse`) isn't
    /// a config field here since a function value can't be deserialized from
    /// a config file; register one via `Client::connect_with_hooks` instead.
    #[serde(default)]
    pub async_stack_traces: bool,
    #[serde(default = "default_acquire_timeout_ms", rename = "acquire_connection_timeout_ms")]
    acquire_connection_timeout_ms: u64,
    #[serde(default)]
    pub log: LogConfig,
    /// Attaches the failing SQL text to `Error::Syntax` (spec §9 resolved:
    /// default on, since the cost is one extra clone on the error path only).
    #[serde(default = "default_true")]
    pub compile_sql_on_error: bool,
}

fn default_true() -> bool {
    true
}

impl ClientConfig {
    pub fn acquire_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_connection_timeout_ms)
    }

    /// Layers `sqlkit.toml` (or `.yaml`/`.json`, whichever `config` finds),
    /// an optional `sqlkit.{SQLKIT_ENV}.toml` override, then `SQLKIT_`-prefixed
    /// environment variables, highest layer wins.
    pub fn load(base_path: &str) -> Result<Self> {
        let env = std::env::var("SQLKIT_ENV").unwrap_or_else(|_| "development".to_string());

        let figment = config::Config::builder()
            .add_source(config::File::with_name(base_path).required(false))
            .add_source(config::File::with_name(&format!("{base_path}.{env}")).required(false))
            .add_source(config::Environment::with_prefix("SQLKIT").separator("__"));

        let loaded = figment
            .build()
            .map_err(|e| Error::Config(format!("failed to load configuration: {e}")))?;

        loaded
            .try_deserialize()
            .map_err(|e| Error::Config(format!("invalid configuration: {e}")))
    }

    /// Builds a config directly from values already in hand (tests, or a
    /// caller that assembles its own `ClientConfig` without a file).
    pub fn new(client: impl Into<String>, connection: impl Into<String>) -> Self {
        ClientConfig {
            client: client.into(),
            connection: connection.into(),
            pool: PoolConfig::default(),
            use_null_as_default: false,
            search_path: None,
            wrap_identifier_raw: false,
            async_stack_traces: false,
            acquire_connection_timeout_ms: default_acquire_timeout_ms(),
            log: LogConfig::default(),
            compile_sql_on_error: true,
        }
    }
}
