//! The driver adapter boundary: translates between this crate's [`Value`]
//! representation and `sqlx`'s runtime-polymorphic `Any` backend, and
//! normalizes raw `sqlx::Error`s through a dialect's `transform_error` hook
//! (spec §4.2, §7). One `AnyPool`/`AnyConnection` serves every supported
//! backend family, so there is a single adapter rather than one per dialect —
//! the per-backend differences live entirely in the [`crate::dialect::Dialect`]
//! strategy objects that parameterize it.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::value::Value;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::{Arguments, Row, TypeInfo, ValueRef};

/// Binds an ordered list of [`Value`]s onto a fresh `sqlx::any::AnyArguments`,
/// in the order the compiler emitted their placeholders.
pub fn bind_arguments(bindings: &[Value]) -> Result<AnyArguments<'static>> {
    let mut args = AnyArguments::default();
    for value in bindings {
        bind_one(&mut args, value)?;
    }
    Ok(args)
}

fn bind_one(args: &mut AnyArguments<'static>, value: &Value) -> Result<()> {
    match value {
        Value::Null => args.add(Option::<i64>::None),
        Value::Bool(b) => args.add(*b),
        Value::Int(i) => args.add(*i),
        Value::Float(f) => args.add(*f),
        Value::Decimal(d) => args.add(d.clone()),
        Value::Text(s) => args.add(s.clone()),
        Value::Blob(b) => args.add(b.clone()),
        Value::Timestamp(ts) => args.add(*ts),
        Value::Json(j) => args.add(sqlx::types::Json(j.clone())),
        Value::Raw(raw) => {
            return Err(Error::Config(format!(
                "raw fragment '{}' reached the driver boundary unexpanded",
                raw.sql
            )))
        }
    }
    .map_err(|e| Error::Config(format!("failed to bind parameter: {e}")))
}

/// Decodes a driver row into an ordered `(column name, Value)` list. `AnyRow`
/// erases the backend but still reports each column's native type name, which
/// is enough to pick a reasonable decode path without knowing the schema
/// ahead of time.
pub fn decode_row(row: &AnyRow) -> Result<Vec<(String, Value)>> {
    let mut out = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_cell(row, idx, column.type_info().name())?;
        out.push((column.name().to_string(), value));
    }
    Ok(out)
}

fn decode_cell(row: &AnyRow, idx: usize, type_name: &str) -> Result<Value> {
    let raw = row
        .try_get_raw(idx)
        .map_err(|e| Error::Stream(e.to_string()))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let upper = type_name.to_ascii_uppercase();
    let decoded = match upper.as_str() {
        "BOOL" | "BOOLEAN" => row.try_get::<bool, _>(idx).map(Value::Bool),
        "INT2" | "INT4" | "INT8" | "INTEGER" | "SMALLINT" | "BIGINT" | "TINYINT"
        | "MEDIUMINT" => row.try_get::<i64, _>(idx).map(Value::Int),
        "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "NUMERIC" | "DECIMAL" => {
            row.try_get::<f64, _>(idx).map(Value::Float)
        }
        "JSON" | "JSONB" => row
            .try_get::<sqlx::types::Json<serde_json::Value>, _>(idx)
            .map(|j| Value::Json(j.0)),
        "BYTEA" | "BLOB" | "VARBINARY" | "BINARY" => row.try_get::<Vec<u8>, _>(idx).map(Value::Blob),
        "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "DATETIME2" | "DATETIMEOFFSET" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(Value::Timestamp),
        _ => row.try_get::<String, _>(idx).map(Value::Text),
    };
    decoded.map_err(|e| Error::Stream(format!("failed to decode column {idx} ({type_name}): {e}")))
}

/// Normalizes a raw `sqlx::Error` into the canonical taxonomy, delegating
/// constraint/syntax/cancellation classification to the dialect.
pub fn transform_error(dialect: &dyn Dialect, err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            let code = db_err.code().map(|c| c.into_owned());
            dialect.transform_error(&message, code.as_deref())
        }
        sqlx::Error::PoolTimedOut => Error::Timeout(std::time::Duration::default()),
        sqlx::Error::Io(io) => Error::Connection(io.to_string()),
        other => Error::Connection(other.to_string()),
    }
}
