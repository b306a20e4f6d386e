//! Dialect strategy: identifier quoting, placeholder style, feature gating, type
//! mapping, and error normalization, captured as value objects per spec §4.2.

pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::error::Error;
use crate::value::Value;
use std::sync::Arc;

/// Parameter placeholder style emitted by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Positional,
    /// `$1`, `$2`, ...
    NumberedDollar,
    /// `@p1`, `@p2`, ...
    NumberedAt,
}

/// Dialect feature flags gating compiler emission, per spec §4.2.
#[derive(Debug, Clone, Copy)]
pub struct Features {
    pub supports_returning: bool,
    pub supports_cte: bool,
    pub supports_recursive_cte: bool,
    pub supports_materialized_cte: bool,
    pub supports_json_path: bool,
    pub supports_on_conflict: bool,
    pub supports_update_from: bool,
    pub supports_for_update_of_tables: bool,
    pub supports_skip_locked: bool,
    pub supports_distinct_on: bool,
    pub supports_ilike: bool,
    pub supports_boolean: bool,
    pub inserts_undefined_as_null: bool,
    /// Whether `count(distinct a, b, ...)` over more than one column is
    /// accepted natively. Dialects without it need a lossy `concat()`
    /// rewrite instead (spec §4.3 point 5: "the dialect decides").
    pub supports_multi_column_count_distinct: bool,
}

/// The closed set of logical column types a dialect maps to its native DDL
/// spelling (spec §4.2). Only consulted by callers building DDL column
/// declarations; the compiler itself never needs this to render DML/DQL.
#[derive(Debug, Clone)]
pub enum LogicalType {
    Increments,
    BigIncrements,
    Integer,
    TinyInt,
    SmallInt,
    MediumInt,
    BigInteger,
    Text,
    Varchar(u32),
    Float,
    Double,
    Decimal(u32, u32),
    Boolean,
    Date,
    DateTime,
    Time,
    Timestamp,
    Geometry,
    Geography,
    Point,
    Binary(u32),
    Enum(Vec<String>),
    Json,
    Jsonb,
    Uuid,
}

/// How `LIMIT`/`OFFSET` are rendered for dialects that don't speak the ANSI form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOffsetStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

/// A dialect value object encapsulating all backend-specific behavior. One
/// instance per supported backend family lives in the process-global registry
/// (`resolve`).
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Quotes a single already-split identifier segment (never a dotted path).
    fn quote_identifier(&self, segment: &str) -> String;

    fn placeholder_style(&self) -> PlaceholderStyle;

    fn features(&self) -> Features;

    fn column_type_sql(&self, ty: &LogicalType) -> String;

    /// Literalizes a value for debug/format output only — never used to build
    /// SQL that gets executed (spec §4.2: "for debug/format only").
    fn literalize(&self, value: &Value) -> String {
        default_literalize(value)
    }

    /// Emulates booleans as 0/1 where the backend lacks a boolean type.
    fn rewrite_boolean(&self, value: bool) -> Value {
        if self.features().supports_boolean {
            Value::Bool(value)
        } else {
            Value::Int(i64::from(value))
        }
    }

    fn limit_offset_style(&self) -> LimitOffsetStyle {
        LimitOffsetStyle::LimitOffset
    }

    /// Normalizes a driver-native error into the canonical taxonomy (spec §7),
    /// including constraint-code normalization.
    fn transform_error(&self, message: &str, code: Option<&str>) -> Error;
}

fn default_literalize(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.clone(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => format!("x'{}'", hex_encode(b)),
        Value::Timestamp(ts) => format!("'{}'", ts.to_rfc3339()),
        Value::Json(j) => format!("'{}'", j.to_string().replace('\'', "''")),
        Value::Raw(r) => r.sql.clone(),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Resolves a dialect name to its strategy object. Unknown names fail fast with
/// `Error::Config`, matching spec §4.2's registry contract. Several names in
/// spec's closed list are wire-compatible forks or near-equivalents of an
/// implemented dialect and are resolved as aliases (documented in DESIGN.md).
pub fn resolve(name: &str) -> Result<Arc<dyn Dialect>, Error> {
    let dialect: Arc<dyn Dialect> = match name {
        "pg" | "postgres" | "postgresql" | "redshift" | "cockroachdb" => {
            Arc::new(postgres::PostgresDialect)
        }
        "mysql" | "mysql2" => Arc::new(mysql::MysqlDialect),
        "sqlite" | "sqlite3" | "better-sqlite" | "node-sqlite" => Arc::new(sqlite::SqliteDialect),
        "mssql" => Arc::new(mssql::MssqlDialect),
        // Oracle is not independently implemented; it is approximated by the
        // Postgres strategy (both support RETURNING and double-quote
        // identifiers). Full Oracle placeholder/error-code support is left as
        // an adapter hook per spec §9's open question.
        "oracle" => Arc::new(postgres::PostgresDialect),
        other => {
            return Err(Error::Config(format!("unknown dialect '{other}'")));
        }
    };
    Ok(dialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_aliases() {
        for name in ["pg", "postgres", "postgresql", "redshift", "cockroachdb"] {
            assert_eq!(resolve(name).unwrap().name(), "pg");
        }
        for name in ["mysql", "mysql2"] {
            assert_eq!(resolve(name).unwrap().name(), "mysql");
        }
        for name in ["sqlite", "sqlite3", "better-sqlite", "node-sqlite"] {
            assert_eq!(resolve(name).unwrap().name(), "sqlite");
        }
        assert_eq!(resolve("mssql").unwrap().name(), "mssql");
        // Oracle has no dedicated strategy; it is approximated by Postgres's.
        assert_eq!(resolve("oracle").unwrap().name(), "pg");
    }

    #[test]
    fn unknown_dialect_fails_fast() {
        let err = resolve("db2").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn registry_resolution_is_not_case_normalizing() {
        // The registry matches exact names only; callers are responsible for
        // normalizing case before resolving (spec §4.2's registry contract
        // names no implicit case-folding).
        assert!(resolve("Postgres").is_err());
    }

    #[test]
    fn boolean_rewrite_only_applies_where_unsupported() {
        let pg = postgres::PostgresDialect;
        assert_eq!(pg.rewrite_boolean(true), Value::Bool(true));

        let mysql = mysql::MysqlDialect;
        assert_eq!(mysql.rewrite_boolean(true), Value::Int(1));
        assert_eq!(mysql.rewrite_boolean(false), Value::Int(0));
    }

    #[test]
    fn each_dialect_quotes_its_own_style() {
        assert_eq!(postgres::PostgresDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(mysql::MysqlDialect.quote_identifier("a`b"), "`a``b`");
        assert_eq!(sqlite::SqliteDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(mssql::MssqlDialect.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn literalize_is_for_debug_only_and_escapes_quotes() {
        let pg = postgres::PostgresDialect;
        assert_eq!(pg.literalize(&Value::Text("o'brien".to_string())), "'o''brien'");
        assert_eq!(pg.literalize(&Value::Null), "NULL");
        assert_eq!(pg.literalize(&Value::Bool(true)), "TRUE");
    }
}
