//! Canonical error taxonomy shared by the compiler, pool, runner, and transaction manager.
//!
//! Driver errors are never surfaced raw: each [`crate::dialect::Dialect`] owns a
//! `transform_error` hook that normalizes its driver's native error into one of
//! these variants before it reaches the caller.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A library-level error, optionally decorated with the SQL text that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("statement cancelled")]
    Cancellation,

    #[error("SQL syntax error: {message}")]
    Syntax { message: String, sql: Option<String> },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("unsupported feature '{feature}' on dialect '{dialect}'")]
    Unsupported {
        feature: &'static str,
        dialect: &'static str,
    },
}

impl Error {
    /// Renders the error with its attached SQL, when present — used for logging
    /// and for the error surfaced to callers when `compile_sql_on_error` is set.
    pub fn to_detailed_string(&self) -> String {
        match self {
            Error::Syntax {
                message,
                sql: Some(sql),
            } => format!("SQL syntax error: {message} (sql: {sql})"),
            other => other.to_string(),
        }
    }

    pub fn unsupported(feature: &'static str, dialect: &'static str) -> Self {
        Error::Unsupported { feature, dialect }
    }

    /// Attaches rendered SQL to a `Syntax` error when `compile_sql_on_error` is set;
    /// every other variant is returned unchanged.
    pub fn with_sql(self, sql: impl Into<String>) -> Self {
        match self {
            Error::Syntax { message, .. } => Error::Syntax {
                message,
                sql: Some(sql.into()),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_sql_only_decorates_syntax_errors() {
        let err = Error::Syntax {
            message: "near \"FORM\"".to_string(),
            sql: None,
        }
        .with_sql("select * form t");
        assert_eq!(
            err.to_detailed_string(),
            "SQL syntax error: near \"FORM\" (sql: select * form t)"
        );

        let unchanged = Error::Connection("refused".to_string()).with_sql("select 1");
        assert_eq!(unchanged.to_detailed_string(), "connection error: refused");
    }

    #[test]
    fn unsupported_carries_feature_and_dialect() {
        let err = Error::unsupported("distinct_on", "mysql");
        assert_eq!(
            err.to_string(),
            "unsupported feature 'distinct_on' on dialect 'mysql'"
        );
    }
}
