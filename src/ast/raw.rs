//! Opaque raw SQL fragments that splice verbatim into any clause position.

use crate::value::Value;

/// A raw SQL fragment with its positional bindings.
///
/// Fragments use `?` as a placeholder and `\?` as an escape for a literal question
/// mark; the compiler rewrites both when it renders the fragment into a dialect
/// that uses a different placeholder style (see `crate::compiler::rewrite_raw`).
#[derive(Debug, Clone, PartialEq)]
pub struct RawFragment {
    pub sql: String,
    pub bindings: Vec<Value>,
}

impl RawFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        RawFragment {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_bindings<I, V>(sql: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        RawFragment {
            sql: sql.into(),
            bindings: bindings.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&str> for RawFragment {
    fn from(sql: &str) -> Self {
        RawFragment::new(sql)
    }
}

impl From<String> for RawFragment {
    fn from(sql: String) -> Self {
        RawFragment::new(sql)
    }
}
