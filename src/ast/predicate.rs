//! Predicate trees: the WHERE/HAVING/ON clause vocabulary.

use super::query::QueryNode;
use super::raw::RawFragment;
use super::reference::Ref;
use crate::value::Value;

/// A column or raw expression appearing on the left-hand side of a predicate.
#[derive(Debug, Clone)]
pub enum ColumnExpr {
    Column(Ref),
    Raw(RawFragment),
}

impl From<&str> for ColumnExpr {
    fn from(s: &str) -> Self {
        ColumnExpr::Column(Ref::parse(s))
    }
}

impl From<String> for ColumnExpr {
    fn from(s: String) -> Self {
        ColumnExpr::Column(Ref::parse(&s))
    }
}

impl From<Ref> for ColumnExpr {
    fn from(r: Ref) -> Self {
        ColumnExpr::Column(r)
    }
}

impl From<RawFragment> for ColumnExpr {
    fn from(r: RawFragment) -> Self {
        ColumnExpr::Raw(r)
    }
}

/// Comparison operators. Spec's closed set is
/// `{= > >= < <= <> != like ilike in not in between is is not}`; anything outside
/// this set is still accepted as a raw operator string and emitted verbatim — the
/// caller's responsibility, per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
    Like,
    ILike,
}

impl CompOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::Gt => ">",
            CompOp::Gte => ">=",
            CompOp::Lt => "<",
            CompOp::Lte => "<=",
            CompOp::Ne => "<>",
            CompOp::Like => "like",
            CompOp::ILike => "ilike",
        }
    }

    /// Parses an operator from the closed set; returns `None` for anything outside
    /// it so the caller can fall back to a raw/verbatim operator.
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" => CompOp::Eq,
            ">" => CompOp::Gt,
            ">=" => CompOp::Gte,
            "<" => CompOp::Lt,
            "<=" => CompOp::Lte,
            "<>" | "!=" => CompOp::Ne,
            "like" => CompOp::Like,
            "ilike" => CompOp::ILike,
            _ => return None,
        })
    }
}

/// A raw operator outside the closed set, emitted verbatim.
#[derive(Debug, Clone)]
pub struct RawOp(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conj {
    And,
    Or,
}

/// A single node in a WHERE/HAVING/ON predicate tree, carrying how it combines
/// with the previous node in the same clause slot (`conj`) and whether it is
/// negated (`whereNot`).
#[derive(Debug, Clone)]
pub struct PredicateNode {
    pub conj: Conj,
    pub negate: bool,
    pub predicate: Predicate,
}

impl PredicateNode {
    pub fn new(conj: Conj, predicate: Predicate) -> Self {
        PredicateNode {
            conj,
            negate: false,
            predicate,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    /// `column op value`, where `op` is either a closed-set comparison or a raw
    /// operator string the caller is responsible for.
    Binary {
        column: ColumnExpr,
        op: Result<CompOp, RawOp>,
        value: Value,
    },
    Raw(RawFragment),
    InList {
        column: ColumnExpr,
        values: Vec<Value>,
        negate: bool,
    },
    Between {
        column: ColumnExpr,
        low: Value,
        high: Value,
        negate: bool,
    },
    IsNull {
        column: ColumnExpr,
        negate: bool,
    },
    Exists {
        query: Box<QueryNode>,
        negate: bool,
    },
    Like {
        column: ColumnExpr,
        pattern: Value,
        case_insensitive: bool,
        negate: bool,
    },
    JsonPath {
        column: ColumnExpr,
        path: String,
        op: CompOp,
        value: Value,
    },
    JsonObject {
        column: ColumnExpr,
        object: serde_json::Value,
    },
    JsonSuperset {
        column: ColumnExpr,
        value: serde_json::Value,
        negate: bool,
    },
    JsonSubset {
        column: ColumnExpr,
        value: serde_json::Value,
        negate: bool,
    },
    /// A nested group of predicates, wrapped in parentheses. Produced by the
    /// callback form of `where`/`having`/`on`.
    Group(Vec<PredicateNode>),
    /// `left op right` where both sides are columns rather than a bound value —
    /// the shape an `ON` clause needs (`a.id = b.a_id`), which `Binary` can't
    /// express since its right-hand side is always a parameter.
    ColumnsCompare {
        left: ColumnExpr,
        op: CompOp,
        right: ColumnExpr,
    },
}
