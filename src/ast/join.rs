//! JOIN clauses.

use super::predicate::PredicateNode;
use super::query::QueryNode;
use super::raw::RawFragment;
use super::reference::Ref;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "inner join",
            JoinKind::Left => "left join",
            JoinKind::Right => "right join",
            JoinKind::Full => "full outer join",
            JoinKind::Cross => "cross join",
        }
    }
}

#[derive(Debug, Clone)]
pub enum JoinTarget {
    Table(Ref),
    Raw(RawFragment),
    SubQuery {
        query: Box<QueryNode>,
        alias: String,
    },
}

/// A single JOIN clause. `on` holds the ON-clause predicate tree (built via the
/// nested `on`/`andOn`/`orOn` callback form); `using` holds simple
/// `USING (col, ...)` shorthand columns, mutually exclusive with `on` in practice
/// but both are carried so the compiler can emit whichever was populated.
#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub target: JoinTarget,
    pub on: Vec<PredicateNode>,
    pub using: Vec<String>,
}

impl Join {
    pub fn new(kind: JoinKind, target: JoinTarget) -> Self {
        Join {
            kind,
            target,
            on: Vec::new(),
            using: Vec::new(),
        }
    }
}
