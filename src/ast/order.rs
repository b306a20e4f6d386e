//! ORDER BY clauses.

use super::predicate::ColumnExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
    Default,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub target: ColumnExpr,
    pub direction: Direction,
    pub nulls: Nulls,
}

impl OrderItem {
    pub fn new(target: ColumnExpr, direction: Direction) -> Self {
        OrderItem {
            target,
            direction,
            nulls: Nulls::Default,
        }
    }
}
