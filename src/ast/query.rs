//! The query AST root: a tagged record identifying its kind plus ordered clause slots.

use super::cte::Cte;
use super::join::Join;
use super::predicate::{ColumnExpr, PredicateNode};
use super::order::OrderItem;
use super::raw::RawFragment;
use super::reference::Ref;
use super::select::SelectItem;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Raw,
    Ddl,
}

impl Default for QueryKind {
    fn default() -> Self {
        QueryKind::Select
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrength {
    None,
    ForUpdate,
    ForShare,
    ForNoKeyUpdate,
    ForKeyShare,
}

impl Default for LockStrength {
    fn default() -> Self {
        LockStrength::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl SetOpKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            SetOpKind::Union => "union",
            SetOpKind::UnionAll => "union all",
            SetOpKind::Intersect => "intersect",
            SetOpKind::Except => "except",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetOperation {
    pub kind: SetOpKind,
    pub query: Box<QueryNode>,
    pub wrap: bool,
}

/// `ON CONFLICT` / `ON DUPLICATE KEY` handling for upserts.
#[derive(Debug, Clone, Default)]
pub enum OnConflict {
    #[default]
    None,
    Ignore {
        columns: Vec<String>,
    },
    Merge {
        columns: Vec<String>,
        update_columns: Option<Vec<String>>,
    },
}

/// One row of `(column, value)` pairs for INSERT/UPSERT, or the full set of
/// `(column, value)` assignments for UPDATE.
pub type RowValues = Vec<(String, Value)>;

/// The query AST: a tagged record plus ordered clause slots. Every slot is an
/// ordered `Vec` so the compiler can preserve call-order *within* a clause while
/// still emitting clauses themselves in the fixed canonical order (spec invariant
/// 4): WITH, SELECT/DML, FROM, JOIN, WHERE, GROUP BY, HAVING, WINDOW, ORDER BY,
/// LIMIT, OFFSET, RETURNING.
#[derive(Debug, Clone, Default)]
pub struct QueryNode {
    pub kind: QueryKind,
    pub schema: Option<String>,
    pub table: Option<Ref>,
    pub table_alias: Option<String>,

    pub ctes: Vec<Cte>,

    pub columns: Vec<SelectItem>,
    pub distinct: bool,
    pub distinct_on: Vec<ColumnExpr>,

    pub joins: Vec<Join>,
    pub wheres: Vec<PredicateNode>,
    pub group_by: Vec<ColumnExpr>,
    pub group_by_raw: Vec<RawFragment>,
    pub havings: Vec<PredicateNode>,
    pub order_by: Vec<OrderItem>,
    pub order_by_raw: Vec<RawFragment>,

    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub skip_binding: bool,

    pub set_ops: Vec<SetOperation>,

    pub insert_rows: Vec<RowValues>,
    pub update_values: RowValues,
    pub on_conflict: OnConflict,
    pub insert_default_as_null: bool,

    pub returning: Vec<SelectItem>,

    pub lock: LockStrength,
    pub skip_locked: bool,
    pub no_wait: bool,
    pub for_update_of: Vec<String>,

    pub raw: Option<RawFragment>,
}

impl QueryNode {
    pub fn new(kind: QueryKind) -> Self {
        QueryNode {
            kind,
            ..Default::default()
        }
    }

    pub fn clear_select(&mut self) {
        self.columns.clear();
        self.distinct = false;
        self.distinct_on.clear();
    }

    pub fn clear_where(&mut self) {
        self.wheres.clear();
    }

    pub fn clear_group(&mut self) {
        self.group_by.clear();
        self.group_by_raw.clear();
    }

    pub fn clear_having(&mut self) {
        self.havings.clear();
    }

    pub fn clear_order(&mut self) {
        self.order_by.clear();
        self.order_by_raw.clear();
    }

    pub fn clear_counters(&mut self) {
        self.limit = None;
        self.offset = None;
    }
}
