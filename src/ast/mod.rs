//! The in-memory query AST: immutable-ish nodes describing selects, joins,
//! predicates, and DML, appended to by the fluent builder in `crate::builder`.

pub mod cte;
pub mod join;
pub mod order;
pub mod predicate;
pub mod query;
pub mod raw;
pub mod reference;
pub mod select;

pub use cte::{Cte, CteBody, Materialization};
pub use join::{Join, JoinKind, JoinTarget};
pub use order::{Direction, Nulls, OrderItem};
pub use predicate::{ColumnExpr, CompOp, Conj, Predicate, PredicateNode, RawOp};
pub use query::{LockStrength, OnConflict, QueryKind, QueryNode, RowValues, SetOpKind, SetOperation};
pub use raw::RawFragment;
pub use reference::Ref;
pub use select::{Aggregate, AggregateKind, SelectItem};
