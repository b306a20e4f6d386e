//! The fluent query builder: assembles a [`QueryNode`] one call at a time and
//! compiles it on demand (spec §4.1, §9 "recompile-on-demand").
//!
//! `QueryBuilder` is a plain value type. Every method consumes `self` and
//! returns an owned builder; nothing is shared behind a pointer, so cloning a
//! builder at any point gives two independent values that can diverge freely
//! (spec invariant 5). Grouped clauses (`whereGroup`, `onGroup`, correlated
//! subqueries) are built with a scratch builder and folded back in, the same
//! trick `exists`/CTEs use for embedding a whole statement.

use crate::ast::{
    Aggregate, AggregateKind, Cte, CteBody, ColumnExpr, CompOp, Conj, Direction, Join, JoinKind,
    JoinTarget, LockStrength, Materialization, Nulls, OnConflict, OrderItem, Predicate,
    PredicateNode, QueryKind, QueryNode, RawFragment, RawOp, Ref, RowValues, SelectItem,
    SetOpKind, SetOperation,
};
use crate::compiler::{CompiledQuery, CompileOptions, Compiler};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::value::Value;

/// Per-call execution overrides (spec §5 "Cancellation": `timeout(ms,
/// {cancel?})`). Kept off `QueryNode` since it governs how the runner drives
/// the call, not anything the compiler renders into SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    pub timeout_ms: Option<u64>,
    /// When the timeout elapses, surface `Error::Cancellation` instead of
    /// `Error::Timeout` — mirrors knex's `{cancel: true}` option, which asks
    /// the driver to actively cancel the in-flight statement rather than
    /// merely stop waiting on it.
    pub cancel_on_timeout: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    node: QueryNode,
    exec: ExecOptions,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder {
            node: QueryNode::new(QueryKind::Select),
            exec: ExecOptions::default(),
        }
    }

    pub(crate) fn from_node(node: QueryNode) -> Self {
        QueryBuilder {
            node,
            exec: ExecOptions::default(),
        }
    }

    pub(crate) fn into_node(self) -> QueryNode {
        self.node
    }

    pub fn node(&self) -> &QueryNode {
        &self.node
    }

    /// Compiles against a dialect without consuming the builder (spec §9: the
    /// builder remains mutable and re-compilable after `toSQL()`).
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Result<CompiledQuery> {
        Compiler::new(dialect).compile(&self.node)
    }

    /// Compiles with connection-level overrides (`searchPath`,
    /// `useNullAsDefault`, `wrapIdentifier`) layered on top of the dialect.
    pub fn to_sql_with_options(&self, dialect: &dyn Dialect, options: CompileOptions) -> Result<CompiledQuery> {
        Compiler::with_options(dialect, options).compile(&self.node)
    }

    /// Returns an immutable snapshot. Frozen builders are still plain values —
    /// this only documents caller intent that no further mutation should occur.
    pub fn freeze(self) -> FrozenQuery {
        FrozenQuery { node: self.node }
    }

    /// Bounds how long the runner will wait on this statement before
    /// surfacing `Error::Timeout` (spec §5 "Cancellation": `timeout(ms)`).
    pub fn timeout(mut self, ms: u64) -> Self {
        self.exec.timeout_ms = Some(ms);
        self
    }

    /// Like [`Self::timeout`], but surfaces `Error::Cancellation` instead of
    /// `Error::Timeout` on expiry — the `{cancel: true}` variant of knex's
    /// `timeout(ms, options)`.
    pub fn timeout_with_cancel(mut self, ms: u64) -> Self {
        self.exec.timeout_ms = Some(ms);
        self.exec.cancel_on_timeout = true;
        self
    }

    pub fn exec_options(&self) -> ExecOptions {
        self.exec
    }

    // ------------------------------------------------------------------
    // Targeting
    // ------------------------------------------------------------------

    pub fn from(mut self, table: impl Into<Ref>) -> Self {
        self.node.table = Some(table.into());
        self
    }

    pub fn into_table(mut self, table: impl Into<Ref>) -> Self {
        self.node.table = Some(table.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.node.schema = Some(schema.into());
        self
    }

    pub fn table_as(mut self, alias: impl Into<String>) -> Self {
        self.node.table_alias = Some(alias.into());
        self
    }

    // ------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------

    pub fn select(mut self, columns: impl IntoIterator<Item = impl Into<SelectItem>>) -> Self {
        self.node.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn column(mut self, column: impl Into<SelectItem>) -> Self {
        self.node.columns.push(column.into());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.node.distinct = true;
        self
    }

    pub fn distinct_on(mut self, columns: impl IntoIterator<Item = impl Into<ColumnExpr>>) -> Self {
        self.node.distinct_on.extend(columns.into_iter().map(Into::into));
        self
    }

    fn push_aggregate(mut self, kind: AggregateKind, columns: Vec<Ref>, distinct: bool, alias: Option<String>) -> Self {
        self.node.columns.push(SelectItem::Aggregate(Aggregate {
            kind,
            columns,
            distinct,
            alias,
        }));
        self
    }

    pub fn count(self, column: impl Into<Ref>) -> Self {
        self.push_aggregate(AggregateKind::Count, vec![column.into()], false, None)
    }

    pub fn count_as(self, column: impl Into<Ref>, alias: impl Into<String>) -> Self {
        self.push_aggregate(AggregateKind::Count, vec![column.into()], false, Some(alias.into()))
    }

    pub fn count_distinct(self, columns: impl IntoIterator<Item = impl Into<Ref>>) -> Self {
        self.push_aggregate(
            AggregateKind::Count,
            columns.into_iter().map(Into::into).collect(),
            true,
            None,
        )
    }

    pub fn min(self, column: impl Into<Ref>) -> Self {
        self.push_aggregate(AggregateKind::Min, vec![column.into()], false, None)
    }

    pub fn max(self, column: impl Into<Ref>) -> Self {
        self.push_aggregate(AggregateKind::Max, vec![column.into()], false, None)
    }

    pub fn sum(self, column: impl Into<Ref>) -> Self {
        self.push_aggregate(AggregateKind::Sum, vec![column.into()], false, None)
    }

    pub fn sum_distinct(self, column: impl Into<Ref>) -> Self {
        self.push_aggregate(AggregateKind::Sum, vec![column.into()], true, None)
    }

    pub fn avg(self, column: impl Into<Ref>) -> Self {
        self.push_aggregate(AggregateKind::Avg, vec![column.into()], false, None)
    }

    pub fn avg_distinct(self, column: impl Into<Ref>) -> Self {
        self.push_aggregate(AggregateKind::Avg, vec![column.into()], true, None)
    }

    // ------------------------------------------------------------------
    // WHERE
    // ------------------------------------------------------------------

    fn push_where(mut self, conj: Conj, predicate: Predicate) -> Self {
        self.node.wheres.push(PredicateNode::new(conj, predicate));
        self
    }

    pub fn where_eq(self, column: impl Into<ColumnExpr>, value: impl Into<Value>) -> Self {
        self.push_where(
            Conj::And,
            Predicate::Binary {
                column: column.into(),
                op: Ok(CompOp::Eq),
                value: value.into(),
            },
        )
    }

    pub fn or_where_eq(self, column: impl Into<ColumnExpr>, value: impl Into<Value>) -> Self {
        self.push_where(
            Conj::Or,
            Predicate::Binary {
                column: column.into(),
                op: Ok(CompOp::Eq),
                value: value.into(),
            },
        )
    }

    pub fn where_op(
        self,
        column: impl Into<ColumnExpr>,
        op: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let op = op.into();
        let parsed = CompOp::parse(&op).ok_or_else(|| RawOp(op.clone()));
        self.push_where(
            Conj::And,
            Predicate::Binary {
                column: column.into(),
                op: parsed,
                value: value.into(),
            },
        )
    }

    pub fn or_where_op(
        self,
        column: impl Into<ColumnExpr>,
        op: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let op = op.into();
        let parsed = CompOp::parse(&op).ok_or_else(|| RawOp(op.clone()));
        self.push_where(
            Conj::Or,
            Predicate::Binary {
                column: column.into(),
                op: parsed,
                value: value.into(),
            },
        )
    }

    pub fn where_not(mut self, column: impl Into<ColumnExpr>, value: impl Into<Value>) -> Self {
        let node = PredicateNode::new(
            Conj::And,
            Predicate::Binary {
                column: column.into(),
                op: Ok(CompOp::Eq),
                value: value.into(),
            },
        )
        .negated();
        self.node.wheres.push(node);
        self
    }

    pub fn where_raw(self, raw: impl Into<RawFragment>) -> Self {
        self.push_where(Conj::And, Predicate::Raw(raw.into()))
    }

    pub fn or_where_raw(self, raw: impl Into<RawFragment>) -> Self {
        self.push_where(Conj::Or, Predicate::Raw(raw.into()))
    }

    pub fn where_in(
        self,
        column: impl Into<ColumnExpr>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.push_where(
            Conj::And,
            Predicate::InList {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negate: false,
            },
        )
    }

    pub fn where_not_in(
        self,
        column: impl Into<ColumnExpr>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.push_where(
            Conj::And,
            Predicate::InList {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negate: true,
            },
        )
    }

    pub fn where_between(
        self,
        column: impl Into<ColumnExpr>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(
            Conj::And,
            Predicate::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
                negate: false,
            },
        )
    }

    pub fn where_not_between(
        self,
        column: impl Into<ColumnExpr>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(
            Conj::And,
            Predicate::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
                negate: true,
            },
        )
    }

    pub fn where_null(self, column: impl Into<ColumnExpr>) -> Self {
        self.push_where(
            Conj::And,
            Predicate::IsNull {
                column: column.into(),
                negate: false,
            },
        )
    }

    pub fn where_not_null(self, column: impl Into<ColumnExpr>) -> Self {
        self.push_where(
            Conj::And,
            Predicate::IsNull {
                column: column.into(),
                negate: true,
            },
        )
    }

    pub fn where_like(self, column: impl Into<ColumnExpr>, pattern: impl Into<Value>) -> Self {
        self.push_where(
            Conj::And,
            Predicate::Like {
                column: column.into(),
                pattern: pattern.into(),
                case_insensitive: false,
                negate: false,
            },
        )
    }

    pub fn where_ilike(self, column: impl Into<ColumnExpr>, pattern: impl Into<Value>) -> Self {
        self.push_where(
            Conj::And,
            Predicate::Like {
                column: column.into(),
                pattern: pattern.into(),
                case_insensitive: true,
                negate: false,
            },
        )
    }

    pub fn where_exists<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.node.wheres.push(PredicateNode::new(
            Conj::And,
            Predicate::Exists {
                query: Box::new(sub.into_node()),
                negate: false,
            },
        ));
        self
    }

    pub fn where_not_exists<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.node.wheres.push(PredicateNode::new(
            Conj::And,
            Predicate::Exists {
                query: Box::new(sub.into_node()),
                negate: true,
            },
        ));
        self
    }

    pub fn where_json_path(
        self,
        column: impl Into<ColumnExpr>,
        path: impl Into<String>,
        op: CompOp,
        value: impl Into<Value>,
    ) -> Self {
        self.push_where(
            Conj::And,
            Predicate::JsonPath {
                column: column.into(),
                path: path.into(),
                op,
                value: value.into(),
            },
        )
    }

    pub fn where_json_object(self, column: impl Into<ColumnExpr>, object: serde_json::Value) -> Self {
        self.push_where(
            Conj::And,
            Predicate::JsonObject {
                column: column.into(),
                object,
            },
        )
    }

    pub fn where_json_superset_of(self, column: impl Into<ColumnExpr>, value: serde_json::Value) -> Self {
        self.push_where(
            Conj::And,
            Predicate::JsonSuperset {
                column: column.into(),
                value,
                negate: false,
            },
        )
    }

    pub fn where_json_subset_of(self, column: impl Into<ColumnExpr>, value: serde_json::Value) -> Self {
        self.push_where(
            Conj::And,
            Predicate::JsonSubset {
                column: column.into(),
                value,
                negate: false,
            },
        )
    }

    /// Builds a parenthesized nested group via a scratch builder (spec's
    /// callback form of `where`).
    pub fn where_group<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.node
            .wheres
            .push(PredicateNode::new(Conj::And, Predicate::Group(sub.node.wheres)));
        self
    }

    pub fn or_where_group<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.node
            .wheres
            .push(PredicateNode::new(Conj::Or, Predicate::Group(sub.node.wheres)));
        self
    }

    // ------------------------------------------------------------------
    // JOIN
    // ------------------------------------------------------------------

    fn push_join(mut self, kind: JoinKind, target: JoinTarget, build: Option<Box<dyn FnOnce(JoinOn) -> JoinOn>>) -> Self {
        let mut join = Join::new(kind, target);
        if let Some(build) = build {
            let on = build(JoinOn::default());
            join.on = on.nodes;
            join.using = on.using;
        }
        self.node.joins.push(join);
        self
    }

    pub fn join<F>(self, table: impl Into<Ref>, build: F) -> Self
    where
        F: FnOnce(JoinOn) -> JoinOn + 'static,
    {
        self.push_join(JoinKind::Inner, JoinTarget::Table(table.into()), Some(Box::new(build)))
    }

    pub fn inner_join<F>(self, table: impl Into<Ref>, build: F) -> Self
    where
        F: FnOnce(JoinOn) -> JoinOn + 'static,
    {
        self.push_join(JoinKind::Inner, JoinTarget::Table(table.into()), Some(Box::new(build)))
    }

    pub fn left_join<F>(self, table: impl Into<Ref>, build: F) -> Self
    where
        F: FnOnce(JoinOn) -> JoinOn + 'static,
    {
        self.push_join(JoinKind::Left, JoinTarget::Table(table.into()), Some(Box::new(build)))
    }

    pub fn right_join<F>(self, table: impl Into<Ref>, build: F) -> Self
    where
        F: FnOnce(JoinOn) -> JoinOn + 'static,
    {
        self.push_join(JoinKind::Right, JoinTarget::Table(table.into()), Some(Box::new(build)))
    }

    pub fn full_outer_join<F>(self, table: impl Into<Ref>, build: F) -> Self
    where
        F: FnOnce(JoinOn) -> JoinOn + 'static,
    {
        self.push_join(JoinKind::Full, JoinTarget::Table(table.into()), Some(Box::new(build)))
    }

    pub fn cross_join(self, table: impl Into<Ref>) -> Self {
        self.push_join(JoinKind::Cross, JoinTarget::Table(table.into()), None)
    }

    pub fn join_sub<F, J>(self, build_query: F, alias: impl Into<String>, build_on: J) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
        J: FnOnce(JoinOn) -> JoinOn + 'static,
    {
        let sub = build_query(QueryBuilder::new());
        self.push_join(
            JoinKind::Inner,
            JoinTarget::SubQuery {
                query: Box::new(sub.into_node()),
                alias: alias.into(),
            },
            Some(Box::new(build_on)),
        )
    }

    // ------------------------------------------------------------------
    // Grouping / HAVING / ordering / paging
    // ------------------------------------------------------------------

    pub fn group_by(mut self, columns: impl IntoIterator<Item = impl Into<ColumnExpr>>) -> Self {
        self.node.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn group_by_raw(mut self, raw: impl Into<RawFragment>) -> Self {
        self.node.group_by_raw.push(raw.into());
        self
    }

    fn push_having(mut self, conj: Conj, predicate: Predicate) -> Self {
        self.node.havings.push(PredicateNode::new(conj, predicate));
        self
    }

    pub fn having_eq(self, column: impl Into<ColumnExpr>, value: impl Into<Value>) -> Self {
        self.push_having(
            Conj::And,
            Predicate::Binary {
                column: column.into(),
                op: Ok(CompOp::Eq),
                value: value.into(),
            },
        )
    }

    pub fn or_having_eq(self, column: impl Into<ColumnExpr>, value: impl Into<Value>) -> Self {
        self.push_having(
            Conj::Or,
            Predicate::Binary {
                column: column.into(),
                op: Ok(CompOp::Eq),
                value: value.into(),
            },
        )
    }

    pub fn having_raw(self, raw: impl Into<RawFragment>) -> Self {
        self.push_having(Conj::And, Predicate::Raw(raw.into()))
    }

    pub fn order_by(mut self, column: impl Into<ColumnExpr>, direction: Direction) -> Self {
        self.node.order_by.push(OrderItem::new(column.into(), direction));
        self
    }

    pub fn order_by_nulls(mut self, column: impl Into<ColumnExpr>, direction: Direction, nulls: Nulls) -> Self {
        let mut item = OrderItem::new(column.into(), direction);
        item.nulls = nulls;
        self.node.order_by.push(item);
        self
    }

    pub fn order_by_raw(mut self, raw: impl Into<RawFragment>) -> Self {
        self.node.order_by_raw.push(raw.into());
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.node.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.node.offset = Some(n);
        self
    }

    pub fn skip_binding(mut self, skip: bool) -> Self {
        self.node.skip_binding = skip;
        self
    }

    // ------------------------------------------------------------------
    // Set operations
    // ------------------------------------------------------------------

    fn push_set_op<F>(mut self, kind: SetOpKind, wrap: bool, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.node.set_ops.push(SetOperation {
            kind,
            query: Box::new(sub.into_node()),
            wrap,
        });
        self
    }

    pub fn union<F>(self, wrap: bool, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_op(SetOpKind::Union, wrap, build)
    }

    pub fn union_all<F>(self, wrap: bool, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_op(SetOpKind::UnionAll, wrap, build)
    }

    pub fn intersect<F>(self, wrap: bool, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_op(SetOpKind::Intersect, wrap, build)
    }

    pub fn except<F>(self, wrap: bool, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.push_set_op(SetOpKind::Except, wrap, build)
    }

    // ------------------------------------------------------------------
    // CTEs
    // ------------------------------------------------------------------

    pub fn with<F>(mut self, alias: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.node
            .ctes
            .push(Cte::new(alias, CteBody::Query(Box::new(sub.into_node()))));
        self
    }

    pub fn with_recursive<F>(mut self, alias: impl Into<String>, columns: Vec<String>, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        let mut cte = Cte::new(alias, CteBody::Query(Box::new(sub.into_node())));
        cte.recursive = true;
        if !columns.is_empty() {
            cte.columns = Some(columns);
        }
        self.node.ctes.push(cte);
        self
    }

    pub fn with_materialized<F>(mut self, alias: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        let mut cte = Cte::new(alias, CteBody::Query(Box::new(sub.into_node())));
        cte.materialization = Materialization::Materialized;
        self.node.ctes.push(cte);
        self
    }

    pub fn with_not_materialized<F>(mut self, alias: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        let mut cte = Cte::new(alias, CteBody::Query(Box::new(sub.into_node())));
        cte.materialization = Materialization::NotMaterialized;
        self.node.ctes.push(cte);
        self
    }

    pub fn with_raw(mut self, alias: impl Into<String>, raw: impl Into<RawFragment>) -> Self {
        self.node.ctes.push(Cte::new(alias, CteBody::Raw(raw.into())));
        self
    }

    // ------------------------------------------------------------------
    // DML
    // ------------------------------------------------------------------

    pub fn insert(table: impl Into<Ref>, rows: Vec<RowValues>) -> Self {
        let mut node = QueryNode::new(QueryKind::Insert);
        node.table = Some(table.into());
        node.insert_rows = rows;
        QueryBuilder {
            node,
            exec: ExecOptions::default(),
        }
    }

    pub fn update(table: impl Into<Ref>, values: RowValues) -> Self {
        let mut node = QueryNode::new(QueryKind::Update);
        node.table = Some(table.into());
        node.update_values = values;
        QueryBuilder {
            node,
            exec: ExecOptions::default(),
        }
    }

    pub fn delete(table: impl Into<Ref>) -> Self {
        let mut node = QueryNode::new(QueryKind::Delete);
        node.table = Some(table.into());
        QueryBuilder {
            node,
            exec: ExecOptions::default(),
        }
    }

    pub fn raw(sql: impl Into<String>, bindings: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        let mut node = QueryNode::new(QueryKind::Raw);
        node.raw = Some(RawFragment::with_bindings(sql, bindings));
        QueryBuilder {
            node,
            exec: ExecOptions::default(),
        }
    }

    pub fn returning(mut self, columns: impl IntoIterator<Item = impl Into<SelectItem>>) -> Self {
        self.node.returning.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Sugar for `insert(..).on_conflict_merge(conflict_columns, update_columns)`:
    /// an INSERT that becomes an UPDATE of `update_columns` (or every inserted
    /// column, if `None`) when `conflict_columns` collide.
    pub fn upsert(
        table: impl Into<Ref>,
        rows: Vec<RowValues>,
        conflict_columns: Vec<String>,
        update_columns: Option<Vec<String>>,
    ) -> Self {
        Self::insert(table, rows).on_conflict_merge(conflict_columns, update_columns)
    }

    pub fn on_conflict_ignore(mut self, columns: Vec<String>) -> Self {
        self.node.on_conflict = OnConflict::Ignore { columns };
        self
    }

    pub fn on_conflict_merge(mut self, columns: Vec<String>, update_columns: Option<Vec<String>>) -> Self {
        self.node.on_conflict = OnConflict::Merge {
            columns,
            update_columns,
        };
        self
    }

    // ------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------

    pub fn for_update(mut self) -> Self {
        self.node.lock = LockStrength::ForUpdate;
        self
    }

    pub fn for_share(mut self) -> Self {
        self.node.lock = LockStrength::ForShare;
        self
    }

    pub fn for_no_key_update(mut self) -> Self {
        self.node.lock = LockStrength::ForNoKeyUpdate;
        self
    }

    pub fn for_key_share(mut self) -> Self {
        self.node.lock = LockStrength::ForKeyShare;
        self
    }

    pub fn of_tables(mut self, tables: Vec<String>) -> Self {
        self.node.for_update_of = tables;
        self
    }

    pub fn skip_locked(mut self) -> Self {
        self.node.skip_locked = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.node.no_wait = true;
        self
    }

    // ------------------------------------------------------------------
    // Clearing
    // ------------------------------------------------------------------

    pub fn clear_select(mut self) -> Self {
        self.node.clear_select();
        self
    }

    pub fn clear_where(mut self) -> Self {
        self.node.clear_where();
        self
    }

    pub fn clear_group(mut self) -> Self {
        self.node.clear_group();
        self
    }

    pub fn clear_having(mut self) -> Self {
        self.node.clear_having();
        self
    }

    pub fn clear_order(mut self) -> Self {
        self.node.clear_order();
        self
    }

    pub fn clear_counters(mut self) -> Self {
        self.node.clear_counters();
        self
    }
}

/// Sub-builder passed into join callbacks, collecting `ON`/`USING` clauses
/// independently of the outer query's own WHERE tree.
#[derive(Debug, Default)]
pub struct JoinOn {
    nodes: Vec<PredicateNode>,
    using: Vec<String>,
}

impl JoinOn {
    fn push(mut self, conj: Conj, predicate: Predicate) -> Self {
        self.nodes.push(PredicateNode::new(conj, predicate));
        self
    }

    pub fn on(self, left: impl Into<ColumnExpr>, op: CompOp, right: impl Into<ColumnExpr>) -> Self {
        self.push(Conj::And, column_eq_predicate(left.into(), op, right.into()))
    }

    pub fn and_on(self, left: impl Into<ColumnExpr>, op: CompOp, right: impl Into<ColumnExpr>) -> Self {
        self.push(Conj::And, column_eq_predicate(left.into(), op, right.into()))
    }

    pub fn or_on(self, left: impl Into<ColumnExpr>, op: CompOp, right: impl Into<ColumnExpr>) -> Self {
        self.push(Conj::Or, column_eq_predicate(left.into(), op, right.into()))
    }

    pub fn on_val(self, column: impl Into<ColumnExpr>, op: CompOp, value: impl Into<Value>) -> Self {
        self.push(
            Conj::And,
            Predicate::Binary {
                column: column.into(),
                op: Ok(op),
                value: value.into(),
            },
        )
    }

    pub fn on_in(self, column: impl Into<ColumnExpr>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.push(
            Conj::And,
            Predicate::InList {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negate: false,
            },
        )
    }

    pub fn on_between(self, column: impl Into<ColumnExpr>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push(
            Conj::And,
            Predicate::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
                negate: false,
            },
        )
    }

    pub fn on_null(self, column: impl Into<ColumnExpr>) -> Self {
        self.push(
            Conj::And,
            Predicate::IsNull {
                column: column.into(),
                negate: false,
            },
        )
    }

    pub fn on_exists<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.nodes.push(PredicateNode::new(
            Conj::And,
            Predicate::Exists {
                query: Box::new(sub.into_node()),
                negate: false,
            },
        ));
        self
    }

    pub fn using(mut self, columns: Vec<String>) -> Self {
        self.using = columns;
        self
    }
}

fn column_eq_predicate(left: ColumnExpr, op: CompOp, right: ColumnExpr) -> Predicate {
    Predicate::ColumnsCompare { left, op, right }
}

/// An immutable, compiled-ready snapshot of a query (spec §9's `freeze()`).
#[derive(Debug, Clone)]
pub struct FrozenQuery {
    node: QueryNode,
}

impl FrozenQuery {
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Result<CompiledQuery> {
        Compiler::new(dialect).compile(&self.node)
    }

    pub fn thaw(self) -> QueryBuilder {
        QueryBuilder {
            node: self.node,
            exec: ExecOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::postgres::PostgresDialect;

    #[test]
    fn cloning_a_builder_lets_branches_diverge_independently() {
        let base = QueryBuilder::new().from("users").where_eq("active", true);
        let branch_a = base.clone().where_eq("role", "admin");
        let branch_b = base.clone().where_null("deleted_at");

        let sql_a = branch_a.to_sql(&PostgresDialect).unwrap().sql;
        let sql_b = branch_b.to_sql(&PostgresDialect).unwrap().sql;
        assert!(sql_a.contains("\"role\" = $2"));
        assert!(sql_b.contains("\"deleted_at\" is null"));
        assert_ne!(sql_a, sql_b);
        // The original is untouched by either branch.
        let base_sql = base.to_sql(&PostgresDialect).unwrap().sql;
        assert!(!base_sql.contains("role") && !base_sql.contains("deleted_at"));
    }

    #[test]
    fn timeout_sets_exec_options_without_altering_compiled_sql() {
        let qb = QueryBuilder::new().from("t").where_eq("id", 1);
        let plain_sql = qb.to_sql(&PostgresDialect).unwrap().sql;

        let timed = qb.clone().timeout(500);
        assert_eq!(timed.exec_options().timeout_ms, Some(500));
        assert!(!timed.exec_options().cancel_on_timeout);
        assert_eq!(timed.to_sql(&PostgresDialect).unwrap().sql, plain_sql);

        let cancellable = qb.timeout_with_cancel(250);
        assert_eq!(cancellable.exec_options().timeout_ms, Some(250));
        assert!(cancellable.exec_options().cancel_on_timeout);
    }

    #[test]
    fn to_sql_is_idempotent_across_repeated_calls() {
        let qb = QueryBuilder::new().from("t").where_eq("id", 1);
        let first = qb.to_sql(&PostgresDialect).unwrap();
        let second = qb.to_sql(&PostgresDialect).unwrap();
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.bindings, second.bindings);
    }

    #[test]
    fn clear_where_then_readd_equals_building_directly() {
        let cleared = QueryBuilder::new()
            .from("t")
            .where_eq("a", 1)
            .clear_where()
            .where_eq("b", 2);
        let direct = QueryBuilder::new().from("t").where_eq("b", 2);
        assert_eq!(
            cleared.to_sql(&PostgresDialect).unwrap().sql,
            direct.to_sql(&PostgresDialect).unwrap().sql
        );
    }

    #[test]
    fn freeze_then_thaw_round_trips_the_same_query() {
        let qb = QueryBuilder::new().from("t").where_eq("id", 1);
        let expected = qb.to_sql(&PostgresDialect).unwrap().sql;
        let thawed = qb.freeze().thaw();
        assert_eq!(thawed.to_sql(&PostgresDialect).unwrap().sql, expected);
    }

    #[test]
    fn union_all_wraps_operand_when_requested() {
        let qb = QueryBuilder::new()
            .from("a")
            .select(["id"])
            .union_all(true, |b| b.from("b").select(["id"]));
        let compiled = qb.to_sql(&PostgresDialect).unwrap();
        assert_eq!(
            compiled.sql,
            "select \"id\" from \"a\" union all (select \"id\" from \"b\")"
        );
    }

    #[test]
    fn with_cte_renders_before_select() {
        let qb = QueryBuilder::new()
            .with("active_users", |b| b.from("users").where_eq("active", true))
            .from("active_users")
            .select(["id"]);
        let compiled = qb.to_sql(&PostgresDialect).unwrap();
        assert_eq!(
            compiled.sql,
            "with \"active_users\" as (select * from \"users\" where \"active\" = $1) select \"id\" from \"active_users\""
        );
    }

    #[test]
    fn where_exists_wraps_a_correlated_subquery() {
        let qb = QueryBuilder::new().from("orders").where_exists(|b| {
            b.from("order_items")
                .where_raw(RawFragment::new("order_items.order_id = orders.id"))
        });
        let compiled = qb.to_sql(&PostgresDialect).unwrap();
        assert_eq!(
            compiled.sql,
            "select * from \"orders\" where exists (select * from \"order_items\" where order_items.order_id = orders.id)"
        );
    }
}
