//! The dialect-parameterized SQL compiler: walks the AST in fixed canonical clause
//! order and emits SQL text plus an ordered binding list (spec §4.3).

use crate::ast::{
    Cte, CteBody, Join, JoinKind, JoinTarget, Materialization, OnConflict, Predicate,
    PredicateNode, QueryKind, QueryNode, RawFragment, Ref, SelectItem, SetOpKind, SetOperation,
    Aggregate, AggregateKind, CompOp, ColumnExpr, Conj, OrderItem, LockStrength, Direction, Nulls,
};
use crate::dialect::{Dialect, LimitOffsetStyle, PlaceholderStyle};
use crate::error::{Error, Result};
use crate::value::Value;

/// The DML/selection tag a compiled query carries, used by the runner to decide
/// post-processing (spec §4.4 "method inference").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Select,
    Insert,
    Update,
    Delete,
    Raw,
}

/// Opaque context the runner consults without re-inspecting the AST.
#[derive(Debug, Clone)]
pub struct CompileContext {
    pub dialect: &'static str,
}

/// The immutable `{sql, bindings, method, returning?, context}` tuple a runner
/// executes (spec §3 "Compiled query").
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
    pub method: Method,
    pub returning: Option<Vec<String>>,
    pub context: CompileContext,
}

impl CompiledQuery {
    /// Invariant 1 (spec §3): `bindings.len()` equals the number of placeholders
    /// actually present in `sql`.
    pub fn placeholder_count(&self, dialect: &dyn Dialect) -> usize {
        match dialect.placeholder_style() {
            PlaceholderStyle::Positional => self.sql.matches('?').count(),
            PlaceholderStyle::NumberedDollar => count_numbered(&self.sql, '$'),
            PlaceholderStyle::NumberedAt => count_numbered_at(&self.sql),
        }
    }
}

fn count_numbered(sql: &str, marker: char) -> usize {
    let mut max_n = 0usize;
    let bytes: Vec<char> = sql.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == marker && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
            let mut j = i + 1;
            let mut n = 0usize;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                n = n * 10 + bytes[j].to_digit(10).unwrap() as usize;
                j += 1;
            }
            max_n = max_n.max(n);
            i = j;
        } else {
            i += 1;
        }
    }
    max_n
}

fn count_numbered_at(sql: &str) -> usize {
    let mut max_n = 0usize;
    let mut rest = sql;
    while let Some(pos) = rest.find("@p") {
        let after = &rest[pos + 2..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse::<usize>() {
            max_n = max_n.max(n);
        }
        rest = &after[digits.len()..];
    }
    max_n
}

/// Per-compile accumulator: the ordered binding list as values are encountered.
#[derive(Default)]
struct Ctx {
    bindings: Vec<Value>,
}

/// Caller-level compile overrides sourced from `ClientConfig` (spec §6), kept
/// separate from `Dialect` because they are a connection's config, not a
/// backend's fixed behavior.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// `searchPath`: a default schema applied to unqualified table references
    /// when the query itself carries none via `withSchema`.
    pub default_schema: Option<String>,
    /// `useNullAsDefault`: pads INSERT rows missing a column with NULL even on
    /// dialects whose own `Features::inserts_undefined_as_null` is `false`.
    pub use_null_as_default: bool,
    /// `wrapIdentifier` escape hatch: when set, identifier segments are
    /// emitted unchanged instead of passing through the dialect's quoting, for
    /// callers whose generated names already carry their own quoting.
    pub wrap_identifier_raw: bool,
}

/// Compiles a [`QueryNode`] for a specific [`Dialect`].
pub struct Compiler<'d> {
    dialect: &'d dyn Dialect,
    options: CompileOptions,
}

impl<'d> Compiler<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Compiler {
            dialect,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(dialect: &'d dyn Dialect, options: CompileOptions) -> Self {
        Compiler { dialect, options }
    }

    pub fn compile(&self, node: &QueryNode) -> Result<CompiledQuery> {
        let mut ctx = Ctx::default();
        let (sql, method, returning) = match node.kind {
            QueryKind::Raw | QueryKind::Ddl => {
                let raw = node.raw.as_ref().ok_or_else(|| {
                    Error::Config("raw query node is missing its SQL fragment".to_string())
                })?;
                (self.splice_raw(raw, &mut ctx)?, Method::Raw, None)
            }
            QueryKind::Select => (self.compile_select(node, &mut ctx)?, Method::Select, None),
            QueryKind::Insert => {
                let sql = self.compile_insert(node, &mut ctx)?;
                (sql, Method::Insert, self.returning_columns(node))
            }
            QueryKind::Update => {
                let sql = self.compile_update(node, &mut ctx)?;
                (sql, Method::Update, self.returning_columns(node))
            }
            QueryKind::Delete => {
                let sql = self.compile_delete(node, &mut ctx)?;
                (sql, Method::Delete, self.returning_columns(node))
            }
        };

        Ok(CompiledQuery {
            sql,
            bindings: ctx.bindings,
            method,
            returning,
            context: CompileContext {
                dialect: self.dialect.name(),
            },
        })
    }

    fn returning_columns(&self, node: &QueryNode) -> Option<Vec<String>> {
        if node.returning.is_empty() || !self.dialect.features().supports_returning {
            return None;
        }
        Some(
            node.returning
                .iter()
                .map(|item| format!("{item:?}"))
                .collect(),
        )
    }

    // ------------------------------------------------------------------
    // Binding / placeholder plumbing
    // ------------------------------------------------------------------

    /// Binds a value into the compiled output. `Value::Raw` is not itself a
    /// bindable value (spec §3: "Raw fragments can appear anywhere a column,
    /// table, or predicate can appear; the compiler splices them verbatim...
    /// and concatenates their bindings") so it is spliced in place instead of
    /// being pushed onto `ctx.bindings` as an opaque parameter.
    fn bind(&self, ctx: &mut Ctx, value: Value) -> String {
        match value {
            Value::Raw(frag) => self
                .splice_raw(&frag, ctx)
                .expect("splice_raw never returns Err"),
            other => {
                ctx.bindings.push(other);
                self.placeholder_token(ctx.bindings.len())
            }
        }
    }

    fn placeholder_token(&self, position: usize) -> String {
        match self.dialect.placeholder_style() {
            PlaceholderStyle::Positional => "?".to_string(),
            PlaceholderStyle::NumberedDollar => format!("${position}"),
            PlaceholderStyle::NumberedAt => format!("@p{position}"),
        }
    }

    /// Splices a raw fragment, consuming one binding per unescaped `?` and
    /// renumbering into the dialect's placeholder style as it goes (spec §4.3
    /// "Raw placeholder rewriting"). `\?` is an escape for a literal `?`. If
    /// bindings run out the marker is left in place defensively.
    fn splice_raw(&self, raw: &RawFragment, ctx: &mut Ctx) -> Result<String> {
        let mut out = String::with_capacity(raw.sql.len());
        let mut chars = raw.sql.chars().peekable();
        let mut bindings = raw.bindings.iter().cloned();
        while let Some(c) = chars.next() {
            if c == '\\' && chars.peek() == Some(&'?') {
                chars.next();
                out.push('?');
            } else if c == '?' {
                match bindings.next() {
                    Some(v) => out.push_str(&self.bind(ctx, v)),
                    None => out.push('?'),
                }
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Identifiers
    // ------------------------------------------------------------------

    /// Quotes one identifier segment, honoring the `wrapIdentifier` escape
    /// hatch (`CompileOptions::wrap_identifier_raw`) before falling back to the
    /// dialect's own quoting.
    fn quote_identifier(&self, segment: &str) -> String {
        if self.options.wrap_identifier_raw {
            segment.to_string()
        } else {
            self.dialect.quote_identifier(segment)
        }
    }

    /// Renders a table/CTE-target reference, applying the query's default
    /// schema (`withSchema`), falling back to the connection-level
    /// `searchPath` (`CompileOptions::default_schema`), when the reference
    /// itself carries none.
    fn quote_table_ref(&self, r: &Ref, default_schema: Option<&str>) -> String {
        let mut out = String::new();
        let schema = r
            .schema
            .as_deref()
            .or(default_schema)
            .or(self.options.default_schema.as_deref());
        if let Some(schema) = schema {
            out.push_str(&self.quote_identifier(schema));
            out.push('.');
        }
        out.push_str(&self.quote_identifier(&r.column));
        out
    }

    /// Renders a column reference. Every non-empty segment is quoted
    /// independently (invariant 3, spec §3): `a.b.c` becomes three quoted
    /// segments, never subject to the query's default-schema substitution.
    fn quote_column_ref(&self, r: &Ref) -> String {
        let mut parts = Vec::new();
        if let Some(schema) = &r.schema {
            parts.push(self.quote_identifier(schema));
        }
        if let Some(table) = &r.table {
            parts.push(self.quote_identifier(table));
        }
        if r.is_wildcard() {
            parts.push("*".to_string());
        } else {
            parts.push(self.quote_identifier(&r.column));
        }
        parts.join(".")
    }

    fn render_column_expr(&self, expr: &ColumnExpr, ctx: &mut Ctx) -> Result<String> {
        match expr {
            ColumnExpr::Column(r) => Ok(self.quote_column_ref(r)),
            ColumnExpr::Raw(r) => self.splice_raw(r, ctx),
        }
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// Renders a predicate chain with minimal necessary parentheses (spec §4.3
    /// point 3): the top-level chain is never itself wrapped; only explicit
    /// nested groups (the callback form) are parenthesized.
    fn render_predicate_nodes(&self, nodes: &[PredicateNode], ctx: &mut Ctx) -> Result<String> {
        let mut out = String::new();
        for (i, node) in nodes.iter().enumerate() {
            let mut rendered = self.render_predicate(&node.predicate, ctx)?;
            if node.negate {
                rendered = format!("not ({rendered})");
            }
            if i == 0 {
                out.push_str(&rendered);
            } else {
                out.push_str(match node.conj {
                    Conj::And => " and ",
                    Conj::Or => " or ",
                });
                out.push_str(&rendered);
            }
        }
        Ok(out)
    }

    fn render_predicate(&self, pred: &Predicate, ctx: &mut Ctx) -> Result<String> {
        match pred {
            Predicate::Group(nodes) => {
                let inner = self.render_predicate_nodes(nodes, ctx)?;
                Ok(format!("({inner})"))
            }
            Predicate::Binary { column, op, value } => {
                let col = self.render_column_expr(column, ctx)?;
                match op {
                    Ok(CompOp::ILike) if !self.dialect.features().supports_ilike => {
                        let ph = self.bind(ctx, value.clone());
                        Ok(format!("lower({col}) like lower({ph})"))
                    }
                    Ok(op) => {
                        let ph = self.bind(ctx, value.clone());
                        Ok(format!("{col} {} {ph}", op.as_sql()))
                    }
                    Err(raw) => {
                        let ph = self.bind(ctx, value.clone());
                        Ok(format!("{col} {} {ph}", raw.0))
                    }
                }
            }
            Predicate::Raw(r) => self.splice_raw(r, ctx),
            Predicate::InList {
                column,
                values,
                negate,
            } => {
                let col = self.render_column_expr(column, ctx)?;
                let placeholders: Vec<String> =
                    values.iter().cloned().map(|v| self.bind(ctx, v)).collect();
                let kw = if *negate { "not in" } else { "in" };
                Ok(format!("{col} {kw} ({})", placeholders.join(", ")))
            }
            Predicate::Between {
                column,
                low,
                high,
                negate,
            } => {
                let col = self.render_column_expr(column, ctx)?;
                let lo = self.bind(ctx, low.clone());
                let hi = self.bind(ctx, high.clone());
                let kw = if *negate { "not between" } else { "between" };
                Ok(format!("{col} {kw} {lo} and {hi}"))
            }
            Predicate::IsNull { column, negate } => {
                let col = self.render_column_expr(column, ctx)?;
                let kw = if *negate { "is not null" } else { "is null" };
                Ok(format!("{col} {kw}"))
            }
            Predicate::Exists { query, negate } => {
                let sub = self.compile_select(query, ctx)?;
                let kw = if *negate { "not exists" } else { "exists" };
                Ok(format!("{kw} ({sub})"))
            }
            Predicate::Like {
                column,
                pattern,
                case_insensitive,
                negate,
            } => {
                let col = self.render_column_expr(column, ctx)?;
                let ilike_supported = self.dialect.features().supports_ilike;
                let (kw, wrap_lower) = match (*case_insensitive, *negate) {
                    (false, false) => ("like", false),
                    (false, true) => ("not like", false),
                    (true, false) if ilike_supported => ("ilike", false),
                    (true, false) => ("like", true),
                    (true, true) if ilike_supported => ("not ilike", false),
                    (true, true) => ("not like", true),
                };
                let ph = self.bind(ctx, pattern.clone());
                if wrap_lower {
                    Ok(format!("lower({col}) {kw} lower({ph})"))
                } else {
                    Ok(format!("{col} {kw} {ph}"))
                }
            }
            Predicate::JsonPath {
                column,
                path,
                op,
                value,
            } => {
                if !self.dialect.features().supports_json_path {
                    return Err(Error::unsupported("json_path", self.dialect.name()));
                }
                let col = self.render_column_expr(column, ctx)?;
                let ph = self.bind(ctx, value.clone());
                Ok(format!(
                    "jsonb_extract_path_text({col}, {}) {} {ph}",
                    quote_path_literal(path),
                    op.as_sql()
                ))
            }
            Predicate::JsonObject { column, object } => {
                if !self.dialect.features().supports_json_path {
                    return Err(Error::unsupported("json_object", self.dialect.name()));
                }
                let col = self.render_column_expr(column, ctx)?;
                let ph = self.bind(ctx, Value::Json(object.clone()));
                Ok(format!("{col} = {ph}"))
            }
            Predicate::JsonSuperset {
                column,
                value,
                negate,
            } => {
                if !self.dialect.features().supports_json_path {
                    return Err(Error::unsupported("json_superset", self.dialect.name()));
                }
                let col = self.render_column_expr(column, ctx)?;
                let ph = self.bind(ctx, Value::Json(value.clone()));
                let op = if *negate { "not @>" } else { "@>" };
                Ok(format!("{col} {op} {ph}"))
            }
            Predicate::JsonSubset {
                column,
                value,
                negate,
            } => {
                if !self.dialect.features().supports_json_path {
                    return Err(Error::unsupported("json_subset", self.dialect.name()));
                }
                let col = self.render_column_expr(column, ctx)?;
                let ph = self.bind(ctx, Value::Json(value.clone()));
                let op = if *negate { "not <@" } else { "<@" };
                Ok(format!("{col} {op} {ph}"))
            }
            Predicate::ColumnsCompare { left, op, right } => {
                let lhs = self.render_column_expr(left, ctx)?;
                let rhs = self.render_column_expr(right, ctx)?;
                Ok(format!("{lhs} {} {rhs}", op.as_sql()))
            }
        }
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    fn compile_select(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        let mut out = String::new();

        out.push_str(&self.compile_ctes(node, ctx)?);

        out.push_str("select ");
        if !node.distinct_on.is_empty() {
            if !self.dialect.features().supports_distinct_on {
                return Err(Error::unsupported("distinct_on", self.dialect.name()));
            }
            let cols: Result<Vec<String>> = node
                .distinct_on
                .iter()
                .map(|c| self.render_column_expr(c, ctx))
                .collect();
            out.push_str(&format!("distinct on ({}) ", cols?.join(", ")));
        } else if node.distinct {
            out.push_str("distinct ");
        }

        if node.columns.is_empty() {
            out.push('*');
        } else {
            let cols: Result<Vec<String>> = node
                .columns
                .iter()
                .map(|c| self.render_select_item(c, ctx))
                .collect();
            out.push_str(&cols?.join(", "));
        }

        if let Some(table) = &node.table {
            out.push_str(" from ");
            out.push_str(&self.quote_table_ref(table, node.schema.as_deref()));
            if let Some(alias) = &node.table_alias {
                out.push_str(" as ");
                out.push_str(&self.quote_identifier(alias));
            }
        }

        for join in &node.joins {
            out.push(' ');
            out.push_str(&self.render_join(join, ctx)?);
        }

        if !node.wheres.is_empty() {
            out.push_str(" where ");
            out.push_str(&self.render_predicate_nodes(&node.wheres, ctx)?);
        }

        let group_sql = self.compile_group_by(node, ctx)?;
        if !group_sql.is_empty() {
            out.push_str(" group by ");
            out.push_str(&group_sql);
        }

        if !node.havings.is_empty() {
            out.push_str(" having ");
            out.push_str(&self.render_predicate_nodes(&node.havings, ctx)?);
        }

        let order_sql = self.compile_order_by(node, ctx)?;
        let has_order = !order_sql.is_empty();
        if has_order {
            out.push_str(" order by ");
            out.push_str(&order_sql);
        }

        out.push_str(&self.compile_limit_offset(node, ctx, has_order)?);
        out.push_str(&self.compile_lock(node)?);

        for set_op in &node.set_ops {
            out.push(' ');
            out.push_str(&self.render_set_operation(set_op, ctx)?);
        }

        Ok(out)
    }

    fn compile_ctes(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        if node.ctes.is_empty() {
            return Ok(String::new());
        }
        if !self.dialect.features().supports_cte {
            return Err(Error::unsupported("cte", self.dialect.name()));
        }
        let recursive = node.ctes.iter().any(|c| c.recursive);
        if recursive && !self.dialect.features().supports_recursive_cte {
            return Err(Error::unsupported("recursive_cte", self.dialect.name()));
        }
        let mut parts = Vec::with_capacity(node.ctes.len());
        for cte in &node.ctes {
            parts.push(self.render_cte(cte, ctx)?);
        }
        Ok(format!(
            "with {}{} ",
            if recursive { "recursive " } else { "" },
            parts.join(", ")
        ))
    }

    fn render_cte(&self, cte: &Cte, ctx: &mut Ctx) -> Result<String> {
        let alias = self.quote_identifier(&cte.alias);
        let columns = match &cte.columns {
            Some(cols) if !cols.is_empty() => format!(
                " ({})",
                cols.iter()
                    .map(|c| self.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => String::new(),
        };
        let materialize = if self.dialect.features().supports_materialized_cte {
            match cte.materialization {
                Materialization::Materialized => "materialized ",
                Materialization::NotMaterialized => "not materialized ",
                Materialization::Default => "",
            }
        } else {
            ""
        };
        let body = match &cte.body {
            CteBody::Query(q) => self.compile_select(q, ctx)?,
            CteBody::Raw(r) => self.splice_raw(r, ctx)?,
        };
        Ok(format!("{alias}{columns} as {materialize}({body})"))
    }

    fn render_select_item(&self, item: &SelectItem, ctx: &mut Ctx) -> Result<String> {
        match item {
            SelectItem::Wildcard => Ok("*".to_string()),
            SelectItem::QualifiedWildcard(table) => {
                Ok(format!("{}.*", self.quote_identifier(table)))
            }
            SelectItem::Column(r) => Ok(self.quote_column_ref(r)),
            SelectItem::Aggregate(agg) => self.render_aggregate(agg),
            SelectItem::Raw(r) => self.splice_raw(r, ctx),
            SelectItem::Aliased { expr, alias } => {
                let inner = self.render_select_item(expr, ctx)?;
                Ok(format!("{inner} as {}", self.quote_identifier(alias)))
            }
        }
    }

    fn render_aggregate(&self, agg: &Aggregate) -> Result<String> {
        let distinct = if agg.distinct { "distinct " } else { "" };
        let cols: Vec<String> = agg.columns.iter().map(|c| self.quote_column_ref(c)).collect();
        let inner = if cols.is_empty() {
            "*".to_string()
        } else if agg.distinct
            && cols.len() > 1
            && agg.kind == AggregateKind::Count
            && !self.dialect.features().supports_multi_column_count_distinct
        {
            // count(distinct a, b) where unsupported is rewritten to
            // count(distinct concat(a, b)) (spec §4.3 point 5: the dialect decides).
            format!("concat({})", cols.join(", "))
        } else {
            cols.join(", ")
        };
        let rendered = format!("{}({distinct}{inner})", agg.kind.as_sql());
        match &agg.alias {
            Some(alias) => Ok(format!("{rendered} as {}", self.quote_identifier(alias))),
            None => Ok(rendered),
        }
    }

    fn render_join(&self, join: &Join, ctx: &mut Ctx) -> Result<String> {
        let target = match &join.target {
            JoinTarget::Table(r) => self.quote_table_ref(r, None),
            JoinTarget::Raw(r) => self.splice_raw(r, ctx)?,
            JoinTarget::SubQuery { query, alias } => {
                let sub = self.compile_select(query, ctx)?;
                format!("({sub}) as {}", self.quote_identifier(alias))
            }
        };
        let mut out = format!("{} {target}", join.kind.as_sql());
        if matches!(join.kind, JoinKind::Cross) {
            return Ok(out);
        }
        if !join.using.is_empty() {
            let cols = join
                .using
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(" using ({cols})"));
        } else if !join.on.is_empty() {
            out.push_str(" on ");
            out.push_str(&self.render_predicate_nodes(&join.on, ctx)?);
        }
        Ok(out)
    }

    fn compile_group_by(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        let mut parts: Vec<String> = node
            .group_by
            .iter()
            .map(|c| self.render_column_expr(c, ctx))
            .collect::<Result<_>>()?;
        for raw in &node.group_by_raw {
            parts.push(self.splice_raw(raw, ctx)?);
        }
        Ok(parts.join(", "))
    }

    fn compile_order_by(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        let mut parts = Vec::new();
        for item in &node.order_by {
            parts.push(self.render_order_item(item, ctx)?);
        }
        for raw in &node.order_by_raw {
            parts.push(self.splice_raw(raw, ctx)?);
        }
        Ok(parts.join(", "))
    }

    fn render_order_item(&self, item: &OrderItem, ctx: &mut Ctx) -> Result<String> {
        let target = self.render_column_expr(&item.target, ctx)?;
        let dir = item.direction.as_sql();
        let nulls = match item.nulls {
            Nulls::Default => "",
            Nulls::First => " nulls first",
            Nulls::Last => " nulls last",
        };
        Ok(format!("{target} {dir}{nulls}"))
    }

    fn compile_limit_offset(&self, node: &QueryNode, ctx: &mut Ctx, has_order: bool) -> Result<String> {
        if node.limit.is_none() && node.offset.is_none() {
            return Ok(String::new());
        }
        for n in [node.limit, node.offset].into_iter().flatten() {
            if n < 0 {
                return Err(Error::Config(format!("limit/offset must be non-negative, got {n}")));
            }
        }
        match self.dialect.limit_offset_style() {
            LimitOffsetStyle::LimitOffset => {
                let mut out = String::new();
                if let Some(n) = node.limit {
                    out.push_str(" limit ");
                    out.push_str(&self.render_number(n, node.skip_binding, ctx));
                }
                if let Some(n) = node.offset {
                    out.push_str(" offset ");
                    out.push_str(&self.render_number(n, node.skip_binding, ctx));
                }
                Ok(out)
            }
            LimitOffsetStyle::OffsetFetch => {
                let mut out = String::new();
                if !has_order {
                    out.push_str(" order by (select null)");
                }
                let offset = node.offset.unwrap_or(0);
                out.push_str(" offset ");
                out.push_str(&self.render_number(offset, node.skip_binding, ctx));
                out.push_str(" rows");
                if let Some(n) = node.limit {
                    out.push_str(" fetch next ");
                    out.push_str(&self.render_number(n, node.skip_binding, ctx));
                    out.push_str(" rows only");
                }
                Ok(out)
            }
        }
    }

    fn render_number(&self, n: i64, skip_binding: bool, ctx: &mut Ctx) -> String {
        if skip_binding {
            n.to_string()
        } else {
            self.bind(ctx, Value::Int(n))
        }
    }

    fn compile_lock(&self, node: &QueryNode) -> Result<String> {
        if matches!(node.lock, LockStrength::None) {
            return Ok(String::new());
        }
        let keyword = match node.lock {
            LockStrength::ForUpdate => "for update",
            LockStrength::ForShare => "for share",
            LockStrength::ForNoKeyUpdate | LockStrength::ForKeyShare => {
                if !self.dialect.features().supports_for_update_of_tables
                    && self.dialect.name() != "pg"
                {
                    return Err(Error::unsupported("for_no_key_update", self.dialect.name()));
                }
                match node.lock {
                    LockStrength::ForNoKeyUpdate => "for no key update",
                    _ => "for key share",
                }
            }
            LockStrength::None => unreachable!(),
        };
        let mut out = format!(" {keyword}");
        if !node.for_update_of.is_empty() {
            if !self.dialect.features().supports_for_update_of_tables {
                return Err(Error::unsupported("for_update_of", self.dialect.name()));
            }
            let tables = node
                .for_update_of
                .iter()
                .map(|t| self.quote_identifier(t))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(" of {tables}"));
        }
        if node.skip_locked {
            if !self.dialect.features().supports_skip_locked {
                return Err(Error::unsupported("skip_locked", self.dialect.name()));
            }
            out.push_str(" skip locked");
        } else if node.no_wait {
            out.push_str(" nowait");
        }
        Ok(out)
    }

    fn render_set_operation(&self, set_op: &SetOperation, ctx: &mut Ctx) -> Result<String> {
        let inner = self.compile_select(&set_op.query, ctx)?;
        let body = if set_op.wrap {
            format!("({inner})")
        } else {
            inner
        };
        Ok(format!("{} {body}", set_op.kind.as_sql()))
    }

    // ------------------------------------------------------------------
    // INSERT / UPDATE / DELETE
    // ------------------------------------------------------------------

    fn compile_insert(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        let table = node
            .table
            .as_ref()
            .ok_or_else(|| Error::Config("insert requires a target table".to_string()))?;

        if node.insert_rows.is_empty() {
            return Err(Error::Config("insert requires at least one row".to_string()));
        }

        let mut columns: Vec<String> = Vec::new();
        for row in &node.insert_rows {
            for (col, _) in row {
                if !columns.contains(col) {
                    columns.push(col.clone());
                }
            }
        }

        let mut verb = "insert into";
        if matches!(node.on_conflict, OnConflict::Ignore { .. }) && self.dialect.name() == "mysql" {
            verb = "insert ignore into";
        }

        let mut out = format!(
            "{verb} {} ({}) values ",
            self.quote_table_ref(table, node.schema.as_deref()),
            columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut rows_sql = Vec::with_capacity(node.insert_rows.len());
        for row in &node.insert_rows {
            let mut values = Vec::with_capacity(columns.len());
            for col in &columns {
                match row.iter().find(|(c, _)| c == col) {
                    Some((_, v)) => values.push(self.bind(ctx, v.clone())),
                    None if self.dialect.features().inserts_undefined_as_null
                        || self.options.use_null_as_default =>
                    {
                        values.push(self.bind(ctx, Value::Null))
                    }
                    None => {
                        return Err(Error::Config(format!(
                            "row is missing column '{col}' and dialect '{}' requires uniform rows",
                            self.dialect.name()
                        )))
                    }
                }
            }
            rows_sql.push(format!("({})", values.join(", ")));
        }
        out.push_str(&rows_sql.join(", "));

        out.push_str(&self.compile_on_conflict(&node.on_conflict, &columns)?);

        if !node.returning.is_empty() && self.dialect.features().supports_returning {
            out.push_str(" returning ");
            out.push_str(&self.render_returning(node, ctx)?);
        }

        Ok(out)
    }

    fn compile_on_conflict(&self, on_conflict: &OnConflict, insert_columns: &[String]) -> Result<String> {
        match on_conflict {
            OnConflict::None => Ok(String::new()),
            OnConflict::Ignore { columns } => {
                if !self.dialect.features().supports_on_conflict {
                    return Err(Error::unsupported("on_conflict", self.dialect.name()));
                }
                if self.dialect.name() == "mysql" {
                    // handled by the "insert ignore" verb swap in compile_insert
                    return Ok(String::new());
                }
                let target = conflict_target(self.dialect, columns);
                Ok(format!(" on conflict{target} do nothing"))
            }
            OnConflict::Merge {
                columns,
                update_columns,
            } => {
                if !self.dialect.features().supports_on_conflict {
                    return Err(Error::unsupported("on_conflict", self.dialect.name()));
                }
                let merge_cols = update_columns.clone().unwrap_or_else(|| insert_columns.to_vec());
                if self.dialect.name() == "mysql" {
                    let assignments = merge_cols
                        .iter()
                        .map(|c| {
                            let q = self.quote_identifier(c);
                            format!("{q} = values({q})")
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    Ok(format!(" on duplicate key update {assignments}"))
                } else {
                    let target = conflict_target(self.dialect, columns);
                    let assignments = merge_cols
                        .iter()
                        .map(|c| {
                            let q = self.quote_identifier(c);
                            format!("{q} = excluded.{q}")
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    Ok(format!(" on conflict{target} do update set {assignments}"))
                }
            }
        }
    }

    fn render_returning(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        if node.returning.len() == 1 && matches!(node.returning[0], SelectItem::Wildcard) {
            return Ok("*".to_string());
        }
        let cols: Result<Vec<String>> = node
            .returning
            .iter()
            .map(|c| self.render_select_item(c, ctx))
            .collect();
        Ok(cols?.join(", "))
    }

    fn compile_update(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        let table = node
            .table
            .as_ref()
            .ok_or_else(|| Error::Config("update requires a target table".to_string()))?;
        if node.update_values.is_empty() {
            return Err(Error::Config("update requires at least one assignment".to_string()));
        }

        let mut out = format!(
            "update {} set ",
            self.quote_table_ref(table, node.schema.as_deref())
        );
        let assignments: Vec<String> = node
            .update_values
            .iter()
            .map(|(col, v)| {
                let ph = self.bind(ctx, v.clone());
                format!("{} = {ph}", self.quote_identifier(col))
            })
            .collect();
        out.push_str(&assignments.join(", "));

        if !node.joins.is_empty() {
            if !self.dialect.features().supports_update_from {
                return Err(Error::unsupported("update_from", self.dialect.name()));
            }
            for join in &node.joins {
                out.push(' ');
                out.push_str(&self.render_join(join, ctx)?);
            }
        }

        if !node.wheres.is_empty() {
            out.push_str(" where ");
            out.push_str(&self.render_predicate_nodes(&node.wheres, ctx)?);
        }

        if !node.returning.is_empty() && self.dialect.features().supports_returning {
            out.push_str(" returning ");
            out.push_str(&self.render_returning(node, ctx)?);
        }

        Ok(out)
    }

    fn compile_delete(&self, node: &QueryNode, ctx: &mut Ctx) -> Result<String> {
        let table = node
            .table
            .as_ref()
            .ok_or_else(|| Error::Config("delete requires a target table".to_string()))?;
        let mut out = format!(
            "delete from {}",
            self.quote_table_ref(table, node.schema.as_deref())
        );

        if !node.wheres.is_empty() {
            out.push_str(" where ");
            out.push_str(&self.render_predicate_nodes(&node.wheres, ctx)?);
        }

        if !node.returning.is_empty() && self.dialect.features().supports_returning {
            out.push_str(" returning ");
            out.push_str(&self.render_returning(node, ctx)?);
        }

        Ok(out)
    }
}

fn conflict_target(dialect: &dyn Dialect, columns: &[String]) -> String {
    if columns.is_empty() {
        String::new()
    } else {
        format!(
            " ({})",
            columns
                .iter()
                .map(|c| dialect.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

fn quote_path_literal(path: &str) -> String {
    format!("'{}'", path.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::QueryBuilder;
    use crate::dialect::mssql::MssqlDialect;
    use crate::dialect::mysql::MysqlDialect;
    use crate::dialect::postgres::PostgresDialect;
    use crate::dialect::sqlite::SqliteDialect;

    fn compile(qb: &QueryBuilder, dialect: &dyn Dialect) -> CompiledQuery {
        qb.to_sql(dialect).expect("query should compile")
    }

    // Spec §8 scenario 1.
    #[test]
    fn select_where_under_postgres() {
        let qb = QueryBuilder::new().from("users").where_eq("id", 1).select(["name"]);
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, "select \"name\" from \"users\" where \"id\" = $1");
        assert_eq!(compiled.bindings, vec![Value::Int(1)]);
    }

    // Spec §8 scenario 2.
    #[test]
    fn where_in_under_mysql() {
        let qb = QueryBuilder::new().from("users").where_in("id", [1, 2, 3]);
        let compiled = compile(&qb, &MysqlDialect);
        assert_eq!(
            compiled.sql,
            "select * from `users` where `id` in (?, ?, ?)"
        );
        assert_eq!(compiled.bindings, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    // Spec §8 scenario 3.
    #[test]
    fn inner_join_under_sqlite() {
        let qb = QueryBuilder::new()
            .from("a")
            .join("b", |on| on.on("a.id", CompOp::Eq, "b.a_id"))
            .select(["a.x", "b.y"]);
        let compiled = compile(&qb, &SqliteDialect);
        assert_eq!(
            compiled.sql,
            "select \"a\".\"x\", \"b\".\"y\" from \"a\" inner join \"b\" on \"a\".\"id\" = \"b\".\"a_id\""
        );
        assert!(compiled.bindings.is_empty());
    }

    // Spec §8 scenario 4.
    #[test]
    fn insert_returning_on_dialect_without_returning() {
        let qb = QueryBuilder::insert("users", vec![vec![("name".to_string(), Value::Text("Alice".to_string()))]])
            .returning(["id"]);
        let compiled = compile(&qb, &SqliteDialect);
        assert_eq!(compiled.sql, "insert into \"users\" (\"name\") values (?)");
        assert_eq!(compiled.bindings, vec![Value::Text("Alice".to_string())]);
        assert!(compiled.returning.is_none());
        assert_eq!(compiled.method, Method::Insert);
    }

    // Spec §8 scenario 5.
    #[test]
    fn insert_returning_star_on_postgres() {
        let qb = QueryBuilder::insert("users", vec![vec![("name".to_string(), Value::Text("Alice".to_string()))]])
            .returning(["*"]);
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(
            compiled.sql,
            "insert into \"users\" (\"name\") values ($1) returning *"
        );
        assert_eq!(compiled.bindings, vec![Value::Text("Alice".to_string())]);
        assert!(compiled.returning.is_some());
    }

    #[test]
    fn placeholder_count_matches_bindings_invariant() {
        let qb = QueryBuilder::new()
            .from("users")
            .where_eq("id", 1)
            .where_in("role", ["admin", "owner"])
            .limit(5);
        for dialect in [
            &PostgresDialect as &dyn Dialect,
            &MysqlDialect,
            &SqliteDialect,
            &MssqlDialect,
        ] {
            let compiled = compile(&qb, dialect);
            assert_eq!(compiled.placeholder_count(dialect), compiled.bindings.len());
        }
    }

    #[test]
    fn compile_is_deterministic() {
        let qb = QueryBuilder::new().from("users").where_eq("id", 1).order_by("name", Direction::Asc);
        let first = compile(&qb, &PostgresDialect);
        let second = compile(&qb, &PostgresDialect);
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.bindings, second.bindings);
    }

    #[test]
    fn and_commutativity_up_to_reordering() {
        let a = QueryBuilder::new().from("t").where_eq("a", 1).where_eq("b", 2);
        let b = QueryBuilder::new().from("t").where_eq("b", 2).where_eq("a", 1);
        let ca = compile(&a, &PostgresDialect);
        let cb = compile(&b, &PostgresDialect);
        // Reordering the calls reorders the emitted conjuncts and bindings
        // together; the set of (predicate, value) pairs is unchanged.
        assert_ne!(ca.sql, cb.sql);
        assert!(ca.sql.contains("\"a\" = $1") && ca.sql.contains("\"b\" = $2"));
        assert!(cb.sql.contains("\"b\" = $1") && cb.sql.contains("\"a\" = $2"));
    }

    #[test]
    fn nested_or_group_is_parenthesized() {
        let qb = QueryBuilder::new()
            .from("t")
            .where_eq("a", 1)
            .where_group(|g| g.where_eq("b", 2).or_where_eq("c", 3));
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(
            compiled.sql,
            "select * from \"t\" where \"a\" = $1 and (\"b\" = $2 or \"c\" = $3)"
        );
    }

    #[test]
    fn dotted_reference_quotes_each_segment_once() {
        let qb = QueryBuilder::new().select(["a.b.c"]);
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, "select \"a\".\"b\".\"c\"");
    }

    #[test]
    fn clause_order_is_canonical_regardless_of_call_order() {
        let qb = QueryBuilder::new()
            .limit(10)
            .from("t")
            .order_by("x", Direction::Asc)
            .where_eq("y", 1)
            .select(["x"]);
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(
            compiled.sql,
            "select \"x\" from \"t\" where \"y\" = $1 order by \"x\" asc limit $2"
        );
    }

    #[test]
    fn raw_fragment_consumes_one_binding_per_unescaped_placeholder() {
        let qb = QueryBuilder::new()
            .from("t")
            .where_raw(RawFragment::with_bindings("score > ? and flag = \\?", [10]));
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, "select * from \"t\" where score > $1 and flag = ?");
        assert_eq!(compiled.bindings, vec![Value::Int(10)]);
    }

    #[test]
    fn embedded_raw_value_splices_in_place_and_concatenates_bindings() {
        let qb = QueryBuilder::new().from("t").where_eq(
            "score",
            Value::from(RawFragment::with_bindings("greatest(?, ?)", [1, 2])),
        );
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, "select * from \"t\" where \"score\" = greatest($1, $2)");
        assert_eq!(compiled.bindings, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn json_path_unsupported_on_mssql() {
        let qb = QueryBuilder::new()
            .from("t")
            .where_json_path("data", "$.a", CompOp::Eq, "x");
        let err = qb.to_sql(&MssqlDialect).unwrap_err();
        assert!(matches!(err, Error::Unsupported { feature: "json_path", .. }));
    }

    #[test]
    fn distinct_on_unsupported_on_mysql() {
        let qb = QueryBuilder::new().from("t").distinct_on(["a"]);
        let err = qb.to_sql(&MysqlDialect).unwrap_err();
        assert!(matches!(err, Error::Unsupported { feature: "distinct_on", .. }));
    }

    #[test]
    fn negative_limit_is_rejected() {
        let qb = QueryBuilder::new().from("t").limit(-1);
        let err = qb.to_sql(&PostgresDialect).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn skip_binding_inlines_limit_as_literal() {
        let qb = QueryBuilder::new().from("t").limit(5).skip_binding(true);
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, "select * from \"t\" limit 5");
        assert!(compiled.bindings.is_empty());
    }

    #[test]
    fn mssql_limit_offset_becomes_fetch_offset() {
        let qb = QueryBuilder::new().from("t").order_by("id", Direction::Asc).limit(5).offset(10);
        let compiled = compile(&qb, &MssqlDialect);
        assert_eq!(
            compiled.sql,
            "select * from [t] order by [id] asc offset @p1 rows fetch next @p2 rows only"
        );
    }

    #[test]
    fn on_conflict_merge_renders_excluded_on_postgres() {
        let qb = QueryBuilder::insert("t", vec![vec![("id".to_string(), Value::Int(1))]])
            .on_conflict_merge(vec!["id".to_string()], None);
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(
            compiled.sql,
            "insert into \"t\" (\"id\") values ($1) on conflict (\"id\") do update set \"id\" = excluded.\"id\""
        );
    }

    #[test]
    fn on_conflict_ignore_becomes_insert_ignore_on_mysql() {
        let qb = QueryBuilder::insert("t", vec![vec![("id".to_string(), Value::Int(1))]])
            .on_conflict_ignore(vec!["id".to_string()]);
        let compiled = compile(&qb, &MysqlDialect);
        assert_eq!(compiled.sql, "insert ignore into `t` (`id`) values (?)");
    }

    #[test]
    fn count_distinct_multi_column_rewrites_on_mysql() {
        let qb = QueryBuilder::new().from("t").count_distinct(["a", "b"]);
        let compiled = compile(&qb, &MysqlDialect);
        assert_eq!(compiled.sql, "select count(distinct concat(`a`, `b`)) from `t`");
    }

    #[test]
    fn count_distinct_multi_column_is_native_on_postgres() {
        let qb = QueryBuilder::new().from("t").count_distinct(["a", "b"]);
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, r#"select count(distinct "a", "b") from "t""#);
    }

    #[test]
    fn use_null_as_default_pads_missing_columns_even_without_dialect_support() {
        let qb = QueryBuilder::insert(
            "t",
            vec![
                vec![("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))],
                vec![("a".to_string(), Value::Int(3))],
            ],
        );

        // Postgres doesn't pad undefined columns on its own.
        assert!(qb.to_sql(&PostgresDialect).is_err());

        let options = CompileOptions {
            use_null_as_default: true,
            ..CompileOptions::default()
        };
        let compiled = qb.to_sql_with_options(&PostgresDialect, options).unwrap();
        assert_eq!(
            compiled.sql,
            "insert into \"t\" (\"a\", \"b\") values ($1, $2), ($3, $4)"
        );
        assert_eq!(
            compiled.bindings,
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Null]
        );
    }

    #[test]
    fn wrap_identifier_raw_bypasses_dialect_quoting() {
        let qb = QueryBuilder::new().from("t").select(["a"]);
        let options = CompileOptions {
            wrap_identifier_raw: true,
            ..CompileOptions::default()
        };
        let compiled = qb.to_sql_with_options(&PostgresDialect, options).unwrap();
        assert_eq!(compiled.sql, "select a from t");
    }

    #[test]
    fn default_schema_applies_when_query_carries_none() {
        let qb = QueryBuilder::new().from("t").select(["a"]);
        let options = CompileOptions {
            default_schema: Some("app".to_string()),
            ..CompileOptions::default()
        };
        let compiled = qb.to_sql_with_options(&PostgresDialect, options).unwrap();
        assert_eq!(compiled.sql, "select \"a\" from \"app\".\"t\"");

        // An explicit `with_schema` on the query still wins over the default.
        let qb = QueryBuilder::new().from("t").with_schema("explicit").select(["a"]);
        let options = CompileOptions {
            default_schema: Some("app".to_string()),
            ..CompileOptions::default()
        };
        let compiled = qb.to_sql_with_options(&PostgresDialect, options).unwrap();
        assert_eq!(compiled.sql, "select \"a\" from \"explicit\".\"t\"");
    }

    #[test]
    fn ilike_emulated_as_lower_like_on_mysql() {
        let qb = QueryBuilder::new().from("t").where_ilike("name", "%foo%");
        let compiled = compile(&qb, &MysqlDialect);
        assert_eq!(compiled.sql, "select * from `t` where lower(`name`) like lower(?)");
    }

    #[test]
    fn cross_join_emits_no_on_clause() {
        let qb = QueryBuilder::new().from("a").cross_join("b");
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, "select * from \"a\" cross join \"b\"");
    }

    #[test]
    fn for_update_skip_locked_on_postgres() {
        let qb = QueryBuilder::new().from("t").for_update().skip_locked();
        let compiled = compile(&qb, &PostgresDialect);
        assert_eq!(compiled.sql, "select * from \"t\" for update skip locked");
    }
}
