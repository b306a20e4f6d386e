//! Property-based fuzzing over random builder call sequences (spec §8
//! "Property-based fuzz"): every sequence must compile without panicking and
//! the compiled query must satisfy the placeholder/bindings count invariant.

use proptest::prelude::*;
use sqlkit::dialect::mssql::MssqlDialect;
use sqlkit::dialect::mysql::MysqlDialect;
use sqlkit::dialect::postgres::PostgresDialect;
use sqlkit::dialect::sqlite::SqliteDialect;
use sqlkit::dialect::Dialect;
use sqlkit::QueryBuilder;

#[derive(Debug, Clone)]
enum Op {
    WhereEqInt(String, i64),
    WhereEqText(String, String),
    WhereIn(String, Vec<i64>),
    WhereNull(String),
    OrderBy(String, bool),
    Limit(i64),
    Offset(i64),
    Select(String),
    GroupBy(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let ident = "[a-z][a-z0-9_]{0,8}";
    prop_oneof![
        (ident, any::<i32>()).prop_map(|(c, v)| Op::WhereEqInt(c, v as i64)),
        (ident, "[a-zA-Z0-9 ]{0,12}").prop_map(|(c, v)| Op::WhereEqText(c, v)),
        (ident, prop::collection::vec(any::<i16>(), 0..5))
            .prop_map(|(c, vs)| Op::WhereIn(c, vs.into_iter().map(i64::from).collect())),
        ident.prop_map(Op::WhereNull),
        (ident, any::<bool>()).prop_map(|(c, d)| Op::OrderBy(c, d)),
        (0i64..1000).prop_map(Op::Limit),
        (0i64..1000).prop_map(Op::Offset),
        ident.prop_map(Op::Select),
        ident.prop_map(Op::GroupBy),
    ]
}

fn apply(mut qb: QueryBuilder, op: &Op) -> QueryBuilder {
    use sqlkit::ast::Direction;
    match op {
        Op::WhereEqInt(c, v) => qb = qb.where_eq(c.as_str(), *v),
        Op::WhereEqText(c, v) => qb = qb.where_eq(c.as_str(), v.as_str()),
        Op::WhereIn(c, vs) => qb = qb.where_in(c.as_str(), vs.clone()),
        Op::WhereNull(c) => qb = qb.where_null(c.as_str()),
        Op::OrderBy(c, asc) => {
            qb = qb.order_by(c.as_str(), if *asc { Direction::Asc } else { Direction::Desc })
        }
        Op::Limit(n) => qb = qb.limit(*n),
        Op::Offset(n) => qb = qb.offset(*n),
        Op::Select(c) => qb = qb.column(c.as_str()),
        Op::GroupBy(c) => qb = qb.group_by([c.as_str()]),
    }
    qb
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn random_builder_sequences_always_compile_with_matching_bindings(
        ops in prop::collection::vec(op_strategy(), 0..16)
    ) {
        let mut qb = QueryBuilder::new().from("t");
        for op in &ops {
            qb = apply(qb, op);
        }

        for dialect in [
            &PostgresDialect as &dyn Dialect,
            &MysqlDialect,
            &SqliteDialect,
            &MssqlDialect,
        ] {
            // Unsupported-feature errors are acceptable outcomes for a
            // randomly generated query; a panic, or a binding-count mismatch
            // on a query that *did* compile, is not.
            if let Ok(compiled) = qb.to_sql(dialect) {
                prop_assert_eq!(
                    compiled.placeholder_count(dialect),
                    compiled.bindings.len()
                );
            }
        }
    }
}
