use super::{Dialect, Features, LogicalType, PlaceholderStyle};
use crate::error::Error;

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "pg"
    }

    fn quote_identifier(&self, segment: &str) -> String {
        format!("\"{}\"", segment.replace('"', "\"\""))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::NumberedDollar
    }

    fn features(&self) -> Features {
        Features {
            supports_returning: true,
            supports_cte: true,
            supports_recursive_cte: true,
            supports_materialized_cte: true,
            supports_json_path: true,
            supports_on_conflict: true,
            supports_update_from: true,
            supports_for_update_of_tables: true,
            supports_skip_locked: true,
            supports_distinct_on: true,
            supports_ilike: true,
            supports_boolean: true,
            inserts_undefined_as_null: false,
            supports_multi_column_count_distinct: true,
        }
    }

    fn column_type_sql(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Increments => "serial primary key".to_string(),
            LogicalType::BigIncrements => "bigserial primary key".to_string(),
            LogicalType::Integer => "integer".to_string(),
            LogicalType::TinyInt => "smallint".to_string(),
            LogicalType::SmallInt => "smallint".to_string(),
            LogicalType::MediumInt => "integer".to_string(),
            LogicalType::BigInteger => "bigint".to_string(),
            LogicalType::Text => "text".to_string(),
            LogicalType::Varchar(n) => format!("varchar({n})"),
            LogicalType::Float => "real".to_string(),
            LogicalType::Double => "double precision".to_string(),
            LogicalType::Decimal(p, s) => format!("decimal({p},{s})"),
            LogicalType::Boolean => "boolean".to_string(),
            LogicalType::Date => "date".to_string(),
            LogicalType::DateTime => "timestamp".to_string(),
            LogicalType::Time => "time".to_string(),
            LogicalType::Timestamp => "timestamptz".to_string(),
            LogicalType::Geometry => "geometry".to_string(),
            LogicalType::Geography => "geography".to_string(),
            LogicalType::Point => "point".to_string(),
            LogicalType::Binary(_) => "bytea".to_string(),
            LogicalType::Enum(variants) => {
                format!("text check (value in ({}))", variants.iter().map(|v| format!("'{v}'")).collect::<Vec<_>>().join(", "))
            }
            LogicalType::Json => "json".to_string(),
            LogicalType::Jsonb => "jsonb".to_string(),
            LogicalType::Uuid => "uuid".to_string(),
        }
    }

    fn transform_error(&self, message: &str, code: Option<&str>) -> Error {
        match code {
            Some("23502") | Some("23503") | Some("23505") | Some("23514") => {
                Error::Constraint(message.to_string())
            }
            Some(c) if c.starts_with("42") => Error::Syntax {
                message: message.to_string(),
                sql: None,
            },
            Some("57014") => Error::Cancellation,
            _ => Error::Connection(message.to_string()),
        }
    }
}
