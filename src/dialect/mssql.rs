use super::{Dialect, Features, LimitOffsetStyle, LogicalType, PlaceholderStyle};
use crate::error::Error;

/// Compiles SQL Server SQL text and bindings. `sqlx::Any` (the driver layer
/// `Pool`/`Client` connect through) has no MSSQL backend, so this dialect can
/// render `CompiledQuery` values for an external adapter but cannot itself
/// drive a live `mssql://` connection — see DESIGN.md.
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_identifier(&self, segment: &str) -> String {
        format!("[{}]", segment.replace(']', "]]"))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::NumberedAt
    }

    fn features(&self) -> Features {
        Features {
            supports_returning: true,
            supports_cte: true,
            supports_recursive_cte: true,
            supports_materialized_cte: false,
            supports_json_path: false,
            supports_on_conflict: false,
            supports_update_from: true,
            supports_for_update_of_tables: false,
            supports_skip_locked: false,
            supports_distinct_on: false,
            supports_ilike: false,
            supports_boolean: false,
            inserts_undefined_as_null: false,
            supports_multi_column_count_distinct: false,
        }
    }

    fn limit_offset_style(&self) -> LimitOffsetStyle {
        LimitOffsetStyle::OffsetFetch
    }

    fn column_type_sql(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Increments => "int identity(1,1) primary key".to_string(),
            LogicalType::BigIncrements => "bigint identity(1,1) primary key".to_string(),
            LogicalType::Integer => "int".to_string(),
            LogicalType::TinyInt => "tinyint".to_string(),
            LogicalType::SmallInt => "smallint".to_string(),
            LogicalType::MediumInt => "int".to_string(),
            LogicalType::BigInteger => "bigint".to_string(),
            LogicalType::Text => "nvarchar(max)".to_string(),
            LogicalType::Varchar(n) => format!("nvarchar({n})"),
            LogicalType::Float => "real".to_string(),
            LogicalType::Double => "float".to_string(),
            LogicalType::Decimal(p, s) => format!("decimal({p},{s})"),
            LogicalType::Boolean => "bit".to_string(),
            LogicalType::Date => "date".to_string(),
            LogicalType::DateTime => "datetime2".to_string(),
            LogicalType::Time => "time".to_string(),
            LogicalType::Timestamp => "datetimeoffset".to_string(),
            LogicalType::Geometry => "geometry".to_string(),
            LogicalType::Geography => "geography".to_string(),
            LogicalType::Point => "geometry".to_string(),
            LogicalType::Binary(n) => format!("varbinary({n})"),
            LogicalType::Enum(variants) => format!(
                "nvarchar(255) check (value in ({}))",
                variants
                    .iter()
                    .map(|v| format!("'{v}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            LogicalType::Json | LogicalType::Jsonb => "nvarchar(max)".to_string(),
            LogicalType::Uuid => "uniqueidentifier".to_string(),
        }
    }

    fn transform_error(&self, message: &str, code: Option<&str>) -> Error {
        match code {
            Some("2627") | Some("547") | Some("2601") => Error::Constraint(message.to_string()),
            Some("102") | Some("170") => Error::Syntax {
                message: message.to_string(),
                sql: None,
            },
            _ => Error::Connection(message.to_string()),
        }
    }
}
