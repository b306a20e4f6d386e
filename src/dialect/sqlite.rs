use super::{Dialect, Features, LogicalType, PlaceholderStyle};
use crate::error::Error;

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, segment: &str) -> String {
        format!("\"{}\"", segment.replace('"', "\"\""))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Positional
    }

    fn features(&self) -> Features {
        Features {
            supports_returning: true,
            supports_cte: true,
            supports_recursive_cte: true,
            supports_materialized_cte: false,
            supports_json_path: true,
            supports_on_conflict: true,
            supports_update_from: true,
            supports_for_update_of_tables: false,
            supports_skip_locked: false,
            supports_distinct_on: false,
            supports_ilike: false,
            supports_boolean: false,
            inserts_undefined_as_null: true,
            supports_multi_column_count_distinct: true,
        }
    }

    fn column_type_sql(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Increments | LogicalType::BigIncrements => {
                "integer primary key autoincrement".to_string()
            }
            LogicalType::Integer
            | LogicalType::TinyInt
            | LogicalType::SmallInt
            | LogicalType::MediumInt
            | LogicalType::BigInteger => "integer".to_string(),
            LogicalType::Text => "text".to_string(),
            LogicalType::Varchar(n) => format!("varchar({n})"),
            LogicalType::Float | LogicalType::Double => "real".to_string(),
            LogicalType::Decimal(_, _) => "numeric".to_string(),
            LogicalType::Boolean => "boolean".to_string(),
            LogicalType::Date | LogicalType::DateTime | LogicalType::Timestamp => {
                "datetime".to_string()
            }
            LogicalType::Time => "time".to_string(),
            LogicalType::Geometry | LogicalType::Geography | LogicalType::Point => {
                "blob".to_string()
            }
            LogicalType::Binary(_) => "blob".to_string(),
            LogicalType::Enum(variants) => format!(
                "text check (value in ({}))",
                variants
                    .iter()
                    .map(|v| format!("'{v}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            LogicalType::Json | LogicalType::Jsonb => "text".to_string(),
            LogicalType::Uuid => "text".to_string(),
        }
    }

    fn transform_error(&self, message: &str, code: Option<&str>) -> Error {
        let lower = message.to_ascii_lowercase();
        if lower.contains("unique") || lower.contains("constraint failed") || lower.contains("foreign key") {
            Error::Constraint(message.to_string())
        } else if lower.contains("syntax error") {
            Error::Syntax {
                message: message.to_string(),
                sql: None,
            }
        } else if code == Some("interrupted") {
            Error::Cancellation
        } else {
            Error::Connection(message.to_string())
        }
    }
}
