use super::{Dialect, Features, LogicalType, PlaceholderStyle};
use crate::error::Error;

pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, segment: &str) -> String {
        format!("`{}`", segment.replace('`', "``"))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Positional
    }

    fn features(&self) -> Features {
        Features {
            supports_returning: false,
            supports_cte: true,
            supports_recursive_cte: true,
            supports_materialized_cte: false,
            supports_json_path: true,
            supports_on_conflict: true,
            supports_update_from: false,
            supports_for_update_of_tables: false,
            supports_skip_locked: true,
            supports_distinct_on: false,
            supports_ilike: false,
            supports_boolean: false,
            inserts_undefined_as_null: false,
            supports_multi_column_count_distinct: false,
        }
    }

    fn column_type_sql(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Increments => "int unsigned auto_increment primary key".to_string(),
            LogicalType::BigIncrements => "bigint unsigned auto_increment primary key".to_string(),
            LogicalType::Integer => "int".to_string(),
            LogicalType::TinyInt => "tinyint".to_string(),
            LogicalType::SmallInt => "smallint".to_string(),
            LogicalType::MediumInt => "mediumint".to_string(),
            LogicalType::BigInteger => "bigint".to_string(),
            LogicalType::Text => "text".to_string(),
            LogicalType::Varchar(n) => format!("varchar({n})"),
            LogicalType::Float => "float".to_string(),
            LogicalType::Double => "double".to_string(),
            LogicalType::Decimal(p, s) => format!("decimal({p},{s})"),
            LogicalType::Boolean => "tinyint(1)".to_string(),
            LogicalType::Date => "date".to_string(),
            LogicalType::DateTime => "datetime".to_string(),
            LogicalType::Time => "time".to_string(),
            LogicalType::Timestamp => "timestamp".to_string(),
            LogicalType::Geometry => "geometry".to_string(),
            LogicalType::Geography => "geometry".to_string(),
            LogicalType::Point => "point".to_string(),
            LogicalType::Binary(n) => format!("varbinary({n})"),
            LogicalType::Enum(variants) => {
                format!("enum({})", variants.iter().map(|v| format!("'{v}'")).collect::<Vec<_>>().join(", "))
            }
            LogicalType::Json | LogicalType::Jsonb => "json".to_string(),
            LogicalType::Uuid => "char(36)".to_string(),
        }
    }

    fn transform_error(&self, message: &str, code: Option<&str>) -> Error {
        match code {
            Some("1048") | Some("1062") | Some("1451") | Some("1452") | Some("3819") => {
                Error::Constraint(message.to_string())
            }
            Some("1064") => Error::Syntax {
                message: message.to_string(),
                sql: None,
            },
            Some("1317") => Error::Cancellation,
            _ => Error::Connection(message.to_string()),
        }
    }
}
