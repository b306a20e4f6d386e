//! Column identifiers (`Ref`) carrying an optional schema, table, column, and alias.

/// A column reference. The compiler quotes each non-empty segment independently
/// (invariant 3 in spec §3: a dotted reference `a.b.c` becomes three independently
/// quoted segments).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ref {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: String,
    pub alias: Option<String>,
}

impl Ref {
    pub fn new(column: impl Into<String>) -> Self {
        Ref {
            schema: None,
            table: None,
            column: column.into(),
            alias: None,
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Ref {
            schema: None,
            table: Some(table.into()),
            column: column.into(),
            alias: None,
        }
    }

    /// Parses a dotted identifier (`col`, `table.col`, or `schema.table.col`) into a
    /// `Ref`. Does not itself quote anything — quoting happens at compile time.
    pub fn parse(expr: &str) -> Self {
        let parts: Vec<&str> = expr.split('.').collect();
        match parts.as_slice() {
            [column] => Ref::new(*column),
            [table, column] => Ref::qualified(*table, *column),
            [schema, table, column] => Ref {
                schema: Some((*schema).to_string()),
                table: Some((*table).to_string()),
                column: (*column).to_string(),
                alias: None,
            },
            _ => Ref::new(expr),
        }
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }
}

impl From<&str> for Ref {
    fn from(s: &str) -> Self {
        Ref::parse(s)
    }
}

impl From<String> for Ref {
    fn from(s: String) -> Self {
        Ref::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_column() {
        let r = Ref::parse("name");
        assert_eq!(r.schema, None);
        assert_eq!(r.table, None);
        assert_eq!(r.column, "name");
    }

    #[test]
    fn parses_table_qualified_column() {
        let r = Ref::parse("users.id");
        assert_eq!(r.schema, None);
        assert_eq!(r.table.as_deref(), Some("users"));
        assert_eq!(r.column, "id");
    }

    #[test]
    fn parses_schema_qualified_column() {
        let r = Ref::parse("public.users.id");
        assert_eq!(r.schema.as_deref(), Some("public"));
        assert_eq!(r.table.as_deref(), Some("users"));
        assert_eq!(r.column, "id");
    }

    #[test]
    fn wildcard_is_detected() {
        assert!(Ref::parse("*").is_wildcard());
        assert!(!Ref::parse("id").is_wildcard());
    }

    #[test]
    fn aliasing_sets_alias_without_touching_column() {
        let r = Ref::parse("users.id").aliased("user_id");
        assert_eq!(r.column, "id");
        assert_eq!(r.alias.as_deref(), Some("user_id"));
    }
}
