//! Catalog introspection.
//!
//! Each introspector reads one table's structure from a live database and
//! returns it as a [`TableState`]. A missing table yields an empty state.

mod mysql;
mod postgres;
mod sqlite;

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

pub use mysql::MySqlIntrospector;
pub use postgres::PostgresIntrospector;
pub use sqlite::SqliteIntrospector;

use crate::error::Result;
use crate::schema::{ForeignKeyAction, TableState};

/// Reads table structure from a database catalog.
#[allow(async_fn_in_trait)]
pub trait Introspector {
    /// Connection pool type of the dialect.
    type Pool;

    /// Introspects one table.
    async fn introspect(&self, pool: &Self::Pool, table: &str) -> Result<TableState>;
}

static QUOTED_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'((?:[^']|'')*)'").expect("valid literal pattern"));

/// Extracts every single-quoted literal from a SQL fragment, in order.
pub(crate) fn quoted_literals(sql: &str) -> Vec<String> {
    QUOTED_LITERAL
        .captures_iter(sql)
        .map(|caps| caps[1].replace("''", "'"))
        .collect()
}

/// Parses a referential action, falling back to `NO ACTION`.
pub(crate) fn parse_action(rule: &str) -> ForeignKeyAction {
    ForeignKeyAction::from_sql(rule).unwrap_or_else(|| {
        warn!(rule, "Unknown referential action, assuming NO ACTION");
        ForeignKeyAction::NoAction
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_literals() {
        assert_eq!(
            quoted_literals("CHECK (\"status\" IN ('draft', 'it''s'))"),
            vec!["draft".to_string(), "it's".to_string()]
        );
        assert_eq!(
            quoted_literals(
                "CHECK (((status)::text = ANY ((ARRAY['a'::character varying, 'b'::character varying])::text[])))"
            ),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(quoted_literals("CHECK (x > 0)").is_empty());
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("CASCADE"), ForeignKeyAction::Cascade);
        assert_eq!(parse_action("weird"), ForeignKeyAction::NoAction);
    }
}
