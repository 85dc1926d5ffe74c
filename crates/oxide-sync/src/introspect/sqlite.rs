//! SQLite introspection via `sqlite_master` and the `pragma_*` table
//! functions.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::schema::{AbstractType, Column, DefaultValue, ForeignKey, Index, TableState};

use super::{parse_action, quoted_literals, Introspector};

static DECLARED_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$")
        .expect("valid declared type pattern")
});

static ENUM_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)CHECK\s*\(\s*["`\[]?(\w+)["`\]]?\s+IN\s*\(((?:[^)']|'(?:[^']|'')*')*)\)\s*\)"#)
        .expect("valid enum check pattern")
});

/// SQLite catalog reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntrospector;

impl SqliteIntrospector {
    /// Maps a declared column type to an abstract type.
    fn parse_type(table: &str, declared: &str) -> Result<AbstractType> {
        if declared.trim().is_empty() {
            return Ok(AbstractType::Binary);
        }
        let caps = DECLARED_TYPE
            .captures(declared)
            .ok_or_else(|| SyncError::introspection(table, format!("unparsable type '{declared}'")))?;
        let name = caps[1].to_ascii_uppercase();
        let size = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());

        let ty = match name.as_str() {
            "INTEGER" | "INT" | "MEDIUMINT" => AbstractType::Integer,
            "BOOLEAN" | "BOOL" => AbstractType::Boolean,
            "TINYINT" | "SMALLINT" => AbstractType::TinyInteger,
            "BIGINT" => AbstractType::BigInteger,
            "VARCHAR" | "CHAR" | "CHARACTER" | "VARYING CHARACTER" | "NVARCHAR" | "NCHAR" => {
                AbstractType::String(size(2).unwrap_or(255))
            }
            "TINYTEXT" => AbstractType::TinyText,
            "TEXT" | "CLOB" => AbstractType::Text,
            "MEDIUMTEXT" | "LONGTEXT" => AbstractType::LongText,
            "NUMERIC" | "DECIMAL" => AbstractType::Decimal {
                precision: size(2).and_then(|p| u8::try_from(p).ok()).unwrap_or(10),
                scale: size(3).and_then(|s| u8::try_from(s).ok()).unwrap_or(0),
            },
            "DOUBLE" | "DOUBLE PRECISION" | "REAL" => AbstractType::Double,
            "FLOAT" => AbstractType::Float,
            "DATETIME" => AbstractType::Datetime,
            "DATE" => AbstractType::Date,
            "TIME" => AbstractType::Time,
            "TIMESTAMP" => AbstractType::Timestamp,
            "BLOB" => AbstractType::Binary,
            "JSON" => AbstractType::Json,
            _ => {
                return Err(SyncError::introspection(
                    table,
                    format!("unsupported column type '{declared}'"),
                ))
            }
        };
        Ok(ty)
    }

    /// Enum values declared as `CHECK ("col" IN (...))`, by column.
    fn enum_checks(create_sql: &str) -> HashMap<String, Vec<String>> {
        ENUM_CHECK
            .captures_iter(create_sql)
            .map(|caps| (caps[1].to_string(), quoted_literals(&caps[2])))
            .filter(|(_, values)| !values.is_empty())
            .collect()
    }
}

impl Introspector for SqliteIntrospector {
    type Pool = SqlitePool;

    async fn introspect(&self, pool: &SqlitePool, table: &str) -> Result<TableState> {
        let mut state = TableState::new(table);
        let failed = |e: sqlx::Error| SyncError::introspection(table, e);

        let create: Option<(String,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(pool)
                .await
                .map_err(failed)?;
        let Some((create_sql,)) = create else {
            debug!(table, "Table does not exist");
            return Ok(state);
        };
        let checks = Self::enum_checks(&create_sql);

        let columns: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(failed)?;

        let mut primary_keys: Vec<(i64, String)> = columns
            .iter()
            .filter(|(_, _, _, _, pk)| *pk > 0)
            .map(|(name, _, _, _, pk)| (*pk, name.clone()))
            .collect();
        primary_keys.sort();
        state.primary_keys = primary_keys.into_iter().map(|(_, name)| name).collect();

        for (name, declared, notnull, default, _) in &columns {
            let mut ty = Self::parse_type(table, declared)?;
            if let Some(values) = checks.get(name) {
                ty = AbstractType::Enum(values.clone());
            }
            // A lone INTEGER primary key aliases the rowid.
            if ty == AbstractType::Integer && state.primary_keys == [name.clone()] {
                ty = AbstractType::Primary;
            }

            let mut column = Column::new(name.clone(), ty.clone());
            column.nullable(*notnull == 0 && !ty.is_auto_increment());
            if !ty.is_auto_increment() {
                column.default = default
                    .as_deref()
                    .and_then(|raw| DefaultValue::from_sql(raw, &ty));
            }
            state.register_column(column);
        }

        let indexes: Vec<(String, i64, String)> =
            sqlx::query_as("SELECT name, \"unique\", origin FROM pragma_index_list(?)")
                .bind(table)
                .fetch_all(pool)
                .await
                .map_err(failed)?;

        for (name, unique, origin) in indexes {
            // Primary keys and inline UNIQUE constraints get automatic indexes.
            if origin == "pk" || name.starts_with("sqlite_autoindex_") {
                continue;
            }
            let columns: Vec<(Option<String>,)> =
                sqlx::query_as("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                    .bind(&name)
                    .fetch_all(pool)
                    .await
                    .map_err(failed)?;
            let Some(columns) = columns.into_iter().map(|(c,)| c).collect::<Option<Vec<_>>>()
            else {
                warn!(table, index = %name, "Skipping expression index");
                continue;
            };
            let mut index = Index::new(name, columns);
            index.unique(unique != 0);
            state.register_index(index);
        }

        let rows: Vec<(i64, String, String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
             FROM pragma_foreign_key_list(?) ORDER BY id, seq",
        )
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(failed)?;

        let mut grouped: IndexMap<i64, Vec<_>> = IndexMap::new();
        for row in rows {
            grouped.entry(row.0).or_default().push(row);
        }
        for (_, parts) in grouped {
            let [(_, foreign_table, column, foreign_key, on_update, on_delete)] = parts.as_slice()
            else {
                warn!(table, "Skipping composite foreign key");
                continue;
            };
            let foreign_key = foreign_key.clone().unwrap_or_else(|| "id".to_string());
            let mut fk = ForeignKey::new(
                ForeignKey::generate_name(table, column),
                column.clone(),
                foreign_table.clone(),
                foreign_key,
            );
            fk.on_delete(parse_action(on_delete))
                .on_update(parse_action(on_update));
            state.register_foreign_key(fk);
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKeyAction;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_type() {
        let parse = |s| SqliteIntrospector::parse_type("t", s).unwrap();
        assert_eq!(parse("VARCHAR(64)"), AbstractType::String(64));
        assert_eq!(parse("numeric(8, 2)"), AbstractType::Decimal { precision: 8, scale: 2 });
        assert_eq!(parse("BOOLEAN"), AbstractType::Boolean);
        assert_eq!(parse("double precision"), AbstractType::Double);
        assert!(SqliteIntrospector::parse_type("t", "GEOMETRY").is_err());
    }

    #[tokio::test]
    async fn test_missing_table_is_empty() {
        let pool = pool().await;
        let state = SqliteIntrospector.introspect(&pool, "ghost").await.unwrap();
        assert!(state.is_empty());
        assert_eq!(state.name, "ghost");
    }

    #[tokio::test]
    async fn test_introspect_table() {
        let pool = pool().await;
        sqlx::query("CREATE TABLE users (id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE posts (
                id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title VARCHAR(200) NOT NULL DEFAULT 'untitled',
                status VARCHAR(9) DEFAULT 'draft' CHECK (\"status\" IN ('draft', 'published')),
                published BOOLEAN NOT NULL DEFAULT 0,
                CONSTRAINT posts_foreign_user_id FOREIGN KEY (user_id)
                    REFERENCES users (id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE UNIQUE INDEX posts_index_title ON posts (title)")
            .execute(&pool)
            .await
            .unwrap();

        let state = SqliteIntrospector.introspect(&pool, "posts").await.unwrap();
        assert_eq!(state.primary_keys, vec!["id"]);
        assert_eq!(state.columns["id"].abstract_type, AbstractType::Primary);
        assert!(!state.columns["user_id"].nullable);
        assert_eq!(
            state.columns["title"].default,
            Some(DefaultValue::String("untitled".into()))
        );
        assert_eq!(
            state.columns["status"].abstract_type,
            AbstractType::Enum(vec!["draft".into(), "published".into()])
        );
        assert_eq!(
            state.columns["published"].default,
            Some(DefaultValue::Bool(false))
        );

        let index = &state.indexes["posts_index_title"];
        assert!(index.unique);
        assert_eq!(index.columns, vec!["title"]);

        let fk = state.foreign_key("user_id").unwrap();
        assert_eq!(fk.foreign_table, "users");
        assert_eq!(fk.foreign_key, "id");
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
        assert_eq!(fk.on_update, ForeignKeyAction::NoAction);
    }
}
