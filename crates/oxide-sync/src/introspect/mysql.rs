//! MySQL / MariaDB introspection via `information_schema`.
//!
//! Catalog columns are cast to `CHAR` / `SIGNED` so both servers decode
//! the same way.

use indexmap::IndexMap;
use sqlx::mysql::MySqlPool;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::schema::{AbstractType, Column, DefaultValue, ForeignKey, Index, TableState};

use super::{parse_action, quoted_literals, Introspector};

const TABLE: &str = "SELECT CAST(ENGINE AS CHAR) FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";

const COLUMNS: &str = "SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR), \
     CAST(COLUMN_TYPE AS CHAR), CAST(IS_NULLABLE AS CHAR), CAST(COLUMN_DEFAULT AS CHAR), \
     CAST(EXTRA AS CHAR), CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED), \
     CAST(NUMERIC_PRECISION AS SIGNED), CAST(NUMERIC_SCALE AS SIGNED) \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

const INDEXES: &str = "SELECT CAST(INDEX_NAME AS CHAR), CAST(NON_UNIQUE AS SIGNED), \
     CAST(COLUMN_NAME AS CHAR) \
     FROM information_schema.STATISTICS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY INDEX_NAME, SEQ_IN_INDEX";

const FOREIGN_KEYS: &str = "SELECT CAST(k.CONSTRAINT_NAME AS CHAR), CAST(k.COLUMN_NAME AS CHAR), \
     CAST(k.REFERENCED_TABLE_NAME AS CHAR), CAST(k.REFERENCED_COLUMN_NAME AS CHAR), \
     CAST(r.DELETE_RULE AS CHAR), CAST(r.UPDATE_RULE AS CHAR) \
     FROM information_schema.KEY_COLUMN_USAGE k \
     JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
       ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA \
      AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
      AND r.TABLE_NAME = k.TABLE_NAME \
     WHERE k.TABLE_SCHEMA = DATABASE() AND k.TABLE_NAME = ? \
       AND k.REFERENCED_TABLE_NAME IS NOT NULL \
     ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION";

type ColumnRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<i64>,
    Option<i64>,
    Option<i64>,
);

type ForeignKeyRow = (String, String, String, String, String, String);

/// MySQL catalog reader (tables of the connection's default database).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlIntrospector;

impl MySqlIntrospector {
    fn parse_type(table: &str, row: &ColumnRow) -> Result<AbstractType> {
        let (name, data_type, column_type, _, _, extra, length, precision, scale) = row;
        let auto_increment = extra.to_ascii_lowercase().contains("auto_increment");
        let small = |value: &Option<i64>, fallback: u8| {
            value.and_then(|v| u8::try_from(v).ok()).unwrap_or(fallback)
        };

        let ty = match data_type.to_ascii_lowercase().as_str() {
            "int" | "integer" | "mediumint" if auto_increment => AbstractType::Primary,
            "bigint" if auto_increment => AbstractType::BigPrimary,
            "int" | "integer" | "mediumint" => AbstractType::Integer,
            "bigint" => AbstractType::BigInteger,
            "tinyint" if column_type.to_ascii_lowercase().starts_with("tinyint(1)") => {
                AbstractType::Boolean
            }
            "tinyint" | "smallint" => AbstractType::TinyInteger,
            "bit" | "bool" | "boolean" => AbstractType::Boolean,
            "varchar" | "char" => {
                AbstractType::String(length.and_then(|l| u32::try_from(l).ok()).unwrap_or(255))
            }
            "tinytext" => AbstractType::TinyText,
            "text" => AbstractType::Text,
            "mediumtext" | "longtext" => AbstractType::LongText,
            "decimal" | "numeric" => AbstractType::Decimal {
                precision: small(precision, 10),
                scale: small(scale, 0),
            },
            "double" | "real" => AbstractType::Double,
            "float" => AbstractType::Float,
            "datetime" => AbstractType::Datetime,
            "date" => AbstractType::Date,
            "time" => AbstractType::Time,
            "timestamp" => AbstractType::Timestamp,
            "tinyblob" => AbstractType::TinyBinary,
            "blob" | "mediumblob" | "binary" | "varbinary" => AbstractType::Binary,
            "longblob" => AbstractType::LongBinary,
            "json" => AbstractType::Json,
            "enum" => {
                let values = quoted_literals(column_type);
                if values.is_empty() {
                    return Err(SyncError::introspection(
                        table,
                        format!("enum column '{name}' has no values"),
                    ));
                }
                AbstractType::Enum(values)
            }
            other => {
                return Err(SyncError::introspection(
                    table,
                    format!("unsupported type '{other}' for column '{name}'"),
                ))
            }
        };
        Ok(ty)
    }
}

impl Introspector for MySqlIntrospector {
    type Pool = MySqlPool;

    async fn introspect(&self, pool: &MySqlPool, table: &str) -> Result<TableState> {
        let mut state = TableState::new(table);
        let failed = |e: sqlx::Error| SyncError::introspection(table, e);

        let engine: Option<(Option<String>,)> = sqlx::query_as(TABLE)
            .bind(table)
            .fetch_optional(pool)
            .await
            .map_err(failed)?;
        let Some((engine,)) = engine else {
            debug!(table, "Table does not exist");
            return Ok(state);
        };
        state.engine = engine;

        let columns: Vec<ColumnRow> = sqlx::query_as(COLUMNS)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(failed)?;
        for row in &columns {
            let ty = Self::parse_type(table, row)?;
            let (name, _, _, nullable, default, ..) = row;
            let mut column = Column::new(name.clone(), ty.clone());
            column.nullable(nullable == "YES");
            if !ty.is_auto_increment() {
                column.default = default
                    .as_deref()
                    .and_then(|raw| DefaultValue::from_sql(raw, &ty));
            }
            state.register_column(column);
        }

        let fk_rows: Vec<ForeignKeyRow> = sqlx::query_as(FOREIGN_KEYS)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(failed)?;
        let mut constraints: IndexMap<String, Vec<ForeignKeyRow>> = IndexMap::new();
        for row in fk_rows {
            constraints.entry(row.0.clone()).or_default().push(row);
        }
        for (name, parts) in &constraints {
            let [(_, column, foreign_table, foreign_key, on_delete, on_update)] = parts.as_slice()
            else {
                warn!(table, constraint = %name, "Skipping composite foreign key");
                continue;
            };
            let mut fk = ForeignKey::new(
                name.clone(),
                column.clone(),
                foreign_table.clone(),
                foreign_key.clone(),
            );
            fk.on_delete(parse_action(on_delete))
                .on_update(parse_action(on_update));
            state.register_foreign_key(fk);
        }

        let index_rows: Vec<(String, i64, Option<String>)> = sqlx::query_as(INDEXES)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(failed)?;
        let mut indexes: IndexMap<String, Option<Index>> = IndexMap::new();
        for (name, non_unique, column) in index_rows {
            let entry = indexes.entry(name.clone()).or_insert_with(|| {
                let mut index = Index::new(name.clone(), Vec::new());
                index.unique(non_unique == 0);
                Some(index)
            });
            match column {
                Some(column) => {
                    if let Some(index) = entry {
                        index.columns.push(column);
                    }
                }
                None => {
                    warn!(table, index = %name, "Skipping functional index");
                    *entry = None;
                }
            }
        }
        for (name, index) in indexes {
            let Some(index) = index else { continue };
            if name == "PRIMARY" {
                state.primary_keys = index.columns;
                continue;
            }
            // MySQL creates an index named after each foreign key constraint.
            if constraints.contains_key(&name) {
                if let Some(fk) = state.foreign_keys.values_mut().find(|fk| fk.name == name) {
                    fk.backing_index = Some(name);
                }
                continue;
            }
            state.register_index(index);
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(data_type: &str, column_type: &str, extra: &str) -> ColumnRow {
        (
            "c".to_string(),
            data_type.to_string(),
            column_type.to_string(),
            "NO".to_string(),
            None,
            extra.to_string(),
            Some(64),
            Some(8),
            Some(2),
        )
    }

    #[test]
    fn test_parse_type() {
        let parse = |data_type, column_type, extra| {
            MySqlIntrospector::parse_type("t", &row(data_type, column_type, extra)).unwrap()
        };
        assert_eq!(parse("int", "int", "auto_increment"), AbstractType::Primary);
        assert_eq!(parse("bigint", "bigint", ""), AbstractType::BigInteger);
        assert_eq!(parse("tinyint", "tinyint(1)", ""), AbstractType::Boolean);
        assert_eq!(parse("tinyint", "tinyint(4)", ""), AbstractType::TinyInteger);
        assert_eq!(parse("varchar", "varchar(64)", ""), AbstractType::String(64));
        assert_eq!(
            parse("decimal", "decimal(8,2)", ""),
            AbstractType::Decimal { precision: 8, scale: 2 }
        );
        assert_eq!(
            parse("enum", "enum('draft','it''s')", ""),
            AbstractType::Enum(vec!["draft".into(), "it's".into()])
        );
    }
}
