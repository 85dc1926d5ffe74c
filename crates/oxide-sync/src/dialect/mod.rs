//! Database dialect implementations.
//!
//! Each dialect knows how to map abstract column types to concrete ones,
//! how to compare columns, and how to generate SQL for schema operations.

mod mysql;
mod postgres;
mod sqlite;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use mysql::MySqlHandler;
pub use postgres::PostgresHandler;
pub use sqlite::SqliteHandler;

use crate::comparator::TableDiff;
use crate::error::{Result, SyncError};
use crate::operation::Operation;
use crate::schema::{Column, DefaultValue, ForeignKey, Index, TableState};

static SQLITE: SqliteHandler = SqliteHandler;
static POSTGRES: PostgresHandler = PostgresHandler;
static MYSQL: MySqlHandler = MySqlHandler;

/// Supported database systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite 3.35+.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL and MariaDB.
    #[serde(rename = "mysql")]
    MySql,
}

impl Dialect {
    /// Selects the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            _ => Err(SyncError::UnsupportedUrl(url.to_string())),
        }
    }

    /// Returns the dialect name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.handler().name()
    }

    /// Returns the DDL handler for this dialect.
    #[must_use]
    pub fn handler(self) -> &'static dyn Handler {
        match self {
            Self::Sqlite => &SQLITE,
            Self::Postgres => &POSTGRES,
            Self::MySql => &MYSQL,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the error returned for operations a dialect cannot express.
pub(crate) fn unsupported(dialect: &'static str, operation: &Operation) -> SyncError {
    SyncError::UnsupportedOperation {
        operation: operation.describe(),
        dialect,
    }
}

/// Trait for database-specific schema handling.
///
/// The provided methods assemble ANSI-style DDL; dialects override the
/// fragments that differ.
pub trait Handler: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the concrete SQL type of a column.
    fn column_type(&self, column: &Column) -> String;

    /// Generates SQL to alter a column (type, nullability, default, name).
    fn alter_column(&self, table: &str, from: &Column, to: &Column) -> Result<Vec<String>>;

    /// Generates SQL to drop a foreign key constraint.
    fn drop_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<Vec<String>>;

    /// Generates SQL to replace the primary key. `constraint` names the
    /// existing primary key constraint when it is known.
    fn alter_primary_keys(
        &self,
        table: &str,
        constraint: Option<&str>,
        from: &[String],
        to: &[String],
    ) -> Result<Vec<String>>;

    /// Name of the index the database creates on its own when `foreign_key`
    /// is added to `table`, if it creates one.
    fn implicit_foreign_key_index(
        &self,
        _table: &TableState,
        _foreign_key: &ForeignKey,
    ) -> Option<String> {
        None
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes and joins a column list.
    fn quote_columns(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders a default value.
    fn render_default(&self, value: &DefaultValue, _column: &Column) -> String {
        value.to_sql()
    }

    /// Column constraint appended after the default (auto increment,
    /// enum checks...).
    fn column_suffix(&self, _table: &str, _column: &Column) -> Option<String> {
        None
    }

    /// Generates column definition SQL.
    fn column_definition(&self, table: &str, column: &Column) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.column_type(column),
        ];

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &column.default {
            if !column.abstract_type.is_auto_increment() {
                parts.push(format!("DEFAULT {}", self.render_default(default, column)));
            }
        }

        if let Some(suffix) = self.column_suffix(table, column) {
            parts.push(suffix);
        }

        parts.join(" ")
    }

    /// Table-level primary key clause, if one is needed.
    fn primary_key_clause(&self, table: &TableState) -> Option<String> {
        (!table.primary_keys.is_empty())
            .then(|| format!("PRIMARY KEY ({})", self.quote_columns(&table.primary_keys)))
    }

    /// Foreign key constraint clause, as used in CREATE and ALTER TABLE.
    fn foreign_key_clause(&self, foreign_key: &ForeignKey) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(&foreign_key.name),
            self.quote_identifier(&foreign_key.column),
            self.quote_identifier(&foreign_key.foreign_table),
            self.quote_identifier(&foreign_key.foreign_key),
            foreign_key.on_delete.to_sql(),
            foreign_key.on_update.to_sql()
        )
    }

    /// Trailing table options (storage engine...).
    fn table_options(&self, _engine: Option<&str>) -> Option<String> {
        None
    }

    /// Generates SQL for creating a table.
    fn create_table(
        &self,
        table: &TableState,
        engine: Option<&str>,
        include_foreign_keys: bool,
    ) -> String {
        let mut definitions: Vec<String> = table
            .columns
            .values()
            .map(|c| self.column_definition(&table.name, c))
            .collect();

        if let Some(pk) = self.primary_key_clause(table) {
            definitions.push(pk);
        }

        if include_foreign_keys {
            definitions.extend(
                table
                    .foreign_keys
                    .values()
                    .map(|fk| self.foreign_key_clause(fk)),
            );
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            definitions.join(",\n  ")
        );
        if let Some(options) = self.table_options(engine) {
            sql.push(' ');
            sql.push_str(&options);
        }
        sql
    }

    /// Generates SQL for dropping a table.
    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    /// Generates SQL for adding a column.
    fn add_column(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(table, column)
        )
    }

    /// Generates SQL for dropping a column.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for creating an index.
    fn create_index(&self, table: &str, index: &Index) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            self.quote_columns(&index.columns)
        )
    }

    /// Generates SQL for dropping an index.
    fn drop_index(&self, _table: &str, index: &Index) -> String {
        format!("DROP INDEX {}", self.quote_identifier(&index.name))
    }

    /// Generates SQL for renaming an index, if the dialect can.
    fn rename_index(&self, _table: &str, _from: &str, _to: &str) -> Option<String> {
        None
    }

    /// Generates SQL for altering an index.
    ///
    /// A pure rename uses [`Handler::rename_index`] when available,
    /// anything else drops and recreates the index. Columns are matched by
    /// position, since a column renamed in the same run keeps its indexes.
    fn alter_index(&self, table: &str, from: &Index, to: &Index) -> Vec<String> {
        if from.columns.len() == to.columns.len() && from.unique == to.unique {
            if let Some(sql) = self.rename_index(table, &from.name, &to.name) {
                return vec![sql];
            }
        }
        vec![self.drop_index(table, from), self.create_index(table, to)]
    }

    /// Generates SQL for adding a foreign key constraint.
    fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.foreign_key_clause(foreign_key)
        )])
    }

    /// Generates SQL to recreate a table under a new structure.
    fn rebuild_table(&self, from: &TableState, to: &TableState) -> Result<Vec<String>> {
        Err(unsupported(
            self.name(),
            &Operation::RebuildTable {
                from: from.clone(),
                to: to.clone(),
            },
        ))
    }

    /// Returns true if foreign keys are part of the table definition
    /// instead of separate constraints.
    fn inline_foreign_keys(&self) -> bool {
        false
    }

    /// Returns true if the diff can only be applied by rebuilding the table.
    fn requires_rebuild(&self, _diff: &TableDiff) -> bool {
        false
    }

    /// Compares an introspected column with a declared one.
    ///
    /// Columns are equal when their names, concrete types, enum values,
    /// nullability and defaults match. Cosmetic default differences
    /// (quoting, `0` vs `false`, `NULL` vs no default) are ignored.
    fn columns_equal(&self, a: &Column, b: &Column) -> bool {
        a.name == b.name
            && self.column_type(a) == self.column_type(b)
            && a.abstract_type.enum_values() == b.abstract_type.enum_values()
            && a.nullable == b.nullable
            && (a.abstract_type.is_auto_increment()
                || DefaultValue::equivalent(a.default.as_ref(), b.default.as_ref()))
    }

    /// Generates SQL for an operation.
    fn generate_sql(&self, operation: &Operation) -> Result<Vec<String>> {
        Ok(match operation {
            Operation::CreateTable {
                table,
                engine,
                include_foreign_keys,
            } => vec![self.create_table(table, engine.as_deref(), *include_foreign_keys)],

            Operation::DropTable { table } => vec![self.drop_table(table)],

            Operation::AddColumn { table, column } => vec![self.add_column(table, column)],

            Operation::AlterColumn { table, from, to } => self.alter_column(table, from, to)?,

            Operation::DropColumn { table, column } => vec![self.drop_column(table, column)],

            Operation::AddIndex { table, index } => vec![self.create_index(table, index)],

            Operation::AlterIndex { table, from, to } => self.alter_index(table, from, to),

            Operation::DropIndex { table, index } => vec![self.drop_index(table, index)],

            Operation::AddForeignKey { table, foreign_key } => {
                self.add_foreign_key(table, foreign_key)?
            }

            Operation::DropForeignKey { table, foreign_key } => {
                self.drop_foreign_key(table, foreign_key)?
            }

            Operation::AlterPrimaryKeys {
                table,
                constraint,
                from,
                to,
            } => self.alter_primary_keys(table, constraint.as_deref(), from, to)?,

            Operation::RebuildTable { from, to } => self.rebuild_table(from, to)?,
        })
    }
}
