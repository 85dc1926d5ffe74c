//! JSON configuration.
//!
//! A configuration names the databases to connect to and declares the
//! complete desired structure of each table:
//!
//! ```json
//! {
//!   "databases": { "default": { "url": "sqlite://app.db" } },
//!   "tables": [{
//!     "name": "users",
//!     "columns": [
//!       { "name": "id", "type": "primary" },
//!       { "name": "email", "type": "string(255)", "nullable": false }
//!     ],
//!     "indexes": [{ "columns": ["email"], "unique": true }]
//!   }]
//! }
//! ```
//!
//! Columns, indexes and foreign keys that a declaration does not list are
//! dropped.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::database::DatabaseManager;
use crate::error::{Result, SyncError};
use crate::schema::{AbstractType, DefaultValue, ForeignKeyAction, Table};

/// Name of the database tables belong to when they do not say otherwise.
pub const DEFAULT_DATABASE: &str = "default";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Databases by name.
    #[serde(default)]
    pub databases: IndexMap<String, DatabaseConfig>,
    /// Declared tables.
    #[serde(default)]
    pub tables: Vec<TableDeclaration>,
}

/// Connection settings of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; its scheme selects the dialect.
    pub url: String,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_max_connections() -> u32 {
    5
}

impl DatabaseConfig {
    /// Settings for a URL with the default pool size.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
        }
    }
}

impl SyncConfig {
    /// Reads a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| SyncError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parses a configuration document.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sets (or replaces) the URL of a database.
    pub fn set_database(&mut self, name: impl Into<String>, url: impl Into<String>) -> &mut Self {
        self.databases.insert(name.into(), DatabaseConfig::new(url));
        self
    }

    /// Introspects every declared table and applies its declaration.
    pub async fn declare_tables(&self, manager: &DatabaseManager) -> Result<Vec<Table>> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for declaration in &self.tables {
            tables.push(declaration.declare(manager).await?);
        }
        Ok(tables)
    }
}

/// Desired structure of one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDeclaration {
    /// Table name.
    pub name: String,
    /// Owning database.
    #[serde(default = "default_database")]
    pub database: String,
    /// Passive tables are never altered.
    #[serde(default)]
    pub passive: bool,
    /// Storage engine used on creation (MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Drop the table.
    #[serde(default)]
    pub drop: bool,
    /// Column renames, old name to new name.
    #[serde(default)]
    pub renames: IndexMap<String, String>,
    /// Columns, in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnDeclaration>,
    /// Primary key columns. Defaults to the auto-increment column.
    #[serde(default)]
    pub primary_keys: Vec<String>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDeclaration>,
    /// Foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDeclaration>,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

/// A declared column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDeclaration {
    /// Column name.
    pub name: String,
    /// Abstract type in textual form (`string(255)`, `decimal(10,2)`...).
    #[serde(rename = "type")]
    pub column_type: AbstractType,
    /// Whether NULL is allowed.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value: a JSON scalar, `"CURRENT_TIMESTAMP"`, or
    /// `{"expression": "..."}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

const fn default_nullable() -> bool {
    true
}

/// A declared index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDeclaration {
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Uniqueness.
    #[serde(default)]
    pub unique: bool,
    /// Explicit name. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A declared foreign key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyDeclaration {
    /// Owning column.
    pub column: String,
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    #[serde(default = "default_key")]
    pub key: String,
    /// ON DELETE rule.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// ON UPDATE rule.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

fn default_key() -> String {
    "id".to_string()
}

impl ColumnDeclaration {
    fn default_value(&self, table: &str) -> Result<Option<DefaultValue>> {
        let Some(value) = &self.default else {
            return Ok(None);
        };
        let invalid = || {
            SyncError::invalid_schema(
                table,
                format!("invalid default for column '{}': {value}", self.name),
            )
        };
        let parsed = match value {
            Value::Null => DefaultValue::Null,
            Value::Bool(b) => DefaultValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DefaultValue::Integer(i),
                None => DefaultValue::Float(n.as_f64().ok_or_else(invalid)?),
            },
            Value::String(s) if s.eq_ignore_ascii_case("CURRENT_TIMESTAMP") => {
                DefaultValue::CurrentTimestamp
            }
            Value::String(s) => DefaultValue::String(s.clone()),
            Value::Object(_) => {
                serde_json::from_value(value.clone()).map_err(|_| invalid())?
            }
            Value::Array(_) => return Err(invalid()),
        };
        Ok(Some(parsed))
    }
}

impl TableDeclaration {
    /// Introspects the table and applies the declaration to it.
    pub async fn declare(&self, manager: &DatabaseManager) -> Result<Table> {
        let mut table = manager.table(&self.database, &self.name).await?;
        self.apply(&mut table)?;
        Ok(table)
    }

    /// Reshapes a table's declared state to match this declaration.
    pub fn apply(&self, table: &mut Table) -> Result<()> {
        table.set_passive(self.passive);
        if let Some(engine) = &self.engine {
            table.set_engine(engine.clone());
        }
        if self.drop {
            table.declare_dropped();
            return Ok(());
        }

        for (from, to) in &self.renames {
            if table.current().has_column(from) {
                table.rename_column(from, to)?;
            } else {
                debug!(table = %self.name, from = %from, to = %to, "Rename already applied");
            }
        }

        let undeclared: Vec<String> = table
            .current()
            .columns
            .keys()
            .filter(|name| !self.columns.iter().any(|c| &c.name == *name))
            .cloned()
            .collect();
        for name in &undeclared {
            table.drop_column(name);
        }
        for declaration in &self.columns {
            let default = declaration.default_value(&self.name)?;
            let column = table.column(&declaration.name, declaration.column_type.clone());
            column.nullable(declaration.nullable);
            match default {
                Some(value) => column.default_value(value),
                None => column.drop_default(),
            };
        }

        let primary_keys = if self.primary_keys.is_empty() {
            self.columns
                .iter()
                .filter(|c| c.column_type.is_auto_increment())
                .map(|c| c.name.clone())
                .collect()
        } else {
            self.primary_keys.clone()
        };
        table.set_primary_keys(primary_keys);

        let stale: Vec<Vec<String>> = table
            .current()
            .indexes
            .values()
            .filter(|index| !self.indexes.iter().any(|d| index.covers(d.columns.as_slice())))
            .map(|index| index.columns.clone())
            .collect();
        for columns in &stale {
            table.drop_index(columns.as_slice());
        }
        for declaration in &self.indexes {
            let index = table.index(declaration.columns.as_slice());
            index.unique(declaration.unique);
            let current = index.name.clone();
            if let Some(name) = &declaration.name {
                table.rename_index(&current, name)?;
            }
        }

        let stale: Vec<String> = table
            .current()
            .foreign_keys
            .keys()
            .filter(|column| !self.foreign_keys.iter().any(|d| &d.column == *column))
            .cloned()
            .collect();
        for column in &stale {
            table.drop_foreign_key(column);
        }
        for declaration in &self.foreign_keys {
            table
                .foreign_key(&declaration.column, &declaration.table, &declaration.key)
                .on_delete(declaration.on_delete)
                .on_update(declaration.on_update);
        }

        Ok(())
    }
}
