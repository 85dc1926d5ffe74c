//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support. Apart from plain column renames,
//! column alterations, foreign key changes and primary key changes use
//! table recreation: the new structure is created as a shadow table, rows
//! are copied over, then the shadow table replaces the old one and the
//! indexes are recreated.

use std::collections::HashSet;

use crate::comparator::TableDiff;
use crate::error::Result;
use crate::operation::Operation;
use crate::schema::{quote_literal, AbstractType, Column, DefaultValue, ForeignKey, TableState};

use super::{unsupported, Handler};

/// Suffix of the shadow table used while rebuilding.
const SHADOW_SUFFIX: &str = "__sync_tmp";

/// SQLite schema handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteHandler;

impl SqliteHandler {
    /// Pairs each declared column with the introspected column it is
    /// copied from. Columns without a source are left out of the copy.
    fn copy_mapping<'a>(from: &'a TableState, to: &'a TableState) -> Vec<(&'a str, &'a str)> {
        let claimed: HashSet<&str> = to.columns.values().filter_map(Column::initial_name).collect();
        to.columns
            .values()
            .filter_map(|column| {
                let source = column.initial_name().or_else(|| {
                    (!claimed.contains(column.name.as_str())).then_some(column.name.as_str())
                })?;
                from.column(source)
                    .map(|old| (column.name.as_str(), old.name.as_str()))
            })
            .collect()
    }

    /// Returns true if `to` only differs from `from` by its name.
    fn is_rename(&self, from: &Column, to: &Column) -> bool {
        let mut renamed = from.clone();
        renamed.name.clone_from(&to.name);
        from.name != to.name && self.columns_equal(&renamed, to)
    }
}

impl Handler for SqliteHandler {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    // Declared types are chosen so introspection maps them back to the
    // same abstract type.
    fn column_type(&self, column: &Column) -> String {
        match &column.abstract_type {
            AbstractType::Primary | AbstractType::BigPrimary | AbstractType::Integer => {
                "INTEGER".to_string()
            }
            AbstractType::Boolean => "BOOLEAN".to_string(),
            AbstractType::TinyInteger => "TINYINT".to_string(),
            AbstractType::BigInteger => "BIGINT".to_string(),
            AbstractType::String(size) => format!("VARCHAR({size})"),
            AbstractType::TinyText | AbstractType::Text | AbstractType::LongText => {
                "TEXT".to_string()
            }
            AbstractType::Decimal { precision, scale } => format!("NUMERIC({precision},{scale})"),
            AbstractType::Double => "DOUBLE".to_string(),
            AbstractType::Float => "FLOAT".to_string(),
            AbstractType::Datetime => "DATETIME".to_string(),
            AbstractType::Date => "DATE".to_string(),
            AbstractType::Time => "TIME".to_string(),
            AbstractType::Timestamp => "TIMESTAMP".to_string(),
            AbstractType::TinyBinary | AbstractType::Binary | AbstractType::LongBinary => {
                "BLOB".to_string()
            }
            AbstractType::Enum(_) => format!("VARCHAR({})", column.abstract_type.enum_size()),
            AbstractType::Json => "JSON".to_string(),
        }
    }

    fn render_default(&self, value: &DefaultValue, _column: &Column) -> String {
        match value {
            // Expressions must be parenthesized in SQLite DEFAULT clauses.
            DefaultValue::Expression(expr) => format!("({expr})"),
            other => other.to_sql(),
        }
    }

    fn column_suffix(&self, _table: &str, column: &Column) -> Option<String> {
        if column.abstract_type.is_auto_increment() {
            return Some("PRIMARY KEY AUTOINCREMENT".to_string());
        }
        column.abstract_type.enum_values().map(|values| {
            let values: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
            format!(
                "CHECK ({} IN ({}))",
                self.quote_identifier(&column.name),
                values.join(", ")
            )
        })
    }

    fn primary_key_clause(&self, table: &TableState) -> Option<String> {
        let inline = table
            .columns
            .values()
            .any(|c| c.abstract_type.is_auto_increment());
        if inline || table.primary_keys.is_empty() {
            return None;
        }
        Some(format!(
            "PRIMARY KEY ({})",
            self.quote_columns(&table.primary_keys)
        ))
    }

    fn alter_column(&self, table: &str, from: &Column, to: &Column) -> Result<Vec<String>> {
        if self.is_rename(from, to) {
            return Ok(vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.quote_identifier(table),
                self.quote_identifier(&from.name),
                self.quote_identifier(&to.name)
            )]);
        }
        Err(unsupported(
            self.name(),
            &Operation::AlterColumn {
                table: table.to_string(),
                from: from.clone(),
                to: to.clone(),
            },
        ))
    }

    fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<Vec<String>> {
        Err(unsupported(
            self.name(),
            &Operation::AddForeignKey {
                table: table.to_string(),
                foreign_key: foreign_key.clone(),
            },
        ))
    }

    fn drop_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<Vec<String>> {
        Err(unsupported(
            self.name(),
            &Operation::DropForeignKey {
                table: table.to_string(),
                foreign_key: foreign_key.clone(),
            },
        ))
    }

    fn alter_primary_keys(
        &self,
        table: &str,
        constraint: Option<&str>,
        from: &[String],
        to: &[String],
    ) -> Result<Vec<String>> {
        Err(unsupported(
            self.name(),
            &Operation::AlterPrimaryKeys {
                table: table.to_string(),
                constraint: constraint.map(str::to_string),
                from: from.to_vec(),
                to: to.to_vec(),
            },
        ))
    }

    fn rebuild_table(&self, from: &TableState, to: &TableState) -> Result<Vec<String>> {
        let table = self.quote_identifier(&to.name);
        let shadow_name = format!("{}{}", to.name, SHADOW_SUFFIX);
        let shadow = self.quote_identifier(&shadow_name);

        let mut definition = to.clone();
        definition.name = shadow_name;
        let mut sql = vec![self.create_table(&definition, None, true)];

        let mapping = Self::copy_mapping(from, to);
        if !mapping.is_empty() {
            let targets: Vec<String> = mapping
                .iter()
                .map(|(new, _)| self.quote_identifier(new))
                .collect();
            let sources: Vec<String> = mapping
                .iter()
                .map(|(_, old)| self.quote_identifier(old))
                .collect();
            sql.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                shadow,
                targets.join(", "),
                sources.join(", "),
                table
            ));
        }

        sql.push(self.drop_table(&to.name));
        sql.push(format!("ALTER TABLE {shadow} RENAME TO {table}"));
        sql.extend(to.indexes.values().map(|i| self.create_index(&to.name, i)));
        Ok(sql)
    }

    fn inline_foreign_keys(&self) -> bool {
        true
    }

    fn requires_rebuild(&self, diff: &TableDiff) -> bool {
        // ADD COLUMN rejects NOT NULL without a default, and non-constant
        // defaults.
        let unaddable = diff.added_columns.iter().any(|c| {
            c.abstract_type.is_auto_increment()
                || (!c.nullable && c.default.is_none())
                || matches!(
                    c.default,
                    Some(DefaultValue::CurrentTimestamp | DefaultValue::Expression(_))
                )
        });
        unaddable
            || diff
                .altered_columns
                .iter()
                .any(|c| !self.is_rename(&c.from, &c.to))
            || diff.has_foreign_key_changes()
            || diff.primary_keys_changed
    }
}
