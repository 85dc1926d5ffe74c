//! Schema operations.
//!
//! An [`Operation`] is one structural change to one table, independent of
//! any dialect. Handlers translate operations into SQL statements.

use serde::Serialize;

use crate::schema::{Column, ForeignKey, Index, TableState};

/// A single structural change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operation {
    /// Create a table with its columns and primary key.
    CreateTable {
        /// Declared structure. Indexes are created by separate operations.
        table: TableState,
        /// Storage engine, where the dialect has one.
        engine: Option<String>,
        /// Whether foreign keys are written inside the table definition.
        include_foreign_keys: bool,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },

    /// Add a column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },

    /// Change a column's name, type, nullability or default.
    AlterColumn {
        /// Table name.
        table: String,
        /// Introspected definition.
        from: Column,
        /// Declared definition.
        to: Column,
    },

    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Create an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: Index,
    },

    /// Change an index's name, columns or uniqueness.
    AlterIndex {
        /// Table name.
        table: String,
        /// Introspected definition.
        from: Index,
        /// Declared definition.
        to: Index,
    },

    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: Index,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKey,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKey,
    },

    /// Replace the primary key.
    AlterPrimaryKeys {
        /// Table name.
        table: String,
        /// Name of the existing constraint, when the catalog reports one.
        constraint: Option<String>,
        /// Introspected primary key columns.
        from: Vec<String>,
        /// Declared primary key columns.
        to: Vec<String>,
    },

    /// Recreate a table under its declared structure, copying the rows.
    RebuildTable {
        /// Introspected structure.
        from: TableState,
        /// Declared structure; column identities map old columns to new.
        to: TableState,
    },
}

impl Operation {
    /// Name of the table the operation applies to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. } => &table.name,
            Self::RebuildTable { to, .. } => &to.name,
            Self::DropTable { table }
            | Self::AddColumn { table, .. }
            | Self::AlterColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::AlterIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::AlterPrimaryKeys { table, .. } => table,
        }
    }

    /// Returns a short human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { table, .. } => format!("Create table {}", table.name),
            Self::DropTable { table } => format!("Drop table {table}"),
            Self::AddColumn { table, column } => {
                format!("Add column {}.{} ({})", table, column.name, column.abstract_type)
            }
            Self::AlterColumn { table, from, to } if from.name != to.name => {
                format!("Alter column {}.{} (renamed to {})", table, from.name, to.name)
            }
            Self::AlterColumn { table, to, .. } => {
                format!("Alter column {}.{} ({})", table, to.name, to.abstract_type)
            }
            Self::DropColumn { table, column } => format!("Drop column {table}.{column}"),
            Self::AddIndex { table, index } => format!("Add index {} on {}", index.name, table),
            Self::AlterIndex { table, to, .. } => format!("Alter index {} on {}", to.name, table),
            Self::DropIndex { table, index } => format!("Drop index {} on {}", index.name, table),
            Self::AddForeignKey { table, foreign_key } => format!(
                "Add foreign key {}.{} -> {}.{}",
                table, foreign_key.column, foreign_key.foreign_table, foreign_key.foreign_key
            ),
            Self::DropForeignKey { table, foreign_key } => {
                format!("Drop foreign key {}.{}", table, foreign_key.column)
            }
            Self::AlterPrimaryKeys { table, to, .. } => {
                format!("Set primary key of {} to ({})", table, to.join(", "))
            }
            Self::RebuildTable { to, .. } => format!("Rebuild table {}", to.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AbstractType;

    #[test]
    fn test_table_and_description() {
        let op = Operation::AddColumn {
            table: "users".into(),
            column: Column::new("email", AbstractType::String(255)),
        };
        assert_eq!(op.table(), "users");
        assert_eq!(op.describe(), "Add column users.email (string(255))");

        let mut renamed = Column::new("full_name", AbstractType::Text);
        renamed.origin = Some("name".into());
        let op = Operation::AlterColumn {
            table: "users".into(),
            from: Column::new("name", AbstractType::Text),
            to: renamed,
        };
        assert_eq!(op.describe(), "Alter column users.name (renamed to full_name)");
    }
}
