//! Foreign key descriptor.

use serde::{Deserialize, Serialize};

use super::types::ForeignKeyAction;

/// Schema definition for a single-column foreign key constraint.
///
/// Identity is the owning column: a column carries at most one foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Column in the referencing table.
    pub column: String,
    /// Referenced table name.
    pub foreign_table: String,
    /// Referenced column.
    pub foreign_key: String,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    /// Index the database created on its own to support this key.
    /// Dropped together with the constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_index: Option<String>,
}

impl ForeignKey {
    /// Creates a foreign key with `NO ACTION` rules.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            foreign_table: foreign_table.into(),
            foreign_key: foreign_key.into(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
            backing_index: None,
        }
    }

    /// Generates the deterministic constraint name.
    #[must_use]
    pub fn generate_name(table: &str, column: &str) -> String {
        format!("{table}_foreign_{column}")
    }

    /// Changes the referenced table and column.
    pub fn references(
        &mut self,
        foreign_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> &mut Self {
        self.foreign_table = foreign_table.into();
        self.foreign_key = foreign_key.into();
        self
    }

    /// Sets the ON DELETE rule.
    pub fn on_delete(&mut self, action: ForeignKeyAction) -> &mut Self {
        self.on_delete = action;
        self
    }

    /// Sets the ON UPDATE rule.
    pub fn on_update(&mut self, action: ForeignKeyAction) -> &mut Self {
        self.on_update = action;
        self
    }

    /// Compares target and rules. Constraint and index names are cosmetic.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.column == other.column
            && self.foreign_table == other.foreign_table
            && self.foreign_key == other.foreign_key
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_ignored_by_comparison() {
        let mut a = ForeignKey::new("a", "user_id", "users", "id");
        let b = ForeignKey::new("posts_foreign_user_id", "user_id", "users", "id");
        assert!(a.same_as(&b));

        a.on_delete(ForeignKeyAction::Cascade);
        assert!(!a.same_as(&b));
    }
}
