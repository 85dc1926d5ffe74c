//! Structural comparison of a table's initial and current states.
//!
//! Descriptors are matched by identity: a current column or index that was
//! cloned from the initial state remembers its initial name, so an explicit
//! rename is reported as an alteration instead of a drop + add.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::dialect::Handler;
use crate::schema::{Column, ForeignKey, Index, TableState};

/// A column present in both states that differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnChange {
    /// Introspected definition.
    pub from: Column,
    /// Declared definition.
    pub to: Column,
}

/// An index present in both states that differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexChange {
    /// Introspected definition.
    pub from: Index,
    /// Declared definition.
    pub to: Index,
}

/// A foreign key present in both states that differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyChange {
    /// Introspected definition.
    pub from: ForeignKey,
    /// Declared definition.
    pub to: ForeignKey,
}

/// Differences between a table's initial and current states.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// Columns declared but not introspected.
    pub added_columns: Vec<Column>,
    /// Columns introspected but no longer declared.
    pub dropped_columns: Vec<Column>,
    /// Columns whose definition (or name) changed.
    pub altered_columns: Vec<ColumnChange>,
    /// Indexes declared but not introspected.
    pub added_indexes: Vec<Index>,
    /// Indexes introspected but no longer declared.
    pub dropped_indexes: Vec<Index>,
    /// Indexes whose definition (or name) changed.
    pub altered_indexes: Vec<IndexChange>,
    /// Foreign keys declared but not introspected.
    pub added_foreign_keys: Vec<ForeignKey>,
    /// Foreign keys introspected but no longer declared.
    pub dropped_foreign_keys: Vec<ForeignKey>,
    /// Foreign keys whose target or rules changed.
    pub altered_foreign_keys: Vec<ForeignKeyChange>,
    /// Whether the primary key column list changed.
    pub primary_keys_changed: bool,
}

impl TableDiff {
    /// Returns true if the states are structurally equal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_column_changes()
            && !self.has_index_changes()
            && !self.has_foreign_key_changes()
            && !self.primary_keys_changed
    }

    /// Returns true if any column was added, dropped or altered.
    #[must_use]
    pub fn has_column_changes(&self) -> bool {
        !self.added_columns.is_empty()
            || !self.dropped_columns.is_empty()
            || !self.altered_columns.is_empty()
    }

    /// Returns true if any index was added, dropped or altered.
    #[must_use]
    pub fn has_index_changes(&self) -> bool {
        !self.added_indexes.is_empty()
            || !self.dropped_indexes.is_empty()
            || !self.altered_indexes.is_empty()
    }

    /// Returns true if any foreign key was added, dropped or altered.
    #[must_use]
    pub fn has_foreign_key_changes(&self) -> bool {
        !self.added_foreign_keys.is_empty()
            || !self.dropped_foreign_keys.is_empty()
            || !self.altered_foreign_keys.is_empty()
    }

    /// Names of every column involved in the diff.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.added_columns
            .iter()
            .chain(&self.dropped_columns)
            .map(|c| c.name.clone())
            .chain(self.altered_columns.iter().map(|c| c.to.name.clone()))
            .collect()
    }

    /// Names of every index involved in the diff.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.added_indexes
            .iter()
            .chain(&self.dropped_indexes)
            .map(|i| i.name.clone())
            .chain(self.altered_indexes.iter().map(|i| i.to.name.clone()))
            .collect()
    }

    /// Owning columns of every foreign key involved in the diff.
    #[must_use]
    pub fn foreign_key_names(&self) -> Vec<String> {
        self.added_foreign_keys
            .iter()
            .chain(&self.dropped_foreign_keys)
            .map(|fk| fk.column.clone())
            .chain(self.altered_foreign_keys.iter().map(|fk| fk.to.column.clone()))
            .collect()
    }
}

/// Compares two states of the same table under a dialect's equality rules.
pub struct Comparator<'a> {
    initial: &'a TableState,
    current: &'a TableState,
    handler: &'a dyn Handler,
}

impl<'a> Comparator<'a> {
    /// Creates a comparator.
    #[must_use]
    pub fn new(initial: &'a TableState, current: &'a TableState, handler: &'a dyn Handler) -> Self {
        Self {
            initial,
            current,
            handler,
        }
    }

    /// Computes the full diff.
    #[must_use]
    pub fn compare(&self) -> TableDiff {
        let mut diff = TableDiff {
            table: self.current.name.clone(),
            ..TableDiff::default()
        };
        self.diff_columns(&mut diff);
        self.diff_indexes(&mut diff);
        self.diff_foreign_keys(&mut diff);
        diff.primary_keys_changed = self.primary_keys_changed();
        diff
    }

    /// Initial name of a current column, following renames.
    fn column_origin(&self, name: &str) -> String {
        self.current
            .column(name)
            .and_then(Column::initial_name)
            .unwrap_or(name)
            .to_string()
    }

    fn diff_columns(&self, diff: &mut TableDiff) {
        let claimed: HashSet<&str> = self
            .current
            .columns
            .values()
            .filter_map(Column::initial_name)
            .collect();
        let mut matched: HashSet<&str> = HashSet::new();

        for column in self.current.columns.values() {
            let identity = column.initial_name().or_else(|| {
                // A descriptor declared from scratch still matches an
                // unclaimed initial column of the same name.
                (!claimed.contains(column.name.as_str()))
                    .then_some(column.name.as_str())
            });

            match identity.and_then(|name| self.initial.column(name)) {
                Some(initial) => {
                    matched.insert(initial.name.as_str());
                    if !self.handler.columns_equal(initial, column) {
                        diff.altered_columns.push(ColumnChange {
                            from: initial.clone(),
                            to: column.clone(),
                        });
                    }
                }
                None => diff.added_columns.push(column.clone()),
            }
        }

        diff.dropped_columns = self
            .initial
            .columns
            .values()
            .filter(|c| !matched.contains(c.name.as_str()))
            .cloned()
            .collect();
    }

    fn diff_indexes(&self, diff: &mut TableDiff) {
        let claimed: HashSet<&str> = self
            .current
            .indexes
            .values()
            .filter_map(|i| i.origin.as_deref())
            .collect();
        let mut matched: HashSet<&str> = HashSet::new();

        for index in self.current.indexes.values() {
            let identity = index.origin.as_deref().or_else(|| {
                (!claimed.contains(index.name.as_str())).then_some(index.name.as_str())
            });

            match identity.and_then(|name| self.initial.indexes.get(name)) {
                Some(initial) => {
                    matched.insert(initial.name.as_str());
                    // Column renames are followed by the database itself.
                    let columns: Vec<String> =
                        index.columns.iter().map(|c| self.column_origin(c)).collect();
                    let unchanged = initial.name == index.name
                        && initial.columns == columns
                        && initial.unique == index.unique;
                    if !unchanged {
                        diff.altered_indexes.push(IndexChange {
                            from: initial.clone(),
                            to: index.clone(),
                        });
                    }
                }
                None => diff.added_indexes.push(index.clone()),
            }
        }

        diff.dropped_indexes = self
            .initial
            .indexes
            .values()
            .filter(|i| !matched.contains(i.name.as_str()))
            .cloned()
            .collect();
    }

    fn diff_foreign_keys(&self, diff: &mut TableDiff) {
        let initial: HashMap<&str, &ForeignKey> = self
            .initial
            .foreign_keys
            .values()
            .map(|fk| (fk.column.as_str(), fk))
            .collect();
        let mut matched: HashSet<&str> = HashSet::new();

        for fk in self.current.foreign_keys.values() {
            match initial.get(fk.column.as_str()) {
                Some(from) => {
                    matched.insert(from.column.as_str());
                    if !from.same_as(fk) {
                        diff.altered_foreign_keys.push(ForeignKeyChange {
                            from: (*from).clone(),
                            to: fk.clone(),
                        });
                    }
                }
                None => diff.added_foreign_keys.push(fk.clone()),
            }
        }

        diff.dropped_foreign_keys = self
            .initial
            .foreign_keys
            .values()
            .filter(|fk| !matched.contains(fk.column.as_str()))
            .cloned()
            .collect();
    }

    fn primary_keys_changed(&self) -> bool {
        let current: Vec<String> = self
            .current
            .primary_keys
            .iter()
            .map(|c| self.column_origin(c))
            .collect();
        current != self.initial.primary_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::schema::{AbstractType, DefaultValue};

    fn users() -> TableState {
        let mut state = TableState::new("users");
        state.register_column(Column::new("id", AbstractType::Primary));
        state.register_column(Column::new("name", AbstractType::String(255)));
        state.register_index(Index::new("users_index_name", vec!["name".into()]));
        state.primary_keys = vec!["id".into()];
        state
    }

    fn compare(initial: &TableState, current: &TableState) -> TableDiff {
        Comparator::new(initial, current, Dialect::Postgres.handler()).compare()
    }

    #[test]
    fn test_identical_states_have_empty_diff() {
        let initial = users();
        let current = initial.to_working_copy();
        assert!(compare(&initial, &current).is_empty());
    }

    #[test]
    fn test_added_dropped_and_altered_columns() {
        let initial = users();
        let mut current = initial.to_working_copy();
        current.columns.shift_remove("name");
        current.indexes.clear();
        current.register_column(Column::new("email", AbstractType::String(128)));
        current
            .columns
            .get_mut("id")
            .unwrap()
            .set_type(AbstractType::BigPrimary);

        let diff = compare(&initial, &current);
        assert_eq!(diff.added_columns[0].name, "email");
        assert_eq!(diff.dropped_columns[0].name, "name");
        assert_eq!(diff.altered_columns.len(), 1);
        assert_eq!(diff.altered_columns[0].to.abstract_type, AbstractType::BigPrimary);
        assert_eq!(diff.dropped_indexes.len(), 1);
        assert!(!diff.primary_keys_changed);
    }

    #[test]
    fn test_cosmetic_default_difference_is_not_an_alteration() {
        let mut initial = users();
        initial
            .columns
            .get_mut("name")
            .unwrap()
            .default_value(DefaultValue::Expression("'guest'".into()));
        let mut current = initial.to_working_copy();
        current
            .columns
            .get_mut("name")
            .unwrap()
            .default_value(DefaultValue::String("guest".into()));
        assert!(compare(&initial, &current).is_empty());
    }

    #[test]
    fn test_redeclared_column_matches_unclaimed_initial() {
        let initial = users();
        let mut current = initial.to_working_copy();
        current.columns.shift_remove("name");
        current.register_column(Column::new("name", AbstractType::String(255)));
        assert!(compare(&initial, &current).is_empty());
    }

    #[test]
    fn test_rename_keeps_identity() {
        let initial = users();
        let mut current = initial.to_working_copy();
        let mut column = current.columns.shift_remove("name").unwrap();
        column.name = "full_name".into();
        current.register_column(column);
        current.indexes.get_mut("users_index_name").unwrap().columns = vec!["full_name".into()];

        let diff = compare(&initial, &current);
        assert!(diff.added_columns.is_empty());
        assert!(diff.dropped_columns.is_empty());
        assert_eq!(diff.altered_columns.len(), 1);
        assert_eq!(diff.altered_columns[0].from.name, "name");
        assert_eq!(diff.altered_columns[0].to.name, "full_name");
        // The index follows the column rename on its own.
        assert!(diff.altered_indexes.is_empty());
    }

    #[test]
    fn test_foreign_key_changes() {
        let mut initial = TableState::new("posts");
        initial.register_column(Column::new("user_id", AbstractType::Integer));
        initial.register_foreign_key(ForeignKey::new("fk", "user_id", "users", "id"));
        let mut current = initial.to_working_copy();
        current
            .foreign_keys
            .get_mut("user_id")
            .unwrap()
            .on_delete(crate::schema::ForeignKeyAction::Cascade);

        let diff = compare(&initial, &current);
        assert_eq!(diff.altered_foreign_keys.len(), 1);
        assert_eq!(diff.foreign_key_names(), vec!["user_id".to_string()]);

        current.foreign_keys.clear();
        let diff = compare(&initial, &current);
        assert_eq!(diff.dropped_foreign_keys.len(), 1);
        assert!(diff.added_foreign_keys.is_empty());
    }

    #[test]
    fn test_primary_key_change() {
        let initial = users();
        let mut current = initial.to_working_copy();
        current.primary_keys = vec!["id".into(), "name".into()];
        assert!(compare(&initial, &current).primary_keys_changed);
    }
}
