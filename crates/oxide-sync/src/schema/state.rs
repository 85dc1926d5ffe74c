//! Table snapshot.
//!
//! A [`TableState`] is one comparable picture of a table's structure:
//! either what introspection found (*initial*) or what the application
//! declares (*current*).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::column::Column;
use super::foreign_key::ForeignKey;
use super::index::Index;

/// Structure of one table at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    /// Table name.
    pub name: String,
    /// Columns by name, in declaration order.
    pub columns: IndexMap<String, Column>,
    /// Indexes by name.
    pub indexes: IndexMap<String, Index>,
    /// Foreign keys by owning column.
    pub foreign_keys: IndexMap<String, ForeignKey>,
    /// Primary key column(s).
    pub primary_keys: Vec<String>,
    /// Primary key constraint name reported by the catalog (PostgreSQL only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_name: Option<String>,
    /// Storage engine reported by the catalog (MySQL only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

impl TableState {
    /// Creates an empty state.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true when the state holds no columns.
    ///
    /// An introspected state is empty exactly when the table does not exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns true if the column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Gets a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Registers a column, replacing any column with the same name.
    pub fn register_column(&mut self, column: Column) {
        self.columns.insert(column.name.clone(), column);
    }

    /// Registers an index, replacing any index with the same name.
    pub fn register_index(&mut self, index: Index) {
        self.indexes.insert(index.name.clone(), index);
    }

    /// Registers a foreign key, replacing any key on the same column.
    pub fn register_foreign_key(&mut self, foreign_key: ForeignKey) {
        self.foreign_keys
            .insert(foreign_key.column.clone(), foreign_key);
    }

    /// Finds the index covering exactly the given columns.
    #[must_use]
    pub fn find_index<S: AsRef<str>>(&self, columns: &[S]) -> Option<&Index> {
        self.indexes.values().find(|index| index.covers(columns))
    }

    /// Finds the foreign key owned by a column.
    #[must_use]
    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.get(column)
    }

    /// Tables referenced by this state's foreign keys.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys.values().map(|fk| fk.foreign_table.as_str())
    }

    /// Returns a copy whose descriptors remember their own names as
    /// identity, ready to be used as a working (*current*) state.
    #[must_use]
    pub(crate) fn to_working_copy(&self) -> Self {
        let mut copy = self.clone();
        for column in copy.columns.values_mut() {
            column.origin = Some(column.name.clone());
        }
        for index in copy.indexes.values_mut() {
            index.origin = Some(index.name.clone());
        }
        copy
    }

    /// Returns a copy with identity tokens cleared, as a committed
    /// (*initial*) state.
    #[must_use]
    pub(crate) fn to_committed(&self) -> Self {
        let mut copy = self.clone();
        for column in copy.columns.values_mut() {
            column.origin = None;
        }
        for index in copy.indexes.values_mut() {
            index.origin = None;
        }
        copy
    }
}
