//! The table schema object.
//!
//! A [`Table`] pairs the introspected state of a table with a mutable
//! working copy that the application reshapes. Synchronization turns the
//! difference between the two into DDL.

use crate::comparator::{Comparator, TableDiff};
use crate::dialect::Dialect;
use crate::error::{Result, SyncError};

use super::column::Column;
use super::foreign_key::ForeignKey;
use super::index::Index;
use super::state::TableState;
use super::types::AbstractType;

/// A table known to a database, with its initial and declared structure.
#[derive(Debug, Clone)]
pub struct Table {
    database: String,
    dialect: Dialect,
    initial: TableState,
    current: TableState,
    passive: bool,
    engine: Option<String>,
    dropped: bool,
}

impl Table {
    /// Creates a schema for a table that does not exist yet.
    #[must_use]
    pub fn new(name: impl Into<String>, database: impl Into<String>, dialect: Dialect) -> Self {
        Self::from_state(TableState::new(name), database, dialect)
    }

    /// Wraps an introspected state. The working copy starts equal to it.
    #[must_use]
    pub fn from_state(state: TableState, database: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            database: database.into(),
            dialect,
            current: state.to_working_copy(),
            engine: state.engine.clone(),
            initial: state,
            passive: false,
            dropped: false,
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.initial.name
    }

    /// Name of the database (connection group) owning the table.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Dialect used to compare and alter the table.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Introspected state.
    #[must_use]
    pub fn initial(&self) -> &TableState {
        &self.initial
    }

    /// Declared state.
    #[must_use]
    pub fn current(&self) -> &TableState {
        &self.current
    }

    /// Returns true if the table existed when it was introspected.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.initial.is_empty()
    }

    /// Returns true if the table is read-only for synchronization.
    #[must_use]
    pub fn is_passive(&self) -> bool {
        self.passive
    }

    /// Marks the table as passive: any pending change is a conflict.
    pub fn set_passive(&mut self, passive: bool) -> &mut Self {
        self.passive = passive;
        self
    }

    /// Storage engine used when the table is created (MySQL only).
    #[must_use]
    pub fn engine(&self) -> Option<&str> {
        self.engine.as_deref()
    }

    /// Sets the storage engine.
    pub fn set_engine(&mut self, engine: impl Into<String>) -> &mut Self {
        self.engine = Some(engine.into());
        self
    }

    /// Returns true if the table is scheduled to be dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Schedules the table to be dropped on the next synchronization.
    pub fn declare_dropped(&mut self) -> &mut Self {
        self.dropped = true;
        self
    }

    // Columns

    /// Declares a column, or retypes the existing column of that name.
    ///
    /// Updating in place keeps the column's identity, so the diff reports
    /// an alteration instead of a drop and re-add.
    pub fn column(&mut self, name: &str, abstract_type: AbstractType) -> &mut Column {
        let column = self
            .current
            .columns
            .entry(name.to_string())
            .or_insert_with(|| Column::new(name, abstract_type.clone()));
        column.set_type(abstract_type)
    }

    /// Declares an auto-increment primary key column.
    pub fn primary(&mut self, name: &str) -> &mut Column {
        self.current.primary_keys = vec![name.to_string()];
        self.column(name, AbstractType::Primary)
    }

    /// Declares a 64-bit auto-increment primary key column.
    pub fn big_primary(&mut self, name: &str) -> &mut Column {
        self.current.primary_keys = vec![name.to_string()];
        self.column(name, AbstractType::BigPrimary)
    }

    /// Declares a boolean column.
    pub fn boolean(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Boolean)
    }

    /// Declares a tiny integer column.
    pub fn tiny_integer(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::TinyInteger)
    }

    /// Declares an integer column.
    pub fn integer(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Integer)
    }

    /// Declares a big integer column.
    pub fn big_integer(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::BigInteger)
    }

    /// Declares a variable-length string column.
    pub fn string(&mut self, name: &str, size: u32) -> &mut Column {
        self.column(name, AbstractType::String(size))
    }

    /// Declares a text column.
    pub fn text(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Text)
    }

    /// Declares a fixed-point column.
    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut Column {
        self.column(name, AbstractType::Decimal { precision, scale })
    }

    /// Declares a double precision column.
    pub fn double(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Double)
    }

    /// Declares a single precision column.
    pub fn float(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Float)
    }

    /// Declares a date and time column.
    pub fn datetime(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Datetime)
    }

    /// Declares a date column.
    pub fn date(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Date)
    }

    /// Declares a time column.
    pub fn time(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Time)
    }

    /// Declares a timestamp column.
    pub fn timestamp(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Timestamp)
    }

    /// Declares a binary column.
    pub fn binary(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Binary)
    }

    /// Declares an enumeration column.
    pub fn enumeration<S: Into<String>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = S>,
    ) -> &mut Column {
        let values = values.into_iter().map(Into::into).collect();
        self.column(name, AbstractType::Enum(values))
    }

    /// Declares a JSON column.
    pub fn json(&mut self, name: &str) -> &mut Column {
        self.column(name, AbstractType::Json)
    }

    /// Renames a column. Indexes, the foreign key and the primary key
    /// follow the new name.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        if from == to {
            return Ok(self);
        }
        if self.current.has_column(to) {
            return Err(SyncError::invalid_schema(
                self.name(),
                format!("cannot rename '{from}' to '{to}': column already exists"),
            ));
        }
        let Some((position, _, mut column)) = self.current.columns.shift_remove_full(from) else {
            return Err(SyncError::invalid_schema(
                self.name(),
                format!("cannot rename unknown column '{from}'"),
            ));
        };
        column.name = to.to_string();
        self.current
            .columns
            .shift_insert(position, to.to_string(), column);

        for index in self.current.indexes.values_mut() {
            for name in index.columns.iter_mut().filter(|c| *c == from) {
                *name = to.to_string();
            }
        }
        if let Some(mut fk) = self.current.foreign_keys.shift_remove(from) {
            fk.column = to.to_string();
            self.current.register_foreign_key(fk);
        }
        for name in self.current.primary_keys.iter_mut().filter(|c| *c == from) {
            *name = to.to_string();
        }
        Ok(self)
    }

    /// Removes a column together with the indexes and foreign key using it.
    pub fn drop_column(&mut self, name: &str) -> &mut Self {
        self.current.columns.shift_remove(name);
        self.current.indexes.retain(|_, index| !index.includes(name));
        self.current.foreign_keys.shift_remove(name);
        self.current.primary_keys.retain(|c| c != name);
        self
    }

    /// Sets the primary key column list.
    pub fn set_primary_keys<S: Into<String>>(
        &mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> &mut Self {
        self.current.primary_keys = columns.into_iter().map(Into::into).collect();
        self
    }

    // Indexes

    /// Declares an index over the given columns, or returns the existing
    /// index covering exactly those columns.
    ///
    /// When the generated name already belongs to an index over other
    /// columns, a numeric suffix is appended.
    pub fn index<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Index {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let name = match self.current.find_index(columns.as_slice()) {
            Some(index) => index.name.clone(),
            None => self.free_index_name(&columns),
        };
        self.current
            .indexes
            .entry(name.clone())
            .or_insert_with(|| Index::new(name, columns))
    }

    fn free_index_name(&self, columns: &[String]) -> String {
        let base = Index::generate_name(&self.initial.name, columns);
        let taken = |name: &str| self.current.indexes.contains_key(name);
        if !taken(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|name| !taken(name))
            .unwrap_or(base)
    }

    /// Declares a unique index over the given columns.
    pub fn unique<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Index {
        self.index(columns).unique(true)
    }

    /// Renames an index.
    pub fn rename_index(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        if from == to {
            return Ok(self);
        }
        if self.current.indexes.contains_key(to) {
            return Err(SyncError::invalid_schema(
                self.name(),
                format!("cannot rename index '{from}' to '{to}': index already exists"),
            ));
        }
        let Some((position, _, mut index)) = self.current.indexes.shift_remove_full(from) else {
            return Err(SyncError::invalid_schema(
                self.name(),
                format!("cannot rename unknown index '{from}'"),
            ));
        };
        index.name = to.to_string();
        self.current
            .indexes
            .shift_insert(position, to.to_string(), index);
        Ok(self)
    }

    /// Removes the index covering exactly the given columns.
    pub fn drop_index<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        self.current
            .indexes
            .retain(|_, index| !index.covers(columns));
        self
    }

    // Foreign keys

    /// Declares that `column` references `foreign_table.foreign_key`.
    ///
    /// No supporting index is created; declare one explicitly if needed.
    pub fn foreign_key(
        &mut self,
        column: &str,
        foreign_table: &str,
        foreign_key: &str,
    ) -> &mut ForeignKey {
        let name = ForeignKey::generate_name(&self.initial.name, column);
        self.current
            .foreign_keys
            .entry(column.to_string())
            .or_insert_with(|| ForeignKey::new(name, column, foreign_table, foreign_key))
            .references(foreign_table, foreign_key)
    }

    /// Removes the foreign key owned by a column.
    pub fn drop_foreign_key(&mut self, column: &str) -> &mut Self {
        self.current.foreign_keys.shift_remove(column);
        self
    }

    // Comparison

    /// Checks that indexes, foreign keys and primary keys only name
    /// declared columns.
    pub fn validate(&self) -> Result<()> {
        if self.dropped {
            return Ok(());
        }
        let state = &self.current;
        let missing = |column: &str| !state.has_column(column);

        for index in state.indexes.values() {
            if index.columns.is_empty() {
                return Err(SyncError::invalid_schema(
                    self.name(),
                    format!("index '{}' has no columns", index.name),
                ));
            }
            if let Some(column) = index.columns.iter().find(|c| missing(c.as_str())) {
                return Err(SyncError::invalid_schema(
                    self.name(),
                    format!("index '{}' uses unknown column '{column}'", index.name),
                ));
            }
        }
        if let Some(fk) = state.foreign_keys.values().find(|fk| missing(&fk.column)) {
            return Err(SyncError::invalid_schema(
                self.name(),
                format!("foreign key '{}' uses unknown column '{}'", fk.name, fk.column),
            ));
        }
        if let Some(column) = state.primary_keys.iter().find(|c| missing(c.as_str())) {
            return Err(SyncError::invalid_schema(
                self.name(),
                format!("primary key uses unknown column '{column}'"),
            ));
        }

        let auto_increment = state
            .columns
            .values()
            .filter(|c| c.abstract_type.is_auto_increment())
            .collect::<Vec<_>>();
        if let [column] = auto_increment.as_slice() {
            if state.primary_keys != [column.name.clone()] {
                return Err(SyncError::invalid_schema(
                    self.name(),
                    format!("auto-increment column '{}' must be the only primary key", column.name),
                ));
            }
        } else if auto_increment.len() > 1 {
            return Err(SyncError::invalid_schema(
                self.name(),
                "a table can have at most one auto-increment column",
            ));
        }
        Ok(())
    }

    /// Compares the introspected state with the declared one.
    ///
    /// A dropped table diffs against an empty state.
    #[must_use]
    pub fn diff(&self) -> TableDiff {
        let handler = self.dialect.handler();
        if self.dropped {
            let empty = TableState::new(self.name());
            return Comparator::new(&self.initial, &empty, handler).compare();
        }
        Comparator::new(&self.initial, &self.current, handler).compare()
    }

    /// Returns true if synchronizing would change anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        if self.dropped {
            return self.exists();
        }
        !self.diff().is_empty()
    }

    /// Commits the declared state as the new initial state.
    pub(crate) fn mark_synchronized(&mut self) {
        if self.dropped {
            self.initial = TableState::new(self.name());
            self.current = self.initial.clone();
            self.dropped = false;
            return;
        }
        self.initial = self.current.to_committed();

        let handler = self.dialect.handler();
        let implicit: Vec<(String, String)> = self
            .initial
            .foreign_keys
            .values()
            .filter(|fk| fk.backing_index.is_none())
            .filter_map(|fk| {
                handler
                    .implicit_foreign_key_index(&self.initial, fk)
                    .map(|index| (fk.column.clone(), index))
            })
            .collect();
        for (column, index) in implicit {
            if let Some(fk) = self.initial.foreign_keys.get_mut(&column) {
                fk.backing_index = Some(index);
            }
        }

        self.current = self.initial.to_working_copy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DefaultValue;

    fn users() -> Table {
        let mut state = TableState::new("users");
        state.register_column(Column::new("id", AbstractType::Primary));
        state.register_column(Column::new("name", AbstractType::String(255)));
        state.register_index(Index::new("users_index_name", vec!["name".into()]));
        state.primary_keys = vec!["id".into()];
        Table::from_state(state, "default", Dialect::Sqlite)
    }

    #[test]
    fn test_new_table_diff_adds_everything() {
        let mut table = Table::new("users", "default", Dialect::Sqlite);
        table.primary("id");
        table.string("email", 255).not_null();
        table.unique(&["email"]);

        assert!(!table.exists());
        let diff = table.diff();
        assert_eq!(diff.added_columns.len(), 2);
        assert_eq!(diff.added_indexes[0].name, "users_index_email");
        assert!(diff.added_indexes[0].unique);
        assert!(diff.primary_keys_changed);
    }

    #[test]
    fn test_unchanged_table_has_no_changes() {
        let table = users();
        assert!(table.exists());
        assert!(!table.has_changes());
    }

    #[test]
    fn test_redeclaring_column_updates_in_place() {
        let mut table = users();
        table.string("name", 64).default_value(DefaultValue::String("x".into()));
        let diff = table.diff();
        assert!(diff.added_columns.is_empty());
        assert_eq!(diff.altered_columns.len(), 1);
        assert_eq!(diff.altered_columns[0].to.abstract_type, AbstractType::String(64));
    }

    #[test]
    fn test_index_reuses_existing_index() {
        let mut table = users();
        table.index(&["name"]).unique(true);
        assert_eq!(table.current().indexes.len(), 1);
        let diff = table.diff();
        assert_eq!(diff.altered_indexes.len(), 1);
    }

    #[test]
    fn test_rename_column_carries_dependents() {
        let mut table = users();
        table.foreign_key("name", "people", "name");
        table.rename_column("name", "full_name").unwrap();

        let current = table.current();
        let names: Vec<&str> = current.columns.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "full_name"]);
        assert_eq!(current.indexes["users_index_name"].columns, vec!["full_name"]);
        assert_eq!(current.foreign_key("full_name").unwrap().column, "full_name");
        assert!(current.columns["full_name"].is_renamed());

        assert!(table.rename_column("missing", "x").is_err());
        assert!(table.rename_column("id", "full_name").is_err());
    }

    #[test]
    fn test_drop_column_forgets_dependents() {
        let mut table = users();
        table.foreign_key("name", "people", "name");
        table.drop_column("name");
        assert!(table.current().indexes.is_empty());
        assert!(table.current().foreign_keys.is_empty());
        let diff = table.diff();
        assert_eq!(diff.dropped_columns.len(), 1);
        assert_eq!(diff.dropped_indexes.len(), 1);
    }

    #[test]
    fn test_validate_rejects_unknown_columns() {
        let mut table = users();
        table.index(&["ghost"]);
        assert!(matches!(
            table.validate(),
            Err(SyncError::InvalidSchema { .. })
        ));

        let mut table = users();
        table.set_primary_keys(["id", "name"]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_index_name_collision_gets_a_suffix() {
        let mut table = Table::new("t", "default", Dialect::Sqlite);
        table.integer("a_b");
        table.integer("a");
        table.integer("b");
        table.index(&["a_b"]);
        let name = table.index(&["a", "b"]).name.clone();
        assert_eq!(name, "t_index_a_b_2");

        let indexes: Vec<(&str, &[String])> = table
            .current()
            .indexes
            .values()
            .map(|i| (i.name.as_str(), i.columns.as_slice()))
            .collect();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0], ("t_index_a_b", &["a_b".to_string()][..]));
        assert_eq!(
            indexes[1],
            ("t_index_a_b_2", &["a".to_string(), "b".to_string()][..])
        );

        // Redeclaring either one finds it again.
        assert_eq!(table.index(&["a", "b"]).name, "t_index_a_b_2");
        assert_eq!(table.index(&["a_b"]).name, "t_index_a_b");
        assert_eq!(table.current().indexes.len(), 2);
    }

    #[test]
    fn test_mysql_commit_records_implicit_foreign_key_index() {
        let mut table = Table::new("posts", "default", Dialect::MySql);
        table.primary("id");
        table.integer("user_id");
        table.integer("editor_id");
        table.foreign_key("user_id", "users", "id");
        table.foreign_key("editor_id", "users", "id");
        table.index(&["editor_id"]);
        table.mark_synchronized();

        let fks = &table.initial().foreign_keys;
        assert_eq!(
            fks["user_id"].backing_index.as_deref(),
            Some("posts_foreign_user_id")
        );
        assert_eq!(fks["editor_id"].backing_index, None);
        assert!(!table.has_changes());
    }

    #[test]
    fn test_mark_synchronized_commits_current() {
        let mut table = users();
        table.integer("age");
        table.mark_synchronized();
        assert!(table.initial().has_column("age"));
        assert!(!table.has_changes());

        table.declare_dropped();
        assert!(table.has_changes());
        table.mark_synchronized();
        assert!(!table.exists());
        assert!(!table.is_dropped());
    }
}
