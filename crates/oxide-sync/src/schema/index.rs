//! Index descriptor.

use serde::{Deserialize, Serialize};

/// Schema definition for an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Columns included in the index, in order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
    #[serde(skip)]
    pub(crate) origin: Option<String>,
}

impl Index {
    /// Creates a new non-unique index.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
            origin: None,
        }
    }

    /// Generates the deterministic index name for a column list.
    #[must_use]
    pub fn generate_name(table: &str, columns: &[String]) -> String {
        format!("{}_index_{}", table, columns.join("_"))
    }

    /// Sets uniqueness.
    pub fn unique(&mut self, unique: bool) -> &mut Self {
        self.unique = unique;
        self
    }

    /// Returns true if this index covers exactly the given columns.
    #[must_use]
    pub fn covers<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a == b.as_ref())
    }

    /// Returns true if the index includes the given column.
    #[must_use]
    pub fn includes(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Compares structure (name, columns, uniqueness), ignoring identity.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.name == other.name && self.columns == other.columns && self.unique == other.unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name() {
        let cols = vec!["user_id".to_string(), "created_at".to_string()];
        assert_eq!(
            Index::generate_name("posts", &cols),
            "posts_index_user_id_created_at"
        );
    }

    #[test]
    fn test_covers_is_order_sensitive() {
        let idx = Index::new("i", vec!["a".into(), "b".into()]);
        assert!(idx.covers(&["a", "b"]));
        assert!(!idx.covers(&["b", "a"]));
        assert!(!idx.covers(&["a"]));
        assert!(idx.includes("b"));
    }
}
