//! Column descriptor.

use serde::{Deserialize, Serialize};

use super::types::{AbstractType, DefaultValue};

/// Schema definition for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Dialect-independent type.
    #[serde(rename = "type")]
    pub abstract_type: AbstractType,
    /// Whether the column allows NULL values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Name this column had in the introspected state, if any.
    #[serde(skip)]
    pub(crate) origin: Option<String>,
}

const fn default_nullable() -> bool {
    true
}

impl Column {
    /// Creates a new, nullable column.
    ///
    /// Primary key types are never nullable.
    #[must_use]
    pub fn new(name: impl Into<String>, abstract_type: AbstractType) -> Self {
        let nullable = !abstract_type.is_auto_increment();
        Self {
            name: name.into(),
            abstract_type,
            nullable,
            default: None,
            origin: None,
        }
    }

    /// Changes the abstract type.
    pub fn set_type(&mut self, abstract_type: AbstractType) -> &mut Self {
        if abstract_type.is_auto_increment() {
            self.nullable = false;
            self.default = None;
        }
        self.abstract_type = abstract_type;
        self
    }

    /// Sets nullability.
    pub fn nullable(&mut self, nullable: bool) -> &mut Self {
        self.nullable = nullable && !self.abstract_type.is_auto_increment();
        self
    }

    /// Sets the column as NOT NULL.
    pub fn not_null(&mut self) -> &mut Self {
        self.nullable(false)
    }

    /// Sets the default value.
    pub fn default_value(&mut self, value: DefaultValue) -> &mut Self {
        self.default = Some(value);
        self
    }

    /// Removes the default value.
    pub fn drop_default(&mut self) -> &mut Self {
        self.default = None;
        self
    }

    /// Name of this column in the introspected state, when it existed there.
    #[must_use]
    pub fn initial_name(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Returns true if the column was renamed since introspection.
    #[must_use]
    pub fn is_renamed(&self) -> bool {
        self.origin.as_deref().is_some_and(|origin| origin != self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_columns_are_not_null() {
        let mut col = Column::new("id", AbstractType::Primary);
        assert!(!col.nullable);
        col.nullable(true);
        assert!(!col.nullable);
    }

    #[test]
    fn test_builder_chain() {
        let mut col = Column::new("status", AbstractType::String(16));
        col.not_null()
            .default_value(DefaultValue::String("new".to_string()));
        assert!(!col.nullable);
        assert_eq!(col.default, Some(DefaultValue::String("new".to_string())));

        col.set_type(AbstractType::BigPrimary);
        assert_eq!(col.default, None);
    }

    #[test]
    fn test_deserialize_declaration() {
        let col: Column =
            serde_json::from_str(r#"{"name": "price", "type": "decimal(8,2)"}"#).unwrap();
        assert_eq!(
            col.abstract_type,
            AbstractType::Decimal {
                precision: 8,
                scale: 2
            }
        );
        assert!(col.nullable);
        assert!(col.initial_name().is_none());
    }
}
