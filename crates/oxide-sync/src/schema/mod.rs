//! Schema descriptors.
//!
//! Columns, indexes and foreign keys describe one table structure; a
//! [`TableState`] groups them and a [`Table`] pairs the introspected state
//! with the declared one.

mod column;
mod foreign_key;
mod index;
mod state;
mod table;
mod types;

pub use column::Column;
pub use foreign_key::ForeignKey;
pub use index::Index;
pub use state::TableState;
pub use table::Table;
pub use types::{quote_literal, AbstractType, DefaultValue, ForeignKeyAction};
