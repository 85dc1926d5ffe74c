//! Declarative schema synchronization for Rust.
//!
//! `oxide-sync` reconciles the schema an application declares with the
//! schema of one or more live databases (SQLite, PostgreSQL, MySQL /
//! MariaDB):
//! - Tables are introspected, reshaped in code, then diffed
//! - Renames are explicit, so data survives them
//! - Tables are ordered by foreign key dependencies, cycles included
//! - DDL runs in four phases, one transaction per database
//!
//! # Architecture
//!
//! - **Schema** - `Table`, `TableState` and the column, index and foreign
//!   key descriptors
//! - **Comparator** - Computes a `TableDiff` between two states
//! - **Dialect** - Database-specific SQL generation
//! - **Introspect** - Reads table structure from database catalogs
//! - **Plan** - Orders operations into phases, without I/O
//! - **Reflector** - Executes plans against the databases
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_sync::prelude::*;
//!
//! let pool = SqlitePoolOptions::new().connect("sqlite:app.db").await?;
//! let mut manager = DatabaseManager::new();
//! manager.add(Database::sqlite("default", pool));
//!
//! let mut users = manager.table("default", "users").await?;
//! users.primary("id");
//! users.string("email", 255).not_null();
//! users.unique(&["email"]);
//!
//! let reflector = Reflector::new(manager);
//! reflector.synchronize(&mut [users]).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show the SQL a synchronization would run
//! oxide-sync --config schema.json plan
//!
//! # Apply the declared schema
//! oxide-sync --config schema.json sync
//!
//! # Print the introspected structure of a table
//! oxide-sync --database sqlite:app.db inspect users
//! ```

pub mod comparator;
pub mod config;
pub mod database;
pub mod dialect;
pub mod error;
pub mod graph;
pub mod introspect;
pub mod operation;
pub mod plan;
pub mod reflector;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::comparator::{Comparator, TableDiff};
    pub use crate::config::{DatabaseConfig, SyncConfig, TableDeclaration};
    pub use crate::database::{Database, DatabaseManager, DatabasePool};
    pub use crate::dialect::{Dialect, Handler};
    pub use crate::error::{Result, SyncError, SyncFailure};
    pub use crate::graph::sort_tables;
    pub use crate::operation::Operation;
    pub use crate::plan::{Phase, Statement, SyncPlan};
    pub use crate::reflector::{Reflector, SyncReport};
    pub use crate::schema::{
        AbstractType, Column, DefaultValue, ForeignKey, ForeignKeyAction, Index, Table,
        TableState,
    };
}
