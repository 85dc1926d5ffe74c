//! The synchronization engine.
//!
//! A [`Reflector`] plans a run over a set of tables, then executes each
//! connection group in its own transaction. Groups are independent: a
//! failure rolls back its own group only, and the tables of committed
//! groups adopt their declared state.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::comparator::TableDiff;
use crate::database::DatabaseManager;
use crate::error::{Result, SyncError, SyncFailure};
use crate::plan::{Statement, SyncPlan};
use crate::schema::Table;

/// What a run did to one connection group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    /// Database name.
    pub database: String,
    /// Tables of the group, in dependency order.
    pub tables: Vec<String>,
    /// Statements run (or, in a dry run, that would have run).
    pub statements: Vec<Statement>,
    /// Whether the statements were committed.
    pub committed: bool,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Groups, in execution order.
    pub groups: Vec<GroupReport>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl SyncReport {
    /// Number of statements across all groups.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.groups.iter().map(|g| g.statements.len()).sum()
    }

    /// Returns true if nothing had to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statement_count() == 0
    }
}

/// Synchronizes declared tables with their databases.
#[derive(Debug, Clone)]
pub struct Reflector {
    manager: DatabaseManager,
    dry_run: bool,
}

impl Reflector {
    /// Creates a reflector over a set of databases.
    #[must_use]
    pub fn new(manager: DatabaseManager) -> Self {
        Self {
            manager,
            dry_run: false,
        }
    }

    /// Enables dry-run mode: statements are planned and reported but not
    /// executed, and tables keep their pending changes.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the database registry.
    #[must_use]
    pub fn manager(&self) -> &DatabaseManager {
        &self.manager
    }

    /// Computes the pending changes of one table.
    #[must_use]
    pub fn diff(&self, table: &Table) -> TableDiff {
        table.diff()
    }

    /// Plans a run without executing anything.
    pub fn plan(&self, tables: &[Table]) -> Result<SyncPlan> {
        self.check_databases(tables)?;
        SyncPlan::build(tables)
    }

    /// Every table must belong to a registered database of its dialect.
    fn check_databases(&self, tables: &[Table]) -> Result<()> {
        for table in tables {
            let database = self.manager.database(table.database())?;
            if database.dialect() != table.dialect() {
                return Err(SyncError::invalid_schema(
                    table.name(),
                    format!(
                        "declared for {} but database '{}' is {}",
                        table.dialect(),
                        database.name(),
                        database.dialect()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Brings every table to its declared state.
    ///
    /// Nothing is executed if planning fails (invalid declaration, passive
    /// table with changes, unknown database). Otherwise each group runs in
    /// one transaction; if any group fails, the error lists the groups
    /// that committed and the first error of each group that did not.
    pub async fn synchronize(&self, tables: &mut [Table]) -> Result<SyncReport> {
        let plan = self.plan(tables)?;
        let mut report = SyncReport {
            groups: Vec::with_capacity(plan.groups.len()),
            dry_run: self.dry_run,
        };
        let mut committed = Vec::new();
        let mut failed = Vec::new();

        for group in plan.groups {
            let mut group_report = GroupReport {
                database: group.database.clone(),
                tables: group.tables.clone(),
                statements: group.statements.clone(),
                committed: false,
            };

            if group.is_empty() {
                debug!(database = %group.database, "Nothing to synchronize");
                report.groups.push(group_report);
                continue;
            }
            if self.dry_run {
                info!(
                    database = %group.database,
                    statements = group.statements.len(),
                    "Dry run, skipping execution"
                );
                report.groups.push(group_report);
                continue;
            }

            info!(
                database = %group.database,
                tables = group.tables.len(),
                statements = group.statements.len(),
                "Synchronizing"
            );
            let database = self.manager.database(&group.database)?;
            match database.execute(&group.statements).await {
                Ok(()) => {
                    for &i in &group.members {
                        tables[i].mark_synchronized();
                    }
                    info!(database = %group.database, "Committed");
                    group_report.committed = true;
                    committed.push(group.database);
                }
                Err(e) => {
                    warn!(database = %group.database, error = %e, "Synchronization failed");
                    failed.push((group.database, e));
                }
            }
            report.groups.push(group_report);
        }

        if !failed.is_empty() {
            return Err(SyncError::Synchronization(SyncFailure { committed, failed }));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::dialect::Dialect;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn reflector() -> Reflector {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        let mut manager = DatabaseManager::new();
        manager.add(Database::sqlite("default", pool));
        Reflector::new(manager)
    }

    fn users() -> Table {
        let mut users = Table::new("users", "default", Dialect::Sqlite);
        users.primary("id");
        users.string("email", 255).not_null();
        users
    }

    #[tokio::test]
    async fn test_synchronize_commits_and_is_idempotent() {
        let reflector = reflector().await;
        let mut tables = vec![users()];

        let report = reflector.synchronize(&mut tables).await.unwrap();
        assert!(report.groups[0].committed);
        assert_eq!(report.statement_count(), 1);
        assert!(!tables[0].has_changes());

        let report = reflector.synchronize(&mut tables).await.unwrap();
        assert!(report.is_empty());
        assert!(!report.groups[0].committed);
    }

    #[tokio::test]
    async fn test_dry_run_keeps_changes_pending() {
        let reflector = reflector().await.dry_run(true);
        let mut tables = vec![users()];

        let report = reflector.synchronize(&mut tables).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.statement_count(), 1);
        assert!(tables[0].has_changes());

        let db = reflector.manager().database("default").unwrap();
        assert!(!db.table("users").await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_unknown_database() {
        let reflector = reflector().await;
        let mut table = Table::new("logs", "archive", Dialect::Sqlite);
        table.primary("id");
        assert!(matches!(
            reflector.synchronize(&mut [table]).await,
            Err(SyncError::UnknownDatabase(name)) if name == "archive"
        ));
    }

    #[tokio::test]
    async fn test_dialect_mismatch() {
        let reflector = reflector().await;
        let mut table = Table::new("logs", "default", Dialect::Postgres);
        table.primary("id");
        assert!(matches!(
            reflector.plan(&[table]),
            Err(SyncError::InvalidSchema { .. })
        ));
    }
}
