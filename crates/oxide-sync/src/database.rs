//! Database connections and transactional DDL execution.
//!
//! A [`Database`] is one named connection group: a pool plus the dialect
//! inferred from its URL. All statements planned for a group run inside a
//! single transaction on a single pooled connection.

use indexmap::{IndexMap, IndexSet};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Connection;
use tracing::{debug, info, warn};

use crate::config::{DatabaseConfig, SyncConfig};
use crate::dialect::Dialect;
use crate::error::{Result, SyncError};
use crate::introspect::{Introspector, MySqlIntrospector, PostgresIntrospector, SqliteIntrospector};
use crate::plan::Statement;
use crate::schema::{Table, TableState};

/// Tables carrying a foreign key that could be violated by changes to `?1`.
const CONSTRAINED_TABLES: &str = "SELECT DISTINCT m.name FROM sqlite_master m \
     JOIN pragma_foreign_key_list(m.name) f \
     WHERE m.type = 'table' AND (m.name = ?1 OR f.\"table\" = ?1)";

const FOREIGN_KEY_CHECK: &str = "SELECT \"table\", parent FROM pragma_foreign_key_check(?1)";

/// Connection pool of one of the supported dialects.
#[derive(Debug, Clone)]
pub enum DatabasePool {
    /// SQLite pool.
    Sqlite(SqlitePool),
    /// PostgreSQL pool.
    Postgres(PgPool),
    /// MySQL / MariaDB pool.
    MySql(MySqlPool),
}

impl DatabasePool {
    /// Dialect of the pool.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite(_) => Dialect::Sqlite,
            Self::Postgres(_) => Dialect::Postgres,
            Self::MySql(_) => Dialect::MySql,
        }
    }
}

/// A named database (connection group).
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    pool: DatabasePool,
}

impl Database {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(name: impl Into<String>, pool: DatabasePool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    /// Wraps an existing SQLite pool.
    #[must_use]
    pub fn sqlite(name: impl Into<String>, pool: SqlitePool) -> Self {
        Self::new(name, DatabasePool::Sqlite(pool))
    }

    /// Wraps an existing PostgreSQL pool.
    #[must_use]
    pub fn postgres(name: impl Into<String>, pool: PgPool) -> Self {
        Self::new(name, DatabasePool::Postgres(pool))
    }

    /// Wraps an existing MySQL pool.
    #[must_use]
    pub fn mysql(name: impl Into<String>, pool: MySqlPool) -> Self {
        Self::new(name, DatabasePool::MySql(pool))
    }

    /// Connects using a configuration entry. The dialect is selected from
    /// the URL scheme.
    pub async fn connect(name: impl Into<String>, config: &DatabaseConfig) -> Result<Self> {
        let name = name.into();
        let dialect = Dialect::from_url(&config.url)?;
        info!(database = %name, dialect = %dialect, "Connecting");

        let pool = match dialect {
            Dialect::Sqlite => DatabasePool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.url)
                    .await?,
            ),
            Dialect::Postgres => DatabasePool::Postgres(
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.url)
                    .await?,
            ),
            Dialect::MySql => DatabasePool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.url)
                    .await?,
            ),
        };
        Ok(Self::new(name, pool))
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.pool.dialect()
    }

    /// Returns the connection pool.
    #[must_use]
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Reads the current structure of a table. Missing tables are empty.
    pub async fn introspect(&self, table: &str) -> Result<TableState> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => SqliteIntrospector.introspect(pool, table).await,
            DatabasePool::Postgres(pool) => PostgresIntrospector.introspect(pool, table).await,
            DatabasePool::MySql(pool) => MySqlIntrospector.introspect(pool, table).await,
        }
    }

    /// Introspects a table and wraps it in a schema object owned by this
    /// database.
    pub async fn table(&self, name: &str) -> Result<Table> {
        let state = self.introspect(name).await?;
        Ok(Table::from_state(state, self.name.clone(), self.dialect()))
    }

    /// Runs statements in one transaction. On failure the transaction is
    /// rolled back and the first error is returned.
    pub(crate) async fn execute(&self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        match &self.pool {
            DatabasePool::Sqlite(pool) => self.execute_sqlite(pool, statements).await,
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                for statement in statements {
                    debug!(
                        database = %self.name,
                        table = %statement.table,
                        phase = %statement.phase,
                        sql = %statement.sql,
                        "Executing"
                    );
                    if let Err(source) = sqlx::query(&statement.sql).execute(&mut *tx).await {
                        self.rollback(tx.rollback().await);
                        return Err(self.ddl_error(statement, source));
                    }
                }
                tx.commit().await?;
                Ok(())
            }
            DatabasePool::MySql(pool) => {
                warn!(
                    database = %self.name,
                    "MySQL commits DDL implicitly; a failed group may be partially applied"
                );
                let mut tx = pool.begin().await?;
                for statement in statements {
                    debug!(
                        database = %self.name,
                        table = %statement.table,
                        phase = %statement.phase,
                        sql = %statement.sql,
                        "Executing"
                    );
                    if let Err(source) = sqlx::query(&statement.sql).execute(&mut *tx).await {
                        self.rollback(tx.rollback().await);
                        return Err(self.ddl_error(statement, source));
                    }
                }
                tx.commit().await?;
                Ok(())
            }
        }
    }

    /// SQLite cannot toggle foreign key enforcement inside a transaction,
    /// so it is switched off on the connection around it and the
    /// constraints are verified before committing.
    async fn execute_sqlite(&self, pool: &SqlitePool, statements: &[Statement]) -> Result<()> {
        let mut conn = pool.acquire().await?;
        let (enforced,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&mut *conn)
            .await?;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await?;

        let result = self.run_sqlite(&mut *conn, statements).await;

        if enforced != 0 {
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&mut *conn)
                .await?;
        }
        result
    }

    async fn run_sqlite(&self, conn: &mut SqliteConnection, statements: &[Statement]) -> Result<()> {
        let mut tx = Connection::begin(conn).await?;
        for statement in statements {
            debug!(
                database = %self.name,
                table = %statement.table,
                phase = %statement.phase,
                sql = %statement.sql,
                "Executing"
            );
            if let Err(source) = sqlx::query(&statement.sql).execute(&mut *tx).await {
                self.rollback(tx.rollback().await);
                return Err(self.ddl_error(statement, source));
            }
        }

        // Only tables this group touched, or whose keys point at them, are
        // checked. Unrelated violations already in the file are not ours.
        let mut constrained: IndexSet<String> = IndexSet::new();
        let touched: IndexSet<&str> = statements.iter().map(|s| s.table.as_str()).collect();
        for table in touched {
            let rows: Vec<(String,)> = sqlx::query_as(CONSTRAINED_TABLES)
                .bind(table)
                .fetch_all(&mut *tx)
                .await?;
            constrained.extend(rows.into_iter().map(|(name,)| name));
        }

        let mut violations: Vec<(String, String)> = Vec::new();
        for table in &constrained {
            let rows: Vec<(String, String)> = sqlx::query_as(FOREIGN_KEY_CHECK)
                .bind(table.as_str())
                .fetch_all(&mut *tx)
                .await?;
            violations.extend(rows);
        }
        if let Some((table, parent)) = violations.first() {
            let (table, parent) = (table.clone(), parent.clone());
            self.rollback(tx.rollback().await);
            return Err(SyncError::DdlExecution {
                database: self.name.clone(),
                table: table.clone(),
                sql: FOREIGN_KEY_CHECK.to_string(),
                source: sqlx::Error::Protocol(format!(
                    "{} row(s) violate foreign keys, first in '{table}' referencing '{parent}'",
                    violations.len()
                )),
            });
        }

        tx.commit().await?;
        Ok(())
    }

    fn ddl_error(&self, statement: &Statement, source: sqlx::Error) -> SyncError {
        SyncError::DdlExecution {
            database: self.name.clone(),
            table: statement.table.clone(),
            sql: statement.sql.clone(),
            source,
        }
    }

    fn rollback(&self, result: std::result::Result<(), sqlx::Error>) {
        match result {
            Ok(()) => info!(database = %self.name, "Rolled back"),
            Err(e) => warn!(database = %self.name, error = %e, "Rollback failed"),
        }
    }
}

/// Registry of named databases.
#[derive(Debug, Clone, Default)]
pub struct DatabaseManager {
    databases: IndexMap<String, Database>,
}

impl DatabaseManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects every database of a configuration.
    pub async fn from_config(config: &SyncConfig) -> Result<Self> {
        let mut manager = Self::new();
        for (name, database) in &config.databases {
            manager.add(Database::connect(name.clone(), database).await?);
        }
        Ok(manager)
    }

    /// Registers a database, replacing any database with the same name.
    pub fn add(&mut self, database: Database) -> &mut Self {
        self.databases.insert(database.name.clone(), database);
        self
    }

    /// Gets a database by name.
    pub fn database(&self, name: &str) -> Result<&Database> {
        self.databases
            .get(name)
            .ok_or_else(|| SyncError::UnknownDatabase(name.to_string()))
    }

    /// Returns true if the database is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Registered databases, in registration order.
    pub fn databases(&self) -> impl Iterator<Item = &Database> {
        self.databases.values()
    }

    /// Introspects a table of a registered database.
    pub async fn table(&self, database: &str, name: &str) -> Result<Table> {
        self.database(database)?.table(name).await
    }
}
