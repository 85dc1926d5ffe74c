#![allow(dead_code)]

use oxide_sync::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub async fn pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap_or_else(|e| panic!("Failed to open in-memory database: {e}"))
}

pub async fn manager(names: &[&str]) -> DatabaseManager {
    let mut manager = DatabaseManager::new();
    for name in names {
        manager.add(Database::sqlite(*name, pool().await));
    }
    manager
}

pub fn sqlite_pool(manager: &DatabaseManager, database: &str) -> SqlitePool {
    match manager.database(database).unwrap().pool() {
        DatabasePool::Sqlite(pool) => pool.clone(),
        other => panic!("Expected a SQLite pool, got {other:?}"),
    }
}

pub async fn exec(manager: &DatabaseManager, database: &str, sql: &str) {
    sqlx::query(sql)
        .execute(&sqlite_pool(manager, database))
        .await
        .unwrap_or_else(|e| panic!("Failed to execute: {sql}\nError: {e}"));
}

pub async fn count(manager: &DatabaseManager, database: &str, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM \"{table}\""))
        .fetch_one(&sqlite_pool(manager, database))
        .await
        .unwrap_or_else(|e| panic!("Failed to count rows of {table}: {e}"));
    count
}
