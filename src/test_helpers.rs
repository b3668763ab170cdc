use anyhow::Result;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;

/// Creates an in-memory SQLite pool with the auth schema applied
pub async fn create_test_pool() -> Result<SqlitePool> {
    let pool = create_test_pool_no_schema().await?;
    crate::db::init_schema(&pool).await?;
    Ok(pool)
}

/// Creates an in-memory SQLite pool without the schema
pub async fn create_test_pool_no_schema() -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1) // In-memory databases should use a single connection
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}
