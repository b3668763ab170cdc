use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

const GUILDPOLL_DB_FILENAME: &str = "guildpoll.db";

/// Initialize the auth database, creating the schema as needed.
pub async fn init_pool() -> Result<(SqlitePool, PathBuf)> {
    let db_root = std::env::var("GUILDPOLL_DB_PATH")
        .context("GUILDPOLL_DB_PATH environment variable must be set")?;

    let db_root_path = normalize_path(db_root)?;
    std::fs::create_dir_all(&db_root_path)
        .with_context(|| format!("failed to create DB path: {}", db_root_path.display()))?;

    let db_path = db_root_path.join(GUILDPOLL_DB_FILENAME);
    let db_uri = format!("sqlite://{}", db_path.to_string_lossy());

    let connect_options = SqliteConnectOptions::from_str(&db_uri)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    init_schema(&pool).await?;

    Ok((pool, db_root_path))
}

/// Create the communities / members / login-tokens tables if they do not
/// already exist. Safe to run on every startup.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS communities (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            external_community_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (platform, external_community_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS community_members (
            id TEXT PRIMARY KEY,
            community_id TEXT NOT NULL REFERENCES communities(id),
            platform TEXT NOT NULL,
            external_user_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            role_ids TEXT NOT NULL DEFAULT '[]',
            joined_at INTEGER,
            banned INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            UNIQUE (community_id, platform, external_user_id)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS login_tokens (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES community_members(id),
            secret_hash TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            used_at INTEGER,
            revoked_at INTEGER
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_login_tokens_member ON login_tokens(member_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub(crate) fn normalize_path<P: Into<PathBuf>>(path: P) -> Result<PathBuf> {
    let path = path.into();
    if path.is_absolute() {
        return Ok(path);
    }

    let cwd = std::env::current_dir().context("failed to read current working directory")?;
    Ok(cwd.join(path))
}
