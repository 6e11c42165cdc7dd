//! SQLite persistence shared by the credential vault and the correlation
//! store. One database file holds both tables; nothing else in the bot
//! touches storage directly.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::Result;

/// Open (creating if missing) the bot database and run migrations.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests. A single connection keeps the `:memory:`
/// database alive and shared.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new().filename(":memory:");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_credentials (
            user_id INTEGER PRIMARY KEY,
            encrypted_token TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS note_messages (
            chat_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            note_id TEXT NOT NULL,
            kind INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (chat_id, message_id)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
