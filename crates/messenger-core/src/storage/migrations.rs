//! Database migrations
//!
//! Manages the SQLite schema of the messenger. Migrations are versioned and
//! applied automatically on database connection.
//!
//! Timestamps are stored as INTEGER microseconds since the Unix epoch so
//! that range predicates (`created_at < ?`) compare exactly.

use anyhow::Context;
use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Chats, membership and messages
const MIGRATION_V1: &str = r#"
    -- Chats. pair_key is set once a private chat holds both of its members.
    CREATE TABLE IF NOT EXISTS chats (
        id TEXT PRIMARY KEY NOT NULL,
        chat_type TEXT NOT NULL CHECK (chat_type IN ('private', 'group')),
        name TEXT,
        avatar_url TEXT,
        pair_key TEXT UNIQUE,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        CHECK (chat_type = 'group' OR (name IS NULL AND avatar_url IS NULL)),
        CHECK (chat_type = 'private' OR pair_key IS NULL)
    );

    CREATE INDEX IF NOT EXISTS idx_chats_updated_at ON chats(updated_at);

    -- Membership with per-member read position
    CREATE TABLE IF NOT EXISTS chat_members (
        chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        last_read INTEGER,
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (chat_id, user_id)
    );

    CREATE INDEX IF NOT EXISTS idx_chat_members_user_id ON chat_members(user_id);

    -- Messages
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY NOT NULL,
        chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
        sender_id TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_chat_created ON messages(chat_id, created_at);
"#;

/// Migration 2: Message attachments
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS message_attachments (
        message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        url TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'file' CHECK (kind IN ('file', 'image', 'video', 'audio')),
        name TEXT,
        PRIMARY KEY (message_id, position)
    );
"#;

/// Schema steps in application order: (version, description, SQL)
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (1, "Chats, membership and messages", MIGRATION_V1),
    (2, "Message attachments", MIGRATION_V2),
];

/// Highest applied version, 0 for a fresh database
async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the database's version
///
/// Each step and its bookkeeping row commit together, so an interrupted
/// run resumes at the first missing step.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let from = applied_version(pool).await?;
    if from >= CURRENT_VERSION {
        tracing::debug!(version = from, "Database schema is current");
        return Ok(());
    }

    for &(version, description, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > from) {
        tracing::info!(version, description, "Applying migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration v{} ({}) failed", version, description))?;
        sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    tracing::info!(from, to = CURRENT_VERSION, "Database migrated");
    Ok(())
}

/// Compare the database's schema version with the latest one
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = applied_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_resumes_from_recorded_version() {
        let pool = create_test_pool().await;
        sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(&pool).await.unwrap();
        sqlx::raw_sql(MIGRATION_V1).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO _migrations (version) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'message_attachments'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 1);
        assert_eq!(migration_status(&pool).await.unwrap().current_version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_table_is_ordered_and_complete() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|(v, _, _)| *v).collect();
        assert_eq!(versions, (1..=CURRENT_VERSION).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pair_key_is_unique() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let insert = "INSERT INTO chats (id, chat_type, pair_key, created_at, updated_at) VALUES (?, 'private', 'a:b', 0, 0)";
        sqlx::query(insert).bind("c1").execute(&pool).await.unwrap();
        let err = sqlx::query(insert).bind("c2").execute(&pool).await.unwrap_err();

        let db_err = err.as_database_error().expect("expected a database error");
        assert!(db_err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_private_chat_rejects_name() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO chats (id, chat_type, name, created_at, updated_at) VALUES ('c1', 'private', 'nope', 0, 0)",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err());
    }
}
