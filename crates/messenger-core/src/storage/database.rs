//! SQLite connection pool
//!
//! File databases run in WAL mode with a busy timeout so that concurrent
//! senders opening the same private chat queue up instead of failing.

use crate::storage::migrations;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MEMORY_PATH: &str = ":memory:";

/// How to open the messenger database
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    pub max_connections: u32,
    /// Apply pending migrations on open
    pub auto_migrate: bool,
    /// How long a writer waits for a locked database
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
            auto_migrate: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Private in-memory database on a single connection
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout);

        if self.is_in_memory() {
            options.in_memory(true)
        } else {
            options
                .filename(&self.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        }
    }
}

/// Default database location under the platform data directory
pub fn default_database_path() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("messenger").join("messenger.db"),
        None => PathBuf::from("messenger.db"),
    }
}

/// Row counts of the main tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub chats: i64,
    pub memberships: i64,
    pub messages: i64,
}

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    /// Open (and by default migrate) the database described by `config`
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if !config.is_in_memory() {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
            }
        }

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_in_memory() {
            // Dropping the only connection would drop the schema with it
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options())
            .await
            .with_context(|| format!("Failed to open database: {}", config.path.display()))?;

        let db = Self { pool, config };
        if db.config.auto_migrate {
            db.migrate().await?;
        }

        tracing::debug!(path = %db.config.path.display(), "Database ready");
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .context("Failed to run database migrations")
    }

    pub async fn migration_status(&self) -> Result<migrations::MigrationStatus> {
        migrations::migration_status(&self.pool)
            .await
            .context("Failed to check migration status")
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    /// Count chats, memberships and messages
    pub async fn stats(&self) -> Result<StoreStats> {
        let (chats, memberships, messages): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM chats),
                   (SELECT COUNT(*) FROM chat_members),
                   (SELECT COUNT(*) FROM messages)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count stored rows")?;

        Ok(StoreStats {
            chats,
            memberships,
            messages,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
