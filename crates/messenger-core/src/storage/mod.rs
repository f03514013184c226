//! Storage layer - SQLite
//!
//! Provides database management and migrations for the messenger.
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//! - `codec`: Column encodings shared by the repositories
//!
//! # Usage
//!
//! ```ignore
//! use messenger_core::storage::Database;
//!
//! // Create an in-memory database for testing
//! let db = Database::in_memory().await?;
//! ```

pub mod codec;
pub mod database;
pub mod migrations;

// Re-export commonly used types
pub use database::{Database, DatabaseConfig, StoreStats, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
