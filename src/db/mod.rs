//! Database layer
//!
//! Persistence for the admin back office. Two backends are supported:
//! - SQLite (default, single file deployment)
//! - MySQL
//!
//! The backend is chosen from configuration. Repositories receive a
//! `DynDatabasePool` and dispatch on [`Backend`] to the matching SQL.
//!
//! # Usage
//!
//! ```ignore
//! use typeidea::config::DatabaseConfig;
//! use typeidea::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for database tests

    use super::{create_test_pool, migrations, DynDatabasePool};

    /// In-memory SQLite pool with all migrations applied
    pub async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// Insert a staff user and return its ID
    pub async fn insert_user(pool: &DynDatabasePool, username: &str) -> i64 {
        let sqlite = pool.as_sqlite().expect("sqlite pool");
        sqlx::query("INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, ?, ?)")
            .bind(username)
            .bind(format!("{}@example.com", username))
            .bind("hash")
            .bind("staff")
            .execute(sqlite)
            .await
            .expect("Failed to create test user")
            .last_insert_rowid()
    }
}
