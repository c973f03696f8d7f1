//! Session repository
//!
//! Login sessions of the admin sites. A session row backs both the
//! `session` cookie of the HTML pages and the bearer token of the JSON
//! API; its ID is the token itself.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up a session by token, expired or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Remove a session, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every session that expired before `now`, returning how many
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_SESSION: &str = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
const SELECT_SESSION: &str = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";
const DELETE_SESSION: &str = "DELETE FROM sessions WHERE id = ?";
const DELETE_EXPIRED: &str = "DELETE FROM sessions WHERE expires_at < ?";

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(INSERT_SESSION)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(pool)
                    .await
                    .map(|_| ())
            }
            Backend::Mysql(pool) => {
                sqlx::query(INSERT_SESSION)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(pool)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let session = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(SELECT_SESSION)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| {
                    row.map(|row| Session {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        expires_at: row.get("expires_at"),
                        created_at: row.get("created_at"),
                    })
                }),
            Backend::Mysql(pool) => sqlx::query(SELECT_SESSION)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| {
                    row.map(|row| Session {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        expires_at: row.get("expires_at"),
                        created_at: row.get("created_at"),
                    })
                }),
        }
        .context("Failed to get session")?;

        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(DELETE_SESSION)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(DELETE_SESSION)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete session")?;

        Ok(affected > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<i64> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(DELETE_EXPIRED)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(DELETE_EXPIRED)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete expired sessions")?;

        Ok(affected as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{insert_user, migrated_pool};
    use chrono::Duration;

    async fn setup() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = migrated_pool().await;
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    #[tokio::test]
    async fn test_create_get_and_delete_session() {
        let (pool, repo) = setup().await;
        let alice = insert_user(&pool, "alice").await;

        let session = repo.create(&Session::start(alice, 14)).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().expect("session stored");
        assert_eq!(found.user_id, alice);
        assert_eq!(found.expires_at, session.expires_at);

        assert!(repo.delete(&session.id).await.unwrap());
        assert!(!repo.delete(&session.id).await.unwrap());
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_requires_existing_user() {
        let (_pool, repo) = setup().await;
        assert!(repo.create(&Session::start(404, 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_expired_uses_cutoff() {
        let (pool, repo) = setup().await;
        let alice = insert_user(&pool, "alice").await;
        let now = Utc::now();

        let mut stale = Session::start(alice, 1);
        stale.expires_at = now - Duration::minutes(5);
        let mut boundary = Session::start(alice, 1);
        boundary.expires_at = now;
        let fresh = Session::start(alice, 14);
        for session in [&stale, &boundary, &fresh] {
            repo.create(session).await.unwrap();
        }

        assert_eq!(repo.delete_expired(now).await.unwrap(), 1);
        assert!(repo.get_by_id(&stale.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&boundary.id).await.unwrap().is_some());

        assert_eq!(repo.delete_expired(now + Duration::days(2)).await.unwrap(), 1);
        assert!(repo.get_by_id(&fresh.id).await.unwrap().is_some());
    }
}
