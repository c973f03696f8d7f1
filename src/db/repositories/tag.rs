//! Tag repository
//!
//! Database operations for tags.
//!
//! This module provides:
//! - `TagRepository` trait defining the interface for tag data access
//! - `SqlxTagRepository` implementing the trait for SQLite and MySQL

use super::placeholders;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, PagedResult, RecordStatus, Tag};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Insert a new tag, returning it with its ID
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    /// Update an existing tag
    async fn update(&self, tag: &Tag) -> Result<Tag>;

    /// Get tag by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Get the tags with the given IDs, in ID order
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>>;

    /// List tags, newest first
    async fn list(&self, params: &ListParams) -> Result<PagedResult<Tag>>;

    /// All tags ordered by ID, used for the post form choices
    async fn list_all(&self) -> Result<Vec<Tag>>;

    /// Delete tags by ID, returning the number deleted
    async fn delete_many(&self, ids: &[i64]) -> Result<u64>;
}

/// SQLx-based tag repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    /// Create a new SQLx tag repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, status, owner_id, created_time FROM tags";

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let sql = r#"
            INSERT INTO tags (name, status, owner_id, created_time)
            VALUES (?, ?, ?, ?)
        "#;

        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&tag.name)
                .bind(tag.status.value())
                .bind(tag.owner_id)
                .bind(tag.created_time)
                .execute(pool)
                .await
                .context("Failed to create tag")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&tag.name)
                .bind(tag.status.value())
                .bind(tag.owner_id)
                .bind(tag.created_time)
                .execute(pool)
                .await
                .context("Failed to create tag")?
                .last_insert_id() as i64,
        };

        let mut created = tag.clone();
        created.id = id;
        Ok(created)
    }

    async fn update(&self, tag: &Tag) -> Result<Tag> {
        let sql = "UPDATE tags SET name = ?, status = ?, owner_id = ? WHERE id = ?";

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(&tag.name)
                    .bind(tag.status.value())
                        .bind(tag.owner_id)
                    .bind(tag.id)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected())
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(&tag.name)
                    .bind(tag.status.value())
                        .bind(tag.owner_id)
                    .bind(tag.id)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected())
            }
        }
        .context("Failed to update tag")?;

        Ok(tag.clone())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_tag_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_tag_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{} WHERE id IN ({}) ORDER BY id",
            SELECT_COLUMNS,
            placeholders(ids.len())
        );

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                let rows = query
                    .fetch_all(pool)
                    .await
                    .context("Failed to get tags by IDs")?;
                rows.iter().map(row_to_tag_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                let rows = query
                    .fetch_all(pool)
                    .await
                    .context("Failed to get tags by IDs")?;
                rows.iter().map(row_to_tag_mysql).collect()
            }
        }
    }

    async fn list(&self, params: &ListParams) -> Result<PagedResult<Tag>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_tags_sqlite(pool, params).await,
            Backend::Mysql(pool) => list_tags_mysql(pool, params).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<Tag>> {
        let sql = format!("{} ORDER BY id", SELECT_COLUMNS);

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list tags")?;
                rows.iter().map(row_to_tag_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list tags")?;
                rows.iter().map(row_to_tag_mysql).collect()
            }
        }
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM tags WHERE id IN ({})", placeholders(ids.len()));

        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                query.execute(pool).await.map(|r| r.rows_affected())
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                query.execute(pool).await.map(|r| r.rows_affected())
            }
        }
        .context("Failed to delete tags")?;

        Ok(affected)
    }
}

fn parse_status(value: i32) -> Result<RecordStatus> {
    RecordStatus::from_value(value).ok_or_else(|| anyhow!("Invalid tag status in database: {}", value))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_tag_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;

    row.as_ref().map(row_to_tag_sqlite).transpose()
}

async fn list_tags_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<PagedResult<Tag>> {
    let total: i64 = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tags")
        .fetch_one(pool)
        .await
        .context("Failed to count tags")?;

    let rows = sqlx::query(&format!("{} ORDER BY id DESC LIMIT ? OFFSET ?", SELECT_COLUMNS))
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    let items = rows
        .iter()
        .map(row_to_tag_sqlite)
        .collect::<Result<Vec<_>>>()?;

    Ok(PagedResult::new(items, total, params))
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.get("id"),
        name: row.get("name"),
        status: parse_status(row.get("status"))?,
        owner_id: row.get("owner_id"),
        created_time: row.get("created_time"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_tag_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;

    row.as_ref().map(row_to_tag_mysql).transpose()
}

async fn list_tags_mysql(pool: &MySqlPool, params: &ListParams) -> Result<PagedResult<Tag>> {
    let total: i64 = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tags")
        .fetch_one(pool)
        .await
        .context("Failed to count tags")?;

    let rows = sqlx::query(&format!("{} ORDER BY id DESC LIMIT ? OFFSET ?", SELECT_COLUMNS))
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    let items = rows
        .iter()
        .map(row_to_tag_mysql)
        .collect::<Result<Vec<_>>>()?;

    Ok(PagedResult::new(items, total, params))
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Tag> {
    Ok(Tag {
        id: row.get("id"),
        name: row.get("name"),
        status: parse_status(row.get("status"))?,
        owner_id: row.get("owner_id"),
        created_time: row.get("created_time"),
    })
}
