//! Category repository
//!
//! Database operations for categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `CategoryPostChange`, an edit to one of a category's posts that is
//!   saved together with the category
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL

use super::placeholders;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, ListParams, PagedResult, Post, RecordStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// An edit to one post of a category
#[derive(Debug, Clone)]
pub enum CategoryPostChange {
    /// New title and description for a post already in the category
    Update { id: i64, title: String, desc: String },
    /// Remove a post of the category
    Delete(i64),
    /// Insert a post; its `category_id` is replaced by the saved category's ID
    Create(Post),
}

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert a new category, returning it with its ID
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Update an existing category
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get the categories with the given IDs, in ID order
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Category>>;

    /// List categories, newest first
    async fn list(&self, params: &ListParams) -> Result<PagedResult<Category>>;

    /// All categories ordered by ID
    async fn list_all(&self) -> Result<Vec<Category>>;

    /// Categories owned by a user, ordered by ID
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Category>>;

    /// Delete categories by ID, returning the number deleted
    async fn delete_many(&self, ids: &[i64]) -> Result<u64>;

    /// Insert the category (when its ID is 0) or update it, then apply
    /// `posts` to its posts. Either everything is stored or nothing is.
    async fn save_with_posts(&self, category: &Category, posts: &[CategoryPostChange]) -> Result<Category>;
}

/// SQLx-based category repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, status, is_nav, owner_id, created_time FROM categories";

const INSERT_CATEGORY: &str = r#"
    INSERT INTO categories (name, status, is_nav, owner_id, created_time)
    VALUES (?, ?, ?, ?, ?)
"#;

const UPDATE_CATEGORY: &str = "UPDATE categories SET name = ?, status = ?, is_nav = ?, owner_id = ? WHERE id = ?";

const INSERT_POST: &str = r#"
    INSERT INTO posts (title, description, content, status, category_id, owner_id, created_time)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_POST: &str = "UPDATE posts SET title = ?, description = ? WHERE id = ? AND category_id = ?";

const DELETE_POST: &str = "DELETE FROM posts WHERE id = ? AND category_id = ?";

const TAG_POST: &str = "INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)";

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let sql = INSERT_CATEGORY;

        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&category.name)
                .bind(category.status.value())
                .bind(category.is_nav)
                .bind(category.owner_id)
                .bind(category.created_time)
                .execute(pool)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&category.name)
                .bind(category.status.value())
                .bind(category.is_nav)
                .bind(category.owner_id)
                .bind(category.created_time)
                .execute(pool)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };

        let mut created = category.clone();
        created.id = id;
        Ok(created)
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let sql = UPDATE_CATEGORY;

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(category.status.value())
                    .bind(category.is_nav)
                    .bind(category.owner_id)
                    .bind(category.id)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected())
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(category.status.value())
                    .bind(category.is_nav)
                    .bind(category.owner_id)
                    .bind(category.id)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected())
            }
        }
        .context("Failed to update category")?;

        Ok(category.clone())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_category_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_category_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Category>> {
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
                    .context("Failed to get categories by IDs")?;
                rows.iter().map(row_to_category_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                let rows = query
                    .fetch_all(pool)
                    .await
                    .context("Failed to get categories by IDs")?;
                rows.iter().map(row_to_category_mysql).collect()
            }
        }
    }

    async fn list(&self, params: &ListParams) -> Result<PagedResult<Category>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_categories_sqlite(pool, params).await,
            Backend::Mysql(pool) => list_categories_mysql(pool, params).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<Category>> {
        let sql = format!("{} ORDER BY id", SELECT_COLUMNS);

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories")?;
                rows.iter().map(row_to_category_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories")?;
                rows.iter().map(row_to_category_mysql).collect()
            }
        }
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Category>> {
        let sql = format!("{} WHERE owner_id = ? ORDER BY id", SELECT_COLUMNS);

        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(owner_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories by owner")?;
                rows.iter().map(row_to_category_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(owner_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list categories by owner")?;
                rows.iter().map(row_to_category_mysql).collect()
            }
        }
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM categories WHERE id IN ({})", placeholders(ids.len()));

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
        .context("Failed to delete categories")?;

        Ok(affected)
    }

    async fn save_with_posts(&self, category: &Category, posts: &[CategoryPostChange]) -> Result<Category> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => save_with_posts_sqlite(pool, category, posts).await,
            Backend::Mysql(pool) => save_with_posts_mysql(pool, category, posts).await,
        }
    }
}

fn parse_status(value: i32) -> Result<RecordStatus> {
    RecordStatus::from_value(value).ok_or_else(|| anyhow!("Invalid category status in database: {}", value))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_category_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Category>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get category by ID")?;

    row.as_ref().map(row_to_category_sqlite).transpose()
}

async fn save_with_posts_sqlite(
    pool: &SqlitePool,
    category: &Category,
    posts: &[CategoryPostChange],
) -> Result<Category> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut saved = category.clone();

    if category.id == 0 {
        saved.id = sqlx::query(INSERT_CATEGORY)
            .bind(&category.name)
            .bind(category.status.value())
            .bind(category.is_nav)
            .bind(category.owner_id)
            .bind(category.created_time)
            .execute(&mut *tx)
            .await
            .context("Failed to create category")?
            .last_insert_rowid();
    } else {
        sqlx::query(UPDATE_CATEGORY)
            .bind(&category.name)
            .bind(category.status.value())
            .bind(category.is_nav)
            .bind(category.owner_id)
            .bind(category.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update category")?;
    }

    for change in posts {
        match change {
            CategoryPostChange::Update { id, title, desc } => {
                sqlx::query(UPDATE_POST)
                    .bind(title)
                    .bind(desc)
                    .bind(*id)
                    .bind(saved.id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update category post")?;
            }
            CategoryPostChange::Delete(id) => {
                sqlx::query(DELETE_POST)
                    .bind(*id)
                    .bind(saved.id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete category post")?;
            }
            CategoryPostChange::Create(post) => {
                let post_id = sqlx::query(INSERT_POST)
                    .bind(&post.title)
                    .bind(&post.desc)
                    .bind(&post.content)
                    .bind(post.status.value())
                    .bind(saved.id)
                    .bind(post.owner_id)
                    .bind(post.created_time)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create category post")?
                    .last_insert_rowid();

                for tag_id in &post.tag_ids {
                    sqlx::query(TAG_POST)
                        .bind(post_id)
                        .bind(*tag_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to tag post")?;
                }
            }
        }
    }

    tx.commit().await.context("Failed to commit category")?;
    Ok(saved)
}

async fn list_categories_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<PagedResult<Category>> {
    let total: i64 = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await
        .context("Failed to count categories")?;

    let rows = sqlx::query(&format!("{} ORDER BY id DESC LIMIT ? OFFSET ?", SELECT_COLUMNS))
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list categories")?;

    let items = rows
        .iter()
        .map(row_to_category_sqlite)
        .collect::<Result<Vec<_>>>()?;

    Ok(PagedResult::new(items, total, params))
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.get("id"),
        name: row.get("name"),
        status: parse_status(row.get("status"))?,
        is_nav: row.get("is_nav"),
        owner_id: row.get("owner_id"),
        created_time: row.get("created_time"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_category_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Category>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get category by ID")?;

    row.as_ref().map(row_to_category_mysql).transpose()
}

async fn save_with_posts_mysql(
    pool: &MySqlPool,
    category: &Category,
    posts: &[CategoryPostChange],
) -> Result<Category> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut saved = category.clone();

    if category.id == 0 {
        saved.id = sqlx::query(INSERT_CATEGORY)
            .bind(&category.name)
            .bind(category.status.value())
            .bind(category.is_nav)
            .bind(category.owner_id)
            .bind(category.created_time)
            .execute(&mut *tx)
            .await
            .context("Failed to create category")?
            .last_insert_id() as i64;
    } else {
        sqlx::query(UPDATE_CATEGORY)
            .bind(&category.name)
            .bind(category.status.value())
            .bind(category.is_nav)
            .bind(category.owner_id)
            .bind(category.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update category")?;
    }

    for change in posts {
        match change {
            CategoryPostChange::Update { id, title, desc } => {
                sqlx::query(UPDATE_POST)
                    .bind(title)
                    .bind(desc)
                    .bind(*id)
                    .bind(saved.id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update category post")?;
            }
            CategoryPostChange::Delete(id) => {
                sqlx::query(DELETE_POST)
                    .bind(*id)
                    .bind(saved.id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete category post")?;
            }
            CategoryPostChange::Create(post) => {
                let post_id = sqlx::query(INSERT_POST)
                    .bind(&post.title)
                    .bind(&post.desc)
                    .bind(&post.content)
                    .bind(post.status.value())
                    .bind(saved.id)
                    .bind(post.owner_id)
                    .bind(post.created_time)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create category post")?
                    .last_insert_id() as i64;

                for tag_id in &post.tag_ids {
                    sqlx::query(TAG_POST)
                        .bind(post_id)
                        .bind(*tag_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to tag post")?;
                }
            }
        }
    }

    tx.commit().await.context("Failed to commit category")?;
    Ok(saved)
}

async fn list_categories_mysql(pool: &MySqlPool, params: &ListParams) -> Result<PagedResult<Category>> {
    let total: i64 = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await
        .context("Failed to count categories")?;

    let rows = sqlx::query(&format!("{} ORDER BY id DESC LIMIT ? OFFSET ?", SELECT_COLUMNS))
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list categories")?;

    let items = rows
        .iter()
        .map(row_to_category_mysql)
        .collect::<Result<Vec<_>>>()?;

    Ok(PagedResult::new(items, total, params))
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Category> {
    Ok(Category {
        id: row.get("id"),
        name: row.get("name"),
        status: parse_status(row.get("status"))?,
        is_nav: row.get("is_nav"),
        owner_id: row.get("owner_id"),
        created_time: row.get("created_time"),
    })
}
