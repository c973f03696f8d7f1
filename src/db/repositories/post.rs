//! Post repository
//!
//! Database operations for posts and their tag associations.
//!
//! This module provides:
//! - `PostQuery`, the filter set the admin narrows before listing,
//!   fetching or deleting posts
//! - `PostRepository` trait defining the interface for post data access
//! - `SqlxPostRepository` implementing the trait for SQLite and MySQL

use super::placeholders;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, PagedResult, Post, PostStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, MySqlPool, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Filters applied to the `posts` table.
///
/// Every condition narrows the set. Search terms must each match the
/// post title or its category name, case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostQuery {
    /// Only posts owned by this user
    pub owner_id: Option<i64>,
    /// Only posts in this category
    pub category_id: Option<i64>,
    /// Words that must all appear in the title or category name
    pub search_terms: Vec<String>,
    /// Only posts with these IDs
    pub ids: Option<Vec<i64>>,
}

impl PostQuery {
    /// Every post
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to posts owned by `owner_id`
    pub fn owned_by(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Restrict to posts in `category_id`
    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Require every term to match the title or category name
    pub fn search<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_terms.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Restrict to the given post IDs
    pub fn with_ids(mut self, ids: &[i64]) -> Self {
        self.ids = Some(ids.to_vec());
        self
    }

    /// Build the WHERE clause (empty when unfiltered) and its bind values
    fn where_clause(&self) -> (String, Vec<BindValue>) {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        if let Some(owner_id) = self.owner_id {
            conditions.push("p.owner_id = ?".to_string());
            binds.push(BindValue::Int(owner_id));
        }

        if let Some(category_id) = self.category_id {
            conditions.push("p.category_id = ?".to_string());
            binds.push(BindValue::Int(category_id));
        }

        for term in &self.search_terms {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            conditions.push(
                "(LOWER(p.title) LIKE ? ESCAPE '!' OR LOWER(c.name) LIKE ? ESCAPE '!')".to_string(),
            );
            binds.push(BindValue::Text(pattern.clone()));
            binds.push(BindValue::Text(pattern));
        }

        if let Some(ids) = &self.ids {
            if ids.is_empty() {
                conditions.push("1 = 0".to_string());
            } else {
                conditions.push(format!("p.id IN ({})", placeholders(ids.len())));
                binds.extend(ids.iter().copied().map(BindValue::Int));
            }
        }

        if conditions.is_empty() {
            (String::new(), binds)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), binds)
        }
    }
}

/// Escape LIKE wildcards using `!` as the escape character
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BindValue {
    Int(i64),
    Text(String),
}

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [BindValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &'q [BindValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a new post with its tags
    async fn create(&self, post: &Post) -> Result<Post>;

    /// Update a post and replace its tags
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Get a post by ID, only if it matches `query`
    async fn get(&self, query: &PostQuery, id: i64) -> Result<Option<Post>>;

    /// List matching posts, newest first
    async fn list(&self, query: &PostQuery, params: &ListParams) -> Result<PagedResult<Post>>;

    /// Count matching posts
    async fn count(&self, query: &PostQuery) -> Result<i64>;

    /// All posts of a category, newest first
    async fn list_by_category(&self, category_id: i64) -> Result<Vec<Post>>;

    /// Delete the posts matching `query`, returning the number deleted
    async fn delete(&self, query: &PostQuery) -> Result<u64>;
}

/// SQLx-based post repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    /// Create a new SQLx post repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_POSTS: &str = r#"
    SELECT p.id, p.title, p.description, p.content, p.status, p.category_id, p.owner_id, p.created_time
    FROM posts p
    INNER JOIN categories c ON c.id = p.category_id
"#;

const COUNT_POSTS: &str = r#"
    SELECT COUNT(*) AS total
    FROM posts p
    INNER JOIN categories c ON c.id = p.category_id
"#;

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_post_sqlite(pool, post).await,
            Backend::Mysql(pool) => create_post_mysql(pool, post).await,
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_post_sqlite(pool, post).await,
            Backend::Mysql(pool) => update_post_mysql(pool, post).await,
        }
    }

    async fn get(&self, query: &PostQuery, id: i64) -> Result<Option<Post>> {
        let query = query.clone().with_ids(&[id]);
        let page = self.list(&query, &ListParams::new(1, 1)).await?;
        Ok(page.items.into_iter().next())
    }

    async fn list(&self, query: &PostQuery, params: &ListParams) -> Result<PagedResult<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_posts_sqlite(pool, query, params).await,
            Backend::Mysql(pool) => list_posts_mysql(pool, query, params).await,
        }
    }

    async fn count(&self, query: &PostQuery) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_posts_sqlite(pool, query).await,
            Backend::Mysql(pool) => count_posts_mysql(pool, query).await,
        }
    }

    async fn list_by_category(&self, category_id: i64) -> Result<Vec<Post>> {
        let query = PostQuery::all().in_category(category_id);
        let total = self.count(&query).await?;
        if total == 0 {
            return Ok(Vec::new());
        }
        let page = self
            .list(&query, &ListParams::new(1, total.clamp(1, u32::MAX as i64) as u32))
            .await?;
        Ok(page.items)
    }

    async fn delete(&self, query: &PostQuery) -> Result<u64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => delete_posts_sqlite(pool, query).await,
            Backend::Mysql(pool) => delete_posts_mysql(pool, query).await,
        }
    }
}

fn parse_status(value: i32) -> Result<PostStatus> {
    PostStatus::from_value(value).ok_or_else(|| anyhow!("Invalid post status in database: {}", value))
}

/// Tag IDs without duplicates, in ascending order
fn unique_tag_ids(post: &Post) -> Vec<i64> {
    let mut ids = post.tag_ids.clone();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn attach_tags(posts: &mut [Post], pairs: Vec<(i64, i64)>) {
    let mut by_post: HashMap<i64, Vec<i64>> = HashMap::new();
    for (post_id, tag_id) in pairs {
        by_post.entry(post_id).or_default().push(tag_id);
    }
    for post in posts {
        post.tag_ids = by_post.remove(&post.id).unwrap_or_default();
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, description, content, status, category_id, owner_id, created_time)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(&post.desc)
    .bind(&post.content)
    .bind(post.status.value())
    .bind(post.category_id)
    .bind(post.owner_id)
    .bind(post.created_time)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?
    .last_insert_rowid();

    let tag_ids = unique_tag_ids(post);
    for tag_id in &tag_ids {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    let mut created = post.clone();
    created.id = id;
    created.tag_ids = tag_ids;
    Ok(created)
}

async fn update_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, description = ?, content = ?, status = ?, category_id = ?, owner_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.title)
    .bind(&post.desc)
    .bind(&post.content)
    .bind(post.status.value())
    .bind(post.category_id)
    .bind(post.owner_id)
    .bind(post.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update post")?;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post tags")?;

    let tag_ids = unique_tag_ids(post);
    for tag_id in &tag_ids {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post.id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    let mut updated = post.clone();
    updated.tag_ids = tag_ids;
    Ok(updated)
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    query: &PostQuery,
    params: &ListParams,
) -> Result<PagedResult<Post>> {
    let total = count_posts_sqlite(pool, query).await?;

    let (where_sql, mut binds) = query.where_clause();
    binds.push(BindValue::Int(params.limit()));
    binds.push(BindValue::Int(params.offset()));
    let sql = format!("{} {} ORDER BY p.id DESC LIMIT ? OFFSET ?", SELECT_POSTS, where_sql);

    let rows = bind_sqlite(sqlx::query(&sql), &binds)
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let mut posts = rows
        .iter()
        .map(row_to_post_sqlite)
        .collect::<Result<Vec<_>>>()?;

    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let pairs = get_post_tags_sqlite(pool, &ids).await?;
    attach_tags(&mut posts, pairs);

    Ok(PagedResult::new(posts, total, params))
}

async fn count_posts_sqlite(pool: &SqlitePool, query: &PostQuery) -> Result<i64> {
    let (where_sql, binds) = query.where_clause();
    let sql = format!("{} {}", COUNT_POSTS, where_sql);

    let row = bind_sqlite(sqlx::query(&sql), &binds)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;

    Ok(row.get("total"))
}

async fn get_post_tags_sqlite(pool: &SqlitePool, post_ids: &[i64]) -> Result<Vec<(i64, i64)>> {
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT post_id, tag_id FROM post_tags WHERE post_id IN ({}) ORDER BY tag_id",
        placeholders(post_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get post tags")?;

    Ok(rows
        .iter()
        .map(|row| (row.get("post_id"), row.get("tag_id")))
        .collect())
}

async fn delete_posts_sqlite(pool: &SqlitePool, query: &PostQuery) -> Result<u64> {
    let (where_sql, binds) = query.where_clause();
    let sql = format!("SELECT p.id FROM posts p INNER JOIN categories c ON c.id = p.category_id {}", where_sql);

    let rows = bind_sqlite(sqlx::query(&sql), &binds)
        .fetch_all(pool)
        .await
        .context("Failed to select posts for deletion")?;
    let ids: Vec<i64> = rows.iter().map(|row| row.get("id")).collect();

    if ids.is_empty() {
        return Ok(0);
    }

    let sql = format!("DELETE FROM posts WHERE id IN ({})", placeholders(ids.len()));
    let mut delete = sqlx::query(&sql);
    for id in &ids {
        delete = delete.bind(*id);
    }

    let result = delete.execute(pool).await.context("Failed to delete posts")?;
    Ok(result.rows_affected())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        desc: row.get("description"),
        content: row.get("content"),
        status: parse_status(row.get("status"))?,
        category_id: row.get("category_id"),
        tag_ids: Vec::new(),
        owner_id: row.get("owner_id"),
        created_time: row.get("created_time"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, description, content, status, category_id, owner_id, created_time)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(&post.desc)
    .bind(&post.content)
    .bind(post.status.value())
    .bind(post.category_id)
    .bind(post.owner_id)
    .bind(post.created_time)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?
    .last_insert_id() as i64;

    let tag_ids = unique_tag_ids(post);
    for tag_id in &tag_ids {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    let mut created = post.clone();
    created.id = id;
    created.tag_ids = tag_ids;
    Ok(created)
}

async fn update_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, description = ?, content = ?, status = ?, category_id = ?, owner_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.title)
    .bind(&post.desc)
    .bind(&post.content)
    .bind(post.status.value())
    .bind(post.category_id)
    .bind(post.owner_id)
    .bind(post.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update post")?;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post tags")?;

    let tag_ids = unique_tag_ids(post);
    for tag_id in &tag_ids {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post.id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag post")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    let mut updated = post.clone();
    updated.tag_ids = tag_ids;
    Ok(updated)
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    query: &PostQuery,
    params: &ListParams,
) -> Result<PagedResult<Post>> {
    let total = count_posts_mysql(pool, query).await?;

    let (where_sql, mut binds) = query.where_clause();
    binds.push(BindValue::Int(params.limit()));
    binds.push(BindValue::Int(params.offset()));
    let sql = format!("{} {} ORDER BY p.id DESC LIMIT ? OFFSET ?", SELECT_POSTS, where_sql);

    let rows = bind_mysql(sqlx::query(&sql), &binds)
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let mut posts = rows
        .iter()
        .map(row_to_post_mysql)
        .collect::<Result<Vec<_>>>()?;

    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let pairs = get_post_tags_mysql(pool, &ids).await?;
    attach_tags(&mut posts, pairs);

    Ok(PagedResult::new(posts, total, params))
}

async fn count_posts_mysql(pool: &MySqlPool, query: &PostQuery) -> Result<i64> {
    let (where_sql, binds) = query.where_clause();
    let sql = format!("{} {}", COUNT_POSTS, where_sql);

    let row = bind_mysql(sqlx::query(&sql), &binds)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;

    Ok(row.get("total"))
}

async fn get_post_tags_mysql(pool: &MySqlPool, post_ids: &[i64]) -> Result<Vec<(i64, i64)>> {
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT post_id, tag_id FROM post_tags WHERE post_id IN ({}) ORDER BY tag_id",
        placeholders(post_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get post tags")?;

    Ok(rows
        .iter()
        .map(|row| (row.get("post_id"), row.get("tag_id")))
        .collect())
}

async fn delete_posts_mysql(pool: &MySqlPool, query: &PostQuery) -> Result<u64> {
    let (where_sql, binds) = query.where_clause();
    let sql = format!("SELECT p.id FROM posts p INNER JOIN categories c ON c.id = p.category_id {}", where_sql);

    let rows = bind_mysql(sqlx::query(&sql), &binds)
        .fetch_all(pool)
        .await
        .context("Failed to select posts for deletion")?;
    let ids: Vec<i64> = rows.iter().map(|row| row.get("id")).collect();

    if ids.is_empty() {
        return Ok(0);
    }

    let sql = format!("DELETE FROM posts WHERE id IN ({})", placeholders(ids.len()));
    let mut delete = sqlx::query(&sql);
    for id in &ids {
        delete = delete.bind(*id);
    }

    let result = delete.execute(pool).await.context("Failed to delete posts")?;
    Ok(result.rows_affected())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        desc: row.get("description"),
        content: row.get("content"),
        status: parse_status(row.get("status"))?,
        category_id: row.get("category_id"),
        tag_ids: Vec::new(),
        owner_id: row.get("owner_id"),
        created_time: row.get("created_time"),
    })
}
