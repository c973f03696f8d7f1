//! Post model
//!
//! This module provides:
//! - `Post` entity representing a blog post
//! - `PostStatus` enum (正常 / 删除 / 草稿)
//! - Pagination types for list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// Post title
    pub title: String,
    /// Summary (摘要), may be empty
    pub desc: String,
    /// Markdown body (正文), stored verbatim
    pub content: String,
    pub status: PostStatus,
    /// Category ID
    pub category_id: i64,
    /// Tag IDs (many-to-many)
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    /// Owning user ID
    pub owner_id: i64,
    /// Creation timestamp
    pub created_time: DateTime<Utc>,
}

impl Post {
    /// Maximum length of `title`
    pub const TITLE_MAX_LEN: usize = 255;
    /// Maximum length of `desc`
    pub const DESC_MAX_LEN: usize = 1024;

    /// Create an unsaved post in a category
    pub fn new(title: String, content: String, category_id: i64) -> Self {
        Self {
            id: 0, // Will be set by database
            title,
            desc: String::new(),
            content,
            status: PostStatus::Normal,
            category_id,
            tag_ids: Vec::new(),
            owner_id: 0,
            created_time: Utc::now(),
        }
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// Post status, stored as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "i32", try_from = "i32")]
pub enum PostStatus {
    /// 正常
    #[default]
    Normal,
    /// 删除
    Deleted,
    /// 草稿
    Draft,
}

impl PostStatus {
    /// All choices in display order
    pub const CHOICES: [PostStatus; 3] = [PostStatus::Normal, PostStatus::Deleted, PostStatus::Draft];

    /// Stored integer value
    pub fn value(self) -> i32 {
        match self {
            PostStatus::Normal => 1,
            PostStatus::Deleted => 0,
            PostStatus::Draft => 2,
        }
    }

    /// Parse from the stored integer value
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(PostStatus::Normal),
            0 => Some(PostStatus::Deleted),
            2 => Some(PostStatus::Draft),
            _ => None,
        }
    }

    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            PostStatus::Normal => "正常",
            PostStatus::Deleted => "删除",
            PostStatus::Draft => "草稿",
        }
    }
}

impl From<PostStatus> for i32 {
    fn from(status: PostStatus) -> Self {
        status.value()
    }
}

impl TryFrom<i32> for PostStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        PostStatus::from_value(value).ok_or_else(|| format!("Invalid status: {}", value))
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 100,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * (self.per_page as i64)
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    /// Create a new paginated result
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64 + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    /// Check if there is a next page
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Check if there is a previous page
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Transform the items, keeping the pagination info
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_post_status_values() {
        assert_eq!(PostStatus::Draft.value(), 2);
        assert_eq!(PostStatus::from_value(0), Some(PostStatus::Deleted));
        assert_eq!(PostStatus::Draft.label(), "草稿");
        assert_eq!(serde_json::to_string(&PostStatus::Draft).unwrap(), "2");
    }

    #[test]
    fn test_new_post_defaults() {
        let post = Post::new("Hello".to_string(), "body".to_string(), 3);
        assert_eq!(post.status, PostStatus::Normal);
        assert_eq!(post.category_id, 3);
        assert!(post.desc.is_empty());
        assert!(post.tag_ids.is_empty());
    }

    #[test]
    fn test_list_params_clamps_to_first_page() {
        let params = ListParams::new(0, 0);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 1);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_paged_result_map_keeps_pagination() {
        let params = ListParams::new(2, 10);
        let result = PagedResult::new(vec![1, 2, 3], 13, &params).map(|n| n * 10);
        assert_eq!(result.items, vec![10, 20, 30]);
        assert_eq!(result.total_pages(), 2);
        assert!(result.has_prev());
        assert!(!result.has_next());
    }

    proptest! {
        #[test]
        fn total_pages_covers_every_item(total in 0i64..10_000, per_page in 1u32..500) {
            let params = ListParams::new(1, per_page);
            let result: PagedResult<()> = PagedResult::new(Vec::new(), total, &params);
            let pages = result.total_pages() as i64;
            prop_assert!(pages * per_page as i64 >= total);
            prop_assert!(pages == 0 || (pages - 1) * (per_page as i64) < total);
        }
    }
}
