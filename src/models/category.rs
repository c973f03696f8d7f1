//! Category model
//!
//! Also home of `RecordStatus`, the 正常/删除 flag shared by categories
//! and tags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a category or tag, stored as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "i32", try_from = "i32")]
pub enum RecordStatus {
    /// 正常
    #[default]
    Normal,
    /// 删除
    Deleted,
}

impl RecordStatus {
    /// All choices in display order
    pub const CHOICES: [RecordStatus; 2] = [RecordStatus::Normal, RecordStatus::Deleted];

    /// Stored integer value
    pub fn value(self) -> i32 {
        match self {
            RecordStatus::Normal => 1,
            RecordStatus::Deleted => 0,
        }
    }

    /// Parse from the stored integer value
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(RecordStatus::Normal),
            0 => Some(RecordStatus::Deleted),
            _ => None,
        }
    }

    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            RecordStatus::Normal => "正常",
            RecordStatus::Deleted => "删除",
        }
    }
}

impl From<RecordStatus> for i32 {
    fn from(status: RecordStatus) -> Self {
        status.value()
    }
}

impl TryFrom<i32> for RecordStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        RecordStatus::from_value(value).ok_or_else(|| format!("Invalid status: {}", value))
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    pub status: RecordStatus,
    /// Shown in the site navigation
    pub is_nav: bool,
    /// Owning user ID
    pub owner_id: i64,
    /// Creation timestamp
    pub created_time: DateTime<Utc>,
}

impl Category {
    /// Maximum length of `name`
    pub const NAME_MAX_LEN: usize = 50;

    /// Create an unsaved category with default status
    pub fn new(name: String) -> Self {
        Self {
            id: 0, // Will be set by database
            name,
            status: RecordStatus::Normal,
            is_nav: false,
            owner_id: 0,
            created_time: Utc::now(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
