//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::RecordStatus;

/// Tag entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    pub status: RecordStatus,
    /// Owning user ID
    pub owner_id: i64,
    /// Creation timestamp
    pub created_time: DateTime<Utc>,
}

impl Tag {
    /// Maximum length of `name`
    pub const NAME_MAX_LEN: usize = 10;

    /// Create an unsaved tag with default status
    pub fn new(name: String) -> Self {
        Self {
            id: 0, // Will be set by database
            name,
            status: RecordStatus::Normal,
            owner_id: 0,
            created_time: Utc::now(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
