//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.

pub mod category;
pub mod post;
pub mod session;
pub mod tag;
pub mod user;

pub use category::{CategoryPostChange, CategoryRepository, SqlxCategoryRepository};
pub use post::{PostQuery, PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Build `?, ?, ?` for an `IN (...)` clause with `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
