//! Data models
//!
//! Entities managed by the typeidea admin:
//! - `User` and `Session` for authentication
//! - `Category`, `Tag` and `Post` for the blog app
//! - Pagination types shared by list queries

mod category;
mod post;
mod session;
mod tag;
mod user;

pub use category::{Category, RecordStatus};
pub use post::{ListParams, PagedResult, Post, PostStatus};
pub use session::Session;
pub use tag::Tag;
pub use user::{CreateUserInput, User, UserRole};
