//! Services layer - Business logic
//!
//! Account and session handling shared by both admin sites. Model level
//! logic lives with the model admins in `crate::admin`.

pub mod password;
pub mod user;

pub use password::{hash_password, verify_password};
pub use user::{LoginInput, UserService, UserServiceError};
