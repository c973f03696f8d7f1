//! Typeidea - admin back office of the typeidea blog
//!
//! Posts, categories and tags are managed through two admin sites: the
//! default site at `/super_admin` for categories and tags, and the custom
//! "Typeidea" site at `/admin` for posts.

pub mod admin;
pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
