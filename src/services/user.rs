//! User service
//!
//! Implements account and session logic for the admin sites:
//! - Account creation (`createsuperuser` and tests)
//! - Login/logout with session tokens
//! - Session validation and cleanup

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, User, UserRole};
use crate::services::password::{hash_password, needs_rehash, verify_password};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 14;

/// Maximum username length
const USERNAME_MAX_LEN: usize = 150;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Create a new account
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the username is empty or too long, or the
    ///   password is empty
    /// - `UserExists` if the username is taken
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        validate_new_user(&username, &input.password)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(username));
        }

        let password_hash = hash_password(&input.password)?;
        let user = User::new(
            username,
            input.email.trim().to_string(),
            password_hash,
            input.role.unwrap_or_default(),
        );

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!("Created user {} ({})", created.username, created.role);
        Ok(created)
    }

    /// Create an account with the superuser role
    pub async fn create_superuser(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        self.create_user(CreateUserInput {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Some(UserRole::Superuser),
        })
        .await
    }

    /// Authenticate an admin user and open a session
    ///
    /// Unknown users, wrong passwords and accounts without admin access
    /// all fail with the same `AuthenticationError`.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError(
                "Please enter the correct username and password for a staff account".to_string(),
            )
        };

        let mut user = self
            .user_repo
            .get_by_username(input.username.trim())
            .await
            .context("Failed to get user by username")?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;

        if !password_valid || !user.can_access_admin() {
            tracing::debug!("Rejected admin login for {}", user.username);
            return Err(invalid());
        }

        if needs_rehash(&user.password_hash) {
            let password_hash = hash_password(&input.password)?;
            self.user_repo
                .set_password_hash(user.id, &password_hash)
                .await
                .context("Failed to upgrade password hash")?;
            tracing::info!("Upgraded password hash of {}", user.username);
            user.password_hash = password_hash;
        }

        let session = Session::start(user.id, self.session_expiration_days);
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok((user, session))
    }

    /// End a session. Unknown tokens are ignored.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        let ended = self
            .session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;

        if !ended {
            tracing::debug!("Logout with unknown session token");
        }
        Ok(())
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;

        Ok(user)
    }

    /// Validate a session token and return the associated user
    ///
    /// Expired sessions are deleted on sight. Inactive users have no
    /// valid sessions.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(|u| u.is_active))
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired(Utc::now())
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }
}

fn validate_new_user(username: &str, password: &str) -> Result<(), UserServiceError> {
    if username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }

    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Username cannot exceed {} characters",
            USERNAME_MAX_LEN
        )));
    }

    if password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Input for user login
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}
