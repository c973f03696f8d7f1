//! User model
//!
//! Accounts that can sign in to the admin sites. Only active staff and
//! superusers get past the admin login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address
    pub email: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role
    pub role: UserRole,
    /// Inactive users cannot sign in
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user.
    ///
    /// The password must already be hashed, see `services::password::hash_password()`.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            password_hash,
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Check if the user is a superuser
    pub fn is_superuser(&self) -> bool {
        self.role == UserRole::Superuser
    }

    /// Check if the user may sign in to the admin sites
    pub fn can_access_admin(&self) -> bool {
        self.is_active && self.role.is_staff()
    }
}

/// User role for authorization.
///
/// - Superuser: staff with every permission
/// - Staff: may use the admin sites
/// - Member: may not use the admin sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Superuser,
    Staff,
    #[default]
    Member,
}

impl UserRole {
    /// Convert role to its database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Superuser => "superuser",
            UserRole::Staff => "staff",
            UserRole::Member => "member",
        }
    }

    /// Staff status, held by superusers too
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Superuser | UserRole::Staff)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "superuser" => Ok(UserRole::Superuser),
            "staff" => Ok(UserRole::Staff),
            "member" => Ok(UserRole::Member),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a new user (before password hashing)
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    /// Username
    pub username: String,
    /// Email address
    pub email: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    /// User role (optional, defaults to Member)
    pub role: Option<UserRole>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "hash".to_string(),
            role,
        )
    }

    #[test]
    fn test_user_new() {
        let user = user(UserRole::Staff);
        assert_eq!(user.id, 0);
        assert_eq!(user.username, "alice");
        assert!(user.is_active);
    }

    #[test]
    fn test_can_access_admin() {
        assert!(user(UserRole::Superuser).can_access_admin());
        assert!(user(UserRole::Staff).can_access_admin());
        assert!(!user(UserRole::Member).can_access_admin());

        let mut inactive = user(UserRole::Superuser);
        inactive.is_active = false;
        assert!(!inactive.can_access_admin());
    }

    #[test]
    fn test_user_role_round_trip_through_str() {
        for role in [UserRole::Superuser, UserRole::Staff, UserRole::Member] {
            assert_eq!(UserRole::from_str(&role.to_string()).unwrap(), role);
        }
        assert_eq!(UserRole::from_str("STAFF").unwrap(), UserRole::Staff);
        assert!(UserRole::from_str("admin").is_err());
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let json = serde_json::to_value(user(UserRole::Staff)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "staff");
    }
}
