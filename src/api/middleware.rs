//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session token validation)
//! - Authorization (admin access checking)
//!
//! Also defines the shared `AppState` and the JSON `ApiError` body.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::admin::{build_sites, AdminError, AdminRenderer, AdminSites};
use crate::config::Config;
use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::user::{UserService, UserServiceError};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub sites: AdminSites,
    pub renderer: Arc<AdminRenderer>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire repositories, services, admin sites and templates together
    pub fn new(pool: DynDatabasePool, config: Config) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let user_service = Arc::new(UserService::with_session_expiration(
            user_repo,
            session_repo,
            config.admin.session_days,
        ));

        let sites = build_sites(&config.admin, pool.clone())?;
        let renderer = Arc::new(AdminRenderer::new()?);

        Ok(Self {
            pool,
            user_service,
            sites,
            renderer,
            config: Arc::new(config),
        })
    }

    /// Session cookie lifetime in seconds
    pub fn session_max_age(&self) -> i64 {
        self.config.admin.session_days * 24 * 60 * 60
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound(_) => ApiError::not_found(err.to_string()),
            AdminError::Validation(errors) => {
                ApiError::with_details("VALIDATION_ERROR", "Validation failed", errors.to_json())
            }
            AdminError::InvalidLookup(_) | AdminError::UnknownAction(_) => {
                ApiError::validation_error(err.to_string())
            }
            AdminError::AlreadyRegistered(_) => ApiError::conflict(err.to_string()),
            AdminError::NoReverseMatch(_) | AdminError::Template(_) | AdminError::InternalError(_) => {
                tracing::error!("Admin request failed: {}", err);
                ApiError::internal_error(err.to_string())
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::InternalError(e) => {
                tracing::error!("User service failed: {:#}", e);
                ApiError::internal_error(e.to_string())
            }
        }
    }
}

/// Extract the session token from the `Authorization` header or the
/// session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value opening a session
pub fn session_cookie(token: &str, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    )
}

/// `Set-Cookie` value clearing the session
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Resolve the user behind the request's session token, if any
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, UserServiceError> {
    match extract_session_token(headers) {
        Some(token) => state.user_service.validate_session(&token).await,
        None => Ok(None),
    }
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await
        .map_err(|e| ApiError::internal_error(format!("Session validation failed: {}", e)))?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware, runs after `require_auth`
pub async fn require_staff(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.can_access_admin() {
        return Err(ApiError::forbidden("Staff privileges required"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::FormErrors;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=def"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sessionid=zzz; session=def"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("def"));
    }

    #[test]
    fn test_extract_token_ignores_cleared_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn test_admin_error_mapping() {
        let err: ApiError = AdminError::NotFound("文章 7".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = AdminError::Validation(FormErrors::single("title", "这个字段是必填项。")).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let details = err.error.details.expect("details");
        assert_eq!(details["title"][0], "这个字段是必填项。");

        let err: ApiError = AdminError::InvalidLookup("p".into()).into();
        assert_eq!(err.error.code, "VALIDATION_ERROR");

        let err: ApiError = AdminError::InternalError(anyhow::anyhow!("boom")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_user_service_error_mapping() {
        let err: ApiError = UserServiceError::AuthenticationError("bad".into()).into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err: ApiError = UserServiceError::UserExists("alice".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_session_cookie_format() {
        assert_eq!(
            session_cookie("tok", 60),
            "session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }
}
