//! Authentication API endpoints
//!
//! Handles HTTP requests for admin authentication:
//! - POST /api/v1/auth/login - Admin login
//! - POST /api/v1/auth/logout - Admin logout
//! - GET /api/v1/auth/me - Get current user

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{
    clear_session_cookie, extract_session_token, session_cookie, ApiError, AppState, AuthenticatedUser,
};
use crate::models::User;
use crate::services::user::LoginInput;

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_superuser: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            is_superuser: user.is_superuser(),
            username: user.username,
            email: user.email,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

fn cookie_header(value: &str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(value).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );
    Ok(headers)
}

/// POST /api/v1/auth/login - Admin login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let username = body.username.clone();
    let (user, session) = state.user_service.login(body).await.map_err(|e| {
        tracing::info!("Failed admin login for {}", username);
        ApiError::from(e)
    })?;

    tracing::info!("{} logged in", user.username);
    let headers = cookie_header(&session_cookie(&session.id, state.session_max_age()))?;

    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout - Admin logout
async fn logout(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_session_token(&request_headers) {
        state.user_service.logout(&token).await?;
    }

    let headers = cookie_header(&clear_session_cookie())?;
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me - Get current user
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}
