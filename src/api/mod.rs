//! API layer - HTTP handlers and routing
//!
//! - `auth`: JSON login/logout under `/api/v1/auth`
//! - `admin`: JSON admin endpoints under `/api/v1/{site}`
//! - `pages`: HTML admin pages under each site's prefix
//! - `middleware`: shared state, errors and authentication

pub mod admin;
pub mod auth;
pub mod middleware;
pub mod pages;

use axum::{middleware as axum_middleware, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the JSON API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need a staff session)
    let admin_routes = admin::router()
        .route_layer(axum_middleware::from_fn(middleware::require_staff))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need a session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .merge(protected_routes)
        .merge(admin_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new().nest("/api/v1", build_api_router(state.clone()));

    for site in state.sites.iter() {
        tracing::debug!("Mounting admin site {} at {}/", site.name, site.prefix);
        router = router.merge(pages::site_router(state.clone(), site.clone()));
    }

    router
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for HTTP tests

    use super::{build_router, AppState};
    use crate::config::Config;
    use crate::db::testing::migrated_pool;
    use crate::models::{CreateUserInput, UserRole};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    pub struct TestApp {
        pub server: TestServer,
        pub state: AppState,
        pub alice_id: i64,
        pub bob_id: i64,
    }

    /// Server over a fresh database with staff users `alice` and `bob`
    /// and the member `carol`. Passwords are `{username}-pass`.
    pub async fn test_server() -> TestApp {
        let pool = migrated_pool().await;
        let state = AppState::new(pool, Config::default()).expect("Failed to build app state");

        let mut ids = Vec::new();
        for (username, role) in [
            ("alice", UserRole::Staff),
            ("bob", UserRole::Staff),
            ("carol", UserRole::Member),
        ] {
            let user = state
                .user_service
                .create_user(CreateUserInput {
                    username: username.to_string(),
                    email: format!("{}@example.com", username),
                    password: format!("{}-pass", username),
                    role: Some(role),
                })
                .await
                .expect("Failed to create user");
            ids.push(user.id);
        }

        let server = TestServer::new(build_router(state.clone())).expect("Failed to start test server");
        TestApp {
            server,
            state,
            alice_id: ids[0],
            bob_id: ids[1],
        }
    }

    /// Log in through the JSON API and return the session token
    pub async fn login_token(server: &TestServer, username: &str) -> String {
        let response = server
            .post("/api/v1/auth/login")
            .json(&json!({"username": username, "password": format!("{}-pass", username)}))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["token"]
            .as_str()
            .expect("token")
            .to_string()
    }
}
