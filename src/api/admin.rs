//! Admin API endpoints
//!
//! JSON surface of the admin sites, all requiring a staff user:
//! - GET /api/v1/{site}/ - Site index
//! - GET /api/v1/{site}/blog/{model}/ - Change list (`q`, `p`, filter params)
//! - POST /api/v1/{site}/blog/{model}/ - Create
//! - GET /api/v1/{site}/blog/{model}/meta - Presentation options
//! - GET /api/v1/{site}/blog/{model}/{id} - Change form
//! - PUT /api/v1/{site}/blog/{model}/{id} - Change
//! - DELETE /api/v1/{site}/blog/{model}/{id} - Delete
//! - POST /api/v1/{site}/blog/{model}/actions - Bulk action

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::admin::site::SiteIndex;
use crate::admin::{
    ActionOutcome, AdminRequest, AdminSite, ChangeForm, ChangeList, ChangeListParams, FormData, ModelAdmin,
    ModelMeta, SavedObject,
};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};

/// Request body for bulk actions
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{site}/", get(site_index))
        .route("/{site}/blog/{model}/", get(changelist).post(create_object))
        .route("/{site}/blog/{model}/meta", get(model_meta))
        .route("/{site}/blog/{model}/actions", post(run_action))
        .route(
            "/{site}/blog/{model}/{id}",
            get(change_form).put(change_object).delete(delete_object),
        )
}

fn site(state: &AppState, name: &str) -> Result<Arc<AdminSite>, ApiError> {
    state
        .sites
        .get(name)
        .ok_or_else(|| ApiError::not_found(format!("Admin site {} not found", name)))
}

fn model_admin(state: &AppState, site_name: &str, model: &str) -> Result<Arc<dyn ModelAdmin>, ApiError> {
    site(state, site_name)?
        .get("blog", model)
        .ok_or_else(|| ApiError::not_found(format!("Model blog.{} is not registered on {}", model, site_name)))
}

fn form_data(body: &serde_json::Value) -> Result<FormData, ApiError> {
    FormData::from_json(body)
        .map_err(|errors| ApiError::with_details("VALIDATION_ERROR", "Invalid form data", errors.to_json()))
}

/// GET /api/v1/{site}/ - Site index
async fn site_index(
    State(state): State<AppState>,
    Path(site_name): Path<String>,
) -> Result<Json<SiteIndex>, ApiError> {
    let site = site(&state, &site_name)?;
    Ok(Json(site.index(state.sites.urls())?))
}

/// GET /api/v1/{site}/blog/{model}/ - Change list
async fn changelist(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((site_name, model)): Path<(String, String)>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<ChangeList>, ApiError> {
    let admin = model_admin(&state, &site_name, &model)?;
    let params = ChangeListParams::from_pairs(&query)?;
    let req = AdminRequest::new(&user.0, &site_name, state.sites.urls());

    Ok(Json(admin.changelist(&req, &params).await?))
}

/// POST /api/v1/{site}/blog/{model}/ - Create
async fn create_object(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((site_name, model)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = model_admin(&state, &site_name, &model)?;
    let data = form_data(&body)?;
    let req = AdminRequest::new(&user.0, &site_name, state.sites.urls());

    let saved = admin.save_form(&req, None, &data).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// GET /api/v1/{site}/blog/{model}/meta - Presentation options
async fn model_meta(
    State(state): State<AppState>,
    Path((site_name, model)): Path<(String, String)>,
) -> Result<Json<ModelMeta>, ApiError> {
    let admin = model_admin(&state, &site_name, &model)?;
    Ok(Json(admin.meta()))
}

/// GET /api/v1/{site}/blog/{model}/{id} - Change form
async fn change_form(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((site_name, model, id)): Path<(String, String, i64)>,
) -> Result<Json<ChangeForm>, ApiError> {
    let admin = model_admin(&state, &site_name, &model)?;
    let req = AdminRequest::new(&user.0, &site_name, state.sites.urls());

    Ok(Json(admin.change_form(&req, Some(id), None).await?))
}

/// PUT /api/v1/{site}/blog/{model}/{id} - Change
async fn change_object(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((site_name, model, id)): Path<(String, String, i64)>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SavedObject>, ApiError> {
    let admin = model_admin(&state, &site_name, &model)?;
    let data = form_data(&body)?;
    let req = AdminRequest::new(&user.0, &site_name, state.sites.urls());

    Ok(Json(admin.save_form(&req, Some(id), &data).await?))
}

/// DELETE /api/v1/{site}/blog/{model}/{id} - Delete
async fn delete_object(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((site_name, model, id)): Path<(String, String, i64)>,
) -> Result<StatusCode, ApiError> {
    let admin = model_admin(&state, &site_name, &model)?;
    let req = AdminRequest::new(&user.0, &site_name, state.sites.urls());

    admin.delete_object(&req, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/{site}/blog/{model}/actions - Bulk action
async fn run_action(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((site_name, model)): Path<(String, String)>,
    Json(body): Json<ActionRequest>,
) -> Result<Json<ActionOutcome>, ApiError> {
    let admin = model_admin(&state, &site_name, &model)?;
    let req = AdminRequest::new(&user.0, &site_name, state.sites.urls());

    Ok(Json(admin.run_action(&req, &body.action, &body.ids).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{login_token, test_server, TestApp};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn create_category(server: &axum_test::TestServer, token: &str, name: &str) -> i64 {
        let response = server
            .post("/api/v1/admin/blog/category/")
            .authorization_bearer(token)
            .json(&json!({"name": name, "status": "1"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["id"].as_i64().unwrap()
    }

    async fn create_post(server: &axum_test::TestServer, token: &str, title: &str, category: i64) -> i64 {
        let response = server
            .post("/api/v1/cus_admin/blog/post/")
            .authorization_bearer(token)
            .json(&json!({
                "title": title,
                "status": 1,
                "category": category,
                "content": "正文内容",
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_admin_routes_require_login() {
        let TestApp { server, .. } = test_server().await;

        let response = server.get("/api/v1/cus_admin/blog/post/").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_site_index_lists_registered_models() {
        let TestApp { server, .. } = test_server().await;
        let token = login_token(&server, "alice").await;

        let body: Value = server.get("/api/v1/cus_admin/").authorization_bearer(&token).await.json();
        assert_eq!(body["site"]["site_header"], "Typeidea");
        assert_eq!(body["site"]["index_title"], "首页");
        assert_eq!(body["apps"][0]["models"][0]["model_name"], "post");
        assert_eq!(body["apps"][0]["models"][0]["changelist_url"], "/admin/blog/post/");

        let body: Value = server.get("/api/v1/admin/").authorization_bearer(&token).await.json();
        let models: Vec<&str> = body["apps"][0]["models"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["model_name"].as_str().unwrap())
            .collect();
        assert_eq!(models, vec!["category", "tag"]);
    }

    #[tokio::test]
    async fn test_model_on_wrong_site_is_not_found() {
        let TestApp { server, .. } = test_server().await;
        let token = login_token(&server, "alice").await;

        let response = server.get("/api/v1/admin/blog/post/").authorization_bearer(&token).await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = server.get("/api/v1/nowhere/").authorization_bearer(&token).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_create_stamps_owner_and_lists_own_posts() {
        let TestApp { server, alice_id, .. } = test_server().await;
        let alice = login_token(&server, "alice").await;
        let bob = login_token(&server, "bob").await;

        let category = create_category(&server, &alice, "Rust").await;
        let post_id = create_post(&server, &alice, "Hello", category).await;

        let form: Value = server
            .get(&format!("/api/v1/cus_admin/blog/post/{}", post_id))
            .authorization_bearer(&alice)
            .await
            .json();
        assert_eq!(form["object"]["owner_id"], alice_id);

        let list: Value = server.get("/api/v1/cus_admin/blog/post/").authorization_bearer(&alice).await.json();
        assert_eq!(list["result_count"], 1);

        let list: Value = server.get("/api/v1/cus_admin/blog/post/").authorization_bearer(&bob).await.json();
        assert_eq!(list["result_count"], 0);
    }

    #[tokio::test]
    async fn test_other_users_post_is_not_found() {
        let TestApp { server, .. } = test_server().await;
        let alice = login_token(&server, "alice").await;
        let bob = login_token(&server, "bob").await;

        let category = create_category(&server, &alice, "Rust").await;
        let post_id = create_post(&server, &alice, "Hello", category).await;
        let url = format!("/api/v1/cus_admin/blog/post/{}", post_id);

        server.get(&url).authorization_bearer(&bob).await.assert_status(StatusCode::NOT_FOUND);
        server
            .put(&url)
            .authorization_bearer(&bob)
            .json(&json!({"title": "Hijacked", "status": 1, "category": category, "content": "x"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server.delete(&url).authorization_bearer(&bob).await.assert_status(StatusCode::NOT_FOUND);

        server.get(&url).authorization_bearer(&alice).await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_validation_error_details() {
        let TestApp { server, .. } = test_server().await;
        let token = login_token(&server, "alice").await;

        let response = server
            .post("/api/v1/cus_admin/blog/post/")
            .authorization_bearer(&token)
            .json(&json!({"title": "", "status": 1, "content": "x"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["title"][0], "这个字段是必填项。");
        assert!(body["error"]["details"]["category"].is_array());
    }

    #[tokio::test]
    async fn test_invalid_page_is_rejected() {
        let TestApp { server, .. } = test_server().await;
        let token = login_token(&server, "alice").await;

        let response = server
            .get("/api/v1/cus_admin/blog/post/?p=zero")
            .authorization_bearer(&token)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_selected_action_only_touches_own_posts() {
        let TestApp { server, .. } = test_server().await;
        let alice = login_token(&server, "alice").await;
        let bob = login_token(&server, "bob").await;

        let category = create_category(&server, &alice, "Rust").await;
        let mine = create_post(&server, &alice, "Mine", category).await;
        let theirs = create_post(&server, &bob, "Theirs", category).await;

        let response = server
            .post("/api/v1/cus_admin/blog/post/actions")
            .authorization_bearer(&alice)
            .json(&json!({"action": "delete_selected", "ids": [mine, theirs]}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["affected_count"], 1);

        let list: Value = server.get("/api/v1/cus_admin/blog/post/").authorization_bearer(&bob).await.json();
        assert_eq!(list["result_count"], 1);

        let response = server
            .post("/api/v1/cus_admin/blog/post/actions")
            .authorization_bearer(&alice)
            .json(&json!({"action": "publish", "ids": [mine]}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_meta_exposes_fieldsets_and_media() {
        let TestApp { server, .. } = test_server().await;
        let token = login_token(&server, "alice").await;

        let body: Value = server
            .get("/api/v1/cus_admin/blog/post/meta")
            .authorization_bearer(&token)
            .await
            .json();
        assert_eq!(body["verbose_name"], "文章");
        assert_eq!(body["fieldsets"][0]["name"], "基础配置");
        assert_eq!(body["filters"][0]["parameter_name"], "owner_category");
        assert!(body["options"]["media"]["js"].as_array().is_some_and(|js| !js.is_empty()));
    }

    #[tokio::test]
    async fn test_delete_category() {
        let TestApp { server, .. } = test_server().await;
        let token = login_token(&server, "alice").await;

        let category = create_category(&server, &token, "Old").await;
        let url = format!("/api/v1/admin/blog/category/{}", category);

        server.delete(&url).authorization_bearer(&token).await.assert_status(StatusCode::NO_CONTENT);
        server.get(&url).authorization_bearer(&token).await.assert_status(StatusCode::NOT_FOUND);
    }
}
