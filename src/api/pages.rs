//! HTML admin pages
//!
//! Each admin site is mounted under its own prefix:
//! - `{prefix}/login/`, `{prefix}/logout/`
//! - `{prefix}/` - index
//! - `{prefix}/blog/{model}/` - change list
//! - `{prefix}/blog/{model}/add/`
//! - `{prefix}/blog/{model}/{id}/change/`
//! - `{prefix}/blog/{model}/{id}/delete/`
//! - `{prefix}/blog/{model}/actions/` - bulk actions from the change list
//!
//! Anonymous visitors are redirected to the site's login page. Handler
//! failures become `PageError`s, which `render_error_pages` turns into
//! the HTML error template.

use axum::{
    extract::{Form, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::admin::{AdminError, AdminRequest, AdminSite, ChangeListParams, FormData, FormErrors, ModelAdmin};
use crate::api::middleware::{
    clear_session_cookie, current_user, extract_session_token, session_cookie, AppState, AuthenticatedUser,
};
use crate::services::user::{LoginInput, UserServiceError};

/// Cookie carrying a one-shot message to the next change list
const MESSAGES_COOKIE: &str = "messages";

const LOGIN_ERROR: &str = "请输入一个正确的 用户名 和密码. 注意他们都是区分大小写的.";

/// A failed page request, rendered by `render_error_pages`
#[derive(Debug, Clone)]
pub struct PageError {
    pub status: StatusCode,
    pub message: String,
}

impl PageError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<AdminError> for PageError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound(_) => PageError::not_found(err.to_string()),
            AdminError::Validation(_) | AdminError::InvalidLookup(_) | AdminError::UnknownAction(_) => {
                PageError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            _ => {
                tracing::error!("Admin page failed: {}", err);
                PageError::new(StatusCode::INTERNAL_SERVER_ERROR, "服务器错误")
            }
        }
    }
}

impl From<UserServiceError> for PageError {
    fn from(err: UserServiceError) -> Self {
        tracing::error!("Admin page failed: {}", err);
        PageError::new(StatusCode::INTERNAL_SERVER_ERROR, "服务器错误")
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message.clone()).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

type PageResult = Result<Response, PageError>;

/// Build the page routes of one site
pub fn site_router(state: AppState, site: Arc<AdminSite>) -> Router<AppState> {
    let prefix = site.prefix.clone();
    let path = |suffix: &str| format!("{}{}", prefix, suffix);

    let protected = Router::new()
        .route(&path("/"), get(index))
        .route(&path("/blog/{model}/"), get(changelist))
        .route(&path("/blog/{model}/actions/"), post(run_action))
        .route(&path("/blog/{model}/add/"), get(add_form).post(add_submit))
        .route(&path("/blog/{model}/{id}/change/"), get(change_form).post(change_submit))
        .route(&path("/blog/{model}/{id}/delete/"), get(delete_confirmation).post(delete_submit))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_login));

    let mut router = Router::new()
        .route(&path("/login/"), get(login_page).post(login_submit))
        .route(&path("/logout/"), get(logout).post(logout))
        .merge(protected);

    if !prefix.is_empty() {
        let index_url = path("/");
        router = router.route(&prefix, get(move || async move { Redirect::permanent(&index_url) }));
    }

    router
        .layer(axum_middleware::from_fn_with_state(state, render_error_pages))
        .layer(Extension(site))
}

/// Page authentication middleware.
///
/// Redirects to the login page unless the session belongs to a user with
/// admin access.
async fn require_login(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    mut request: Request,
    next: Next,
) -> Response {
    match current_user(&state, request.headers()).await {
        Ok(Some(user)) if user.can_access_admin() => {
            request.extensions_mut().insert(AuthenticatedUser(user));
            next.run(request).await
        }
        Ok(_) => {
            let next_url = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| format!("{}/", site.prefix));
            Redirect::to(&format!(
                "{}/login/?next={}",
                site.prefix,
                urlencoding::encode(&next_url)
            ))
            .into_response()
        }
        Err(e) => PageError::from(e).into_response(),
    }
}

/// Render `PageError` responses with the site's error template
async fn render_error_pages(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(error) = response.extensions_mut().remove::<PageError>() else {
        return response;
    };

    match state
        .renderer
        .error(&site.context(), None, error.status.as_u16(), &error.message)
    {
        Ok(html) => (error.status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render error page: {}", e);
            (error.status, error.message).into_response()
        }
    }
}

fn model_admin(site: &AdminSite, model: &str) -> Result<Arc<dyn ModelAdmin>, PageError> {
    site.get("blog", model)
        .ok_or_else(|| PageError::not_found(format!("blog.{} 未在此站点注册", model)))
}

/// Only same-site absolute paths are followed after login. Browsers drop
/// tabs and newlines inside URLs, so any byte outside visible ASCII (or a
/// backslash) could turn the path into a scheme-relative one.
fn safe_next<'a>(next: Option<&'a str>, fallback: &'a str) -> &'a str {
    match next {
        Some(url)
            if url.starts_with('/')
                && !url.starts_with("//")
                && url.bytes().all(|b| b.is_ascii_graphic() && b != b'\\') =>
        {
            url
        }
        _ => fallback,
    }
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("Dropped invalid cookie: {}", e),
    }
    response
}

/// Redirect carrying a message for the next change list
fn redirect_with_message(site: &AdminSite, location: &str, message: &str) -> Response {
    let cookie = format!(
        "{}={}; Path={}/; HttpOnly; SameSite=Lax",
        MESSAGES_COOKIE,
        urlencoding::encode(message),
        site.prefix
    );
    with_cookie(Redirect::to(location).into_response(), &cookie)
}

fn take_message(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|c| c.trim().strip_prefix(MESSAGES_COOKIE)?.strip_prefix('='))
        .find(|value| !value.is_empty())
        .and_then(|value| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}

// ============================================================================
// Login
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

/// GET {prefix}/login/
async fn login_page(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> PageResult {
    let index_url = format!("{}/", site.prefix);
    let next = safe_next(query.next.as_deref(), &index_url);

    if let Some(user) = current_user(&state, &headers).await? {
        if user.can_access_admin() {
            return Ok(Redirect::to(next).into_response());
        }
    }

    let html = state.renderer.login(&site.context(), "", None, next)?;
    Ok(Html(html).into_response())
}

/// POST {prefix}/login/
async fn login_submit(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    Form(form): Form<LoginForm>,
) -> PageResult {
    let index_url = format!("{}/", site.prefix);
    let next = safe_next(form.next.as_deref(), &index_url).to_string();

    match state
        .user_service
        .login(LoginInput::new(form.username.clone(), form.password))
        .await
    {
        Ok((user, session)) => {
            tracing::info!("{} logged in to {}", user.username, site.name);
            let cookie = session_cookie(&session.id, state.session_max_age());
            Ok(with_cookie(Redirect::to(&next).into_response(), &cookie))
        }
        Err(UserServiceError::AuthenticationError(_)) => {
            tracing::info!("Failed login for {} on {}", form.username, site.name);
            let html = state
                .renderer
                .login(&site.context(), &form.username, Some(LOGIN_ERROR), &next)?;
            Ok(Html(html).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET|POST {prefix}/logout/
async fn logout(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    headers: HeaderMap,
) -> PageResult {
    if let Some(token) = extract_session_token(&headers) {
        state.user_service.logout(&token).await?;
    }

    let response = Redirect::to(&format!("{}/login/", site.prefix)).into_response();
    Ok(with_cookie(response, &clear_session_cookie()))
}

// ============================================================================
// Index and change list
// ============================================================================

/// GET {prefix}/
async fn index(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
) -> PageResult {
    let index = site.index(state.sites.urls())?;
    let html = state.renderer.index(&index, &user.0)?;
    Ok(Html(html).into_response())
}

/// GET {prefix}/blog/{model}/
async fn changelist(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path(model): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let params = ChangeListParams::from_pairs(&query)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());

    let list = admin.changelist(&req, &params).await?;
    let message = take_message(&headers);
    let html = state
        .renderer
        .change_list(&site.context(), &user.0, &list, message.as_deref())?;

    let response = Html(html).into_response();
    Ok(match message {
        Some(_) => with_cookie(
            response,
            &format!("{}=; Path={}/; HttpOnly; SameSite=Lax; Max-Age=0", MESSAGES_COOKIE, site.prefix),
        ),
        None => response,
    })
}

/// POST {prefix}/blog/{model}/actions/
async fn run_action(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path(model): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());
    let changelist_url = req.model_url(admin.app_label(), admin.model_name(), "changelist", None)?;

    let data = FormData::from_pairs(pairs);
    // The action select appears above and below the list
    let action = data.get_all("action").into_iter().find(|a| !a.is_empty());
    let ids: Vec<i64> = data
        .get_all("_selected_action")
        .into_iter()
        .filter_map(|id| id.parse().ok())
        .collect();

    let Some(action) = action else {
        return Ok(redirect_with_message(&site, &changelist_url, "未选择动作。"));
    };
    if ids.is_empty() {
        return Ok(redirect_with_message(
            &site,
            &changelist_url,
            "条目必须选中以对其进行操作。没有任何条目被更改。",
        ));
    }

    let outcome = admin.run_action(&req, action, &ids).await?;
    Ok(redirect_with_message(&site, &changelist_url, &outcome.message))
}

// ============================================================================
// Change form
// ============================================================================

async fn render_change_form(
    state: &AppState,
    site: &AdminSite,
    admin: &dyn ModelAdmin,
    req: &AdminRequest<'_>,
    object_id: Option<i64>,
    submitted: Option<(&FormData, &FormErrors)>,
) -> PageResult {
    let form = admin.change_form(req, object_id, submitted).await?;
    let changelist_url = req.model_url(admin.app_label(), admin.model_name(), "changelist", None)?;
    let html = state
        .renderer
        .change_form(&site.context(), req.user, &form, &changelist_url)?;
    Ok(Html(html).into_response())
}

/// Validate and save, then redirect like the stock admin does for the
/// pressed submit button. Invalid input re-renders the form.
async fn save_and_redirect(
    state: &AppState,
    site: &AdminSite,
    admin: &dyn ModelAdmin,
    req: &AdminRequest<'_>,
    object_id: Option<i64>,
    data: FormData,
) -> PageResult {
    let saved = match admin.save_form(req, object_id, &data).await {
        Ok(saved) => saved,
        Err(AdminError::Validation(errors)) => {
            return render_change_form(state, site, admin, req, object_id, Some((&data, &errors))).await;
        }
        Err(e) => return Err(e.into()),
    };

    let (app_label, model_name) = (admin.app_label(), admin.model_name());
    let verb = if object_id.is_some() { "已修改成功" } else { "添加成功" };
    let message = format!("{} “{}” {}。", admin.verbose_name(), saved.repr, verb);

    let location = if data.contains("_continue") {
        req.model_url(app_label, model_name, "change", Some(saved.id))?
    } else if data.contains("_addanother") {
        req.model_url(app_label, model_name, "add", None)?
    } else {
        req.model_url(app_label, model_name, "changelist", None)?
    };

    Ok(redirect_with_message(site, &location, &message))
}

/// GET {prefix}/blog/{model}/add/
async fn add_form(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path(model): Path<String>,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());
    render_change_form(&state, &site, admin.as_ref(), &req, None, None).await
}

/// POST {prefix}/blog/{model}/add/
async fn add_submit(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path(model): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());
    save_and_redirect(&state, &site, admin.as_ref(), &req, None, FormData::from_pairs(pairs)).await
}

/// GET {prefix}/blog/{model}/{id}/change/
async fn change_form(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path((model, id)): Path<(String, i64)>,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());
    render_change_form(&state, &site, admin.as_ref(), &req, Some(id), None).await
}

/// POST {prefix}/blog/{model}/{id}/change/
async fn change_submit(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path((model, id)): Path<(String, i64)>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());
    save_and_redirect(&state, &site, admin.as_ref(), &req, Some(id), FormData::from_pairs(pairs)).await
}

// ============================================================================
// Delete
// ============================================================================

/// GET {prefix}/blog/{model}/{id}/delete/
async fn delete_confirmation(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path((model, id)): Path<(String, i64)>,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());

    let confirmation = admin.delete_confirmation(&req, id).await?;
    let change_url = req.model_url(admin.app_label(), admin.model_name(), "change", Some(id))?;
    let html = state
        .renderer
        .delete_confirmation(&site.context(), &user.0, &confirmation, &change_url)?;
    Ok(Html(html).into_response())
}

/// POST {prefix}/blog/{model}/{id}/delete/
async fn delete_submit(
    State(state): State<AppState>,
    Extension(site): Extension<Arc<AdminSite>>,
    user: AuthenticatedUser,
    Path((model, id)): Path<(String, i64)>,
) -> PageResult {
    let admin = model_admin(&site, &model)?;
    let req = AdminRequest::new(&user.0, &site.name, state.sites.urls());

    let repr = admin.delete_object(&req, id).await?;
    let changelist_url = req.model_url(admin.app_label(), admin.model_name(), "changelist", None)?;
    let message = format!("{} “{}” 删除成功。", admin.verbose_name(), repr);
    Ok(redirect_with_message(&site, &changelist_url, &message))
}
