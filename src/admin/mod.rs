//! Admin back office
//!
//! Model admins describe how each blog model is listed, searched and
//! edited, and hook into saving to stamp ownership. They are registered
//! on admin sites, which the HTTP layer mounts under their URL prefixes.
//!
//! - `options`: declarative presentation metadata
//! - `forms`: form data binding and field validation
//! - `filters`: change list parameters and sidebar filters
//! - `views`: contexts for change lists, forms and confirmations
//! - `site`: site registries and URL reversing
//! - `blog`: `PostAdmin`, `CategoryAdmin`, `TagAdmin` and the two sites
//! - `render`: Tera templates for the HTML pages

pub mod blog;
pub mod filters;
pub mod forms;
pub mod options;
pub mod render;
pub mod site;
pub mod views;

pub use blog::{build_sites, CategoryAdmin, PostAdmin, TagAdmin};
pub use filters::{CategoryOwnerFilter, ChangeListParams, ListFilter};
pub use forms::{FormData, FormErrors};
pub use options::{Fieldset, InlineAdmin, Media, ModelAdminOptions};
pub use render::AdminRenderer;
pub use site::{AdminSite, AdminSites, SiteUrls};
pub use views::{ActionOutcome, ChangeForm, ChangeList, DeleteConfirmation, SavedObject};

use crate::models::User;
use async_trait::async_trait;
use forms::FieldSpec;
use serde::Serialize;
use views::{ActionContext, DELETE_SELECTED};

/// Result type of admin operations
pub type AdminResult<T> = Result<T, AdminError>;

/// Error types for admin operations
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// Object missing or outside the user's queryset
    #[error("{0} not found")]
    NotFound(String),

    /// Submitted form failed validation
    #[error("Validation failed")]
    Validation(FormErrors),

    /// Malformed change list parameter
    #[error("Invalid lookup: {0}")]
    InvalidLookup(String),

    /// Action name not offered by the model admin
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// URL name could not be resolved
    #[error("Reverse for '{0}' not found")]
    NoReverseMatch(String),

    /// Model registered twice on one site
    #[error("The model {0} is already registered")]
    AlreadyRegistered(String),

    /// Template rendering failed
    #[error("Template error: {0}")]
    Template(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// The current request as seen by a model admin
#[derive(Clone, Copy)]
pub struct AdminRequest<'a> {
    /// Authenticated admin user
    pub user: &'a User,
    /// Name of the site serving the request
    pub site: &'a str,
    pub urls: &'a SiteUrls,
}

impl<'a> AdminRequest<'a> {
    pub fn new(user: &'a User, site: &'a str, urls: &'a SiteUrls) -> Self {
        Self { user, site, urls }
    }

    /// URL of a model view on the current site
    pub fn model_url(&self, app_label: &str, model_name: &str, view: &str, id: Option<i64>) -> AdminResult<String> {
        let name = format!("{}:{}_{}_{}", self.site, app_label, model_name, view);
        match id {
            Some(id) => self.urls.reverse(&name, &[id]),
            None => self.urls.reverse(&name, &[]),
        }
    }
}

/// Serializable description of a model admin
#[derive(Debug, Clone, Serialize)]
pub struct ModelMeta {
    pub app_label: &'static str,
    pub model_name: &'static str,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    pub options: ModelAdminOptions,
    /// Effective form layout
    pub fieldsets: Vec<Fieldset>,
    pub filters: Vec<FilterMeta>,
    pub actions: Vec<ActionContext>,
}

/// Parameter and title of a change list filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterMeta {
    pub parameter_name: &'static str,
    pub title: &'static str,
}

/// Admin behavior of one model.
///
/// Implementations own their repositories and decide which objects the
/// current user may see. Every lookup by ID goes through that scope, so
/// an object outside it is reported as not found.
#[async_trait]
pub trait ModelAdmin: Send + Sync {
    fn app_label(&self) -> &'static str {
        "blog"
    }

    fn model_name(&self) -> &'static str;

    fn verbose_name(&self) -> &'static str;

    fn verbose_name_plural(&self) -> &'static str {
        self.verbose_name()
    }

    fn options(&self) -> &ModelAdminOptions;

    /// Form fields in declaration order, excluded fields left out
    fn form_fields(&self) -> Vec<FieldSpec>;

    fn list_filters(&self) -> Vec<FilterMeta> {
        Vec::new()
    }

    fn actions(&self) -> Vec<ActionContext> {
        vec![ActionContext::delete_selected(self.verbose_name_plural())]
    }

    fn meta(&self) -> ModelMeta {
        let names: Vec<&'static str> = self.form_fields().iter().map(|f| f.name).collect();
        ModelMeta {
            app_label: self.app_label(),
            model_name: self.model_name(),
            verbose_name: self.verbose_name(),
            verbose_name_plural: self.verbose_name_plural(),
            options: self.options().clone(),
            fieldsets: self.options().get_fieldsets(&names),
            filters: self.list_filters(),
            actions: self.actions(),
        }
    }

    /// Rows of one change list page
    async fn changelist(&self, req: &AdminRequest<'_>, params: &ChangeListParams) -> AdminResult<ChangeList>;

    /// Add form (`object_id` is `None`) or change form.
    ///
    /// With `submitted`, fields show the submitted values and errors
    /// instead of the stored ones.
    async fn change_form(
        &self,
        req: &AdminRequest<'_>,
        object_id: Option<i64>,
        submitted: Option<(&FormData, &FormErrors)>,
    ) -> AdminResult<ChangeForm>;

    /// Validate and save a submitted form, creating when `object_id` is
    /// `None`
    async fn save_form(&self, req: &AdminRequest<'_>, object_id: Option<i64>, data: &FormData) -> AdminResult<SavedObject>;

    async fn delete_confirmation(&self, req: &AdminRequest<'_>, object_id: i64) -> AdminResult<DeleteConfirmation>;

    /// Delete one object, returning its display name
    async fn delete_object(&self, req: &AdminRequest<'_>, object_id: i64) -> AdminResult<String>;

    /// Delete the given objects that are visible to the user
    async fn delete_queryset(&self, req: &AdminRequest<'_>, ids: &[i64]) -> AdminResult<u64>;

    /// Run a bulk action on the selected IDs
    async fn run_action(&self, req: &AdminRequest<'_>, action: &str, ids: &[i64]) -> AdminResult<ActionOutcome> {
        if action != DELETE_SELECTED {
            return Err(AdminError::UnknownAction(action.to_string()));
        }

        let affected_count = self.delete_queryset(req, ids).await?;
        tracing::info!(
            "{} deleted {} {} via {}",
            req.user.username,
            affected_count,
            self.model_name(),
            action
        );

        Ok(ActionOutcome {
            action: action.to_string(),
            affected_count,
            message: format!("成功删除了 {} 个 {}。", affected_count, self.verbose_name_plural()),
        })
    }
}
