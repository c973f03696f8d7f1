//! Blog model admins and site registrations
//!
//! `CategoryAdmin` and `TagAdmin` live on the stock `admin` site, while
//! `PostAdmin` lives on the custom `cus_admin` site. Every save stamps the
//! current user as owner. Posts are additionally scoped to their owner
//! for listing, editing and deleting.

use super::filters::{CategoryOwnerFilter, ChangeListParams, ListFilter};
use super::forms::{
    self, BoundField, FieldKind, FieldSpec, FieldValue, FormData, FormErrors, NON_FIELD_ERRORS,
};
use super::options::{FieldLine, Fieldset, InlineAdmin, InlineType, Media, ModelAdminOptions};
use super::views::{
    bind_fieldsets, format_datetime, Cell, ChangeForm, ChangeList, Column, DeleteConfirmation,
    InlineForm, InlineFormset, PaginationContext, RelatedObjects, Row, SavedObject,
};
use super::{AdminError, AdminRequest, AdminResult, AdminSite, AdminSites, FilterMeta, ModelAdmin};
use crate::config::AdminConfig;
use crate::db::repositories::{
    CategoryPostChange, CategoryRepository, PostQuery, PostRepository, SqlxCategoryRepository, SqlxPostRepository,
    SqlxTagRepository, TagRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Category, ListParams, Post, PostStatus, RecordStatus, Tag, User};
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const BOOTSTRAP_CSS: &str = "https://cdn.bootcss.com/bootstrap/4.0.0-beta.2/css/bootstrap.min.css";
const BOOTSTRAP_JS: &str = "https://cdn.bootcss.com/bootstrap/4.0.0-beta.2/js/bootstrap.bundle.js";

/// Build both admin sites over one database pool
pub fn build_sites(config: &AdminConfig, pool: DynDatabasePool) -> AdminResult<AdminSites> {
    let posts = SqlxPostRepository::boxed(pool.clone());
    let categories = SqlxCategoryRepository::boxed(pool.clone());
    let tags = SqlxTagRepository::boxed(pool);

    let mut admin = AdminSite::new("admin", &config.super_admin_prefix);
    admin.register(Arc::new(
        CategoryAdmin::new(categories.clone(), posts.clone()).with_list_per_page(config.list_per_page),
    ))?;
    admin.register(Arc::new(TagAdmin::new(tags.clone()).with_list_per_page(config.list_per_page)))?;

    let mut cus_admin = AdminSite::new("cus_admin", &config.custom_admin_prefix)
        .with_header("Typeidea")
        .with_title("Typeidea管理后台")
        .with_index_title("首页");
    cus_admin.register(Arc::new(
        PostAdmin::new(posts, categories, tags).with_list_per_page(config.list_per_page),
    ))?;

    Ok(AdminSites::new(vec![admin, cus_admin]))
}

fn record_status_choices() -> Vec<(i32, &'static str)> {
    RecordStatus::CHOICES.iter().map(|s| (s.value(), s.label())).collect()
}

fn post_status_choices() -> Vec<(i32, &'static str)> {
    PostStatus::CHOICES.iter().map(|s| (s.value(), s.label())).collect()
}

fn to_json<T: Serialize>(value: &T) -> AdminResult<serde_json::Value> {
    Ok(serde_json::to_value(value).context("Failed to serialize object")?)
}

fn columns(options: &ModelAdminOptions, label: fn(&str) -> &'static str) -> Vec<Column> {
    options
        .list_display
        .iter()
        .map(|name| Column {
            name: name.to_string(),
            label: label(name).to_string(),
        })
        .collect()
}

/// Attach the change link to the link columns of a row
fn link_row(options: &ModelAdminOptions, cells: Vec<(&'static str, Cell)>, change_url: &str) -> Vec<Cell> {
    let links = options.effective_list_display_links();
    cells
        .into_iter()
        .map(|(name, mut cell)| {
            if links.contains(&name) {
                cell.link = Some(change_url.to_string());
            }
            cell
        })
        .collect()
}

/// Bind every field to its submitted value or its initial value
fn bind_form(
    specs: &[FieldSpec],
    submitted: Option<(&FormData, &FormErrors)>,
    initial: impl Fn(&str) -> FieldValue,
    related: &HashMap<&'static str, Vec<(String, String)>>,
) -> HashMap<&'static str, BoundField> {
    let no_errors = FormErrors::default();
    let errors = submitted.map(|(_, e)| e).unwrap_or(&no_errors);

    specs
        .iter()
        .map(|spec| {
            let value = match submitted {
                Some((data, _)) => FieldValue::from_data(spec, data, spec.name),
                None => initial(spec.name),
            };
            let choices = related.get(spec.name).map(Vec::as_slice).unwrap_or(&[]);
            (
                spec.name,
                BoundField::new(spec, spec.name.to_string(), value, choices, errors),
            )
        })
        .collect()
}

/// Shared shape of every change form
struct FormParts {
    object: Option<(String, serde_json::Value)>,
    fields: HashMap<&'static str, BoundField>,
    inlines: Vec<InlineFormset>,
}

fn change_form_context<A: ModelAdmin + ?Sized>(
    admin: &A,
    req: &AdminRequest<'_>,
    object_id: Option<i64>,
    parts: FormParts,
    errors: Option<&FormErrors>,
) -> AdminResult<ChangeForm> {
    let names: Vec<&'static str> = admin.form_fields().iter().map(|f| f.name).collect();
    let options = admin.options();
    let delete_url = object_id
        .map(|id| req.model_url(admin.app_label(), admin.model_name(), "delete", Some(id)))
        .transpose()?;
    let (object_repr, object) = match parts.object {
        Some((repr, object)) => (Some(repr), Some(object)),
        None => (None, None),
    };

    Ok(ChangeForm {
        model_name: admin.model_name().to_string(),
        verbose_name: admin.verbose_name().to_string(),
        object_id,
        object_repr,
        object,
        fieldsets: bind_fieldsets(&options.get_fieldsets(&names), &parts.fields),
        inlines: parts.inlines,
        non_field_errors: errors.map(|e| e.get(NON_FIELD_ERRORS).to_vec()).unwrap_or_default(),
        has_errors: errors.is_some_and(|e| !e.is_empty()),
        save_on_top: options.save_on_top,
        delete_url,
        media: options.media.clone(),
    })
}

// ============================================================================
// Post
// ============================================================================

/// Admin for posts, served on the custom site
pub struct PostAdmin {
    posts: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    tags: Arc<dyn TagRepository>,
    filters: Vec<Box<dyn ListFilter<PostQuery>>>,
    options: ModelAdminOptions,
}

/// Cleaned post form
struct PostForm {
    title: String,
    desc: String,
    content: String,
    status: PostStatus,
    category_id: i64,
    tag_ids: Vec<i64>,
}

impl PostAdmin {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        tags: Arc<dyn TagRepository>,
    ) -> Self {
        let mut media = Media::default();
        media.css.insert("all", vec![BOOTSTRAP_CSS]);
        media.js.push(BOOTSTRAP_JS);

        let options = ModelAdminOptions {
            list_display: vec!["title", "category", "status", "created_time", "operator"],
            list_display_links: Vec::new(),
            search_fields: vec!["title", "category__name"],
            actions_on_top: true,
            actions_on_bottom: true,
            save_on_top: true,
            exclude: vec!["owner"],
            fieldsets: vec![
                Fieldset::new(
                    "基础配置",
                    vec![FieldLine::Row(vec!["title", "category"]), FieldLine::Single("status")],
                )
                .description("基础配置描述"),
                Fieldset::new("内容", vec![FieldLine::Single("desc"), FieldLine::Single("content")]),
                Fieldset::new("额外信息", vec![FieldLine::Single("tag")]).classes(&["collapse"]),
            ],
            media,
            ..Default::default()
        };

        let filters: Vec<Box<dyn ListFilter<PostQuery>>> =
            vec![Box::new(CategoryOwnerFilter::new(categories.clone()))];

        Self {
            posts,
            categories,
            tags,
            filters,
            options,
        }
    }

    pub fn with_list_per_page(mut self, list_per_page: u32) -> Self {
        self.options.list_per_page = list_per_page.max(1);
        self
    }

    /// Posts `user` may see: only the ones they own
    pub fn get_queryset(&self, user: &User) -> PostQuery {
        PostQuery::all().owned_by(user.id)
    }

    /// Stamp `user` as owner, then persist
    pub async fn save_model(&self, user: &User, mut post: Post, change: bool) -> AdminResult<Post> {
        post.owner_id = user.id;

        let saved = if change {
            self.posts.update(&post).await.context("Failed to update post")?
        } else {
            self.posts.create(&post).await.context("Failed to create post")?
        };

        tracing::info!(
            "{} {} post {} ({})",
            user.username,
            if change { "changed" } else { "added" },
            saved.id,
            saved.title
        );
        Ok(saved)
    }

    /// Edit link of the `operator` column
    pub fn operator(&self, req: &AdminRequest<'_>, post: &Post) -> AdminResult<String> {
        let url = req.urls.reverse("cus_admin:blog_post_change", &[post.id])?;
        Ok(format!(r#"<a href="{}">编辑</a>"#, escape_attr(&url)))
    }

    async fn get_object(&self, user: &User, id: i64) -> AdminResult<Post> {
        self.posts
            .get(&self.get_queryset(user), id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| AdminError::NotFound(format!("文章 {}", id)))
    }

    fn column_label(name: &str) -> &'static str {
        match name {
            "title" => "标题",
            "category" => "分类",
            "status" => "状态",
            "created_time" => "创建时间",
            "operator" => "操作",
            _ => "",
        }
    }

    fn cell(
        &self,
        req: &AdminRequest<'_>,
        post: &Post,
        column: &str,
        category_names: &HashMap<i64, String>,
    ) -> AdminResult<Cell> {
        Ok(match column {
            "title" => Cell::text(json!(post.title), post.title.clone()),
            "category" => Cell::text(
                json!(post.category_id),
                category_names
                    .get(&post.category_id)
                    .cloned()
                    .unwrap_or_else(|| "-".to_string()),
            ),
            "status" => Cell::text(json!(post.status.value()), post.status.label()),
            "created_time" => Cell::text(json!(post.created_time), format_datetime(&post.created_time)),
            "operator" => Cell::html(self.operator(req, post)?),
            _ => Cell::text(serde_json::Value::Null, "-"),
        })
    }

    async fn clean_form(&self, data: &FormData) -> AdminResult<PostForm> {
        let mut errors = FormErrors::default();

        let title = errors.check("title", forms::clean_text(data.get("title"), true, Some(Post::TITLE_MAX_LEN)));
        let desc = errors.check("desc", forms::clean_text(data.get("desc"), false, Some(Post::DESC_MAX_LEN)));
        let content = errors.check("content", forms::clean_text(data.get("content"), true, None));
        let status = errors
            .check("status", forms::clean_choice(data.get("status"), &post_status_choices()))
            .and_then(PostStatus::from_value);
        let category_id = errors
            .check("category", forms::clean_foreign_key(data.get("category"), true))
            .flatten();
        let tag_ids = errors.check("tag", forms::clean_many(&data.get_all("tag")));

        if let Some(id) = category_id {
            let exists = self
                .categories
                .get_by_id(id)
                .await
                .context("Failed to check category")?
                .is_some();
            if !exists {
                errors.add("category", forms::invalid_choice());
            }
        }

        if let Some(ids) = tag_ids.as_deref().filter(|ids| !ids.is_empty()) {
            let found = self.tags.get_by_ids(ids).await.context("Failed to check tags")?;
            if let Some(missing) = ids.iter().find(|id| !found.iter().any(|t| t.id == **id)) {
                errors.add("tag", forms::invalid_pk_choice(*missing));
            }
        }

        match (title, desc, content, status, category_id, tag_ids) {
            (Some(title), Some(desc), Some(content), Some(status), Some(category_id), Some(tag_ids))
                if errors.is_empty() =>
            {
                Ok(PostForm {
                    title,
                    desc,
                    content,
                    status,
                    category_id,
                    tag_ids,
                })
            }
            _ => Err(AdminError::Validation(errors)),
        }
    }

    fn initial(post: Option<&Post>, name: &str) -> FieldValue {
        let text = |f: fn(&Post) -> String| FieldValue::Text(post.map(f).unwrap_or_default());
        match name {
            "title" => text(|p| p.title.clone()),
            "desc" => text(|p| p.desc.clone()),
            "content" => text(|p| p.content.clone()),
            "category" => text(|p| p.category_id.to_string()),
            "status" => FieldValue::Text(
                post.map(|p| p.status).unwrap_or_default().value().to_string(),
            ),
            "tag" => FieldValue::Many(
                post.map(|p| p.tag_ids.iter().map(ToString::to_string).collect())
                    .unwrap_or_default(),
            ),
            _ => FieldValue::Text(String::new()),
        }
    }
}

#[async_trait]
impl ModelAdmin for PostAdmin {
    fn model_name(&self) -> &'static str {
        "post"
    }

    fn verbose_name(&self) -> &'static str {
        "文章"
    }

    fn options(&self) -> &ModelAdminOptions {
        &self.options
    }

    fn form_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("title", "标题", FieldKind::Char { max_length: Post::TITLE_MAX_LEN }),
            FieldSpec::new("desc", "摘要", FieldKind::Text { max_length: Some(Post::DESC_MAX_LEN) }).optional(),
            FieldSpec::new("status", "状态", FieldKind::Choice(post_status_choices())),
            FieldSpec::new("category", "分类", FieldKind::ForeignKey),
            FieldSpec::new("tag", "标签", FieldKind::ManyToMany).optional(),
            FieldSpec::new("content", "正文", FieldKind::Text { max_length: None }),
        ]
    }

    fn list_filters(&self) -> Vec<FilterMeta> {
        self.filters
            .iter()
            .map(|f| FilterMeta {
                parameter_name: f.parameter_name(),
                title: f.title(),
            })
            .collect()
    }

    async fn changelist(&self, req: &AdminRequest<'_>, params: &ChangeListParams) -> AdminResult<ChangeList> {
        let base = self.get_queryset(req.user);

        let mut query = base.clone();
        for filter in &self.filters {
            query = filter.queryset(params.filter_value(filter.parameter_name()), query)?;
        }
        let query = query.search(params.search_terms());

        let page = self
            .posts
            .list(&query, &ListParams::new(params.page, self.options.list_per_page))
            .await
            .context("Failed to list posts")?;
        let full_result_count = self.posts.count(&base).await.context("Failed to count posts")?;

        let mut category_ids: Vec<i64> = page.items.iter().map(|p| p.category_id).collect();
        category_ids.sort_unstable();
        category_ids.dedup();
        let category_names: HashMap<i64, String> = self
            .categories
            .get_by_ids(&category_ids)
            .await
            .context("Failed to load categories")?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut rows = Vec::with_capacity(page.items.len());
        for post in &page.items {
            let change_url = req.model_url(self.app_label(), self.model_name(), "change", Some(post.id))?;
            let mut cells = Vec::with_capacity(self.options.list_display.len());
            for column in &self.options.list_display {
                cells.push((*column, self.cell(req, post, column, &category_names)?));
            }
            rows.push(Row {
                id: post.id,
                cells: link_row(&self.options, cells, &change_url),
                object: to_json(post)?,
            });
        }

        let mut filters = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            filters.push(filter.context(req.user, params).await?);
        }

        Ok(ChangeList {
            model_name: self.model_name().to_string(),
            verbose_name_plural: self.verbose_name_plural().to_string(),
            columns: columns(&self.options, Self::column_label),
            rows,
            filters,
            has_search: self.options.has_search(),
            search_query: params.query.clone(),
            pagination: PaginationContext::new(&page, params),
            result_count: page.total,
            full_result_count,
            actions: self.actions(),
            actions_on_top: self.options.actions_on_top,
            actions_on_bottom: self.options.actions_on_bottom,
            add_url: req.model_url(self.app_label(), self.model_name(), "add", None)?,
            media: self.options.media.clone(),
        })
    }

    async fn change_form(
        &self,
        req: &AdminRequest<'_>,
        object_id: Option<i64>,
        submitted: Option<(&FormData, &FormErrors)>,
    ) -> AdminResult<ChangeForm> {
        let post = match object_id {
            Some(id) => Some(self.get_object(req.user, id).await?),
            None => None,
        };

        let categories = self.categories.list_all().await.context("Failed to list categories")?;
        let tags = self.tags.list_all().await.context("Failed to list tags")?;

        let mut related: HashMap<&'static str, Vec<(String, String)>> = HashMap::new();
        related.insert(
            "category",
            categories.iter().map(|c| (c.id.to_string(), c.name.clone())).collect(),
        );
        related.insert("tag", tags.iter().map(|t| (t.id.to_string(), t.name.clone())).collect());

        let fields = bind_form(
            &self.form_fields(),
            submitted,
            |name| Self::initial(post.as_ref(), name),
            &related,
        );

        let object = match &post {
            Some(p) => Some((p.to_string(), to_json(p)?)),
            None => None,
        };

        change_form_context(
            self,
            req,
            object_id,
            FormParts {
                object,
                fields,
                inlines: Vec::new(),
            },
            submitted.map(|(_, e)| e),
        )
    }

    async fn save_form(&self, req: &AdminRequest<'_>, object_id: Option<i64>, data: &FormData) -> AdminResult<SavedObject> {
        let existing = match object_id {
            Some(id) => Some(self.get_object(req.user, id).await?),
            None => None,
        };
        let form = self.clean_form(data).await?;

        let change = existing.is_some();
        let mut post = existing.unwrap_or_else(|| Post::new(String::new(), String::new(), form.category_id));
        post.title = form.title;
        post.desc = form.desc;
        post.content = form.content;
        post.status = form.status;
        post.category_id = form.category_id;
        post.tag_ids = form.tag_ids;

        let saved = self.save_model(req.user, post, change).await?;
        Ok(SavedObject {
            id: saved.id,
            repr: saved.to_string(),
            object: to_json(&saved)?,
        })
    }

    async fn delete_confirmation(&self, req: &AdminRequest<'_>, object_id: i64) -> AdminResult<DeleteConfirmation> {
        let post = self.get_object(req.user, object_id).await?;
        Ok(DeleteConfirmation {
            model_name: self.model_name().to_string(),
            verbose_name: self.verbose_name().to_string(),
            object_id,
            object_repr: post.to_string(),
            related: Vec::new(),
        })
    }

    async fn delete_object(&self, req: &AdminRequest<'_>, object_id: i64) -> AdminResult<String> {
        let post = self.get_object(req.user, object_id).await?;
        self.delete_queryset(req, &[post.id]).await?;
        tracing::info!("{} deleted post {} ({})", req.user.username, post.id, post.title);
        Ok(post.to_string())
    }

    async fn delete_queryset(&self, req: &AdminRequest<'_>, ids: &[i64]) -> AdminResult<u64> {
        let query = self.get_queryset(req.user).with_ids(ids);
        Ok(self.posts.delete(&query).await.context("Failed to delete posts")?)
    }
}

// ============================================================================
// Category
// ============================================================================

const POST_INLINE_PREFIX: &str = "post_set";

/// Admin for categories, with posts edited inline
pub struct CategoryAdmin {
    categories: Arc<dyn CategoryRepository>,
    posts: Arc<dyn PostRepository>,
    options: ModelAdminOptions,
}

/// Escape a value for a double-quoted HTML attribute, leaving `/` readable
fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Cleaned category form
struct CategoryForm {
    name: String,
    status: RecordStatus,
    is_nav: bool,
}

impl CategoryAdmin {
    pub fn new(categories: Arc<dyn CategoryRepository>, posts: Arc<dyn PostRepository>) -> Self {
        let options = ModelAdminOptions {
            list_display: vec!["name", "status", "is_nav", "created_time"],
            fields: vec!["name", "status", "is_nav"],
            inlines: vec![InlineAdmin {
                model: "post",
                fk_name: "category",
                prefix: POST_INLINE_PREFIX,
                verbose_name_plural: "文章",
                inline_type: InlineType::Tabular,
                fields: vec!["title", "desc"],
                extra: 1,
                can_delete: true,
            }],
            ..Default::default()
        };

        Self {
            categories,
            posts,
            options,
        }
    }

    pub fn with_list_per_page(mut self, list_per_page: u32) -> Self {
        self.options.list_per_page = list_per_page.max(1);
        self
    }

    /// Stamp `user` as owner of the category and of every post the inline
    /// adds, then persist the category and its inline changes together
    pub async fn save_model(
        &self,
        user: &User,
        mut category: Category,
        change: bool,
        mut inline: Vec<CategoryPostChange>,
    ) -> AdminResult<Category> {
        category.owner_id = user.id;
        for post_change in &mut inline {
            if let CategoryPostChange::Create(post) = post_change {
                post.owner_id = user.id;
            }
        }

        let saved = self
            .categories
            .save_with_posts(&category, &inline)
            .await
            .context(if change {
                "Failed to update category"
            } else {
                "Failed to create category"
            })?;

        tracing::info!(
            "{} {} category {} ({}) with {} inline change(s)",
            user.username,
            if change { "changed" } else { "added" },
            saved.id,
            saved.name,
            inline.len()
        );
        Ok(saved)
    }

    async fn get_object(&self, id: i64) -> AdminResult<Category> {
        self.categories
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| AdminError::NotFound(format!("分类 {}", id)))
    }

    fn inline(&self) -> &InlineAdmin {
        &self.options.inlines[0]
    }

    fn inline_specs() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("title", "标题", FieldKind::Char { max_length: Post::TITLE_MAX_LEN }),
            FieldSpec::new("desc", "摘要", FieldKind::Char { max_length: Post::DESC_MAX_LEN }).optional(),
        ]
    }

    fn column_label(name: &str) -> &'static str {
        match name {
            "name" => "名称",
            "status" => "状态",
            "is_nav" => "是否为导航",
            "created_time" => "创建时间",
            _ => "",
        }
    }

    fn cell(category: &Category, column: &str) -> Cell {
        match column {
            "name" => Cell::text(json!(category.name), category.name.clone()),
            "status" => Cell::text(json!(category.status.value()), category.status.label()),
            "is_nav" => Cell::text(json!(category.is_nav), category.is_nav.to_string()),
            "created_time" => Cell::text(
                json!(category.created_time),
                format_datetime(&category.created_time),
            ),
            _ => Cell::text(serde_json::Value::Null, "-"),
        }
    }

    fn clean_form(data: &FormData, errors: &mut FormErrors) -> Option<CategoryForm> {
        let name = errors.check("name", forms::clean_text(data.get("name"), true, Some(Category::NAME_MAX_LEN)));
        let status = errors
            .check("status", forms::clean_choice(data.get("status"), &record_status_choices()))
            .and_then(RecordStatus::from_value);
        let is_nav = forms::is_checked(data.get("is_nav"));

        Some(CategoryForm {
            name: name?,
            status: status?,
            is_nav,
        })
    }

    /// Validate the inline post rows against the category's current posts
    fn clean_inline(data: &FormData, existing: &[Post], errors: &mut FormErrors) -> Vec<CategoryPostChange> {
        let key = |index: usize, field: &str| format!("{}-{}-{}", POST_INLINE_PREFIX, index, field);

        let total_key = format!("{}-TOTAL_FORMS", POST_INLINE_PREFIX);
        let total = match data.get(&total_key) {
            None => 0,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n <= forms::MAX_INLINE_FORMS => n,
                _ => {
                    errors.add(NON_FIELD_ERRORS, "ManagementForm 数据缺失或被篡改");
                    return Vec::new();
                }
            },
        };

        let mut changes = Vec::new();
        for index in 0..total {
            let delete = forms::is_checked(data.get(&key(index, "DELETE")));
            let title_key = key(index, "title");
            let desc_key = key(index, "desc");
            let id = data.get(&key(index, "id")).map(str::trim).filter(|v| !v.is_empty());

            match id {
                Some(raw) => {
                    let post = raw
                        .parse::<i64>()
                        .ok()
                        .and_then(|id| existing.iter().find(|p| p.id == id));
                    let Some(post) = post else {
                        errors.add(&key(index, "id"), forms::invalid_choice());
                        continue;
                    };

                    if delete {
                        changes.push(CategoryPostChange::Delete(post.id));
                        continue;
                    }

                    let title = errors.check(
                        &title_key,
                        forms::clean_text(data.get(&title_key), true, Some(Post::TITLE_MAX_LEN)),
                    );
                    let desc = errors.check(
                        &desc_key,
                        forms::clean_text(data.get(&desc_key), false, Some(Post::DESC_MAX_LEN)),
                    );
                    if let (Some(title), Some(desc)) = (title, desc) {
                        changes.push(CategoryPostChange::Update {
                            id: post.id,
                            title,
                            desc,
                        });
                    }
                }
                None => {
                    let blank = |k: &str| data.get(k).map_or(true, |v| v.trim().is_empty());
                    if delete || (blank(&title_key) && blank(&desc_key)) {
                        continue;
                    }

                    let title = errors.check(
                        &title_key,
                        forms::clean_text(data.get(&title_key), true, Some(Post::TITLE_MAX_LEN)),
                    );
                    let desc = errors.check(
                        &desc_key,
                        forms::clean_text(data.get(&desc_key), false, Some(Post::DESC_MAX_LEN)),
                    );
                    if let (Some(title), Some(desc)) = (title, desc) {
                        let mut post = Post::new(title, String::new(), 0);
                        post.desc = desc;
                        post.status = PostStatus::Normal;
                        changes.push(CategoryPostChange::Create(post));
                    }
                }
            }
        }

        changes
    }

    fn inline_formset(&self, existing: &[Post], submitted: Option<(&FormData, &FormErrors)>) -> InlineFormset {
        let inline = self.inline();
        let specs = Self::inline_specs();
        let no_errors = FormErrors::default();
        let errors = submitted.map(|(_, e)| e).unwrap_or(&no_errors);
        let key = |index: usize, field: &str| format!("{}-{}-{}", inline.prefix, index, field);

        let rows: Vec<Option<&Post>> = match submitted {
            Some((data, _)) => {
                let total = data
                    .get(&format!("{}-TOTAL_FORMS", inline.prefix))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0)
                    .min(forms::MAX_INLINE_FORMS);
                (0..total)
                    .map(|i| {
                        data.get(&key(i, "id"))
                            .and_then(|v| v.trim().parse::<i64>().ok())
                            .and_then(|id| existing.iter().find(|p| p.id == id))
                    })
                    .collect()
            }
            None => existing
                .iter()
                .map(Some)
                .chain(std::iter::repeat(None).take(inline.extra))
                .collect(),
        };

        let forms = rows
            .iter()
            .enumerate()
            .map(|(index, post)| {
                let fields = specs
                    .iter()
                    .map(|spec| {
                        let name = key(index, spec.name);
                        let value = match submitted {
                            Some((data, _)) => FieldValue::from_data(spec, data, &name),
                            None => FieldValue::Text(match (spec.name, post) {
                                ("title", Some(p)) => p.title.clone(),
                                ("desc", Some(p)) => p.desc.clone(),
                                _ => String::new(),
                            }),
                        };
                        BoundField::new(spec, name, value, &[], errors)
                    })
                    .collect();

                let delete_name = key(index, "DELETE");
                InlineForm {
                    id: post.map(|p| p.id),
                    id_name: key(index, "id"),
                    delete_checked: submitted.is_some_and(|(data, _)| forms::is_checked(data.get(&delete_name))),
                    delete_name,
                    fields,
                }
            })
            .collect::<Vec<_>>();

        InlineFormset {
            prefix: inline.prefix.to_string(),
            verbose_name_plural: inline.verbose_name_plural.to_string(),
            inline_type: inline.inline_type,
            columns: specs
                .iter()
                .map(|s| Column {
                    name: s.name.to_string(),
                    label: s.label.to_string(),
                })
                .collect(),
            total_forms: forms.len(),
            initial_forms: rows.iter().filter(|p| p.is_some()).count(),
            can_delete: inline.can_delete,
            forms,
        }
    }
}

#[async_trait]
impl ModelAdmin for CategoryAdmin {
    fn model_name(&self) -> &'static str {
        "category"
    }

    fn verbose_name(&self) -> &'static str {
        "分类"
    }

    fn options(&self) -> &ModelAdminOptions {
        &self.options
    }

    fn form_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("name", "名称", FieldKind::Char { max_length: Category::NAME_MAX_LEN }),
            FieldSpec::new("status", "状态", FieldKind::Choice(record_status_choices())),
            FieldSpec::new("is_nav", "是否为导航", FieldKind::Boolean),
        ]
    }

    async fn changelist(&self, req: &AdminRequest<'_>, params: &ChangeListParams) -> AdminResult<ChangeList> {
        let page = self
            .categories
            .list(&ListParams::new(params.page, self.options.list_per_page))
            .await
            .context("Failed to list categories")?;

        let mut rows = Vec::with_capacity(page.items.len());
        for category in &page.items {
            let change_url = req.model_url(self.app_label(), self.model_name(), "change", Some(category.id))?;
            let cells = self
                .options
                .list_display
                .iter()
                .map(|column| (*column, Self::cell(category, column)))
                .collect();
            rows.push(Row {
                id: category.id,
                cells: link_row(&self.options, cells, &change_url),
                object: to_json(category)?,
            });
        }

        Ok(ChangeList {
            model_name: self.model_name().to_string(),
            verbose_name_plural: self.verbose_name_plural().to_string(),
            columns: columns(&self.options, Self::column_label),
            rows,
            filters: Vec::new(),
            has_search: false,
            search_query: String::new(),
            pagination: PaginationContext::new(&page, params),
            result_count: page.total,
            full_result_count: page.total,
            actions: self.actions(),
            actions_on_top: self.options.actions_on_top,
            actions_on_bottom: self.options.actions_on_bottom,
            add_url: req.model_url(self.app_label(), self.model_name(), "add", None)?,
            media: self.options.media.clone(),
        })
    }

    async fn change_form(
        &self,
        req: &AdminRequest<'_>,
        object_id: Option<i64>,
        submitted: Option<(&FormData, &FormErrors)>,
    ) -> AdminResult<ChangeForm> {
        let category = match object_id {
            Some(id) => Some(self.get_object(id).await?),
            None => None,
        };
        let existing = match &category {
            Some(c) => self
                .posts
                .list_by_category(c.id)
                .await
                .context("Failed to list category posts")?,
            None => Vec::new(),
        };

        let fields = bind_form(
            &self.form_fields(),
            submitted,
            |name| match name {
                "name" => FieldValue::Text(category.as_ref().map(|c| c.name.clone()).unwrap_or_default()),
                "status" => FieldValue::Text(
                    category.as_ref().map(|c| c.status).unwrap_or_default().value().to_string(),
                ),
                "is_nav" => FieldValue::Bool(category.as_ref().is_some_and(|c| c.is_nav)),
                _ => FieldValue::Text(String::new()),
            },
            &HashMap::new(),
        );

        let object = match &category {
            Some(c) => Some((c.to_string(), to_json(c)?)),
            None => None,
        };

        change_form_context(
            self,
            req,
            object_id,
            FormParts {
                object,
                fields,
                inlines: vec![self.inline_formset(&existing, submitted)],
            },
            submitted.map(|(_, e)| e),
        )
    }

    async fn save_form(&self, req: &AdminRequest<'_>, object_id: Option<i64>, data: &FormData) -> AdminResult<SavedObject> {
        let existing = match object_id {
            Some(id) => Some(self.get_object(id).await?),
            None => None,
        };
        let existing_posts = match &existing {
            Some(c) => self
                .posts
                .list_by_category(c.id)
                .await
                .context("Failed to list category posts")?,
            None => Vec::new(),
        };

        let mut errors = FormErrors::default();
        let form = Self::clean_form(data, &mut errors);
        let changes = Self::clean_inline(data, &existing_posts, &mut errors);
        let form = match form {
            Some(form) if errors.is_empty() => form,
            _ => return Err(AdminError::Validation(errors)),
        };

        let change = existing.is_some();
        let mut category = existing.unwrap_or_else(|| Category::new(String::new()));
        category.name = form.name;
        category.status = form.status;
        category.is_nav = form.is_nav;

        let saved = self.save_model(req.user, category, change, changes).await?;

        Ok(SavedObject {
            id: saved.id,
            repr: saved.to_string(),
            object: to_json(&saved)?,
        })
    }

    async fn delete_confirmation(&self, _req: &AdminRequest<'_>, object_id: i64) -> AdminResult<DeleteConfirmation> {
        let category = self.get_object(object_id).await?;
        let posts = self
            .posts
            .list_by_category(category.id)
            .await
            .context("Failed to list category posts")?;

        let related = if posts.is_empty() {
            Vec::new()
        } else {
            vec![RelatedObjects {
                verbose_name_plural: "文章".to_string(),
                items: posts.iter().map(ToString::to_string).collect(),
            }]
        };

        Ok(DeleteConfirmation {
            model_name: self.model_name().to_string(),
            verbose_name: self.verbose_name().to_string(),
            object_id,
            object_repr: category.to_string(),
            related,
        })
    }

    async fn delete_object(&self, req: &AdminRequest<'_>, object_id: i64) -> AdminResult<String> {
        let category = self.get_object(object_id).await?;
        self.delete_queryset(req, &[category.id]).await?;
        tracing::info!("{} deleted category {} ({})", req.user.username, category.id, category.name);
        Ok(category.to_string())
    }

    async fn delete_queryset(&self, _req: &AdminRequest<'_>, ids: &[i64]) -> AdminResult<u64> {
        Ok(self
            .categories
            .delete_many(ids)
            .await
            .context("Failed to delete categories")?)
    }
}

// ============================================================================
// Tag
// ============================================================================

/// Admin for tags
pub struct TagAdmin {
    tags: Arc<dyn TagRepository>,
    options: ModelAdminOptions,
}

impl TagAdmin {
    pub fn new(tags: Arc<dyn TagRepository>) -> Self {
        let options = ModelAdminOptions {
            list_display: vec!["name", "status", "created_time"],
            fields: vec!["name", "status"],
            ..Default::default()
        };
        Self { tags, options }
    }

    pub fn with_list_per_page(mut self, list_per_page: u32) -> Self {
        self.options.list_per_page = list_per_page.max(1);
        self
    }

    /// Stamp `user` as owner, then persist
    pub async fn save_model(&self, user: &User, mut tag: Tag, change: bool) -> AdminResult<Tag> {
        tag.owner_id = user.id;

        let saved = if change {
            self.tags.update(&tag).await.context("Failed to update tag")?
        } else {
            self.tags.create(&tag).await.context("Failed to create tag")?
        };

        tracing::info!(
            "{} {} tag {} ({})",
            user.username,
            if change { "changed" } else { "added" },
            saved.id,
            saved.name
        );
        Ok(saved)
    }

    async fn get_object(&self, id: i64) -> AdminResult<Tag> {
        self.tags
            .get_by_id(id)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| AdminError::NotFound(format!("标签 {}", id)))
    }

    fn column_label(name: &str) -> &'static str {
        match name {
            "name" => "名称",
            "status" => "状态",
            "created_time" => "创建时间",
            _ => "",
        }
    }

    fn cell(tag: &Tag, column: &str) -> Cell {
        match column {
            "name" => Cell::text(json!(tag.name), tag.name.clone()),
            "status" => Cell::text(json!(tag.status.value()), tag.status.label()),
            "created_time" => Cell::text(json!(tag.created_time), format_datetime(&tag.created_time)),
            _ => Cell::text(serde_json::Value::Null, "-"),
        }
    }
}

#[async_trait]
impl ModelAdmin for TagAdmin {
    fn model_name(&self) -> &'static str {
        "tag"
    }

    fn verbose_name(&self) -> &'static str {
        "标签"
    }

    fn options(&self) -> &ModelAdminOptions {
        &self.options
    }

    fn form_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("name", "名称", FieldKind::Char { max_length: Tag::NAME_MAX_LEN }),
            FieldSpec::new("status", "状态", FieldKind::Choice(record_status_choices())),
        ]
    }

    async fn changelist(&self, req: &AdminRequest<'_>, params: &ChangeListParams) -> AdminResult<ChangeList> {
        let page = self
            .tags
            .list(&ListParams::new(params.page, self.options.list_per_page))
            .await
            .context("Failed to list tags")?;

        let mut rows = Vec::with_capacity(page.items.len());
        for tag in &page.items {
            let change_url = req.model_url(self.app_label(), self.model_name(), "change", Some(tag.id))?;
            let cells = self
                .options
                .list_display
                .iter()
                .map(|column| (*column, Self::cell(tag, column)))
                .collect();
            rows.push(Row {
                id: tag.id,
                cells: link_row(&self.options, cells, &change_url),
                object: to_json(tag)?,
            });
        }

        Ok(ChangeList {
            model_name: self.model_name().to_string(),
            verbose_name_plural: self.verbose_name_plural().to_string(),
            columns: columns(&self.options, Self::column_label),
            rows,
            filters: Vec::new(),
            has_search: false,
            search_query: String::new(),
            pagination: PaginationContext::new(&page, params),
            result_count: page.total,
            full_result_count: page.total,
            actions: self.actions(),
            actions_on_top: self.options.actions_on_top,
            actions_on_bottom: self.options.actions_on_bottom,
            add_url: req.model_url(self.app_label(), self.model_name(), "add", None)?,
            media: self.options.media.clone(),
        })
    }

    async fn change_form(
        &self,
        req: &AdminRequest<'_>,
        object_id: Option<i64>,
        submitted: Option<(&FormData, &FormErrors)>,
    ) -> AdminResult<ChangeForm> {
        let tag = match object_id {
            Some(id) => Some(self.get_object(id).await?),
            None => None,
        };

        let fields = bind_form(
            &self.form_fields(),
            submitted,
            |name| match name {
                "name" => FieldValue::Text(tag.as_ref().map(|t| t.name.clone()).unwrap_or_default()),
                "status" => FieldValue::Text(
                    tag.as_ref().map(|t| t.status).unwrap_or_default().value().to_string(),
                ),
                _ => FieldValue::Text(String::new()),
            },
            &HashMap::new(),
        );

        let object = match &tag {
            Some(t) => Some((t.to_string(), to_json(t)?)),
            None => None,
        };

        change_form_context(
            self,
            req,
            object_id,
            FormParts {
                object,
                fields,
                inlines: Vec::new(),
            },
            submitted.map(|(_, e)| e),
        )
    }

    async fn save_form(&self, req: &AdminRequest<'_>, object_id: Option<i64>, data: &FormData) -> AdminResult<SavedObject> {
        let existing = match object_id {
            Some(id) => Some(self.get_object(id).await?),
            None => None,
        };

        let mut errors = FormErrors::default();
        let name = errors.check("name", forms::clean_text(data.get("name"), true, Some(Tag::NAME_MAX_LEN)));
        let status = errors
            .check("status", forms::clean_choice(data.get("status"), &record_status_choices()))
            .and_then(RecordStatus::from_value);
        let (name, status) = match (name, status) {
            (Some(name), Some(status)) if errors.is_empty() => (name, status),
            _ => return Err(AdminError::Validation(errors)),
        };

        let change = existing.is_some();
        let mut tag = existing.unwrap_or_else(|| Tag::new(String::new()));
        tag.name = name;
        tag.status = status;

        let saved = self.save_model(req.user, tag, change).await?;
        Ok(SavedObject {
            id: saved.id,
            repr: saved.to_string(),
            object: to_json(&saved)?,
        })
    }

    async fn delete_confirmation(&self, _req: &AdminRequest<'_>, object_id: i64) -> AdminResult<DeleteConfirmation> {
        let tag = self.get_object(object_id).await?;
        Ok(DeleteConfirmation {
            model_name: self.model_name().to_string(),
            verbose_name: self.verbose_name().to_string(),
            object_id,
            object_repr: tag.to_string(),
            related: Vec::new(),
        })
    }

    async fn delete_object(&self, req: &AdminRequest<'_>, object_id: i64) -> AdminResult<String> {
        let tag = self.get_object(object_id).await?;
        self.delete_queryset(req, &[tag.id]).await?;
        tracing::info!("{} deleted tag {} ({})", req.user.username, tag.id, tag.name);
        Ok(tag.to_string())
    }

    async fn delete_queryset(&self, _req: &AdminRequest<'_>, ids: &[i64]) -> AdminResult<u64> {
        Ok(self.tags.delete_many(ids).await.context("Failed to delete tags")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::testing::{insert_user, migrated_pool};

    struct Fixture {
        pool: DynDatabasePool,
        sites: AdminSites,
        posts: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        tags: Arc<dyn TagRepository>,
        alice: User,
        bob: User,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = migrated_pool().await;
            let users = SqlxUserRepository::new(pool.clone());
            let alice_id = insert_user(&pool, "alice").await;
            let bob_id = insert_user(&pool, "bob").await;

            Self {
                pool: pool.clone(),
                sites: build_sites(&AdminConfig::default(), pool.clone()).expect("Failed to build sites"),
                posts: SqlxPostRepository::boxed(pool.clone()),
                categories: SqlxCategoryRepository::boxed(pool.clone()),
                tags: SqlxTagRepository::boxed(pool.clone()),
                alice: users.get_by_id(alice_id).await.unwrap().unwrap(),
                bob: users.get_by_id(bob_id).await.unwrap().unwrap(),
            }
        }

        fn post_admin(&self) -> PostAdmin {
            PostAdmin::new(self.posts.clone(), self.categories.clone(), self.tags.clone())
        }

        fn admin(&self, site: &str, model: &str) -> Arc<dyn ModelAdmin> {
            self.sites.get(site).unwrap().get("blog", model).unwrap()
        }

        fn req<'a>(&'a self, user: &'a User, site: &'a str) -> AdminRequest<'a> {
            AdminRequest::new(user, site, self.sites.urls())
        }

        async fn category(&self, name: &str, owner: &User) -> Category {
            let mut category = Category::new(name.to_string());
            category.owner_id = owner.id;
            self.categories.create(&category).await.unwrap()
        }

        async fn tag(&self, name: &str, owner: &User) -> Tag {
            let mut tag = Tag::new(name.to_string());
            tag.owner_id = owner.id;
            self.tags.create(&tag).await.unwrap()
        }

        async fn post(&self, title: &str, category: &Category, owner: &User) -> Post {
            let mut post = Post::new(title.to_string(), "body".to_string(), category.id);
            post.owner_id = owner.id;
            self.posts.create(&post).await.unwrap()
        }
    }

    fn data(pairs: &[(&str, &str)]) -> FormData {
        FormData::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn params(pairs: &[(&str, &str)]) -> ChangeListParams {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ChangeListParams::from_pairs(&pairs).unwrap()
    }

    fn row_titles(list: &ChangeList) -> Vec<String> {
        list.rows.iter().map(|r| r.cells[0].display.clone()).collect()
    }

    #[tokio::test]
    async fn test_post_changelist_only_lists_own_posts() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        f.post("mine 1", &rust, &f.alice).await;
        f.post("theirs", &rust, &f.bob).await;
        f.post("mine 2", &rust, &f.alice).await;

        let admin = f.admin("cus_admin", "post");
        let list = admin.changelist(&f.req(&f.alice, "cus_admin"), &params(&[])).await.unwrap();

        assert_eq!(row_titles(&list), vec!["mine 2", "mine 1"]);
        assert_eq!(list.result_count, 2);
        assert_eq!(list.full_result_count, 2);

        let list = admin.changelist(&f.req(&f.bob, "cus_admin"), &params(&[])).await.unwrap();
        assert_eq!(row_titles(&list), vec!["theirs"]);
    }

    #[tokio::test]
    async fn test_owner_category_filter_narrows_list() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let go = f.category("Go", &f.alice).await;
        let other = f.category("Other", &f.bob).await;
        f.post("in rust", &rust, &f.alice).await;
        f.post("in go", &go, &f.alice).await;

        let admin = f.admin("cus_admin", "post");
        let req = f.req(&f.alice, "cus_admin");

        let id = rust.id.to_string();
        let list = admin.changelist(&req, &params(&[("owner_category", id.as_str())])).await.unwrap();
        assert_eq!(row_titles(&list), vec!["in rust"]);
        assert_eq!(list.result_count, 1);
        assert_eq!(list.full_result_count, 2);

        let filter = &list.filters[0];
        assert_eq!(filter.title, "分类过滤器");
        let labels: Vec<&str> = filter.choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["全部", "Rust", "Go"]);
        assert!(filter.choices[1].selected);
        assert!(!labels.contains(&other.name.as_str()));

        let list = admin.changelist(&req, &params(&[("owner_category", "")])).await.unwrap();
        assert_eq!(list.result_count, 2);

        let result = admin.changelist(&req, &params(&[("owner_category", "rust")])).await;
        assert!(matches!(result, Err(AdminError::InvalidLookup(_))));
    }

    #[tokio::test]
    async fn test_search_matches_title_and_category_name() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let go = f.category("Go", &f.alice).await;
        f.post("Async patterns", &rust, &f.alice).await;
        f.post("Async in practice", &go, &f.alice).await;
        f.post("Ownership", &rust, &f.alice).await;

        let admin = f.admin("cus_admin", "post");
        let req = f.req(&f.alice, "cus_admin");

        let list = admin.changelist(&req, &params(&[("q", "async rust")])).await.unwrap();
        assert_eq!(row_titles(&list), vec!["Async patterns"]);

        let list = admin.changelist(&req, &params(&[("q", "RUST")])).await.unwrap();
        assert_eq!(row_titles(&list), vec!["Ownership", "Async patterns"]);

        let list = admin.changelist(&req, &params(&[("q", "   ")])).await.unwrap();
        assert_eq!(list.result_count, 3);
    }

    #[tokio::test]
    async fn test_post_rows_display_labels_and_operator_link() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let post = f.post("Hello", &rust, &f.alice).await;

        let admin = f.admin("cus_admin", "post");
        let list = admin.changelist(&f.req(&f.alice, "cus_admin"), &params(&[])).await.unwrap();

        let labels: Vec<&str> = list.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["标题", "分类", "状态", "创建时间", "操作"]);

        let row = &list.rows[0];
        let change_url = format!("/admin/blog/post/{}/change/", post.id);
        assert_eq!(row.cells[0].link.as_deref(), Some(change_url.as_str()));
        assert_eq!(row.cells[1].display, "Rust");
        assert_eq!(row.cells[1].link, None);
        assert_eq!(row.cells[2].display, "正常");
        assert_eq!(
            row.cells[4].html.as_deref(),
            Some(format!(r#"<a href="/admin/blog/post/{}/change/">编辑</a>"#, post.id).as_str())
        );
        assert_eq!(list.add_url, "/admin/blog/post/add/");
        assert!(list.actions_on_bottom);
        assert_eq!(list.media.js.len(), 1);
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr("/admin/blog/post/1/change/"), "/admin/blog/post/1/change/");
        assert_eq!(
            escape_attr(r#"/a?x=1&y="<b>'"#),
            "/a?x=1&amp;y=&quot;&lt;b&gt;&#x27;"
        );
    }

    #[tokio::test]
    async fn test_saving_post_stamps_current_user() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.bob).await;
        let tag = f.tag("web", &f.bob).await;
        let admin = f.admin("cus_admin", "post");

        let category = rust.id.to_string();
        let tag_id = tag.id.to_string();
        let bob_id = f.bob.id.to_string();
        let saved = admin
            .save_form(
                &f.req(&f.alice, "cus_admin"),
                None,
                &data(&[
                    ("title", "Hello"),
                    ("category", category.as_str()),
                    ("status", "2"),
                    ("content", "# body"),
                    ("tag", tag_id.as_str()),
                    ("owner", bob_id.as_str()),
                ]),
            )
            .await
            .unwrap();

        let post = f.posts.get(&PostQuery::all(), saved.id).await.unwrap().unwrap();
        assert_eq!(post.owner_id, f.alice.id);
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.tag_ids, vec![tag.id]);
        assert_eq!(post.content, "# body");
    }

    #[tokio::test]
    async fn test_save_model_overwrites_owner_on_change() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let mut post = f.post("Hello", &rust, &f.alice).await;
        let admin = f.post_admin();

        post.owner_id = f.bob.id;
        post.title = "Changed".to_string();
        let saved = admin.save_model(&f.alice, post, true).await.unwrap();
        assert_eq!(saved.owner_id, f.alice.id);
        assert_eq!(saved.title, "Changed");

        assert_eq!(admin.get_queryset(&f.alice), PostQuery::all().owned_by(f.alice.id));
    }

    #[tokio::test]
    async fn test_other_users_post_is_not_found() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.bob).await;
        let post = f.post("Bob's", &rust, &f.bob).await;

        let admin = f.admin("cus_admin", "post");
        let req = f.req(&f.alice, "cus_admin");
        let category = rust.id.to_string();
        let form = data(&[("title", "Mine now"), ("category", category.as_str()), ("status", "1"), ("content", "x")]);

        assert!(matches!(admin.change_form(&req, Some(post.id), None).await, Err(AdminError::NotFound(_))));
        assert!(matches!(admin.save_form(&req, Some(post.id), &form).await, Err(AdminError::NotFound(_))));
        assert!(matches!(admin.delete_confirmation(&req, post.id).await, Err(AdminError::NotFound(_))));
        assert!(matches!(admin.delete_object(&req, post.id).await, Err(AdminError::NotFound(_))));

        let outcome = admin.run_action(&req, "delete_selected", &[post.id]).await.unwrap();
        assert_eq!(outcome.affected_count, 0);

        let stored = f.posts.get(&PostQuery::all(), post.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Bob's");
        assert_eq!(stored.owner_id, f.bob.id);
    }

    #[tokio::test]
    async fn test_delete_selected_removes_own_posts() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let a = f.post("a", &rust, &f.alice).await;
        let b = f.post("b", &rust, &f.alice).await;
        let c = f.post("c", &rust, &f.alice).await;

        let admin = f.admin("cus_admin", "post");
        let req = f.req(&f.alice, "cus_admin");
        let outcome = admin.run_action(&req, "delete_selected", &[a.id, c.id]).await.unwrap();
        assert_eq!(outcome.affected_count, 2);
        assert!(outcome.message.contains('2'));

        let list = admin.changelist(&req, &params(&[])).await.unwrap();
        assert_eq!(list.rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id]);

        let result = admin.run_action(&req, "publish", &[b.id]).await;
        assert!(matches!(result, Err(AdminError::UnknownAction(_))));
    }

    #[tokio::test]
    async fn test_post_form_validation() {
        let f = Fixture::new().await;
        let admin = f.admin("cus_admin", "post");
        let req = f.req(&f.alice, "cus_admin");
        let long_title = "t".repeat(256);

        let err = admin
            .save_form(
                &req,
                None,
                &data(&[("title", long_title.as_str()), ("category", "999"), ("status", "7"), ("tag", "5")]),
            )
            .await
            .unwrap_err();

        let AdminError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        for field in ["title", "category", "status", "content", "tag"] {
            assert!(!errors.get(field).is_empty(), "missing error for {}", field);
        }
        assert!(errors.get("desc").is_empty());
    }

    #[tokio::test]
    async fn test_post_change_form_layout() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let post = f.post("Hello", &rust, &f.alice).await;

        let admin = f.admin("cus_admin", "post");
        let form = admin
            .change_form(&f.req(&f.alice, "cus_admin"), Some(post.id), None)
            .await
            .unwrap();

        let names: Vec<Option<&str>> = form.fieldsets.iter().map(|fs| fs.name.as_deref()).collect();
        assert_eq!(names, vec![Some("基础配置"), Some("内容"), Some("额外信息")]);
        assert_eq!(form.fieldsets[0].description.as_deref(), Some("基础配置描述"));
        assert_eq!(form.fieldsets[0].lines[0].len(), 2);
        assert_eq!(form.fieldsets[0].lines[0][0].value, "Hello");
        assert_eq!(form.fieldsets[2].classes, "collapse");
        assert!(form.save_on_top);
        assert_eq!(form.object_repr.as_deref(), Some("Hello"));
        assert_eq!(
            form.delete_url.as_deref(),
            Some(format!("/admin/blog/post/{}/delete/", post.id).as_str())
        );

        let owner_shown = form
            .fieldsets
            .iter()
            .flat_map(|fs| fs.lines.iter().flatten())
            .any(|field| field.name == "owner");
        assert!(!owner_shown);

        let category = &form.fieldsets[0].lines[0][1];
        assert!(category.choices.iter().any(|c| c.label == "Rust" && c.selected));
    }

    #[tokio::test]
    async fn test_rerendered_form_keeps_submitted_values() {
        let f = Fixture::new().await;
        let admin = f.admin("cus_admin", "post");
        let req = f.req(&f.alice, "cus_admin");

        let submitted = data(&[("title", "Draft title")]);
        let errors = FormErrors::single("content", "这个字段是必填项。");
        let form = admin.change_form(&req, None, Some((&submitted, &errors))).await.unwrap();

        assert!(form.has_errors);
        let fields: Vec<&BoundField> = form.fieldsets.iter().flat_map(|fs| fs.lines.iter().flatten()).collect();
        let title = fields.iter().find(|f| f.name == "title").unwrap();
        let content = fields.iter().find(|f| f.name == "content").unwrap();
        assert_eq!(title.value, "Draft title");
        assert_eq!(content.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_category_and_tag_saves_stamp_owner() {
        let f = Fixture::new().await;
        let req = f.req(&f.alice, "admin");

        let bob_id = f.bob.id.to_string();
        let category = f
            .admin("admin", "category")
            .save_form(&req, None, &data(&[("name", "Rust"), ("status", "1"), ("is_nav", "on"), ("owner", bob_id.as_str())]))
            .await
            .unwrap();
        let stored = f.categories.get_by_id(category.id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, f.alice.id);
        assert!(stored.is_nav);

        let tag = f.tag("old", &f.bob).await;
        f.admin("admin", "tag")
            .save_form(&req, Some(tag.id), &data(&[("name", "new"), ("status", "0")]))
            .await
            .unwrap();
        let stored = f.tags.get_by_id(tag.id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, f.alice.id);
        assert_eq!(stored.name, "new");
        assert_eq!(stored.status, RecordStatus::Deleted);

        let result = f
            .admin("admin", "tag")
            .save_form(&req, None, &data(&[("name", "much too long"), ("status", "1")]))
            .await;
        assert!(matches!(result, Err(AdminError::Validation(_))));
    }

    #[tokio::test]
    async fn test_category_changelist_is_not_owner_scoped() {
        let f = Fixture::new().await;
        f.category("Rust", &f.alice).await;
        f.category("Go", &f.bob).await;

        let admin = f.admin("admin", "category");
        let list = admin.changelist(&f.req(&f.alice, "admin"), &params(&[])).await.unwrap();
        assert_eq!(row_titles(&list), vec!["Go", "Rust"]);
        assert_eq!(list.rows[0].cells[2].display, "false");
        assert!(list.rows[0].cells[0].link.is_some());
        assert!(!list.has_search);
    }

    #[tokio::test]
    async fn test_category_inline_rows_are_saved() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.bob).await;
        let kept = f.post("kept", &rust, &f.bob).await;
        let removed = f.post("removed", &rust, &f.bob).await;
        let admin = f.admin("admin", "category");

        let kept_id = kept.id.to_string();
        let removed_id = removed.id.to_string();
        admin
            .save_form(
                &f.req(&f.alice, "admin"),
                Some(rust.id),
                &data(&[
                    ("name", "Rust lang"),
                    ("status", "1"),
                    ("post_set-TOTAL_FORMS", "4"),
                    ("post_set-0-id", kept_id.as_str()),
                    ("post_set-0-title", "kept and renamed"),
                    ("post_set-0-desc", "summary"),
                    ("post_set-1-id", removed_id.as_str()),
                    ("post_set-1-title", "removed"),
                    ("post_set-1-DELETE", "on"),
                    ("post_set-2-title", "brand new"),
                    ("post_set-3-title", ""),
                ]),
            )
            .await
            .unwrap();

        let posts = f.posts.list_by_category(rust.id).await.unwrap();
        let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["brand new", "kept and renamed"]);

        let renamed = posts.iter().find(|p| p.id == kept.id).unwrap();
        assert_eq!(renamed.desc, "summary");
        assert_eq!(renamed.owner_id, f.bob.id);

        let created = posts.iter().find(|p| p.title == "brand new").unwrap();
        assert_eq!(created.owner_id, f.alice.id);
        assert_eq!(created.status, PostStatus::Normal);
        assert_eq!(created.content, "");
    }

    #[tokio::test]
    async fn test_category_inline_errors_block_save() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let admin = f.admin("admin", "category");

        let err = admin
            .save_form(
                &f.req(&f.alice, "admin"),
                Some(rust.id),
                &data(&[
                    ("name", "Renamed"),
                    ("status", "1"),
                    ("post_set-TOTAL_FORMS", "2"),
                    ("post_set-0-id", "9999"),
                    ("post_set-0-title", "ghost"),
                    ("post_set-1-title", ""),
                    ("post_set-1-desc", "desc without title"),
                ]),
            )
            .await
            .unwrap_err();

        let AdminError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(!errors.get("post_set-0-id").is_empty());
        assert!(!errors.get("post_set-1-title").is_empty());

        let stored = f.categories.get_by_id(rust.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Rust");
    }

    #[tokio::test]
    async fn test_category_save_is_undone_when_an_inline_row_fails() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let kept = f.post("kept", &rust, &f.alice).await;
        let admin = f.admin("admin", "category");

        sqlx::query(
            "CREATE TRIGGER reject_post BEFORE INSERT ON posts WHEN NEW.title = 'reject' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(f.pool.as_sqlite().unwrap())
        .await
        .unwrap();

        let kept_id = kept.id.to_string();
        let err = admin
            .save_form(
                &f.req(&f.alice, "admin"),
                Some(rust.id),
                &data(&[
                    ("name", "Renamed"),
                    ("status", "1"),
                    ("post_set-TOTAL_FORMS", "2"),
                    ("post_set-0-id", kept_id.as_str()),
                    ("post_set-0-title", "kept and renamed"),
                    ("post_set-1-title", "reject"),
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InternalError(_)));

        let stored = f.categories.get_by_id(rust.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Rust");
        let posts = f.posts.list_by_category(rust.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "kept");
    }

    #[tokio::test]
    async fn test_category_change_form_has_post_inline() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        f.post("first", &rust, &f.alice).await;

        let admin = f.admin("admin", "category");
        let form = admin.change_form(&f.req(&f.alice, "admin"), Some(rust.id), None).await.unwrap();

        assert_eq!(form.fieldsets.len(), 1);
        assert_eq!(form.fieldsets[0].name, None);
        assert_eq!(form.fieldsets[0].lines.len(), 3);

        let inline = &form.inlines[0];
        assert_eq!(inline.inline_type, InlineType::Tabular);
        assert_eq!(inline.initial_forms, 1);
        assert_eq!(inline.total_forms, 2);
        assert_eq!(inline.forms[0].fields[0].name, "post_set-0-title");
        assert_eq!(inline.forms[0].fields[0].value, "first");
        assert_eq!(inline.forms[1].id, None);
    }

    #[tokio::test]
    async fn test_category_delete_cascades_to_posts() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let post = f.post("gone", &rust, &f.bob).await;

        let admin = f.admin("admin", "category");
        let req = f.req(&f.alice, "admin");

        let confirmation = admin.delete_confirmation(&req, rust.id).await.unwrap();
        assert_eq!(confirmation.object_repr, "Rust");
        assert_eq!(confirmation.related[0].items, vec!["gone".to_string()]);

        assert_eq!(admin.delete_object(&req, rust.id).await.unwrap(), "Rust");
        assert!(f.posts.get(&PostQuery::all(), post.id).await.unwrap().is_none());
        assert!(matches!(admin.delete_object(&req, rust.id).await, Err(AdminError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tag_delete_untags_posts_but_keeps_them() {
        let f = Fixture::new().await;
        let rust = f.category("Rust", &f.alice).await;
        let web = f.tag("web", &f.alice).await;
        let cli = f.tag("cli", &f.alice).await;
        let async_tag = f.tag("async", &f.alice).await;

        let mut post = Post::new("tagged".to_string(), "body".to_string(), rust.id);
        post.owner_id = f.bob.id;
        post.tag_ids = vec![web.id, cli.id, async_tag.id];
        let post = f.posts.create(&post).await.unwrap();

        let admin = f.admin("admin", "tag");
        let req = f.req(&f.alice, "admin");

        let confirmation = admin.delete_confirmation(&req, web.id).await.unwrap();
        assert!(confirmation.related.is_empty());
        assert_eq!(admin.delete_object(&req, web.id).await.unwrap(), "web");

        let stored = f.posts.get(&PostQuery::all(), post.id).await.unwrap().expect("post kept");
        assert_eq!(stored.tag_ids, vec![cli.id, async_tag.id]);

        let outcome = admin
            .run_action(&req, "delete_selected", &[cli.id, async_tag.id])
            .await
            .unwrap();
        assert_eq!(outcome.affected_count, 2);

        let stored = f.posts.get(&PostQuery::all(), post.id).await.unwrap().expect("post kept");
        assert!(stored.tag_ids.is_empty());
        assert_eq!(stored.title, "tagged");

        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_tags")
            .fetch_one(f.pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(links, 0);
    }

    #[tokio::test]
    async fn test_sites_register_models() {
        let f = Fixture::new().await;
        let admin = f.sites.get("admin").unwrap();
        let cus_admin = f.sites.get("cus_admin").unwrap();

        assert!(admin.get("blog", "category").is_some());
        assert!(admin.get("blog", "tag").is_some());
        assert!(admin.get("blog", "post").is_none());
        assert!(cus_admin.get("blog", "post").is_some());
        assert_eq!(cus_admin.site_title, "Typeidea管理后台");
        assert_eq!(cus_admin.index_title, "首页");

        let meta = f.admin("cus_admin", "post").meta();
        assert_eq!(meta.filters[0].parameter_name, "owner_category");
        assert_eq!(meta.options.exclude, vec!["owner"]);
        assert_eq!(meta.actions[0].name, "delete_selected");
    }
}
