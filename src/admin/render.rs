//! HTML rendering of admin pages
//!
//! Templates are embedded from `templates/admin/` at build time and
//! compiled once into a Tera instance. Each page gets the site titles and
//! the current user on top of its view context.

use super::site::{SiteContext, SiteIndex};
use super::views::{ChangeForm, ChangeList, DeleteConfirmation};
use super::{AdminError, AdminResult};
use crate::models::User;
use rust_embed::RustEmbed;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

/// Embedded admin page templates
#[derive(RustEmbed)]
#[folder = "templates/admin/"]
#[include = "*.html"]
struct AdminTemplates;

/// Renders admin pages from the embedded templates
pub struct AdminRenderer {
    tera: Tera,
}

impl AdminRenderer {
    /// Compile every embedded template
    pub fn new() -> AdminResult<Self> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for name in AdminTemplates::iter() {
            let file = AdminTemplates::get(&name)
                .ok_or_else(|| AdminError::Template(format!("Missing embedded template {}", name)))?;
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|e| AdminError::Template(format!("Template {} is not UTF-8: {}", name, e)))?;
            templates.push((name.to_string(), content));
        }

        // Parents first so children can resolve them
        templates.sort_by_key(|(name, _)| name != "base.html");

        let mut tera = Tera::default();
        for (name, content) in &templates {
            tera.add_raw_template(name, content)
                .map_err(|e| AdminError::Template(format!("Failed to add template {}: {}", name, e)))?;
        }
        tera.build_inheritance_chains()
            .map_err(|e| AdminError::Template(format!("Failed to build template inheritance: {}", e)))?;

        tracing::debug!("Loaded {} admin templates", templates.len());
        Ok(Self { tera })
    }

    fn base_context(site: &SiteContext, user: Option<&User>) -> TeraContext {
        let mut context = TeraContext::new();
        context.insert("site", site);
        context.insert("index_url", &format!("{}/", site.prefix));
        context.insert("logout_url", &format!("{}/logout/", site.prefix));
        context.insert("username", &user.map(|u| u.username.as_str()));
        context.insert("media", &Vec::<(&str, &str)>::new());
        context.insert("scripts", &Vec::<&str>::new());
        context
    }

    fn render(&self, template: &str, context: &TeraContext) -> AdminResult<String> {
        self.tera.render(template, context).map_err(|e| {
            let mut message = format!("Failed to render {}: {}", template, e);
            let mut source = e.source();
            while let Some(s) = source {
                message.push_str(&format!("\n  Caused by: {}", s));
                source = s.source();
            }
            AdminError::Template(message)
        })
    }

    pub fn login(&self, site: &SiteContext, username: &str, error: Option<&str>, next: &str) -> AdminResult<String> {
        let mut context = Self::base_context(site, None);
        context.insert("title", "登录");
        context.insert("login_username", username);
        context.insert("error", &error);
        context.insert("next", next);
        self.render("login.html", &context)
    }

    pub fn index(&self, index: &SiteIndex, user: &User) -> AdminResult<String> {
        let mut context = Self::base_context(&index.site, Some(user));
        context.insert("title", &index.site.index_title);
        context.insert("apps", &index.apps);
        self.render("index.html", &context)
    }

    pub fn change_list(
        &self,
        site: &SiteContext,
        user: &User,
        list: &ChangeList,
        message: Option<&str>,
    ) -> AdminResult<String> {
        let mut context = Self::base_context(site, Some(user));
        context.insert("title", &format!("选择 {} 来修改", list.verbose_name_plural));
        context.insert("cl", list);
        context.insert("media", &list.media.stylesheets());
        context.insert("scripts", &list.media.js);
        context.insert("message", &message);
        self.render("change_list.html", &context)
    }

    pub fn change_form(
        &self,
        site: &SiteContext,
        user: &User,
        form: &ChangeForm,
        changelist_url: &str,
    ) -> AdminResult<String> {
        let title = match form.object_id {
            Some(_) => format!("修改 {}", form.verbose_name),
            None => format!("增加 {}", form.verbose_name),
        };

        let mut context = Self::base_context(site, Some(user));
        context.insert("title", &title);
        context.insert("form", form);
        context.insert("changelist_url", changelist_url);
        context.insert("media", &form.media.stylesheets());
        context.insert("scripts", &form.media.js);
        self.render("change_form.html", &context)
    }

    pub fn delete_confirmation(
        &self,
        site: &SiteContext,
        user: &User,
        confirmation: &DeleteConfirmation,
        change_url: &str,
    ) -> AdminResult<String> {
        let mut context = Self::base_context(site, Some(user));
        context.insert("title", "你确定吗？");
        context.insert("confirmation", confirmation);
        context.insert("change_url", change_url);
        self.render("delete_confirmation.html", &context)
    }

    pub fn error(&self, site: &SiteContext, user: Option<&User>, status: u16, message: &str) -> AdminResult<String> {
        let mut context = Self::base_context(site, user);
        context.insert("title", &status.to_string());
        context.insert("status", &status);
        context.insert("message", message);
        self.render("error.html", &context)
    }
}
