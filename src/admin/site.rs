//! Admin sites
//!
//! A site is a named registry of model admins mounted under a URL
//! prefix. URL names follow `{site}:{app}_{model}_{view}` and are
//! resolved by [`SiteUrls::reverse`].

use super::{AdminError, AdminResult, ModelAdmin};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A named admin site
pub struct AdminSite {
    pub name: String,
    /// URL prefix without trailing slash, e.g. `/admin`
    pub prefix: String,
    pub site_header: String,
    pub site_title: String,
    pub index_title: String,
    registry: Vec<Arc<dyn ModelAdmin>>,
}

impl AdminSite {
    /// Create an empty site with the stock titles
    pub fn new(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: normalize_prefix(prefix),
            site_header: "Django 管理".to_string(),
            site_title: "Django 站点管理员".to_string(),
            index_title: "站点管理".to_string(),
            registry: Vec::new(),
        }
    }

    pub fn with_header(mut self, header: &str) -> Self {
        self.site_header = header.to_string();
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.site_title = title.to_string();
        self
    }

    pub fn with_index_title(mut self, index_title: &str) -> Self {
        self.index_title = index_title.to_string();
        self
    }

    /// Register a model admin
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if the site already has an admin for the model.
    pub fn register(&mut self, admin: Arc<dyn ModelAdmin>) -> AdminResult<()> {
        if self.get(admin.app_label(), admin.model_name()).is_some() {
            return Err(AdminError::AlreadyRegistered(format!(
                "{}.{}",
                admin.app_label(),
                admin.model_name()
            )));
        }

        tracing::debug!(
            "Registered {}.{} on admin site {}",
            admin.app_label(),
            admin.model_name(),
            self.name
        );
        self.registry.push(admin);
        Ok(())
    }

    /// Model admin registered for `app_label.model_name`
    pub fn get(&self, app_label: &str, model_name: &str) -> Option<Arc<dyn ModelAdmin>> {
        self.registry
            .iter()
            .find(|a| a.app_label() == app_label && a.model_name() == model_name)
            .cloned()
    }

    pub fn registry(&self) -> &[Arc<dyn ModelAdmin>] {
        &self.registry
    }

    /// Titles and prefix for page templates
    pub fn context(&self) -> SiteContext {
        SiteContext {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            site_header: self.site_header.clone(),
            site_title: self.site_title.clone(),
            index_title: self.index_title.clone(),
        }
    }

    /// Index page: registered models grouped by app
    pub fn index(&self, urls: &SiteUrls) -> AdminResult<SiteIndex> {
        let mut apps: Vec<AppEntry> = Vec::new();

        for admin in &self.registry {
            let app_label = admin.app_label();
            let entry = ModelEntry {
                model_name: admin.model_name().to_string(),
                verbose_name_plural: admin.verbose_name_plural().to_string(),
                changelist_url: urls.reverse(&self.url_name(app_label, admin.model_name(), "changelist"), &[])?,
                add_url: urls.reverse(&self.url_name(app_label, admin.model_name(), "add"), &[])?,
            };

            match apps.iter_mut().find(|a| a.app_label == app_label) {
                Some(app) => app.models.push(entry),
                None => apps.push(AppEntry {
                    app_label: app_label.to_string(),
                    name: capitalize(app_label),
                    models: vec![entry],
                }),
            }
        }

        Ok(SiteIndex {
            site: self.context(),
            apps,
        })
    }

    fn url_name(&self, app_label: &str, model_name: &str, view: &str) -> String {
        format!("{}:{}_{}_{}", self.name, app_label, model_name, view)
    }
}

/// Site titles for templates and the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteContext {
    pub name: String,
    pub prefix: String,
    pub site_header: String,
    pub site_title: String,
    pub index_title: String,
}

/// Site index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteIndex {
    pub site: SiteContext,
    pub apps: Vec<AppEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppEntry {
    pub app_label: String,
    pub name: String,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub model_name: String,
    pub verbose_name_plural: String,
    pub changelist_url: String,
    pub add_url: String,
}

/// URL resolver over every site
#[derive(Debug, Clone, Default)]
pub struct SiteUrls {
    prefixes: HashMap<String, String>,
    models: HashSet<(String, String, String)>,
}

impl SiteUrls {
    /// Collect prefixes and registered models of `sites`
    pub fn new<'a>(sites: impl IntoIterator<Item = &'a AdminSite>) -> Self {
        let mut urls = Self::default();
        for site in sites {
            urls.prefixes.insert(site.name.clone(), site.prefix.clone());
            for admin in site.registry() {
                urls.models.insert((
                    site.name.clone(),
                    admin.app_label().to_string(),
                    admin.model_name().to_string(),
                ));
            }
        }
        urls
    }

    /// Resolve a URL name.
    ///
    /// Supported names are `{site}:index`, `{site}:login`,
    /// `{site}:logout` and `{site}:{app}_{model}_{view}` where view is
    /// `changelist` or `add` (no arguments), `change` or `delete` (the
    /// object ID).
    pub fn reverse(&self, name: &str, args: &[i64]) -> AdminResult<String> {
        let no_match = || AdminError::NoReverseMatch(name.to_string());

        let (site, view) = name.split_once(':').ok_or_else(no_match)?;
        let prefix = self.prefixes.get(site).ok_or_else(no_match)?;

        match (view, args) {
            ("index", []) => return Ok(format!("{}/", prefix)),
            ("login", []) | ("logout", []) => return Ok(format!("{}/{}/", prefix, view)),
            _ => {}
        }

        let (model_path, action) = view.rsplit_once('_').ok_or_else(no_match)?;
        let (app_label, model_name) = model_path.split_once('_').ok_or_else(no_match)?;

        if !self.models.contains(&(site.to_string(), app_label.to_string(), model_name.to_string())) {
            return Err(no_match());
        }

        let base = format!("{}/{}/{}", prefix, app_label, model_name);
        match (action, args) {
            ("changelist", []) => Ok(format!("{}/", base)),
            ("add", []) => Ok(format!("{}/add/", base)),
            ("change", [id]) => Ok(format!("{}/{}/change/", base, id)),
            ("delete", [id]) => Ok(format!("{}/{}/delete/", base, id)),
            _ => Err(no_match()),
        }
    }
}

/// Every admin site, in mounting order
#[derive(Clone)]
pub struct AdminSites {
    sites: Vec<Arc<AdminSite>>,
    urls: Arc<SiteUrls>,
}

impl AdminSites {
    pub fn new(sites: Vec<AdminSite>) -> Self {
        let urls = Arc::new(SiteUrls::new(&sites));
        Self {
            sites: sites.into_iter().map(Arc::new).collect(),
            urls,
        }
    }

    /// Site by name
    pub fn get(&self, name: &str) -> Option<Arc<AdminSite>> {
        self.sites.iter().find(|s| s.name == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AdminSite>> {
        self.sites.iter()
    }

    pub fn urls(&self) -> &Arc<SiteUrls> {
        &self.urls
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
