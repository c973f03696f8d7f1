//! Presentation metadata of a model admin
//!
//! Plain data describing how a model is listed and edited: list columns,
//! link columns, search fields, fieldsets, inlines and page media.

use serde::Serialize;
use std::collections::BTreeMap;

/// Options of a model admin
#[derive(Debug, Clone, Serialize)]
pub struct ModelAdminOptions {
    /// Columns of the change list, in order
    pub list_display: Vec<&'static str>,
    /// Columns linking to the change form; empty links the first column
    pub list_display_links: Vec<&'static str>,
    /// Fields matched by the `q` search parameter
    pub search_fields: Vec<&'static str>,
    pub actions_on_top: bool,
    pub actions_on_bottom: bool,
    /// Repeat the save buttons above the form
    pub save_on_top: bool,
    /// Fields never shown on the form
    pub exclude: Vec<&'static str>,
    /// Form fields when no fieldsets are declared; empty means all
    pub fields: Vec<&'static str>,
    pub fieldsets: Vec<Fieldset>,
    pub inlines: Vec<InlineAdmin>,
    pub media: Media,
    /// Rows per change list page
    pub list_per_page: u32,
}

impl Default for ModelAdminOptions {
    fn default() -> Self {
        Self {
            list_display: vec!["__str__"],
            list_display_links: Vec::new(),
            search_fields: Vec::new(),
            actions_on_top: true,
            actions_on_bottom: false,
            save_on_top: false,
            exclude: Vec::new(),
            fields: Vec::new(),
            fieldsets: Vec::new(),
            inlines: Vec::new(),
            media: Media::default(),
            list_per_page: 100,
        }
    }
}

impl ModelAdminOptions {
    /// Columns that link to the change form
    pub fn effective_list_display_links(&self) -> Vec<&'static str> {
        if self.list_display_links.is_empty() {
            self.list_display.iter().take(1).copied().collect()
        } else {
            self.list_display_links.clone()
        }
    }

    /// Fieldsets used to lay out the form.
    ///
    /// Declared fieldsets win. Otherwise `fields` (or every name in
    /// `form_fields` when `fields` is empty) goes into one unnamed
    /// fieldset, minus anything excluded.
    pub fn get_fieldsets(&self, form_fields: &[&'static str]) -> Vec<Fieldset> {
        if !self.fieldsets.is_empty() {
            return self.fieldsets.clone();
        }

        let names = if self.fields.is_empty() {
            form_fields
        } else {
            self.fields.as_slice()
        };

        let lines = names
            .iter()
            .filter(|name| !self.exclude.contains(name))
            .map(|name| FieldLine::Single(name))
            .collect();

        vec![Fieldset::unnamed(lines)]
    }

    /// Whether search is enabled on the change list
    pub fn has_search(&self) -> bool {
        !self.search_fields.is_empty()
    }
}

/// One line of a fieldset: a single field or several on a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldLine {
    Single(&'static str),
    Row(Vec<&'static str>),
}

impl FieldLine {
    /// Field names on this line
    pub fn names(&self) -> Vec<&'static str> {
        match self {
            FieldLine::Single(name) => vec![name],
            FieldLine::Row(names) => names.clone(),
        }
    }
}

/// A titled group of form fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fieldset {
    pub name: Option<&'static str>,
    pub description: Option<&'static str>,
    pub classes: Vec<&'static str>,
    pub fields: Vec<FieldLine>,
}

impl Fieldset {
    pub fn new(name: &'static str, fields: Vec<FieldLine>) -> Self {
        Self {
            name: Some(name),
            description: None,
            classes: Vec::new(),
            fields,
        }
    }

    pub fn unnamed(fields: Vec<FieldLine>) -> Self {
        Self {
            name: None,
            description: None,
            classes: Vec::new(),
            fields,
        }
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn classes(mut self, classes: &[&'static str]) -> Self {
        self.classes = classes.to_vec();
        self
    }

    /// Every field name in this fieldset
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().flat_map(FieldLine::names).collect()
    }
}

/// Layout of an inline formset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineType {
    Stacked,
    Tabular,
}

/// Related objects edited on the parent's change form
#[derive(Debug, Clone, Serialize)]
pub struct InlineAdmin {
    /// Related model name
    pub model: &'static str,
    /// Foreign key on the related model pointing at the parent
    pub fk_name: &'static str,
    /// Form field prefix, `{model}_set`
    pub prefix: &'static str,
    pub verbose_name_plural: &'static str,
    pub inline_type: InlineType,
    pub fields: Vec<&'static str>,
    /// Number of blank rows offered
    pub extra: usize,
    pub can_delete: bool,
}

/// CSS and JavaScript included on admin pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Media {
    /// Stylesheets keyed by media type (`all`, `screen`, ...)
    pub css: BTreeMap<&'static str, Vec<&'static str>>,
    pub js: Vec<&'static str>,
}

impl Media {
    pub fn is_empty(&self) -> bool {
        self.css.values().all(Vec::is_empty) && self.js.is_empty()
    }

    /// `(media, href)` pairs in a stable order
    pub fn stylesheets(&self) -> Vec<(&'static str, &'static str)> {
        self.css
            .iter()
            .flat_map(|(media, urls)| urls.iter().map(move |url| (*media, *url)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_link_is_first_column() {
        let options = ModelAdminOptions {
            list_display: vec!["title", "category"],
            ..Default::default()
        };
        assert_eq!(options.effective_list_display_links(), vec!["title"]);

        let options = ModelAdminOptions {
            list_display: vec!["title", "category"],
            list_display_links: vec!["category"],
            ..Default::default()
        };
        assert_eq!(options.effective_list_display_links(), vec!["category"]);
    }

    #[test]
    fn test_fields_without_fieldsets_render_one_unnamed_fieldset() {
        let options = ModelAdminOptions {
            fields: vec!["name", "status"],
            ..Default::default()
        };

        let fieldsets = options.get_fieldsets(&["name", "status", "is_nav"]);
        assert_eq!(fieldsets.len(), 1);
        assert_eq!(fieldsets[0].name, None);
        assert_eq!(fieldsets[0].field_names(), vec!["name", "status"]);
    }

    #[test]
    fn test_all_form_fields_minus_exclude() {
        let options = ModelAdminOptions {
            exclude: vec!["owner"],
            ..Default::default()
        };

        let fieldsets = options.get_fieldsets(&["title", "owner", "desc"]);
        assert_eq!(fieldsets[0].field_names(), vec!["title", "desc"]);
    }

    #[test]
    fn test_declared_fieldsets_win() {
        let options = ModelAdminOptions {
            fields: vec!["ignored"],
            fieldsets: vec![
                Fieldset::new("基础配置", vec![FieldLine::Row(vec!["title", "category"])])
                    .description("基础配置描述"),
                Fieldset::new("额外信息", vec![FieldLine::Single("tag")]).classes(&["collapse"]),
            ],
            ..Default::default()
        };

        let fieldsets = options.get_fieldsets(&[]);
        assert_eq!(fieldsets.len(), 2);
        assert_eq!(fieldsets[0].field_names(), vec!["title", "category"]);
        assert_eq!(fieldsets[1].classes, vec!["collapse"]);
    }

    #[test]
    fn test_field_line_serializes_untagged() {
        let json = serde_json::to_value(vec![
            FieldLine::Row(vec!["title", "category"]),
            FieldLine::Single("status"),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([["title", "category"], "status"]));
    }

    #[test]
    fn test_media_stylesheets() {
        let mut media = Media::default();
        assert!(media.is_empty());

        media.css.insert("all", vec!["a.css"]);
        media.js.push("a.js");
        assert!(!media.is_empty());
        assert_eq!(media.stylesheets(), vec![("all", "a.css")]);
    }
}
