//! View contexts shared by the HTML pages and the JSON API
//!
//! Model admins produce these; the renderer feeds them to templates and
//! the API serializes them as they are.

use super::filters::{ChangeListParams, FilterContext, PAGE_VAR};
use super::forms::BoundField;
use super::options::{Fieldset, InlineType, Media};
use crate::models::PagedResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Timestamp format of list cells
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp for display
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// A change list column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub label: String,
}

/// One cell of a change list row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    /// Raw value for API clients
    pub value: serde_json::Value,
    /// Text shown to the user, escaped by the template
    pub display: String,
    /// Pre-escaped markup, rendered as is when present
    pub html: Option<String>,
    /// Change form URL when this column links to the object
    pub link: Option<String>,
}

impl Cell {
    pub fn text(value: serde_json::Value, display: impl Into<String>) -> Self {
        Self {
            value,
            display: display.into(),
            html: None,
            link: None,
        }
    }

    pub fn html(markup: String) -> Self {
        Self {
            value: serde_json::Value::Null,
            display: String::new(),
            html: Some(markup),
            link: None,
        }
    }
}

/// A change list row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: i64,
    pub cells: Vec<Cell>,
    /// The full object
    pub object: serde_json::Value,
}

/// Change list pagination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationContext {
    pub page: u32,
    pub total_pages: u32,
    pub per_page: u32,
    pub total_count: i64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_url: Option<String>,
    pub next_url: Option<String>,
}

impl PaginationContext {
    pub fn new<T>(page: &PagedResult<T>, params: &ChangeListParams) -> Self {
        let link = |p: u32| params.query_string(&[(PAGE_VAR, p.to_string())], &[]);
        let has_previous = page.has_prev();
        let has_next = page.has_next();

        Self {
            page: page.page,
            total_pages: page.total_pages(),
            per_page: page.per_page,
            total_count: page.total,
            has_previous,
            has_next,
            previous_url: has_previous.then(|| link(page.page - 1)),
            next_url: has_next.then(|| link(page.page + 1)),
        }
    }
}

/// A bulk action offered on the change list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionContext {
    pub name: String,
    pub description: String,
}

impl ActionContext {
    /// The built-in bulk delete
    pub fn delete_selected(verbose_name_plural: &str) -> Self {
        Self {
            name: DELETE_SELECTED.to_string(),
            description: format!("删除所选的 {}", verbose_name_plural),
        }
    }
}

/// Name of the built-in bulk delete action
pub const DELETE_SELECTED: &str = "delete_selected";

/// Result of running a bulk action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub action: String,
    pub affected_count: u64,
    pub message: String,
}

/// Everything needed to render a change list page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeList {
    pub model_name: String,
    pub verbose_name_plural: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub filters: Vec<FilterContext>,
    pub has_search: bool,
    pub search_query: String,
    pub pagination: PaginationContext,
    /// Rows matching the current filters
    pub result_count: i64,
    /// Rows visible without filters or search
    pub full_result_count: i64,
    pub actions: Vec<ActionContext>,
    pub actions_on_top: bool,
    pub actions_on_bottom: bool,
    pub add_url: String,
    pub media: Media,
}

/// A fieldset with its fields bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldsetContext {
    pub name: Option<String>,
    pub description: Option<String>,
    pub classes: String,
    /// Each line holds one or more fields shown side by side
    pub lines: Vec<Vec<BoundField>>,
}

/// Lay out bound fields by fieldsets, dropping names with no field
pub fn bind_fieldsets(fieldsets: &[Fieldset], fields: &HashMap<&'static str, BoundField>) -> Vec<FieldsetContext> {
    fieldsets
        .iter()
        .map(|fieldset| FieldsetContext {
            name: fieldset.name.map(str::to_string),
            description: fieldset.description.map(str::to_string),
            classes: fieldset.classes.join(" "),
            lines: fieldset
                .fields
                .iter()
                .map(|line| {
                    line.names()
                        .into_iter()
                        .filter_map(|name| fields.get(name).cloned())
                        .collect::<Vec<_>>()
                })
                .filter(|line| !line.is_empty())
                .collect(),
        })
        .collect()
}

/// One row of an inline formset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineForm {
    /// ID of the existing object, `None` for extra rows
    pub id: Option<i64>,
    /// Input name of the hidden ID field
    pub id_name: String,
    /// Input name of the delete checkbox
    pub delete_name: String,
    pub delete_checked: bool,
    pub fields: Vec<BoundField>,
}

/// An inline formset on a change form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineFormset {
    pub prefix: String,
    pub verbose_name_plural: String,
    pub inline_type: InlineType,
    pub columns: Vec<Column>,
    pub forms: Vec<InlineForm>,
    pub total_forms: usize,
    pub initial_forms: usize,
    pub can_delete: bool,
}

/// Everything needed to render an add or change form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeForm {
    pub model_name: String,
    pub verbose_name: String,
    /// `None` on the add form
    pub object_id: Option<i64>,
    pub object_repr: Option<String>,
    /// The stored object on the change form
    pub object: Option<serde_json::Value>,
    pub fieldsets: Vec<FieldsetContext>,
    pub inlines: Vec<InlineFormset>,
    /// Errors not tied to a field
    pub non_field_errors: Vec<String>,
    pub has_errors: bool,
    pub save_on_top: bool,
    pub delete_url: Option<String>,
    pub media: Media,
}

/// Object saved through a form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedObject {
    pub id: i64,
    pub repr: String,
    pub object: serde_json::Value,
}

/// Objects removed along with the one being deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedObjects {
    pub verbose_name_plural: String,
    pub items: Vec<String>,
}

/// Delete confirmation page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteConfirmation {
    pub model_name: String,
    pub verbose_name: String,
    pub object_id: i64,
    pub object_repr: String,
    pub related: Vec<RelatedObjects>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::forms::{FieldKind, FieldSpec, FieldValue, FormErrors};
    use crate::admin::options::FieldLine;
    use crate::models::ListParams;
    use chrono::TimeZone;

    #[test]
    fn test_format_datetime() {
        let value = Utc.with_ymd_and_hms(2018, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_datetime(&value), "2018-03-09 07:05:01");
    }

    #[test]
    fn test_pagination_links() {
        let params = ChangeListParams {
            query: "rust".to_string(),
            page: 2,
            ..Default::default()
        };
        let page = PagedResult::new(vec![1, 2], 7, &ListParams::new(2, 2));

        let pagination = PaginationContext::new(&page, &params);
        assert_eq!(pagination.total_pages, 4);
        assert_eq!(pagination.previous_url.as_deref(), Some("?p=1&q=rust"));
        assert_eq!(pagination.next_url.as_deref(), Some("?p=3&q=rust"));
    }

    #[test]
    fn test_bind_fieldsets_groups_rows() {
        let spec = FieldSpec::new("title", "标题", FieldKind::Char { max_length: 255 });
        let title = BoundField::new(
            &spec,
            "title".to_string(),
            FieldValue::Text("Hi".to_string()),
            &[],
            &FormErrors::default(),
        );
        let mut fields = HashMap::new();
        fields.insert("title", title);

        let fieldsets = vec![
            Fieldset::new("基础配置", vec![FieldLine::Row(vec!["title", "missing"])])
                .classes(&["wide", "collapse"]),
            Fieldset::new("空", vec![FieldLine::Single("missing")]),
        ];

        let bound = bind_fieldsets(&fieldsets, &fields);
        assert_eq!(bound[0].classes, "wide collapse");
        assert_eq!(bound[0].lines.len(), 1);
        assert_eq!(bound[0].lines[0][0].value, "Hi");
        assert!(bound[1].lines.is_empty());
    }
}
