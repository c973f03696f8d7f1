//! Form binding and validation
//!
//! Submitted data, whether an urlencoded HTML form or a JSON object, is
//! normalized into a multi-valued [`FormData`]. Model admins clean it
//! field by field with the helpers here and collect failures in
//! [`FormErrors`], keyed by field name.

use serde::Serialize;
use std::collections::BTreeMap;

/// Key used for errors that belong to no single field
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Upper bound on rows accepted from one inline formset
pub const MAX_INLINE_FORMS: usize = 1000;

const MSG_REQUIRED: &str = "这个字段是必填项。";
const MSG_INVALID_CHOICE: &str = "选择一个有效的选项。 该选择不在可用的选项中。";

/// Multi-valued form data in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    values: Vec<(String, String)>,
}

impl FormData {
    /// Build from decoded urlencoded pairs
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self { values: pairs }
    }

    /// Build from a JSON object.
    ///
    /// Strings and numbers become single values, `true` becomes `"on"`
    /// and `false`/`null` are left out. Arrays of scalars become repeated
    /// values. An array of objects under `key` is flattened into inline
    /// formset fields `key-{i}-{field}` plus `key-TOTAL_FORMS`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FormErrors> {
        let object = value.as_object().ok_or_else(|| {
            FormErrors::non_field("Expected a JSON object")
        })?;

        let mut data = FormData::default();
        for (key, value) in object {
            match value {
                serde_json::Value::Array(items)
                    if items.iter().any(serde_json::Value::is_object) =>
                {
                    data.push(format!("{}-TOTAL_FORMS", key), items.len().to_string());
                    for (index, item) in items.iter().enumerate() {
                        let row = item.as_object().ok_or_else(|| {
                            FormErrors::single(key, "Inline rows must be JSON objects")
                        })?;
                        for (field, value) in row {
                            data.push_json(&format!("{}-{}-{}", key, index, field), value)?;
                        }
                    }
                }
                _ => data.push_json(key, value)?,
            }
        }

        Ok(data)
    }

    fn push_json(&mut self, key: &str, value: &serde_json::Value) -> Result<(), FormErrors> {
        match value {
            serde_json::Value::Null | serde_json::Value::Bool(false) => {}
            serde_json::Value::Bool(true) => self.push(key, "on"),
            serde_json::Value::String(s) => self.push(key, s.clone()),
            serde_json::Value::Number(n) => self.push(key, n.to_string()),
            serde_json::Value::Array(items) => {
                for item in items {
                    match item {
                        serde_json::Value::String(s) => self.push(key, s.clone()),
                        serde_json::Value::Number(n) => self.push(key, n.to_string()),
                        _ => return Err(FormErrors::single(key, "Unsupported list value")),
                    }
                }
            }
            serde_json::Value::Object(_) => {
                return Err(FormErrors::single(key, "Nested objects are not supported"))
            }
        }
        Ok(())
    }

    /// Append a value
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.push((key.into(), value.into()));
    }

    /// First value submitted for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value submitted for `key`
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether `key` was submitted at all
    pub fn contains(&self, key: &str) -> bool {
        self.values.iter().any(|(k, _)| k == key)
    }
}

/// Validation errors keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    /// A single error on one field
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    /// A single error not tied to a field
    pub fn non_field(message: impl Into<String>) -> Self {
        Self::single(NON_FIELD_ERRORS, message)
    }

    /// Record an error on `field`
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    /// Record the error of a failed cleaner, passing the value through
    pub fn check<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Errors recorded on `field`
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every message, prefixed by its field
    pub fn messages(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| format!("{}: {}", field, m))
            })
            .collect()
    }

    /// Copy into a JSON map for API error details
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

/// Kind of a form field, which drives cleaning and the rendered widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Single line text with a maximum length
    Char { max_length: usize },
    /// Multi-line text, optionally length limited
    Text { max_length: Option<usize> },
    /// Integer choice rendered as a select
    Choice(Vec<(i32, &'static str)>),
    /// Checkbox
    Boolean,
    /// Select of one related object
    ForeignKey,
    /// Multiple select of related objects
    ManyToMany,
}

/// Declaration of one form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
        }
    }

    /// Mark the field as allowed to be blank
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn widget(&self) -> Widget {
        match self.kind {
            FieldKind::Char { .. } => Widget::Text,
            FieldKind::Text { .. } => Widget::Textarea,
            FieldKind::Choice(_) | FieldKind::ForeignKey => Widget::Select,
            FieldKind::Boolean => Widget::Checkbox,
            FieldKind::ManyToMany => Widget::SelectMultiple,
        }
    }

    fn max_length(&self) -> Option<usize> {
        match self.kind {
            FieldKind::Char { max_length } => Some(max_length),
            FieldKind::Text { max_length } => max_length,
            _ => None,
        }
    }
}

/// HTML widget of a bound field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    Text,
    Textarea,
    Select,
    Checkbox,
    SelectMultiple,
}

/// One option of a select widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Current value of a field, either initial or submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Many(Vec<String>),
}

impl FieldValue {
    /// Read the submitted value of `spec` stored under `key`
    pub fn from_data(spec: &FieldSpec, data: &FormData, key: &str) -> Self {
        match spec.kind {
            FieldKind::Boolean => FieldValue::Bool(is_checked(data.get(key))),
            FieldKind::ManyToMany => FieldValue::Many(
                data.get_all(key).into_iter().map(str::to_string).collect(),
            ),
            _ => FieldValue::Text(data.get(key).unwrap_or_default().to_string()),
        }
    }

    fn selected(&self) -> Vec<&str> {
        match self {
            FieldValue::Text(s) => vec![s.as_str()],
            FieldValue::Bool(_) => Vec::new(),
            FieldValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// A field ready for rendering: declaration, value, choices and errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundField {
    /// HTML input name (prefixed for inline rows)
    pub name: String,
    pub label: String,
    pub widget: Widget,
    pub value: String,
    pub checked: bool,
    pub choices: Vec<ChoiceOption>,
    pub required: bool,
    pub max_length: Option<usize>,
    pub errors: Vec<String>,
}

impl BoundField {
    /// Bind `spec` to a value.
    ///
    /// `related` supplies `(value, label)` options for foreign key and
    /// many-to-many fields; choice fields use their own choices.
    pub fn new(
        spec: &FieldSpec,
        name: String,
        value: FieldValue,
        related: &[(String, String)],
        errors: &FormErrors,
    ) -> Self {
        let selected = value.selected();
        let options: Vec<(String, String)> = match &spec.kind {
            FieldKind::Choice(choices) => choices
                .iter()
                .map(|(v, label)| (v.to_string(), label.to_string()))
                .collect(),
            FieldKind::ForeignKey => std::iter::once((String::new(), "---------".to_string()))
                .chain(related.iter().cloned())
                .collect(),
            FieldKind::ManyToMany => related.to_vec(),
            _ => Vec::new(),
        };

        let choices = options
            .into_iter()
            .map(|(value, label)| ChoiceOption {
                selected: selected.contains(&value.as_str()),
                value,
                label,
            })
            .collect();

        let errors = errors.get(&name).to_vec();

        Self {
            label: spec.label.to_string(),
            widget: spec.widget(),
            value: match &value {
                FieldValue::Text(s) => s.clone(),
                _ => String::new(),
            },
            checked: matches!(value, FieldValue::Bool(true)),
            choices,
            required: spec.required && spec.kind != FieldKind::Boolean,
            max_length: spec.max_length(),
            errors,
            name,
        }
    }
}

/// Checkbox semantics: present and not an explicit false value
pub fn is_checked(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !matches!(v.trim().to_lowercase().as_str(), "" | "false" | "0" | "off"),
    }
}

/// Clean a text field: trim, enforce required and max length
pub fn clean_text(value: Option<&str>, required: bool, max_length: Option<usize>) -> Result<String, String> {
    let value = value.unwrap_or_default().trim().to_string();

    if value.is_empty() && required {
        return Err(MSG_REQUIRED.to_string());
    }

    if let Some(limit) = max_length {
        let length = value.chars().count();
        if length > limit {
            return Err(format!(
                "确保该值不超过 {} 个字符（它已经有 {} 个）。",
                limit, length
            ));
        }
    }

    Ok(value)
}

/// Clean an integer choice against the allowed values
pub fn clean_choice(value: Option<&str>, choices: &[(i32, &'static str)]) -> Result<i32, String> {
    let raw = value.unwrap_or_default().trim();
    if raw.is_empty() {
        return Err(MSG_REQUIRED.to_string());
    }

    raw.parse::<i32>()
        .ok()
        .filter(|v| choices.iter().any(|(choice, _)| choice == v))
        .ok_or_else(|| format!("选择一个有效的选项。 {} 不在可用的选项中。", raw))
}

/// Clean a foreign key reference to an integer ID
///
/// Existence of the target is checked by the caller.
pub fn clean_foreign_key(value: Option<&str>, required: bool) -> Result<Option<i64>, String> {
    let raw = value.unwrap_or_default().trim();
    if raw.is_empty() {
        return if required {
            Err(MSG_REQUIRED.to_string())
        } else {
            Ok(None)
        };
    }

    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| MSG_INVALID_CHOICE.to_string())
}

/// Clean many-to-many references to a list of unique IDs
pub fn clean_many(values: &[&str]) -> Result<Vec<i64>, String> {
    let mut ids = Vec::new();
    for raw in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        let id = raw
            .parse::<i64>()
            .map_err(|_| format!("“{}” 不是一个有效的值。", raw))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Error for a related object that does not exist
pub fn invalid_choice() -> String {
    MSG_INVALID_CHOICE.to_string()
}

/// Error for related objects of which some do not exist
pub fn invalid_pk_choice(id: i64) -> String {
    format!("选择一个有效的选项。{} 不在可用的选项中。", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_data_multi_values() {
        let data = FormData::from_pairs(vec![
            ("tag".to_string(), "1".to_string()),
            ("title".to_string(), "Hello".to_string()),
            ("tag".to_string(), "3".to_string()),
        ]);

        assert_eq!(data.get("title"), Some("Hello"));
        assert_eq!(data.get("tag"), Some("1"));
        assert_eq!(data.get_all("tag"), vec!["1", "3"]);
        assert!(!data.contains("owner"));
    }

    #[test]
    fn test_form_data_from_json_scalars() {
        let data = FormData::from_json(&json!({
            "title": "Hello",
            "category": 3,
            "is_nav": true,
            "hidden": false,
            "desc": null,
            "tag": [1, "2"]
        }))
        .unwrap();

        assert_eq!(data.get("title"), Some("Hello"));
        assert_eq!(data.get("category"), Some("3"));
        assert_eq!(data.get("is_nav"), Some("on"));
        assert!(!data.contains("hidden"));
        assert!(!data.contains("desc"));
        assert_eq!(data.get_all("tag"), vec!["1", "2"]);
    }

    #[test]
    fn test_form_data_from_json_flattens_inline_rows() {
        let data = FormData::from_json(&json!({
            "name": "Rust",
            "post_set": [
                {"id": 4, "title": "Kept"},
                {"title": "New", "desc": "d"}
            ]
        }))
        .unwrap();

        assert_eq!(data.get("post_set-TOTAL_FORMS"), Some("2"));
        assert_eq!(data.get("post_set-0-id"), Some("4"));
        assert_eq!(data.get("post_set-1-title"), Some("New"));
        assert_eq!(data.get("post_set-1-desc"), Some("d"));
    }

    #[test]
    fn test_form_data_from_json_rejects_non_objects() {
        assert!(FormData::from_json(&json!(["a"])).is_err());
        assert!(FormData::from_json(&json!({"a": {"b": 1}})).is_err());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text(Some("  hi "), true, Some(10)), Ok("hi".to_string()));
        assert_eq!(clean_text(None, false, None), Ok(String::new()));
        assert_eq!(clean_text(Some("   "), true, None), Err(MSG_REQUIRED.to_string()));

        let err = clean_text(Some("标签名称太长了超过十个字"), true, Some(10)).unwrap_err();
        assert!(err.contains("10"));
        assert!(err.contains("12"));
    }

    #[test]
    fn test_clean_choice() {
        let choices = [(1, "正常"), (0, "删除")];
        assert_eq!(clean_choice(Some("0"), &choices), Ok(0));
        assert!(clean_choice(Some("2"), &choices).is_err());
        assert!(clean_choice(Some("x"), &choices).is_err());
        assert_eq!(clean_choice(None, &choices), Err(MSG_REQUIRED.to_string()));
    }

    #[test]
    fn test_clean_foreign_key_and_many() {
        assert_eq!(clean_foreign_key(Some("5"), true), Ok(Some(5)));
        assert_eq!(clean_foreign_key(Some(""), false), Ok(None));
        assert!(clean_foreign_key(Some(""), true).is_err());
        assert!(clean_foreign_key(Some("abc"), true).is_err());

        assert_eq!(clean_many(&["2", "1", "2", ""]), Ok(vec![2, 1]));
        assert!(clean_many(&["1", "x"]).is_err());
    }

    #[test]
    fn test_is_checked() {
        assert!(is_checked(Some("on")));
        assert!(is_checked(Some("true")));
        assert!(!is_checked(Some("false")));
        assert!(!is_checked(Some("")));
        assert!(!is_checked(None));
    }

    #[test]
    fn test_form_errors() {
        let mut errors = FormErrors::default();
        assert!(errors.is_empty());
        assert_eq!(errors.check("a", Ok::<_, String>(1)), Some(1));
        assert_eq!(errors.check::<i32>("title", Err("bad".to_string())), None);
        errors.add("title", "worse");

        assert_eq!(errors.get("title"), ["bad".to_string(), "worse".to_string()]);
        assert!(errors.get("other").is_empty());
        assert_eq!(errors.to_json(), json!({"title": ["bad", "worse"]}));
    }

    #[test]
    fn test_bound_field_marks_selected_choices() {
        let spec = FieldSpec::new("tag", "标签", FieldKind::ManyToMany).optional();
        let related = vec![
            ("1".to_string(), "a".to_string()),
            ("2".to_string(), "b".to_string()),
        ];
        let field = BoundField::new(
            &spec,
            "tag".to_string(),
            FieldValue::Many(vec!["2".to_string()]),
            &related,
            &FormErrors::single("tag", "oops"),
        );

        assert_eq!(field.widget, Widget::SelectMultiple);
        assert!(!field.choices[0].selected);
        assert!(field.choices[1].selected);
        assert_eq!(field.errors, vec!["oops".to_string()]);
        assert!(!field.required);
    }

    #[test]
    fn test_bound_foreign_key_has_blank_option() {
        let spec = FieldSpec::new("category", "分类", FieldKind::ForeignKey);
        let related = vec![("7".to_string(), "Rust".to_string())];
        let field = BoundField::new(
            &spec,
            "category".to_string(),
            FieldValue::Text("7".to_string()),
            &related,
            &FormErrors::default(),
        );

        assert_eq!(field.choices.len(), 2);
        assert_eq!(field.choices[0].label, "---------");
        assert!(field.choices[1].selected);
    }
}
