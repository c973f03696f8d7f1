//! Change list filtering
//!
//! Parses the change list query string (`q`, `p` and filter parameters)
//! and provides the sidebar filters. Filters narrow a repository query
//! the same way the owner scope does, so every filter composes with it.

use super::AdminError;
use crate::db::repositories::{CategoryRepository, PostQuery};
use crate::models::User;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Search parameter
pub const SEARCH_VAR: &str = "q";
/// Page parameter (1-based)
pub const PAGE_VAR: &str = "p";

/// Change list request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeListParams {
    /// Raw search text
    pub query: String,
    /// Requested page, 1-based
    pub page: u32,
    /// Every other parameter, for filters
    pub filters: BTreeMap<String, String>,
}

impl ChangeListParams {
    /// Parse decoded query string pairs.
    ///
    /// A page that is not a positive integer is an invalid lookup.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, AdminError> {
        let mut params = ChangeListParams {
            page: 1,
            ..Default::default()
        };

        for (key, value) in pairs {
            match key.as_str() {
                SEARCH_VAR => params.query = value.clone(),
                PAGE_VAR => {
                    params.page = value
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| AdminError::InvalidLookup(format!("page {:?}", value)))?;
                }
                _ => {
                    params.filters.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(params)
    }

    /// Whitespace separated search terms
    pub fn search_terms(&self) -> Vec<String> {
        split_search_terms(&self.query)
    }

    /// Selected value of a filter parameter
    pub fn filter_value(&self, parameter: &str) -> Option<&str> {
        self.filters
            .get(parameter)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Query string for a link from this page.
    ///
    /// `set` overrides parameters, `remove` drops them. The page number
    /// is always reset unless `set` provides one.
    pub fn query_string(&self, set: &[(&str, String)], remove: &[&str]) -> String {
        let mut pairs: BTreeMap<&str, String> = BTreeMap::new();
        if !self.query.is_empty() {
            pairs.insert(SEARCH_VAR, self.query.clone());
        }
        for (key, value) in &self.filters {
            pairs.insert(key.as_str(), value.clone());
        }
        for key in remove {
            pairs.remove(key);
        }
        for (key, value) in set {
            pairs.insert(key, value.clone());
        }

        if pairs.is_empty() {
            return "?".to_string();
        }

        let encoded: Vec<String> = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("?{}", encoded.join("&"))
    }
}

/// Split a search string into terms on whitespace
pub fn split_search_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_string).collect()
}

/// One choice of a sidebar filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterChoice {
    pub label: String,
    /// Parameter value, `None` for "all"
    pub value: Option<String>,
    pub selected: bool,
    pub query_string: String,
}

/// A rendered sidebar filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterContext {
    pub title: String,
    pub parameter_name: String,
    pub choices: Vec<FilterChoice>,
}

/// A change list filter over queries of type `Q`
#[async_trait]
pub trait ListFilter<Q>: Send + Sync {
    /// Sidebar title
    fn title(&self) -> &'static str;

    /// Query string parameter carrying the selected value
    fn parameter_name(&self) -> &'static str;

    /// `(value, label)` pairs offered to `user`
    async fn lookups(&self, user: &User) -> Result<Vec<(String, String)>, AdminError>;

    /// Narrow `query` by the selected value; `None` leaves it unchanged
    fn queryset(&self, value: Option<&str>, query: Q) -> Result<Q, AdminError>;

    /// Sidebar context with an "all" choice first
    async fn context(&self, user: &User, params: &ChangeListParams) -> Result<FilterContext, AdminError> {
        let parameter = self.parameter_name();
        let selected = params.filter_value(parameter);

        let mut choices = vec![FilterChoice {
            label: "全部".to_string(),
            value: None,
            selected: selected.is_none(),
            query_string: params.query_string(&[], &[parameter]),
        }];

        for (value, label) in self.lookups(user).await? {
            choices.push(FilterChoice {
                selected: selected == Some(value.as_str()),
                query_string: params.query_string(&[(parameter, value.clone())], &[]),
                label,
                value: Some(value),
            });
        }

        Ok(FilterContext {
            title: self.title().to_string(),
            parameter_name: parameter.to_string(),
            choices,
        })
    }
}

/// Filters posts by one of the current user's categories
pub struct CategoryOwnerFilter {
    categories: Arc<dyn CategoryRepository>,
}

impl CategoryOwnerFilter {
    pub fn new(categories: Arc<dyn CategoryRepository>) -> Self {
        Self { categories }
    }
}

#[async_trait]
impl ListFilter<PostQuery> for CategoryOwnerFilter {
    fn title(&self) -> &'static str {
        "分类过滤器"
    }

    fn parameter_name(&self) -> &'static str {
        "owner_category"
    }

    async fn lookups(&self, user: &User) -> Result<Vec<(String, String)>, AdminError> {
        let categories = self
            .categories
            .list_by_owner(user.id)
            .await
            .context("Failed to list categories for filter")?;

        Ok(categories
            .into_iter()
            .map(|c| (c.id.to_string(), c.name))
            .collect())
    }

    fn queryset(&self, value: Option<&str>, query: PostQuery) -> Result<PostQuery, AdminError> {
        match value {
            None => Ok(query),
            Some(raw) => {
                let category_id = raw.trim().parse::<i64>().map_err(|_| {
                    AdminError::InvalidLookup(format!("{}={:?}", self.parameter_name(), raw))
                })?;
                Ok(query.in_category(category_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::db::testing::{insert_user, migrated_pool};
    use crate::models::{Category, UserRole};
    use proptest::prelude::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_change_list_params() {
        let params = ChangeListParams::from_pairs(&pairs(&[
            ("q", "rust async"),
            ("p", "2"),
            ("owner_category", "3"),
        ]))
        .unwrap();

        assert_eq!(params.page, 2);
        assert_eq!(params.search_terms(), vec!["rust", "async"]);
        assert_eq!(params.filter_value("owner_category"), Some("3"));
        assert_eq!(params.filter_value("missing"), None);
    }

    #[test]
    fn test_invalid_page_is_rejected() {
        for bad in ["0", "-1", "two", ""] {
            let result = ChangeListParams::from_pairs(&pairs(&[("p", bad)]));
            assert!(matches!(result, Err(AdminError::InvalidLookup(_))), "{}", bad);
        }
    }

    #[test]
    fn test_query_string_keeps_search_and_resets_page() {
        let params = ChangeListParams::from_pairs(&pairs(&[
            ("q", "a b"),
            ("p", "3"),
            ("owner_category", "1"),
        ]))
        .unwrap();

        assert_eq!(
            params.query_string(&[], &["owner_category"]),
            "?q=a%20b"
        );
        assert_eq!(
            params.query_string(&[("p", "2".to_string())], &[]),
            "?owner_category=1&p=2&q=a%20b"
        );
        assert_eq!(ChangeListParams::default().query_string(&[], &[]), "?");
    }

    #[test]
    fn test_queryset_narrows_by_category() {
        let filter = CategoryOwnerFilter::new(Arc::new(NoCategories));
        let base = PostQuery::all().owned_by(1);

        assert_eq!(filter.queryset(None, base.clone()).unwrap(), base);
        assert_eq!(
            filter.queryset(Some("7"), base.clone()).unwrap(),
            base.clone().in_category(7)
        );
        assert!(matches!(
            filter.queryset(Some("abc"), base),
            Err(AdminError::InvalidLookup(_))
        ));
    }

    #[tokio::test]
    async fn test_lookups_only_return_own_categories() {
        let pool = migrated_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let repo = SqlxCategoryRepository::boxed(pool.clone());

        for (name, owner) in [("Rust", alice), ("Go", bob), ("Python", alice)] {
            let mut category = Category::new(name.to_string());
            category.owner_id = owner;
            repo.create(&category).await.unwrap();
        }

        let mut user = User::new("alice".into(), String::new(), String::new(), UserRole::Staff);
        user.id = alice;

        let filter = CategoryOwnerFilter::new(repo);
        let labels: Vec<String> = filter
            .lookups(&user)
            .await
            .unwrap()
            .into_iter()
            .map(|(_, label)| label)
            .collect();
        assert_eq!(labels, vec!["Rust".to_string(), "Python".to_string()]);

        let params = ChangeListParams::from_pairs(&pairs(&[("owner_category", "999")])).unwrap();
        let context = filter.context(&user, &params).await.unwrap();
        assert_eq!(context.title, "分类过滤器");
        assert_eq!(context.choices.len(), 3);
        assert_eq!(context.choices[0].label, "全部");
        assert!(context.choices.iter().all(|c| !c.selected));
    }

    struct NoCategories;

    #[async_trait]
    impl CategoryRepository for NoCategories {
        async fn create(&self, category: &Category) -> anyhow::Result<Category> {
            Ok(category.clone())
        }
        async fn update(&self, category: &Category) -> anyhow::Result<Category> {
            Ok(category.clone())
        }
        async fn get_by_id(&self, _id: i64) -> anyhow::Result<Option<Category>> {
            Ok(None)
        }
        async fn get_by_ids(&self, _ids: &[i64]) -> anyhow::Result<Vec<Category>> {
            Ok(Vec::new())
        }
        async fn list(
            &self,
            params: &crate::models::ListParams,
        ) -> anyhow::Result<crate::models::PagedResult<Category>> {
            Ok(crate::models::PagedResult::new(Vec::new(), 0, params))
        }
        async fn list_all(&self) -> anyhow::Result<Vec<Category>> {
            Ok(Vec::new())
        }
        async fn list_by_owner(&self, _owner_id: i64) -> anyhow::Result<Vec<Category>> {
            Ok(Vec::new())
        }
        async fn delete_many(&self, _ids: &[i64]) -> anyhow::Result<u64> {
            Ok(0)
        }
        async fn save_with_posts(
            &self,
            category: &Category,
            _posts: &[crate::db::repositories::CategoryPostChange],
        ) -> anyhow::Result<Category> {
            Ok(category.clone())
        }
    }

    proptest! {
        #[test]
        fn prop_search_terms_have_no_whitespace(query in "[a-z \\t\\n]{0,40}") {
            let terms = split_search_terms(&query);
            for term in &terms {
                prop_assert!(!term.is_empty());
                prop_assert!(!term.chars().any(char::is_whitespace));
            }
            prop_assert_eq!(terms.join(""), query.chars().filter(|c| !c.is_whitespace()).collect::<String>());
        }
    }
}
