//! Filter state and query-string serialization for the list endpoints.
//!
//! The backend ignores unknown keys but chokes on literal empty strings, so
//! serialization only emits fields that are set, non-empty and not the "all"
//! sentinel the UI uses for its dropdowns.

use urlencoding::encode;

/// Sentinel dropdown value meaning "no filter on this field".
pub const ALL: &str = "all";

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Filter/sort/pagination state for `/api/customers/`.
///
/// Every field is optional; `to_query_string` decides what actually goes on
/// the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerFilters {
    pub search: Option<String>,
    pub geography: Option<String>,
    pub gender: Option<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub min_credit_score: Option<u32>,
    pub max_credit_score: Option<u32>,
    pub min_balance: Option<f64>,
    pub max_balance: Option<f64>,
    pub exited: Option<bool>,
    pub has_cr_card: Option<bool>,
    pub is_active_member: Option<bool>,
    /// Django-style ordering key, e.g. `-credit_score`.
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl CustomerFilters {
    /// Serialize to a query string.
    ///
    /// Only defined, non-empty, non-"all" values are emitted; booleans as
    /// literal `true`/`false`. Missing pagination falls back to
    /// `page=1&page_size=10`. Pure: same input, same output.
    pub fn to_query_string(&self) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();

        push_text(&mut params, "search", &self.search);
        push_text(&mut params, "geography", &self.geography);
        push_text(&mut params, "gender", &self.gender);
        push_num(&mut params, "min_age", &self.min_age);
        push_num(&mut params, "max_age", &self.max_age);
        push_num(&mut params, "min_credit_score", &self.min_credit_score);
        push_num(&mut params, "max_credit_score", &self.max_credit_score);
        push_num(&mut params, "min_balance", &self.min_balance);
        push_num(&mut params, "max_balance", &self.max_balance);
        push_bool(&mut params, "exited", &self.exited);
        push_bool(&mut params, "has_cr_card", &self.has_cr_card);
        push_bool(&mut params, "is_active_member", &self.is_active_member);
        push_text(&mut params, "ordering", &self.ordering);

        params.push(("page", self.page.unwrap_or(DEFAULT_PAGE).to_string()));
        params.push((
            "page_size",
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
        ));

        render(&params)
    }

    /// Effective page, defaults applied.
    pub fn effective_page(&self) -> u32 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    /// Effective page size, defaults applied.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    /// True if any predicate field (not pagination/ordering) is set.
    pub fn has_predicates(&self) -> bool {
        self.search.as_deref().is_some_and(|s| !s.is_empty())
            || is_set(&self.geography)
            || is_set(&self.gender)
            || self.min_age.is_some()
            || self.max_age.is_some()
            || self.min_credit_score.is_some()
            || self.max_credit_score.is_some()
            || self.min_balance.is_some()
            || self.max_balance.is_some()
            || self.exited.is_some()
            || self.has_cr_card.is_some()
            || self.is_active_member.is_some()
    }
}

/// Filter state for `/api/alerts/history/`. Same omission rules as customer
/// filters but no pagination defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertHistoryFilters {
    pub alert_type: Option<String>,
    pub customer_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub success_only: Option<bool>,
}

impl AlertHistoryFilters {
    pub fn to_query_string(&self) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();

        push_text(&mut params, "alert_type", &self.alert_type);
        push_text(&mut params, "customer_id", &self.customer_id);
        push_text(&mut params, "date_from", &self.date_from);
        push_text(&mut params, "date_to", &self.date_to);
        push_bool(&mut params, "success_only", &self.success_only);

        render(&params)
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty() && v != ALL)
}

fn push_text(params: &mut Vec<(&'static str, String)>, key: &'static str, value: &Option<String>) {
    if let Some(v) = value {
        if !v.is_empty() && v != ALL {
            params.push((key, v.clone()));
        }
    }
}

fn push_num<T: ToString>(
    params: &mut Vec<(&'static str, String)>,
    key: &'static str,
    value: &Option<T>,
) {
    if let Some(v) = value {
        params.push((key, v.to_string()));
    }
}

fn push_bool(params: &mut Vec<(&'static str, String)>, key: &'static str, value: &Option<bool>) {
    if let Some(v) = value {
        params.push((key, v.to_string()));
    }
}

fn render(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filters_yield_pagination_defaults_only() {
        let filters = CustomerFilters::default();
        assert_eq!(filters.to_query_string(), "page=1&page_size=10");
    }

    #[test]
    fn test_all_sentinel_and_empty_strings_are_omitted() {
        let filters = CustomerFilters {
            geography: Some(ALL.to_string()),
            gender: Some(String::new()),
            search: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(filters.to_query_string(), "page=1&page_size=10");
    }

    #[test]
    fn test_geography_and_exited_serialize_alone() {
        let filters = CustomerFilters {
            geography: Some("France".to_string()),
            exited: Some(true),
            ..Default::default()
        };
        let qs = filters.to_query_string();
        assert!(qs.contains("geography=France"));
        assert!(qs.contains("exited=true"));
        // no other filter keys
        assert_eq!(qs, "geography=France&exited=true&page=1&page_size=10");
    }

    #[test]
    fn test_booleans_serialize_literally() {
        let filters = CustomerFilters {
            has_cr_card: Some(false),
            is_active_member: Some(true),
            ..Default::default()
        };
        let qs = filters.to_query_string();
        assert!(qs.contains("has_cr_card=false"));
        assert!(qs.contains("is_active_member=true"));
    }

    #[test]
    fn test_explicit_pagination_wins_over_defaults() {
        let filters = CustomerFilters {
            page: Some(3),
            page_size: Some(25),
            ..Default::default()
        };
        assert_eq!(filters.to_query_string(), "page=3&page_size=25");
    }

    #[test]
    fn test_range_and_ordering_fields() {
        let filters = CustomerFilters {
            min_age: Some(30),
            max_age: Some(50),
            min_balance: Some(1000.5),
            ordering: Some("-credit_score".to_string()),
            ..Default::default()
        };
        let qs = filters.to_query_string();
        assert!(qs.contains("min_age=30"));
        assert!(qs.contains("max_age=50"));
        assert!(qs.contains("min_balance=1000.5"));
        assert!(qs.contains("ordering=-credit_score"));
    }

    #[test]
    fn test_search_values_are_percent_encoded() {
        let filters = CustomerFilters {
            search: Some("van der Berg".to_string()),
            ..Default::default()
        };
        let qs = filters.to_query_string();
        assert!(qs.contains("search=van%20der%20Berg"));
    }

    #[test]
    fn test_serialization_is_idempotent() {
        let filters = CustomerFilters {
            geography: Some("Germany".to_string()),
            exited: Some(false),
            page: Some(2),
            ..Default::default()
        };
        assert_eq!(filters.to_query_string(), filters.to_query_string());
    }

    #[test]
    fn test_alert_history_filters_have_no_pagination_defaults() {
        let filters = AlertHistoryFilters::default();
        assert_eq!(filters.to_query_string(), "");

        let filters = AlertHistoryFilters {
            alert_type: Some("HIGH_RISK".to_string()),
            success_only: Some(true),
            ..Default::default()
        };
        assert_eq!(
            filters.to_query_string(),
            "alert_type=HIGH_RISK&success_only=true"
        );
    }

    #[test]
    fn test_has_predicates() {
        assert!(!CustomerFilters::default().has_predicates());

        let paged_only = CustomerFilters {
            page: Some(4),
            ordering: Some("age".to_string()),
            ..Default::default()
        };
        assert!(!paged_only.has_predicates());

        let filtered = CustomerFilters {
            exited: Some(true),
            ..Default::default()
        };
        assert!(filtered.has_predicates());
    }
}
