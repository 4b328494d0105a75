use std::collections::BTreeMap;
use tracing::debug;

use crate::api::models::{FilterGroup, FilterRequest, FilterRule, LogicalOperator};

/// Combines structured column filters and per-column search boxes into the
/// single filter tree sent with every data request.
///
/// Global search is deliberately not part of this: its matches only
/// highlight rows of the page that was already fetched.
#[derive(Debug, Clone, Default)]
pub struct FilterComposer {
    filters: BTreeMap<String, FilterRule>,
    column_searches: BTreeMap<String, String>,
}

impl FilterComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the structured rule for `rule.column`, replacing any previous one
    pub fn set_filter(&mut self, rule: FilterRule) -> bool {
        if self.filters.get(&rule.column) == Some(&rule) {
            return false;
        }
        debug!(target: "filter", "Filter on '{}': {} {:?}", rule.column, rule.operator, rule.value);
        self.filters.insert(rule.column.clone(), rule);
        true
    }

    pub fn remove_filter(&mut self, column: &str) -> bool {
        self.filters.remove(column).is_some()
    }

    pub fn clear_filters(&mut self) -> bool {
        let changed = !self.filters.is_empty();
        self.filters.clear();
        changed
    }

    /// Set the search box of one column. An empty or whitespace-only query
    /// removes the search entirely.
    pub fn set_column_search(&mut self, column: &str, query: &str) -> bool {
        if query.trim().is_empty() {
            return self.column_searches.remove(column).is_some();
        }
        if self.column_searches.get(column).map(String::as_str) == Some(query) {
            return false;
        }
        self.column_searches
            .insert(column.to_string(), query.to_string());
        true
    }

    pub fn clear_column_search(&mut self, column: &str) -> bool {
        self.column_searches.remove(column).is_some()
    }

    pub fn clear_column_searches(&mut self) -> bool {
        let changed = !self.column_searches.is_empty();
        self.column_searches.clear();
        changed
    }

    /// Drop every filter and search
    pub fn clear(&mut self) -> bool {
        let filters = self.clear_filters();
        let searches = self.clear_column_searches();
        filters || searches
    }

    pub fn filter(&self, column: &str) -> Option<&FilterRule> {
        self.filters.get(column)
    }

    pub fn filters(&self) -> impl Iterator<Item = &FilterRule> {
        self.filters.values()
    }

    pub fn column_search(&self, column: &str) -> Option<&str> {
        self.column_searches.get(column).map(String::as_str)
    }

    pub fn column_searches(&self) -> &BTreeMap<String, String> {
        &self.column_searches
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.column_searches.is_empty()
    }

    /// Number of rules `compose` would emit
    pub fn active_rule_count(&self) -> usize {
        self.filters.len() + self.column_searches.len()
    }

    /// Structured rules first, then one `contains` rule per column search,
    /// all ANDed in a single group. `None` when there is nothing to filter.
    pub fn compose(&self) -> Option<FilterRequest> {
        let rules: Vec<FilterRule> = self
            .filters
            .values()
            .cloned()
            .chain(
                self.column_searches
                    .iter()
                    .map(|(column, query)| FilterRule::contains(column.as_str(), query.as_str())),
            )
            .collect();

        if rules.is_empty() {
            return None;
        }

        Some(FilterRequest {
            groups: vec![FilterGroup {
                rules,
                logical_operator: LogicalOperator::And,
            }],
            global_operator: LogicalOperator::And,
        })
    }
}
