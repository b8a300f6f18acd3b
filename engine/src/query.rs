//! Record set queries: filters, sorting, pagination rules and limits.

use crate::filter::{matches_all, sort_records, Comparator, Direction, Filter, Sort};
use crate::{FieldNames, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Filters combined with AND. A list of rules is combined with OR.
pub type PaginationRule = Vec<Filter>;

/// Parameters of a record set read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Restrict the candidate set (AND)
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Cumulative ordering
    #[serde(default)]
    pub sorting: Vec<Sort>,
    /// Continuation predicates (OR of ANDs), applied on top of `filters`
    #[serde(default)]
    pub pagination_rules: Vec<PaginationRule>,
    /// Maximum number of records returned; never caps the total
    #[serde(default)]
    pub limit: Option<usize>,
    /// Include tombstones that match the filters
    #[serde(default)]
    pub include_deleted: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorting.push(sort);
        self
    }

    pub fn paginate(mut self, rule: PaginationRule) -> Self {
        self.pagination_rules.push(rule);
        self
    }

    pub fn pagination_rules(mut self, rules: impl IntoIterator<Item = PaginationRule>) -> Self {
        self.pagination_rules.extend(rules);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// Continue after `last` in this query's sort order, replacing any
    /// previous pagination rules.
    pub fn after(mut self, last: &Record) -> Self {
        self.pagination_rules = pagination_rules_after(&self.sorting, last);
        self
    }
}

/// Check that a record satisfies at least one rule (logical OR).
///
/// No rules means no pagination: every record passes.
pub fn matches_any(rules: &[PaginationRule], record: &Record) -> bool {
    rules.is_empty() || rules.iter().any(|rule| matches_all(rule, record))
}

/// Build the rules selecting records strictly after `last` in `sorting` order.
///
/// For keys `k1..kn` this yields `[k1 > v1]`, `[k1 = v1, k2 > v2]`, ...
/// with `<` in place of `>` for descending keys. The order is strict only if
/// the keys identify records uniquely, so callers usually sort by the id last.
pub fn pagination_rules_after(sorting: &[Sort], last: &Record) -> Vec<PaginationRule> {
    let value_of = |field: &str| last.get(field).cloned().unwrap_or(Value::Null);

    (0..sorting.len())
        .map(|i| {
            let mut rule: PaginationRule = sorting[..i]
                .iter()
                .map(|s| Filter::eq(s.field.clone(), value_of(&s.field)))
                .collect();
            let key = &sorting[i];
            let comparator = match key.direction {
                Direction::Ascending => Comparator::Gt,
                Direction::Descending => Comparator::Lt,
            };
            rule.push(Filter::new(key.field.clone(), value_of(&key.field), comparator));
            rule
        })
        .collect()
}

/// Select the page of `candidates` described by `query`.
///
/// Returns the page and the number of candidates matching the filters,
/// before pagination rules and limit are applied. This is the reference
/// behavior of [`crate::Storage::get_all`]; backends evaluating queries in
/// process use it directly.
pub fn extract_record_set<'a, I>(
    candidates: I,
    query: &Query,
    names: &FieldNames,
) -> (Vec<Record>, usize)
where
    I: IntoIterator<Item = Cow<'a, Record>>,
{
    let filters: Vec<Filter> = query.filters.iter().map(|f| f.normalized(names)).collect();
    let rules: Vec<PaginationRule> = query
        .pagination_rules
        .iter()
        .map(|rule| rule.iter().map(|f| f.normalized(names)).collect())
        .collect();

    let mut records: Vec<Record> = candidates
        .into_iter()
        .filter(|r| matches_all(&filters, r))
        .map(Cow::into_owned)
        .collect();
    let total = records.len();

    sort_records(&mut records, &query.sorting);
    if !rules.is_empty() {
        records.retain(|r| matches_any(&rules, r));
    }
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }

    (records, total)
}
