//! Query primitives for the resource registries.
//!
//! A [`Query`] carries the conditions, ordering and paging requested by a list
//! call. [`filter_and_sort`] and [`paginate`] apply it to any collection whose
//! items expose their fields through [`Fields`], so every searcher behaves the
//! same regardless of the object type behind it.
//!
//! Parameters are parsed and validated here ([`Query::from_legacy_params`],
//! [`Query::from_params`]); anything that gets past parsing is safe to hand to
//! a registry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

mod parse;

pub use parse::{params, QueryError};

/// Field names understood by conditions and ordering.
pub mod fields {
    /// Object name
    pub const NAME: &str = "name";
    /// Object namespace
    pub const NAMESPACE: &str = "namespace";
    /// Creation time (legacy spelling)
    pub const CREATE_TIME: &str = "createTime";
    /// Creation time
    pub const CREATION_TIMESTAMP: &str = "creationTimestamp";
    /// Status phase / state summary
    pub const STATUS: &str = "status";
    /// Label selector term, `key=value` or bare `key`
    pub const LABEL: &str = "label";
    /// Annotation term, `key=value` or bare `key`
    pub const ANNOTATION: &str = "annotation";
    /// Owning workspace
    pub const WORKSPACE: &str = "workspace";
    /// Email address (users)
    pub const EMAIL: &str = "email";
    /// Account state (users)
    pub const STATE: &str = "state";
    /// Display alias
    pub const ALIAS: &str = "alias";

    /// Every field name accepted at the parsing boundary.
    pub const KNOWN: &[&str] = &[
        NAME,
        NAMESPACE,
        CREATE_TIME,
        CREATION_TIMESTAMP,
        STATUS,
        LABEL,
        ANNOTATION,
        WORKSPACE,
        EMAIL,
        STATE,
        ALIAS,
    ];

    /// Returns `true` if `field` is a known field name.
    #[must_use]
    pub fn is_known(field: &str) -> bool {
        KNOWN.contains(&field)
    }
}

/// `limit` value meaning "everything after the offset".
pub const NO_LIMIT: i64 = -1;

/// How a condition compares against a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Field value equality
    Exact,
    /// Substring containment
    Fuzzy,
}

/// A single match requirement on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Exact or fuzzy
    pub kind: MatchKind,
    /// Value to compare against
    pub value: String,
}

impl Condition {
    /// Equality condition
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Exact,
            value: value.into(),
        }
    }

    /// Substring condition
    pub fn fuzzy(value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Fuzzy,
            value: value.into(),
        }
    }

    /// Compare a candidate field value.
    #[must_use]
    pub fn matches_value(&self, candidate: &str) -> bool {
        match self.kind {
            MatchKind::Exact => candidate == self.value,
            MatchKind::Fuzzy => candidate.contains(self.value.as_str()),
        }
    }
}

/// Parsed list parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Field name to condition
    pub conditions: BTreeMap<String, Condition>,
    /// Field to order by
    pub order_by: String,
    /// Flip the ordering
    pub reverse: bool,
    /// Page size, [`NO_LIMIT`] for everything
    pub limit: i64,
    /// Items to skip
    pub offset: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            conditions: BTreeMap::new(),
            order_by: fields::CREATE_TIME.to_string(),
            reverse: false,
            limit: NO_LIMIT,
            offset: 0,
        }
    }
}

impl Query {
    /// Query with no conditions that returns everything in creation order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition on `field`, replacing any previous one.
    #[must_use]
    pub fn with_condition(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    /// Set the ordering field and direction.
    #[must_use]
    pub fn ordered_by(mut self, field: impl Into<String>, reverse: bool) -> Self {
        self.order_by = field.into();
        self.reverse = reverse;
        self
    }

    /// Set limit and offset.
    #[must_use]
    pub fn paged(mut self, limit: i64, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Read access to the queryable fields of an object.
pub trait Fields {
    /// Name used as the ordering tie-breaker.
    fn name(&self) -> &str;

    /// Value of `field`, or `None` if the object does not carry it.
    fn field(&self, field: &str) -> Option<Cow<'_, str>>;

    /// Whether `condition` holds for `field`.
    ///
    /// Objects override this for structured fields such as labels.
    fn matches(&self, field: &str, condition: &Condition) -> bool {
        self.field(field)
            .is_some_and(|value| condition.matches_value(&value))
    }
}

impl<T: Fields + ?Sized> Fields for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn field(&self, field: &str) -> Option<Cow<'_, str>> {
        (**self).field(field)
    }

    fn matches(&self, field: &str, condition: &Condition) -> bool {
        (**self).matches(field, condition)
    }
}

/// One page of a list result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Matching items before pagination
    pub total_count: usize,
    /// Items on this page
    pub items: Vec<T>,
}

/// Keep the items satisfying every condition, ordered per `query`.
///
/// Ties on the ordering field fall back to the name so that repeated calls
/// against the same snapshot page identically.
pub fn filter_and_sort<T: Fields>(items: Vec<T>, query: &Query) -> Vec<T> {
    let mut result: Vec<T> = items
        .into_iter()
        .filter(|item| {
            query
                .conditions
                .iter()
                .all(|(field, condition)| item.matches(field, condition))
        })
        .collect();

    result.sort_by(|a, b| {
        let ordering = compare(a, b, &query.order_by);
        if query.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
    result
}

fn compare<T: Fields>(a: &T, b: &T, order_by: &str) -> Ordering {
    a.field(order_by)
        .cmp(&b.field(order_by))
        .then_with(|| a.name().cmp(b.name()))
}

/// Slice `items[offset..offset + limit]`.
///
/// A negative `limit`, or one running past the end, is clamped to what
/// remains; an offset past the end yields an empty page.
pub fn paginate<T>(items: Vec<T>, limit: i64, offset: usize) -> Page<T> {
    let total_count = items.len();
    if offset >= total_count {
        return Page {
            total_count,
            items: Vec::new(),
        };
    }

    let remaining = total_count - offset;
    let take = usize::try_from(limit).map_or(remaining, |l| l.min(remaining));

    Page {
        total_count,
        items: items.into_iter().skip(offset).take(take).collect(),
    }
}

/// [`filter_and_sort`] followed by [`paginate`].
pub fn apply<T: Fields>(items: Vec<T>, query: &Query) -> Page<T> {
    paginate(filter_and_sort(items, query), query.limit, query.offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone)]
    struct Item {
        name: String,
        created: String,
        status: Option<String>,
    }

    impl Fields for Item {
        fn name(&self) -> &str {
            &self.name
        }

        fn field(&self, field: &str) -> Option<Cow<'_, str>> {
            match field {
                fields::NAME => Some(Cow::Borrowed(&self.name)),
                fields::CREATE_TIME => Some(Cow::Borrowed(&self.created)),
                fields::STATUS => self.status.as_deref().map(Cow::Borrowed),
                _ => None,
            }
        }
    }

    fn item(name: &str, created: &str, status: Option<&str>) -> Item {
        Item {
            name: name.to_string(),
            created: created.to_string(),
            status: status.map(str::to_string),
        }
    }

    fn names<T: Fields>(items: &[T]) -> Vec<String> {
        items.iter().map(|i| i.name().to_string()).collect()
    }

    fn sample() -> Vec<Item> {
        vec![
            item("gamma", "2024-01-03T00:00:00Z", Some("Running")),
            item("alpha", "2024-01-01T00:00:00Z", Some("Failed")),
            item("beta", "2024-01-02T00:00:00Z", None),
            item("delta", "2024-01-02T00:00:00Z", Some("Running")),
        ]
    }

    #[test]
    fn default_query_orders_by_creation_then_name() {
        let sorted = filter_and_sort(sample(), &Query::new());
        assert_eq!(names(&sorted), vec!["alpha", "beta", "delta", "gamma"]);
    }

    #[test]
    fn reverse_flips_the_whole_ordering() {
        let query = Query::new().ordered_by(fields::CREATE_TIME, true);
        let sorted = filter_and_sort(sample(), &query);
        assert_eq!(names(&sorted), vec!["gamma", "delta", "beta", "alpha"]);
    }

    #[test]
    fn exact_and_fuzzy_conditions() {
        let exact = Query::new().with_condition(fields::STATUS, Condition::exact("Running"));
        assert_eq!(names(&filter_and_sort(sample(), &exact)), vec!["delta", "gamma"]);

        let fuzzy = Query::new().with_condition(fields::NAME, Condition::fuzzy("ta"));
        assert_eq!(names(&filter_and_sort(sample(), &fuzzy)), vec!["beta", "delta"]);

        let exact_partial = Query::new().with_condition(fields::STATUS, Condition::exact("Run"));
        assert!(filter_and_sort(sample(), &exact_partial).is_empty());
    }

    #[test]
    fn missing_field_never_matches() {
        let query = Query::new().with_condition(fields::STATUS, Condition::fuzzy(""));
        let result = filter_and_sort(sample(), &query);
        assert!(!names(&result).contains(&"beta".to_string()));
    }

    #[test]
    fn paginate_clamps_and_handles_offsets() {
        let items: Vec<u32> = (0..10).collect();

        let page = paginate(items.clone(), 3, 2);
        assert_eq!(page.total_count, 10);
        assert_eq!(page.items, vec![2, 3, 4]);

        let page = paginate(items.clone(), NO_LIMIT, 7);
        assert_eq!(page.items, vec![7, 8, 9]);

        let page = paginate(items.clone(), 5, 8);
        assert_eq!(page.items, vec![8, 9]);

        let page = paginate(items.clone(), NO_LIMIT, 10);
        assert!(page.items.is_empty());

        let page = paginate(items, 5, 42);
        assert_eq!(page.total_count, 10);
        assert!(page.items.is_empty());
    }

    #[test]
    fn limit_minus_one_returns_everything_after_offset() {
        for k in 0..=10usize {
            let items: Vec<usize> = (0..10).collect();
            let page = paginate(items, NO_LIMIT, k);
            assert_eq!(page.items.len(), 10 - k);
        }
    }

    #[test]
    fn apply_is_deterministic() {
        let query = Query::new().paged(2, 1);
        let first = apply(sample(), &query);
        let second = apply(sample(), &query);
        assert_eq!(first.total_count, second.total_count);
        assert_eq!(names(&first.items), names(&second.items));
    }
}
