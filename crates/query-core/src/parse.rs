//! List parameter parsing for both API generations.
//!
//! - Legacy (`v1alpha2`): `conditions=name=foo,status~run`,
//!   `paging=limit=10,page=1` or `limit`/`offset`/`page`, `orderBy`, `reverse`.
//! - Current (`v1alpha3`): `limit`, `page`, `sortBy`, `ascending`; every other
//!   parameter is a field filter (`name` fuzzy, the rest exact).

use std::collections::{BTreeMap, HashMap};

use crate::{fields, Condition, Query, NO_LIMIT};

/// Query parameter names.
pub mod params {
    /// Legacy condition list
    pub const CONDITIONS: &str = "conditions";
    /// Legacy combined paging
    pub const PAGING: &str = "paging";
    /// Legacy ordering field
    pub const ORDER_BY: &str = "orderBy";
    /// Legacy ordering direction
    pub const REVERSE: &str = "reverse";
    /// Page size
    pub const LIMIT: &str = "limit";
    /// Items to skip
    pub const OFFSET: &str = "offset";
    /// 1-based page number
    pub const PAGE: &str = "page";
    /// Ordering field
    pub const SORT_BY: &str = "sortBy";
    /// Ordering direction
    pub const ASCENDING: &str = "ascending";
}

/// Page size used by the legacy generation when none is given.
const LEGACY_DEFAULT_LIMIT: i64 = 10;

/// Rejections raised while parsing list parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Parameter value failed to parse
    #[error("invalid value '{value}' for parameter '{param}'")]
    InvalidValue {
        /// Parameter name
        param: String,
        /// Offending value
        value: String,
    },

    /// Field name outside the known vocabulary
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Condition term without `=` or `~`
    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    /// Negative offset
    #[error("offset must not be negative")]
    NegativeOffset,
}

impl Query {
    /// Parse legacy (`v1alpha2`) list parameters.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for unknown fields, malformed conditions,
    /// negative offsets or non-numeric paging values.
    pub fn from_legacy_params<'a, I>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let values: HashMap<&str, &str> = pairs.into_iter().collect();
        let mut query = Query {
            limit: LEGACY_DEFAULT_LIMIT,
            ..Query::default()
        };

        if let Some(raw) = values.get(params::CONDITIONS) {
            query.conditions = parse_conditions(raw)?;
        }

        if let Some(field) = values.get(params::ORDER_BY) {
            query.order_by = known_field(field)?;
        }

        if let Some(raw) = values.get(params::REVERSE) {
            query.reverse = parse_bool(params::REVERSE, raw)?;
        }

        let mut page: Option<i64> = None;
        if let Some(raw) = values.get(params::PAGING) {
            for term in raw.split(',').filter(|t| !t.is_empty()) {
                let (key, value) = term
                    .split_once('=')
                    .ok_or_else(|| invalid(params::PAGING, raw))?;
                match key {
                    params::LIMIT => query.limit = parse_limit(value)?,
                    params::PAGE => page = Some(parse_page(value)?),
                    _ => return Err(invalid(params::PAGING, raw)),
                }
            }
        }
        if let Some(raw) = values.get(params::LIMIT) {
            query.limit = parse_limit(raw)?;
        }
        if let Some(raw) = values.get(params::PAGE) {
            page = Some(parse_page(raw)?);
        }

        query.offset = match values.get(params::OFFSET) {
            Some(raw) => parse_offset(raw)?,
            None => offset_for_page(page, query.limit),
        };

        Ok(query)
    }

    /// Parse current (`v1alpha3`) list parameters.
    ///
    /// Ordering defaults to newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for unknown filter fields or non-numeric paging
    /// values.
    pub fn from_params<'a, I>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut query = Query {
            order_by: fields::CREATION_TIMESTAMP.to_string(),
            reverse: true,
            ..Query::default()
        };
        let mut page = None;

        for (key, value) in pairs {
            match key {
                params::LIMIT => query.limit = parse_limit(value)?,
                params::PAGE => page = Some(parse_page(value)?),
                params::SORT_BY => query.order_by = known_field(value)?,
                params::ASCENDING => query.reverse = !parse_bool(params::ASCENDING, value)?,
                field => {
                    let field = known_field(field)?;
                    let condition = if field == fields::NAME {
                        Condition::fuzzy(value)
                    } else {
                        Condition::exact(value)
                    };
                    query.conditions.insert(field, condition);
                }
            }
        }

        query.offset = offset_for_page(page, query.limit);
        Ok(query)
    }
}

fn parse_conditions(raw: &str) -> Result<BTreeMap<String, Condition>, QueryError> {
    let mut conditions = BTreeMap::new();
    for term in raw.split(',').filter(|t| !t.is_empty()) {
        let split_at = term
            .find(['=', '~'])
            .ok_or_else(|| QueryError::MalformedCondition(term.to_string()))?;
        let (field, rest) = term.split_at(split_at);
        let value = &rest[1..];
        let field = known_field(field)?;
        let condition = if rest.starts_with('~') {
            Condition::fuzzy(value)
        } else {
            Condition::exact(value)
        };
        conditions.insert(field, condition);
    }
    Ok(conditions)
}

fn known_field(field: &str) -> Result<String, QueryError> {
    if fields::is_known(field) {
        Ok(field.to_string())
    } else {
        Err(QueryError::UnknownField(field.to_string()))
    }
}

fn parse_limit(raw: &str) -> Result<i64, QueryError> {
    match raw.parse::<i64>() {
        Ok(limit) if limit >= NO_LIMIT => Ok(limit),
        _ => Err(invalid(params::LIMIT, raw)),
    }
}

fn parse_page(raw: &str) -> Result<i64, QueryError> {
    match raw.parse::<i64>() {
        Ok(page) if page >= 1 => Ok(page),
        _ => Err(invalid(params::PAGE, raw)),
    }
}

fn parse_offset(raw: &str) -> Result<usize, QueryError> {
    let offset = raw
        .parse::<i64>()
        .map_err(|_| invalid(params::OFFSET, raw))?;
    usize::try_from(offset).map_err(|_| QueryError::NegativeOffset)
}

fn parse_bool(param: &str, raw: &str) -> Result<bool, QueryError> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(param, raw)),
    }
}

fn offset_for_page(page: Option<i64>, limit: i64) -> usize {
    match page {
        Some(page) if limit > 0 => usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(0),
        _ => 0,
    }
}

fn invalid(param: &str, value: &str) -> QueryError {
    QueryError::InvalidValue {
        param: param.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatchKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn legacy_defaults() {
        let query = Query::from_legacy_params(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 0);
        assert_eq!(query.order_by, fields::CREATE_TIME);
        assert!(!query.reverse);
        assert!(query.conditions.is_empty());
    }

    #[test]
    fn legacy_conditions_split_exact_and_fuzzy() {
        let query =
            Query::from_legacy_params([("conditions", "name~builder,status=Running")]).unwrap();
        assert_eq!(query.conditions["name"], Condition::fuzzy("builder"));
        assert_eq!(query.conditions["status"].kind, MatchKind::Exact);
        assert_eq!(query.conditions["status"].value, "Running");
    }

    #[test]
    fn legacy_label_condition_keeps_inner_equals() {
        let query = Query::from_legacy_params([("conditions", "label=app=web")]).unwrap();
        assert_eq!(query.conditions["label"], Condition::exact("app=web"));
    }

    #[test]
    fn legacy_paging_is_converted_to_offset() {
        let query = Query::from_legacy_params([("paging", "limit=5,page=3")]).unwrap();
        assert_eq!(query.limit, 5);
        assert_eq!(query.offset, 10);
    }

    #[test]
    fn explicit_offset_wins_over_page() {
        let query =
            Query::from_legacy_params([("limit", "-1"), ("page", "4"), ("offset", "3")]).unwrap();
        assert_eq!(query.limit, NO_LIMIT);
        assert_eq!(query.offset, 3);
    }

    #[test]
    fn legacy_rejects_bad_input() {
        assert_eq!(
            Query::from_legacy_params([("conditions", "colour=red")]),
            Err(QueryError::UnknownField("colour".to_string()))
        );
        assert_eq!(
            Query::from_legacy_params([("conditions", "name")]),
            Err(QueryError::MalformedCondition("name".to_string()))
        );
        assert_eq!(
            Query::from_legacy_params([("offset", "-2")]),
            Err(QueryError::NegativeOffset)
        );
        assert!(Query::from_legacy_params([("limit", "-5")]).is_err());
        assert!(Query::from_legacy_params([("limit", "ten")]).is_err());
        assert!(Query::from_legacy_params([("reverse", "maybe")]).is_err());
        assert!(Query::from_legacy_params([("orderBy", "colour")]).is_err());
    }

    #[test]
    fn current_generation_defaults_to_newest_first() {
        let query = Query::from_params(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(query.limit, NO_LIMIT);
        assert_eq!(query.order_by, fields::CREATION_TIMESTAMP);
        assert!(query.reverse);
    }

    #[test]
    fn current_generation_filters_and_pages() {
        let query = Query::from_params([
            ("name", "proj"),
            ("workspace", "ws1"),
            ("limit", "10"),
            ("page", "2"),
            ("sortBy", "name"),
            ("ascending", "true"),
        ])
        .unwrap();
        assert_eq!(query.conditions["name"], Condition::fuzzy("proj"));
        assert_eq!(query.conditions["workspace"], Condition::exact("ws1"));
        assert_eq!(query.offset, 10);
        assert_eq!(query.order_by, "name");
        assert!(!query.reverse);
    }

    #[test]
    fn current_generation_rejects_unknown_filters() {
        assert_eq!(
            Query::from_params([("colour", "red")]),
            Err(QueryError::UnknownField("colour".to_string()))
        );
        assert!(Query::from_params([("page", "0")]).is_err());
    }
}
