//! Query specification: the raw query-string mapping of one request
//!
//! A [`QuerySpec`] is built once per request from the decoded query pairs and
//! is never modified afterwards. Keys keep their arrival order.
//!
//! # Example
//! ```rust,ignore
//! // GET /api/v1/tours?duration[gte]=5&difficulty=easy&sort=-price&page=2
//! let spec = QuerySpec::from_pairs(pairs, &["difficulty"]);
//! assert_eq!(spec.get("sort"), Some("-price"));
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Query-string keys consumed by the builder itself rather than by the filter
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Value of one query-string key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Many(Vec<String>),
}

impl QueryValue {
    /// Last value supplied for the key
    pub fn last(&self) -> &str {
        match self {
            QueryValue::Single(s) => s,
            QueryValue::Many(values) => values.last().map(String::as_str).unwrap_or(""),
        }
    }

    /// JSON form used by filter clauses
    pub fn to_json(&self) -> Value {
        match self {
            QueryValue::Single(s) => Value::String(s.clone()),
            QueryValue::Many(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Raw query-string mapping for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    entries: IndexMap<String, QueryValue>,
}

impl QuerySpec {
    /// Create an empty specification
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded `(key, value)` pairs.
    ///
    /// Keys seen more than once keep every value only when listed in
    /// `multi_value_keys`; any other repeated key keeps its last value.
    pub fn from_pairs<I, K, V>(pairs: I, multi_value_keys: &[String]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: IndexMap<String, QueryValue> = IndexMap::new();

        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            let keep_all = multi_value_keys.iter().any(|k| field_of(&key) == k);

            match entries.get_mut(&key) {
                Some(existing) if keep_all => {
                    let mut values = match std::mem::replace(existing, QueryValue::Many(vec![])) {
                        QueryValue::Single(s) => vec![s],
                        QueryValue::Many(v) => v,
                    };
                    values.push(value);
                    *existing = QueryValue::Many(values);
                }
                Some(existing) => *existing = QueryValue::Single(value),
                None => {
                    entries.insert(key, QueryValue::Single(value));
                }
            }
        }

        Self { entries }
    }

    /// Return a copy with `key` set to a single value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries
            .insert(key.into(), QueryValue::Single(value.into()));
        self
    }

    /// Last value for `key`, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(QueryValue::last)
    }

    /// Raw value for `key`, if present
    pub fn value(&self, key: &str) -> Option<&QueryValue> {
        self.entries.get(key)
    }

    /// Iterate entries in arrival order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries that are not reserved builder keys
    pub fn filter_entries(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.iter().filter(|(k, _)| !RESERVED_KEYS.contains(k))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Field part of a possibly bracketed key (`price[gte]` → `price`)
fn field_of(key: &str) -> &str {
    key.split_once('[').map(|(field, _)| field).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist() -> Vec<String> {
        vec!["difficulty".to_string(), "price".to_string()]
    }

    #[test]
    fn test_from_pairs_keeps_order() {
        let spec = QuerySpec::from_pairs(
            vec![("sort", "price"), ("difficulty", "easy"), ("page", "2")],
            &[],
        );
        let keys: Vec<&str> = spec.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["sort", "difficulty", "page"]);
    }

    #[test]
    fn test_repeated_whitelisted_key_becomes_many() {
        let spec = QuerySpec::from_pairs(
            vec![("difficulty", "easy"), ("difficulty", "medium")],
            &whitelist(),
        );
        assert_eq!(
            spec.value("difficulty"),
            Some(&QueryValue::Many(vec!["easy".into(), "medium".into()]))
        );
    }

    #[test]
    fn test_repeated_bracketed_whitelisted_key_becomes_many() {
        let spec = QuerySpec::from_pairs(
            vec![("price[gte]", "100"), ("price[gte]", "200")],
            &whitelist(),
        );
        assert!(matches!(spec.value("price[gte]"), Some(QueryValue::Many(_))));
    }

    #[test]
    fn test_repeated_other_key_keeps_last() {
        let spec = QuerySpec::from_pairs(vec![("sort", "price"), ("sort", "duration")], &whitelist());
        assert_eq!(spec.value("sort"), Some(&QueryValue::Single("duration".into())));
    }

    #[test]
    fn test_filter_entries_skip_reserved() {
        let spec = QuerySpec::from_pairs(
            vec![
                ("page", "1"),
                ("sort", "price"),
                ("limit", "3"),
                ("fields", "name"),
                ("difficulty", "easy"),
            ],
            &[],
        );
        let keys: Vec<&str> = spec.filter_entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["difficulty"]);
    }

    #[test]
    fn test_with_overrides_value() {
        let spec = QuerySpec::new().with("limit", "10").with("limit", "5");
        assert_eq!(spec.get("limit"), Some("5"));
        assert_eq!(spec.len(), 1);
    }
}
