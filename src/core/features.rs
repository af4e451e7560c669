//! Query feature builder
//!
//! Translates a request's [`QuerySpec`] into modifications of a [`FindQuery`].
//! The four steps are meant to run in a fixed order, each consuming and
//! returning the builder:
//!
//! ```rust,ignore
//! let query = QueryFeatures::new(resource.find(base_filter), &spec)
//!     .filter()
//!     .sort()
//!     .limit_fields()
//!     .paginate()
//!     .into_query();
//! ```
//!
//! Malformed values are coerced to defaults instead of being rejected.

use crate::core::filter::{
    Comparison, Condition, FindQuery, Filter, Projection, SortSpec, VERSION_FIELD,
};
use crate::core::query::{QuerySpec, QueryValue};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Page used when `page` is absent or malformed
pub const DEFAULT_PAGE: u64 = 1;

/// Page size used when `limit` is absent or malformed
pub const DEFAULT_LIMIT: u64 = 100;

/// Largest skip or limit a store can represent (signed 64-bit)
pub const MAX_WINDOW: u64 = i64::MAX as u64;

/// Builder applying filter / sort / projection / pagination to a query
#[derive(Debug)]
pub struct QueryFeatures<'a> {
    query: FindQuery,
    spec: &'a QuerySpec,
}

impl<'a> QueryFeatures<'a> {
    pub fn new(query: FindQuery, spec: &'a QuerySpec) -> Self {
        Self { query, spec }
    }

    /// AND the clauses derived from non-reserved keys into the query
    pub fn filter(mut self) -> Self {
        self.query = self.query.where_(filter_from_spec(self.spec));
        self
    }

    /// Apply `sort`, or newest-first with the identifier as tie-break
    pub fn sort(mut self) -> Self {
        let requested = self.spec.get("sort").map(SortSpec::parse);
        let sort = match requested {
            Some(sort) if !sort.is_empty() => sort,
            _ => SortSpec::newest_first(),
        };
        self.query = self.query.sort(sort);
        self
    }

    /// Project `fields`, or drop the internal version field
    pub fn limit_fields(mut self) -> Self {
        let projection = match self.spec.get("fields").map(Projection::include_list) {
            Some(Projection::Include(fields)) if !fields.is_empty() => Projection::Include(fields),
            _ => Projection::exclude([VERSION_FIELD]),
        };
        self.query = self.query.select(projection);
        self
    }

    /// Apply `skip = (page - 1) * limit` and `limit`
    pub fn paginate(mut self) -> Self {
        let page = positive_or(self.spec.get("page"), DEFAULT_PAGE);
        let limit = positive_or(self.spec.get("limit"), DEFAULT_LIMIT).min(MAX_WINDOW);
        let skip = (page - 1).saturating_mul(limit).min(MAX_WINDOW);

        self.query = self.query.skip(skip).limit(limit);
        self
    }

    pub fn query(&self) -> &FindQuery {
        &self.query
    }

    pub fn into_query(self) -> FindQuery {
        self.query
    }
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

fn bracket_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^\[\]]+)\[([^\[\]]+)\]$").expect("valid regex"))
}

/// Build the filter described by the non-reserved entries of `spec`.
///
/// `field[gte|gt|lte|lt]=v` becomes a comparison clause on `field`. Any other
/// bracketed key `field[x]=v` is an equality against the object `{x: v}`.
/// Plain keys are equality clauses; their values are never rewritten. A plain
/// key supplied more than once matches any of its values.
pub fn filter_from_spec(spec: &QuerySpec) -> Filter {
    let mut filter = Filter::new();

    for (key, value) in spec.filter_entries() {
        match bracket_key().captures(key) {
            Some(caps) => {
                let field = &caps[1];
                let token = &caps[2];
                match Comparison::from_token(token) {
                    Some(op) => filter.push(field, Condition::Compare(op, value.to_json())),
                    None => {
                        let mut object = Map::new();
                        object.insert(token.to_string(), value.to_json());
                        filter.push(field, Condition::Eq(Value::Object(object)));
                    }
                }
            }
            None => match value {
                QueryValue::Single(s) => filter.push(key, Condition::Eq(Value::String(s.clone()))),
                QueryValue::Many(values) => filter.push(
                    key,
                    Condition::In(values.iter().cloned().map(Value::String).collect()),
                ),
            },
        }
    }

    filter
}

impl QueryValue {
    /// True when the value was supplied more than once
    pub fn is_many(&self) -> bool {
        matches!(self, QueryValue::Many(_))
    }
}
