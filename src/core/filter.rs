//! Query object vocabulary shared by every storage backend
//!
//! [`FindQuery`] plays the role of a driver query builder: it accumulates a
//! [`Filter`], a [`SortSpec`], a [`Projection`], skip/limit and the relations
//! to expand, and is handed to a [`DocumentStore`](crate::core::DocumentStore)
//! for execution.

use serde_json::{Map, Value};

/// Identifier field carried by every record
pub const ID_FIELD: &str = "id";

/// Creation timestamp carried by every record
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Internal versioning field excluded from responses by default
pub const VERSION_FIELD: &str = "__v";

/// A longitude/latitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Read a GeoJSON point (`{ "coordinates": [lng, lat] }`)
    pub fn from_geojson(value: &Value) -> Option<Self> {
        let coords = value.get("coordinates")?.as_array()?;
        Some(Self::new(coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
    }
}

/// Comparison operators accepted from query strings as `field[op]=value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// Parse a whitelisted query-string token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Comparison::Gt),
            "gte" => Some(Comparison::Gte),
            "lt" => Some(Comparison::Lt),
            "lte" => Some(Comparison::Lte),
            _ => None,
        }
    }

    /// Database operator syntax
    pub fn operator(&self) -> &'static str {
        match self {
            Comparison::Gt => "$gt",
            Comparison::Gte => "$gte",
            Comparison::Lt => "$lt",
            Comparison::Lte => "$lte",
        }
    }
}

/// Condition applied to one field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Compare(Comparison, Value),
    In(Vec<Value>),
    /// Point field lies within a sphere of `radius` radians around `center`
    GeoWithin { center: GeoPoint, radius: f64 },
}

/// One `field → condition` pair
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub condition: Condition,
}

/// Conjunction of clauses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with a single equality clause
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, Condition::Eq(value.into()))
    }

    /// Add a clause
    pub fn and(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.push(field, condition);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, condition: Condition) {
        self.clauses.push(Clause {
            field: field.into(),
            condition,
        });
    }

    /// Append every clause of `other`
    pub fn merge(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

// =============================================================================
// Sorting
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

/// Ordered list of sort keys; earlier keys take precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    /// Parse a comma-separated list where a leading `-` means descending
    pub fn parse(list: &str) -> Self {
        let keys = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "-")
            .map(|s| match s.strip_prefix('-') {
                Some(field) => SortKey {
                    field: field.to_string(),
                    direction: Direction::Descending,
                },
                None => SortKey {
                    field: s.to_string(),
                    direction: Direction::Ascending,
                },
            })
            .collect();
        Self { keys }
    }

    /// Newest first, identifier as tie-break
    pub fn newest_first() -> Self {
        Self::default()
            .then(CREATED_AT_FIELD, Direction::Descending)
            .then(ID_FIELD, Direction::Ascending)
    }

    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.keys.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Space-joined form (`-ratingsAverage price`)
    pub fn to_spec_string(&self) -> String {
        self.keys
            .iter()
            .map(|k| match k.direction {
                Direction::Ascending => k.field.clone(),
                Direction::Descending => format!("-{}", k.field),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// =============================================================================
// Projection
// =============================================================================

/// Field selection applied to returned records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only these fields (plus the identifier)
    Include(Vec<String>),
    /// Drop these fields
    Exclude(Vec<String>),
}

impl Projection {
    /// Parse a comma-separated field list into an inclusion projection
    pub fn include_list(list: &str) -> Self {
        Projection::Include(split_list(list))
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Apply to a JSON document. Unknown fields are ignored.
    pub fn apply(&self, doc: Value) -> Value {
        let Value::Object(map) = doc else {
            return doc;
        };

        let projected: Map<String, Value> = match self {
            Projection::Include(fields) => map
                .into_iter()
                .filter(|(k, _)| k == ID_FIELD || fields.iter().any(|f| f == k))
                .collect(),
            Projection::Exclude(fields) => map
                .into_iter()
                .filter(|(k, _)| !fields.iter().any(|f| f == k))
                .collect(),
        };
        Value::Object(projected)
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// =============================================================================
// Relation expansion
// =============================================================================

/// How a populated path relates to the owning record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// The record stores the id (or ids) of the related records at `path`
    Reference,
    /// Related records point back at this record through `foreign_field`
    Virtual { foreign_field: String },
}

/// Relation to expand in place of stored ids
#[derive(Debug, Clone, PartialEq)]
pub struct Populate {
    pub path: String,
    pub collection: String,
    pub relation: Relation,
    pub select: Option<Projection>,
    pub filter: Filter,
    pub nested: Vec<Populate>,
}

impl Populate {
    /// Expand ids stored at `path` from `collection`
    pub fn reference(path: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
            relation: Relation::Reference,
            select: None,
            filter: Filter::new(),
            nested: Vec::new(),
        }
    }

    /// Attach records from `collection` whose `foreign_field` holds this record's id
    pub fn virtual_field(
        path: impl Into<String>,
        collection: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            relation: Relation::Virtual {
                foreign_field: foreign_field.into(),
            },
            ..Self::reference(path, collection)
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }

    /// Extra clauses applied when loading the related records
    pub fn matching(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Relations to expand on the related records themselves
    pub fn with_nested(mut self, nested: Vec<Populate>) -> Self {
        self.nested = nested;
        self
    }
}

// =============================================================================
// Query object
// =============================================================================

/// Chainable find query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: SortSpec,
    pub projection: Option<Projection>,
    pub skip: u64,
    pub limit: Option<u64>,
    pub populate: Vec<Populate>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// AND more clauses into the filter
    pub fn where_(mut self, filter: Filter) -> Self {
        self.filter = self.filter.merge(filter);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn populate(mut self, populate: Populate) -> Self {
        self.populate.push(populate);
        self
    }
}
