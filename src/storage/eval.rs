//! Evaluation of filters, sorts and pipelines over JSON documents
//!
//! Used by the in-memory store. Matching follows MongoDB's rules closely
//! enough for the API: array fields match when any element matches, a
//! missing field equals `null`, and query-string literals are compared
//! loosely against numbers, booleans and dates.

use crate::core::error::StorageError;
use crate::core::filter::{
    Comparison, Condition, Direction, Filter, GeoPoint, Projection, SortSpec,
};
use crate::core::pipeline::{Accumulator, Expr, GROUP_KEY, Pipeline, Stage};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Radius used to turn angular distances into meters
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// Value at a dotted path
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, key| match current {
        Value::Object(map) => map.get(key),
        _ => None,
    })
}

// =============================================================================
// Matching
// =============================================================================

/// True when `doc` satisfies every clause of `filter`
pub fn matches(doc: &Value, filter: &Filter) -> bool {
    filter
        .clauses()
        .iter()
        .all(|clause| condition_holds(lookup(doc, &clause.field), &clause.condition))
}

fn condition_holds(actual: Option<&Value>, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(expected) => equals(actual, expected),
        Condition::Ne(expected) => !equals(actual, expected),
        Condition::In(options) => options.iter().any(|expected| equals(actual, expected)),
        Condition::Compare(op, expected) => match actual {
            Some(Value::Array(items)) => items.iter().any(|item| compares(item, *op, expected)),
            Some(value) => compares(value, *op, expected),
            None => false,
        },
        Condition::GeoWithin { center, radius } => actual
            .and_then(GeoPoint::from_geojson)
            .is_some_and(|point| angular_distance(*center, point) <= *radius),
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None | Some(Value::Null) => expected.is_null(),
        Some(Value::Array(items)) => {
            loose_eq(&Value::Array(items.clone()), expected)
                || items.iter().any(|item| loose_eq(item, expected))
        }
        Some(value) => loose_eq(value, expected),
    }
}

/// Equality that lets a string literal match a number, bool or date
pub fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (n.as_f64(), s.trim().parse::<f64>()) {
                (Some(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.parse::<bool>().is_ok_and(|parsed| parsed == *b)
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::String(a), Value::String(b)) => match (parse_date(a), parse_date(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

fn compares(actual: &Value, op: Comparison, expected: &Value) -> bool {
    let Some(ordering) = loose_cmp(actual, expected) else {
        return false;
    };
    match op {
        Comparison::Gt => ordering == Ordering::Greater,
        Comparison::Gte => ordering != Ordering::Less,
        Comparison::Lt => ordering == Ordering::Less,
        Comparison::Lte => ordering != Ordering::Greater,
    }
}

/// Ordering between a stored value and a literal, if they are comparable
pub fn loose_cmp(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(s)) => a.as_f64()?.partial_cmp(&s.trim().parse().ok()?),
        (Value::String(s), Value::Number(b)) => s.trim().parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => match (parse_date(a), parse_date(b)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => Some(a.cmp(b)),
        },
        _ => None,
    }
}

/// Parse the date formats records and query strings use
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d,%H:%M") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Great-circle distance in radians
pub fn angular_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

// =============================================================================
// Sorting
// =============================================================================

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting, min and max
pub fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => sort_cmp(x.first(), y.first()),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        _ => Ordering::Equal,
    }
}

/// Stable sort by every key in order
pub fn sort_documents(docs: &mut [Value], sort: &SortSpec) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in sort.keys() {
            let ordering = sort_cmp(lookup(a, &key.field), lookup(b, &key.field));
            let ordering = match key.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

// =============================================================================
// Pipelines
// =============================================================================

/// Run `pipeline` over a snapshot of a collection
pub fn run_pipeline(mut docs: Vec<Value>, pipeline: &Pipeline) -> Result<Vec<Value>, StorageError> {
    for (position, stage) in pipeline.stages().iter().enumerate() {
        docs = match stage {
            Stage::GeoNear {
                near,
                distance_field,
                distance_multiplier,
                key,
            } => {
                if position != 0 {
                    return Err(StorageError::QueryError {
                        backend: "memory".to_string(),
                        message: "$geoNear is only valid as the first stage in a pipeline"
                            .to_string(),
                    });
                }
                geo_near(docs, *near, distance_field, *distance_multiplier, key)
            }
            Stage::Match(filter) => docs.into_iter().filter(|d| matches(d, filter)).collect(),
            Stage::Group { id, fields } => group(&docs, id, fields),
            Stage::Sort(sort) => {
                sort_documents(&mut docs, sort);
                docs
            }
            Stage::Unwind(field) => unwind(docs, field),
            Stage::AddFields(fields) => docs
                .into_iter()
                .map(|mut doc| {
                    let computed: Vec<(String, Value)> = fields
                        .iter()
                        .map(|(name, expr)| (name.clone(), evaluate(&doc, expr)))
                        .collect();
                    if let Some(map) = doc.as_object_mut() {
                        map.extend(computed);
                    }
                    doc
                })
                .collect(),
            Stage::Project(projection) => project(docs, projection),
            Stage::Limit(limit) => docs.into_iter().take(*limit as usize).collect(),
        };
    }
    Ok(docs)
}

fn geo_near(
    docs: Vec<Value>,
    near: GeoPoint,
    distance_field: &str,
    multiplier: f64,
    key: &str,
) -> Vec<Value> {
    let mut placed: Vec<(f64, Value)> = docs
        .into_iter()
        .filter_map(|mut doc| {
            let point = lookup(&doc, key).and_then(GeoPoint::from_geojson)?;
            let distance = angular_distance(near, point) * EARTH_RADIUS_METERS * multiplier;
            doc.as_object_mut()?
                .insert(distance_field.to_string(), Value::from(distance));
            Some((distance, doc))
        })
        .collect();
    placed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    placed.into_iter().map(|(_, doc)| doc).collect()
}

fn unwind(docs: Vec<Value>, field: &str) -> Vec<Value> {
    let mut out = Vec::new();
    for doc in docs {
        match lookup(&doc, field) {
            Some(Value::Array(items)) => {
                for item in items.clone() {
                    let mut copy = doc.clone();
                    if let Some(map) = copy.as_object_mut() {
                        map.insert(field.to_string(), item);
                    }
                    out.push(copy);
                }
            }
            None | Some(Value::Null) => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

fn project(docs: Vec<Value>, projection: &Projection) -> Vec<Value> {
    docs.into_iter().map(|doc| projection.apply(doc)).collect()
}

fn group(docs: &[Value], id: &Expr, fields: &[(String, Accumulator)]) -> Vec<Value> {
    let mut groups: IndexMap<String, (Value, Vec<&Value>)> = IndexMap::new();
    for doc in docs {
        let key = evaluate(doc, id);
        groups
            .entry(key.to_string())
            .or_insert_with(|| (key, Vec::new()))
            .1
            .push(doc);
    }

    groups
        .into_values()
        .map(|(key, members)| {
            let mut out = Map::new();
            out.insert(GROUP_KEY.to_string(), key);
            for (name, accumulator) in fields {
                out.insert(name.clone(), accumulate(&members, accumulator));
            }
            Value::Object(out)
        })
        .collect()
}

fn accumulate(members: &[&Value], accumulator: &Accumulator) -> Value {
    match accumulator {
        Accumulator::Sum(expr) => {
            let values: Vec<Value> = members.iter().map(|d| evaluate(d, expr)).collect();
            let numbers: Vec<&serde_json::Number> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => Some(n),
                    _ => None,
                })
                .collect();
            if numbers.iter().all(|n| n.is_i64()) {
                Value::from(numbers.iter().filter_map(|n| n.as_i64()).sum::<i64>())
            } else {
                Value::from(numbers.iter().filter_map(|n| n.as_f64()).sum::<f64>())
            }
        }
        Accumulator::Avg(expr) => {
            let numbers: Vec<f64> = members
                .iter()
                .filter_map(|d| evaluate(d, expr).as_f64())
                .collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Accumulator::Min(expr) => extreme(members, expr, Ordering::Less),
        Accumulator::Max(expr) => extreme(members, expr, Ordering::Greater),
        Accumulator::Push(expr) => {
            Value::Array(members.iter().map(|d| evaluate(d, expr)).collect())
        }
    }
}

fn extreme(members: &[&Value], expr: &Expr, wanted: Ordering) -> Value {
    members
        .iter()
        .map(|d| evaluate(d, expr))
        .filter(|v| !v.is_null())
        .reduce(|best, v| {
            if sort_cmp(Some(&v), Some(&best)) == wanted {
                v
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}

/// Evaluate an expression against one document
pub fn evaluate(doc: &Value, expr: &Expr) -> Value {
    match expr {
        Expr::Field(path) => lookup(doc, path).cloned().unwrap_or(Value::Null),
        Expr::Literal(value) => value.clone(),
        Expr::ToUpper(inner) => match evaluate(doc, inner) {
            Value::String(s) => Value::String(s.to_uppercase()),
            Value::Null => Value::String(String::new()),
            other => Value::String(other.to_string().to_uppercase()),
        },
        Expr::Month(inner) => match evaluate(doc, inner) {
            Value::String(s) => parse_date(&s)
                .map(|d| Value::from(d.month()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Expr::Null => Value::Null,
    }
}
