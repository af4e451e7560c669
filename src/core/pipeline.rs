//! Typed aggregation pipelines
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s executed by a
//! [`DocumentStore`](crate::core::DocumentStore). Field names are the record's
//! own names (`id`, `createdAt`, ...); backends translate them as needed.
//!
//! # Example
//!
//! ```rust,ignore
//! let stats = Pipeline::new()
//!     .match_(Filter::new().and("ratingsAverage", Condition::Compare(Comparison::Gte, json!(4.5))))
//!     .group(
//!         Expr::upper(Expr::field("difficulty")),
//!         vec![("numTours".into(), Accumulator::count())],
//!     )
//!     .sort(SortSpec::parse("avgPrice"));
//! ```

use crate::core::filter::{Filter, GeoPoint, Projection, SortSpec};
use serde_json::Value;

/// Key under which a group stage stores its grouping value
pub const GROUP_KEY: &str = "id";

/// Value expression evaluated against one document
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Value of a (possibly dotted) field
    Field(String),
    Literal(Value),
    /// Upper-cased string
    ToUpper(Box<Expr>),
    /// Month (1-12) of a date value
    Month(Box<Expr>),
    Null,
}

impl Expr {
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn upper(inner: Expr) -> Self {
        Expr::ToUpper(Box::new(inner))
    }

    pub fn month(inner: Expr) -> Self {
        Expr::Month(Box::new(inner))
    }
}

/// Group accumulator
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    Push(Expr),
}

impl Accumulator {
    /// Number of documents in the group
    pub fn count() -> Self {
        Accumulator::Sum(Expr::literal(1))
    }
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    /// Distance-sorted documents around `near`; must be the first stage
    GeoNear {
        near: GeoPoint,
        distance_field: String,
        distance_multiplier: f64,
        key: String,
    },
    Group {
        id: Expr,
        fields: Vec<(String, Accumulator)>,
    },
    Sort(SortSpec),
    /// One output document per element of the array field
    Unwind(String),
    AddFields(Vec<(String, Expr)>),
    Project(Projection),
    Limit(u64),
}

/// Ordered list of stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn match_(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    pub fn geo_near(
        self,
        near: GeoPoint,
        distance_field: impl Into<String>,
        distance_multiplier: f64,
        key: impl Into<String>,
    ) -> Self {
        self.stage(Stage::GeoNear {
            near,
            distance_field: distance_field.into(),
            distance_multiplier,
            key: key.into(),
        })
    }

    pub fn group(self, id: Expr, fields: Vec<(String, Accumulator)>) -> Self {
        self.stage(Stage::Group { id, fields })
    }

    pub fn sort(self, sort: SortSpec) -> Self {
        self.stage(Stage::Sort(sort))
    }

    pub fn unwind(self, field: impl Into<String>) -> Self {
        self.stage(Stage::Unwind(field.into()))
    }

    pub fn add_fields(self, fields: Vec<(String, Expr)>) -> Self {
        self.stage(Stage::AddFields(fields))
    }

    pub fn project(self, projection: Projection) -> Self {
        self.stage(Stage::Project(projection))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.stage(Stage::Limit(limit))
    }

    /// Insert a stage before every other stage
    pub fn prepend(mut self, stage: Stage) -> Self {
        self.stages.insert(0, stage);
        self
    }

    pub fn first(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_puts_stage_first() {
        let pipeline = Pipeline::new()
            .sort(SortSpec::parse("avgPrice"))
            .prepend(Stage::Match(Filter::eq("secretTour", false)));
        assert!(matches!(pipeline.first(), Some(Stage::Match(_))));
        assert_eq!(pipeline.stages().len(), 2);
    }

    #[test]
    fn test_count_is_sum_of_one() {
        assert_eq!(Accumulator::count(), Accumulator::Sum(Expr::Literal(Value::from(1))));
    }
}
