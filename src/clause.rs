//! Typed representation of a parsed `$apply` clause.

use crate::filter::FilterExpr;
use itertools::Itertools;
use std::fmt;

/// `A/B/C`: member access through nested rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath(pub Vec<String>);

impl PropertyPath {
    pub fn single(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("/"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateExpr {
    /// `Path with method as Alias`
    Property {
        path: PropertyPath,
        method: String,
        alias: String,
    },
    /// `$count as Alias`
    Count { alias: String },
}

impl AggregateExpr {
    pub fn alias(&self) -> &str {
        match self {
            AggregateExpr::Property { alias, .. } | AggregateExpr::Count { alias } => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub path: PropertyPath,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transformation {
    Aggregate(Vec<AggregateExpr>),
    GroupBy {
        properties: Vec<PropertyPath>,
        aggregate: Option<Vec<AggregateExpr>>,
    },
    Filter(FilterExpr),
    Select(Vec<PropertyPath>),
    OrderBy(Vec<OrderByItem>),
    Top(u64),
    Skip(u64),
    Concat(Vec<Vec<Transformation>>),
    Identity,
}

impl Transformation {
    pub fn kind(&self) -> &'static str {
        match self {
            Transformation::Aggregate(_) => "aggregate",
            Transformation::GroupBy { .. } => "groupby",
            Transformation::Filter(_) => "filter",
            Transformation::Select(_) => "select",
            Transformation::OrderBy(_) => "orderby",
            Transformation::Top(_) => "top",
            Transformation::Skip(_) => "skip",
            Transformation::Concat(_) => "concat",
            Transformation::Identity => "identity",
        }
    }
}

/// A parsed clause: transformations applied left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyClause {
    pub transformations: Vec<Transformation>,
}

impl ApplyClause {
    pub fn new(transformations: Vec<Transformation>) -> Self {
        Self { transformations }
    }

    /// Every transformation, including those nested in `concat` branches.
    pub fn walk(&self) -> Vec<&Transformation> {
        fn visit<'a>(ts: &'a [Transformation], out: &mut Vec<&'a Transformation>) {
            for t in ts {
                out.push(t);
                if let Transformation::Concat(branches) = t {
                    for b in branches {
                        visit(b, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        visit(&self.transformations, &mut out);
        out
    }
}
