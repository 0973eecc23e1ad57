//! Composition of `$apply` clauses onto lazily evaluated row sources.
//!
//! A [`QueryContext`] describes what is being queried, a
//! [`DynamicQueryOption`] owns the raw clause text and parses it on demand,
//! and [`DynamicQueryOption::apply_to`] compiles the clause into operators
//! composed onto a [`Queryable`].

pub mod errors;
pub mod model;
pub mod path_context;
pub mod services;
pub mod resolver;
pub mod settings;
pub mod context;
pub mod clause;
pub mod apply_parser;
pub mod filter;
pub mod functions;
pub mod queryable;
pub mod engine;
pub mod option;
mod parser;
mod comparison;

use serde_json::Value;
use std::sync::Arc;

pub use apply_parser::{ApplyParser, ClauseParser};
pub use clause::ApplyClause;
pub use context::QueryContext;
pub use errors::{ApplyError, Result};
pub use model::{Model, Path, PathSegment};
pub use option::DynamicQueryOption;
pub use queryable::Queryable;
pub use resolver::{CaseInsensitivePropertyResolver, ExactPropertyResolver, PropertyResolver};
pub use services::ServiceScope;
pub use settings::{DefaultQuerySettings, HandleNullPropagation, QuerySettings};

/// Convenience: apply `clause` to `rows` with no path, no service scope and
/// default settings.
pub fn apply(clause: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
    let context = Arc::new(QueryContext::standalone());
    let option = DynamicQueryOption::new(clause, context, Arc::new(ApplyParser::new()))?;
    option
        .apply_to(&Queryable::from_rows(rows), &QuerySettings::default())?
        .execute()
}
