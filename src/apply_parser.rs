//! The clause grammar.
//!
//! ```text
//! clause    := sequence
//! sequence  := transform ('/' transform)*
//! transform := aggregate(agg, ...) | groupby((path, ...)[, aggregate(...)])
//!            | filter(expr) | select(path, ...) | orderby(path [asc|desc], ...)
//!            | top(n) | skip(n) | concat(sequence, sequence, ...) | identity
//! agg       := path with method as alias | $count as alias
//! ```

use crate::clause::{
    AggregateExpr, ApplyClause, OrderByItem, PropertyPath, SortDirection, Transformation,
};
use crate::context::QueryContext;
use crate::errors::{ApplyError, Result};
use crate::filter::parse_filter_or;
use crate::model::{Model, StructuredType};
use crate::parser::Parser;
use std::sync::Arc;
use tracing::debug;

/// Turns raw clause text into a typed clause.
pub trait ClauseParser: Send + Sync {
    fn parse_apply_clause(&self, text: &str) -> Result<ApplyClause>;
}

/// Checks property paths against a structured type of the model.
#[derive(Debug, Clone)]
pub struct Binding {
    model: Arc<Model>,
    type_name: String,
}

impl Binding {
    pub fn new(model: Arc<Model>, type_name: &str) -> Self {
        Self {
            model,
            type_name: type_name.to_string(),
        }
    }

    fn root(&self) -> Option<&StructuredType> {
        self.model.find_type(&self.type_name)
    }

    pub fn check_path(&self, path: &PropertyPath, position: usize) -> Result<()> {
        let mut current = self.root();
        for segment in path.segments() {
            let ty = current.ok_or_else(|| {
                ApplyError::syntax(position, format!("'{path}' navigates through a primitive property"))
            })?;
            let property = self.model.find_property(ty, segment).ok_or_else(|| {
                ApplyError::syntax(
                    position,
                    format!("property '{segment}' not found on type '{}'", ty.name),
                )
            })?;
            current = self.model.property_type(property);
        }
        Ok(())
    }
}

/// Built-in `$apply` grammar, optionally bound to a model type.
#[derive(Debug, Clone, Default)]
pub struct ApplyParser {
    binding: Option<Binding>,
}

impl ApplyParser {
    /// Untyped: property paths are not checked.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(model: Arc<Model>, type_name: &str) -> Self {
        Self {
            binding: Some(Binding::new(model, type_name)),
        }
    }

    /// Binds to the element type addressed by the context's path, when it
    /// has one.
    pub fn for_context(context: &QueryContext) -> Self {
        let (Some(path), target) = (context.path(), context.path_context()) else {
            return Self::new();
        };
        let model = &path.model;
        let element = match &target.property {
            Some(property) => model.property_type(property),
            None => target.structured_type.as_ref(),
        };
        match element {
            Some(ty) => Self::for_type(model.clone(), &ty.name),
            None => Self::new(),
        }
    }
}

impl ClauseParser for ApplyParser {
    fn parse_apply_clause(&self, text: &str) -> Result<ApplyClause> {
        let mut grammar = Grammar {
            parser: Parser::new(text),
            binding: self.binding.clone(),
        };
        let transformations = grammar.parse_sequence()?;
        grammar.parser.skip_ws();
        if !grammar.parser.eof() {
            return Err(grammar.parser.error("trailing input"));
        }
        debug!(steps = transformations.len(), "parsed apply clause");
        Ok(ApplyClause::new(transformations))
    }
}

struct Grammar<'a> {
    parser: Parser<'a>,
    /// Dropped once a transformation reshapes the rows.
    binding: Option<Binding>,
}

impl<'a> Grammar<'a> {
    fn parse_sequence(&mut self) -> Result<Vec<Transformation>> {
        let mut out = vec![self.parse_transformation()?];
        loop {
            self.parser.skip_ws();
            if !self.parser.consume_char('/') {
                break;
            }
            out.push(self.parse_transformation()?);
        }
        Ok(out)
    }

    fn parse_transformation(&mut self) -> Result<Transformation> {
        self.parser.skip_ws();
        let start = self.parser.position();
        let name = self.parser.parse_identifier()?;
        if name == "identity" {
            return Ok(Transformation::Identity);
        }
        self.parser.skip_ws();
        self.parser.expect('(')?;
        let t = match name.as_str() {
            "aggregate" => {
                let aggs = self.parse_aggregates()?;
                self.binding = None;
                Transformation::Aggregate(aggs)
            }
            "groupby" => self.parse_groupby()?,
            "filter" => Transformation::Filter(parse_filter_or(&mut self.parser, self.binding.as_ref())?),
            "select" => Transformation::Select(self.parse_list(Self::parse_path)?),
            "orderby" => Transformation::OrderBy(self.parse_list(Self::parse_order_item)?),
            "top" => Transformation::Top(self.parse_count()?),
            "skip" => Transformation::Skip(self.parse_count()?),
            "concat" => self.parse_concat(start)?,
            other => {
                return Err(ApplyError::syntax(start, format!("unknown transformation '{other}'")))
            }
        };
        self.parser.skip_ws();
        self.parser.expect(')')?;
        Ok(t)
    }

    fn parse_list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let mut out = vec![item(self)?];
        loop {
            self.parser.skip_ws();
            if !self.parser.consume_char(',') {
                break;
            }
            out.push(item(self)?);
        }
        Ok(out)
    }

    fn parse_path(&mut self) -> Result<PropertyPath> {
        self.parser.skip_ws();
        let start = self.parser.position();
        let mut segments = vec![self.parser.parse_identifier()?];
        while self.parser.consume_char('/') {
            segments.push(self.parser.parse_identifier()?);
        }
        let path = PropertyPath(segments);
        if let Some(binding) = &self.binding {
            binding.check_path(&path, start)?;
        }
        Ok(path)
    }

    fn parse_order_item(&mut self) -> Result<OrderByItem> {
        let path = self.parse_path()?;
        self.parser.skip_ws();
        let direction = if self.parser.consume_keyword("desc") {
            SortDirection::Descending
        } else {
            self.parser.consume_keyword("asc");
            SortDirection::Ascending
        };
        Ok(OrderByItem { path, direction })
    }

    fn parse_count(&mut self) -> Result<u64> {
        self.parser.skip_ws();
        let start = self.parser.position();
        let n = self.parser.parse_int()?;
        u64::try_from(n).map_err(|_| ApplyError::syntax(start, "expected a non-negative integer"))
    }

    fn parse_aggregates(&mut self) -> Result<Vec<AggregateExpr>> {
        self.parse_list(Self::parse_aggregate)
    }

    fn parse_aggregate(&mut self) -> Result<AggregateExpr> {
        self.parser.skip_ws();
        if self.parser.consume_keyword("$count") {
            let alias = self.parse_alias()?;
            return Ok(AggregateExpr::Count { alias });
        }
        let path = self.parse_path()?;
        self.parser.skip_ws();
        if !self.parser.consume_keyword("with") {
            return Err(self.parser.error("expected 'with'"));
        }
        self.parser.skip_ws();
        let method = self.parser.parse_qualified_identifier()?;
        let alias = self.parse_alias()?;
        Ok(AggregateExpr::Property {
            path,
            method,
            alias,
        })
    }

    fn parse_alias(&mut self) -> Result<String> {
        self.parser.skip_ws();
        if !self.parser.consume_keyword("as") {
            return Err(self.parser.error("expected 'as'"));
        }
        self.parser.skip_ws();
        self.parser.parse_identifier()
    }

    fn parse_groupby(&mut self) -> Result<Transformation> {
        self.parser.skip_ws();
        self.parser.expect('(')?;
        let properties = self.parse_list(Self::parse_path)?;
        self.parser.skip_ws();
        self.parser.expect(')')?;
        self.parser.skip_ws();
        let mut aggregate = None;
        if self.parser.consume_char(',') {
            self.parser.skip_ws();
            if !self.parser.consume_keyword("aggregate") {
                return Err(self.parser.error("expected 'aggregate'"));
            }
            self.parser.skip_ws();
            self.parser.expect('(')?;
            aggregate = Some(self.parse_aggregates()?);
            self.parser.skip_ws();
            self.parser.expect(')')?;
        }
        self.binding = None;
        Ok(Transformation::GroupBy {
            properties,
            aggregate,
        })
    }

    fn parse_concat(&mut self, start: usize) -> Result<Transformation> {
        let outer = self.binding.clone();
        let mut branches = Vec::new();
        let mut reshaped = false;
        loop {
            self.binding = outer.clone();
            branches.push(self.parse_sequence()?);
            reshaped |= self.binding.is_none();
            self.parser.skip_ws();
            if !self.parser.consume_char(',') {
                break;
            }
        }
        if branches.len() < 2 {
            return Err(ApplyError::syntax(start, "concat needs at least two sequences"));
        }
        self.binding = if reshaped { None } else { outer };
        Ok(Transformation::Concat(branches))
    }
}
