//! The `$apply` query option.

use crate::apply_parser::ClauseParser;
use crate::clause::{AggregateExpr, ApplyClause, Transformation};
use crate::context::QueryContext;
use crate::engine::{compile, CompileContext};
use crate::errors::{ApplyError, Result};
use crate::functions::Registry;
use crate::queryable::Queryable;
use crate::resolver::resolve_active;
use crate::settings::QuerySettings;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

/// A raw `$apply` clause bound to its query context.
///
/// The clause is parsed at most once, on first use; a failed parse is not
/// remembered and the next access parses again. Every `apply_to` call looks
/// up the active resolver and compiles the clause afresh.
pub struct DynamicQueryOption {
    raw_value: String,
    context: Arc<QueryContext>,
    parser: Arc<dyn ClauseParser>,
    functions: Registry,
    clause: OnceCell<ApplyClause>,
}

impl std::fmt::Debug for DynamicQueryOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicQueryOption")
            .field("raw_value", &self.raw_value)
            .field("context", &self.context)
            .field("parsed", &self.clause.get().is_some())
            .finish()
    }
}

impl DynamicQueryOption {
    pub fn new(
        raw_value: impl Into<String>,
        context: Arc<QueryContext>,
        parser: Arc<dyn ClauseParser>,
    ) -> Result<Self> {
        let raw_value = raw_value.into();
        if raw_value.is_empty() {
            return Err(ApplyError::invalid_argument("raw_value", "must not be empty"));
        }
        Ok(Self {
            raw_value,
            context,
            parser,
            functions: Registry::with_builtins(),
            clause: OnceCell::new(),
        })
    }

    pub fn builder() -> DynamicQueryOptionBuilder {
        DynamicQueryOptionBuilder::default()
    }

    /// Replaces the aggregation methods available to the clause.
    pub fn with_functions(mut self, functions: Registry) -> Self {
        self.functions = functions;
        self
    }

    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    pub fn context(&self) -> &Arc<QueryContext> {
        &self.context
    }

    /// The parsed clause. Parse errors surface unchanged.
    pub fn clause(&self) -> Result<&ApplyClause> {
        self.clause.get_or_try_init(|| {
            debug!(raw = %self.raw_value, target_name = ?self.context.target_name(), "parsing apply clause");
            self.parser.parse_apply_clause(&self.raw_value)
        })
    }

    /// Checks the clause against the context's default query settings.
    pub fn validate(&self) -> Result<()> {
        let clause = self.clause()?;
        let settings = self.context.default_settings()?;
        for t in clause.walk() {
            match t {
                Transformation::Filter(_) if !settings.enable_filter => {
                    return Err(ApplyError::Validation("filter is not allowed".into()));
                }
                Transformation::OrderBy(_) if !settings.enable_order_by => {
                    return Err(ApplyError::Validation("orderby is not allowed".into()));
                }
                Transformation::Top(n) => {
                    if let Some(max) = settings.max_top.filter(|max| n > max) {
                        return Err(ApplyError::Validation(format!(
                            "top({n}) exceeds the maximum of {max}"
                        )));
                    }
                }
                Transformation::Aggregate(aggs)
                | Transformation::GroupBy {
                    aggregate: Some(aggs),
                    ..
                } if !settings.enable_count
                    && aggs.iter().any(|a| matches!(a, AggregateExpr::Count { .. })) =>
                {
                    return Err(ApplyError::Validation("$count is not allowed".into()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Composes the clause onto `query`. `query` itself is not modified.
    pub fn apply_to(&self, query: &Queryable, settings: &QuerySettings) -> Result<Queryable> {
        let clause = self.clause()?;
        let scope = self.context.service_scope();
        let resolver = resolve_active(scope.as_deref());
        let ops = compile(
            clause,
            &CompileContext {
                resolver,
                settings,
                functions: &self.functions,
            },
        )?;
        Ok(query.compose_all(ops))
    }
}

/// Collects the option's collaborators; `build` reports the first one that
/// is missing.
#[derive(Default)]
pub struct DynamicQueryOptionBuilder {
    raw_value: Option<String>,
    context: Option<Arc<QueryContext>>,
    parser: Option<Arc<dyn ClauseParser>>,
    functions: Option<Registry>,
}

impl DynamicQueryOptionBuilder {
    pub fn raw_value(mut self, raw_value: impl Into<String>) -> Self {
        self.raw_value = Some(raw_value.into());
        self
    }

    pub fn context(mut self, context: Arc<QueryContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn ClauseParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn functions(mut self, functions: Registry) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn build(self) -> Result<DynamicQueryOption> {
        let context = self
            .context
            .ok_or_else(|| ApplyError::invalid_argument("context", "is required"))?;
        let raw_value = match self.raw_value {
            Some(v) if !v.is_empty() => v,
            _ => return Err(ApplyError::invalid_argument("raw_value", "must not be empty")),
        };
        let parser = self
            .parser
            .ok_or_else(|| ApplyError::invalid_argument("parser", "is required"))?;
        let option = DynamicQueryOption::new(raw_value, context, parser)?;
        Ok(match self.functions {
            Some(functions) => option.with_functions(functions),
            None => option,
        })
    }
}
