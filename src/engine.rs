//! Compiles a parsed clause into source-level operators.

use crate::clause::{AggregateExpr, ApplyClause, OrderByItem, PropertyPath, SortDirection, Transformation};
use crate::comparison::{key_fingerprint, sort_order};
use crate::errors::{ApplyError, Result};
use crate::filter::{eval_filter, FilterExpr};
use crate::functions::{AggregateFunction, Registry};
use crate::queryable::{run_stages, Operator};
use crate::resolver::PropertyResolver;
use crate::settings::QuerySettings;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Reads property paths out of rows through the active resolver.
#[derive(Debug, Clone)]
pub struct MemberAccess {
    resolver: Arc<dyn PropertyResolver>,
    propagate_nulls: bool,
}

impl MemberAccess {
    pub fn new(resolver: Arc<dyn PropertyResolver>, propagate_nulls: bool) -> Self {
        Self {
            resolver,
            propagate_nulls,
        }
    }

    /// A missing last member reads as null. Stepping into a null or missing
    /// member fails unless nulls propagate.
    pub fn read(&self, row: &Value, path: &PropertyPath) -> Result<Value> {
        let segments = path.segments();
        let mut current = row;
        for (i, segment) in segments.iter().enumerate() {
            if current.is_null() && !self.propagate_nulls {
                return Err(ApplyError::Evaluation(format!(
                    "cannot read '{segment}' of null while evaluating '{path}'"
                )));
            }
            match self.resolver.resolve_member(current, segment) {
                Some(v) => current = v,
                None if self.propagate_nulls || i + 1 == segments.len() => return Ok(Value::Null),
                None => {
                    return Err(ApplyError::Evaluation(format!(
                        "member '{segment}' not found while evaluating '{path}'"
                    )))
                }
            }
        }
        Ok(current.clone())
    }
}

/// Everything compilation depends on besides the clause.
pub struct CompileContext<'a> {
    pub resolver: Arc<dyn PropertyResolver>,
    pub settings: &'a QuerySettings,
    pub functions: &'a Registry,
}

pub fn compile(clause: &ApplyClause, ctx: &CompileContext) -> Result<Vec<Arc<dyn Operator>>> {
    let access = MemberAccess::new(ctx.resolver.clone(), ctx.settings.propagates_nulls());
    let ops = compile_sequence(&clause.transformations, &access, ctx.functions)?;
    debug!(
        resolver = ctx.resolver.name(),
        operators = ops.len(),
        "compiled apply clause"
    );
    Ok(ops)
}

fn compile_sequence(
    transformations: &[Transformation],
    access: &MemberAccess,
    functions: &Registry,
) -> Result<Vec<Arc<dyn Operator>>> {
    let mut ops: Vec<Arc<dyn Operator>> = Vec::new();
    for t in transformations {
        let op: Arc<dyn Operator> = match t {
            Transformation::Identity => continue,
            Transformation::Filter(expr) => Arc::new(FilterOp {
                expr: expr.clone(),
                access: access.clone(),
            }),
            Transformation::Select(paths) => Arc::new(SelectOp {
                paths: paths.clone(),
                access: access.clone(),
            }),
            Transformation::OrderBy(items) => Arc::new(OrderByOp {
                items: items.clone(),
                access: access.clone(),
            }),
            Transformation::Top(n) => Arc::new(TopOp(*n)),
            Transformation::Skip(n) => Arc::new(SkipOp(*n)),
            Transformation::Aggregate(aggs) => Arc::new(AggregateOp {
                aggregates: compile_aggregates(aggs, functions)?,
                access: access.clone(),
            }),
            Transformation::GroupBy {
                properties,
                aggregate,
            } => Arc::new(GroupByOp {
                properties: properties.clone(),
                aggregates: match aggregate {
                    Some(aggs) => compile_aggregates(aggs, functions)?,
                    None => Vec::new(),
                },
                access: access.clone(),
            }),
            Transformation::Concat(branches) => Arc::new(ConcatOp {
                branches: branches
                    .iter()
                    .map(|b| compile_sequence(b, access, functions))
                    .collect::<Result<_>>()?,
            }),
        };
        ops.push(op);
    }
    Ok(ops)
}

enum CompiledAggregate {
    Property {
        path: PropertyPath,
        function: Arc<dyn AggregateFunction>,
        alias: String,
    },
    Count {
        alias: String,
    },
}

impl fmt::Debug for CompiledAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledAggregate::Property {
                path,
                function,
                alias,
            } => write!(f, "{path} with {} as {alias}", function.name()),
            CompiledAggregate::Count { alias } => write!(f, "$count as {alias}"),
        }
    }
}

fn compile_aggregates(aggs: &[AggregateExpr], functions: &Registry) -> Result<Vec<CompiledAggregate>> {
    aggs.iter()
        .map(|a| match a {
            AggregateExpr::Count { alias } => Ok(CompiledAggregate::Count {
                alias: alias.clone(),
            }),
            AggregateExpr::Property {
                path,
                method,
                alias,
            } => {
                let function = functions
                    .get(method)
                    .ok_or_else(|| ApplyError::UnknownFunction(method.clone()))?;
                Ok(CompiledAggregate::Property {
                    path: path.clone(),
                    function,
                    alias: alias.clone(),
                })
            }
        })
        .collect()
}

fn aggregate_into(
    out: &mut Map<String, Value>,
    aggregates: &[CompiledAggregate],
    rows: &[Value],
    access: &MemberAccess,
) -> Result<()> {
    for agg in aggregates {
        match agg {
            CompiledAggregate::Count { alias } => {
                out.insert(alias.clone(), Value::from(rows.len() as u64));
            }
            CompiledAggregate::Property {
                path,
                function,
                alias,
            } => {
                let values = rows
                    .iter()
                    .map(|r| access.read(r, path))
                    .collect::<Result<Vec<_>>>()?;
                out.insert(alias.clone(), function.call(&values)?);
            }
        }
    }
    Ok(())
}

/// Writes `value` at `path`, creating intermediate objects.
fn set_path(out: &mut Map<String, Value>, path: &PropertyPath, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };
    let mut target = out;
    for p in parents {
        let entry = target
            .entry(p.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        target = next;
    }
    target.insert(last.clone(), value);
}

#[derive(Debug)]
struct FilterOp {
    expr: FilterExpr,
    access: MemberAccess,
}

impl Operator for FilterOp {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if eval_filter(&self.expr, &row, &self.access)? {
                out.push(row);
            }
        }
        Ok(out)
    }
}

#[derive(Debug)]
struct SelectOp {
    paths: Vec<PropertyPath>,
    access: MemberAccess,
}

impl Operator for SelectOp {
    fn name(&self) -> &'static str {
        "select"
    }

    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        rows.iter()
            .map(|row| {
                let mut out = Map::new();
                for path in &self.paths {
                    set_path(&mut out, path, self.access.read(row, path)?);
                }
                Ok(Value::Object(out))
            })
            .collect()
    }
}

#[derive(Debug)]
struct OrderByOp {
    items: Vec<OrderByItem>,
    access: MemberAccess,
}

impl Operator for OrderByOp {
    fn name(&self) -> &'static str {
        "orderby"
    }

    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut keyed = rows
            .into_iter()
            .map(|row| {
                let keys = self
                    .items
                    .iter()
                    .map(|item| self.access.read(&row, &item.path))
                    .collect::<Result<Vec<_>>>()?;
                Ok((keys, row))
            })
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| {
            self.items
                .iter()
                .zip(a.iter().zip(b.iter()))
                .map(|(item, (ka, kb))| match item.direction {
                    SortDirection::Ascending => sort_order(ka, kb),
                    SortDirection::Descending => sort_order(kb, ka),
                })
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

#[derive(Debug)]
struct TopOp(u64);

impl Operator for TopOp {
    fn name(&self) -> &'static str {
        "top"
    }

    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        Ok(rows.into_iter().take(usize::try_from(self.0).unwrap_or(usize::MAX)).collect())
    }
}

#[derive(Debug)]
struct SkipOp(u64);

impl Operator for SkipOp {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        Ok(rows.into_iter().skip(usize::try_from(self.0).unwrap_or(usize::MAX)).collect())
    }
}

#[derive(Debug)]
struct AggregateOp {
    aggregates: Vec<CompiledAggregate>,
    access: MemberAccess,
}

impl Operator for AggregateOp {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut out = Map::new();
        aggregate_into(&mut out, &self.aggregates, &rows, &self.access)?;
        Ok(vec![Value::Object(out)])
    }
}

#[derive(Debug)]
struct GroupByOp {
    properties: Vec<PropertyPath>,
    aggregates: Vec<CompiledAggregate>,
    access: MemberAccess,
}

impl Operator for GroupByOp {
    fn name(&self) -> &'static str {
        "groupby"
    }

    /// Groups come out in order of first appearance.
    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();
        for row in rows {
            let keys = self
                .properties
                .iter()
                .map(|p| self.access.read(&row, p))
                .collect::<Result<Vec<_>>>()?;
            let fingerprint = keys.iter().map(key_fingerprint).collect::<Vec<_>>().join("\u{1f}");
            match index.get(&fingerprint) {
                Some(&i) => groups[i].1.push(row),
                None => {
                    index.insert(fingerprint, groups.len());
                    groups.push((keys, vec![row]));
                }
            }
        }

        groups
            .into_iter()
            .map(|(keys, members)| {
                let mut out = Map::new();
                for (path, key) in self.properties.iter().zip(keys) {
                    set_path(&mut out, path, key);
                }
                aggregate_into(&mut out, &self.aggregates, &members, &self.access)?;
                Ok(Value::Object(out))
            })
            .collect()
    }
}

#[derive(Debug)]
struct ConcatOp {
    branches: Vec<Vec<Arc<dyn Operator>>>,
}

impl Operator for ConcatOp {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for branch in &self.branches {
            out.extend(run_stages(rows.clone(), branch)?);
        }
        Ok(out)
    }
}
