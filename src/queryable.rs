//! Lazily evaluated row source.
//!
//! Composing an operator only records it; rows are produced by `execute`.

use crate::errors::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A source-level transformation: rows in, rows out.
pub trait Operator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn apply(&self, rows: Vec<Value>) -> Result<Vec<Value>>;
}

#[derive(Clone)]
pub struct Queryable {
    rows: Arc<[Value]>,
    stages: Vec<Arc<dyn Operator>>,
}

impl fmt::Debug for Queryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("rows", &self.rows.len())
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Queryable {
    pub fn from_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: rows.into(),
            stages: Vec::new(),
        }
    }

    /// Returns a new queryable with `op` appended; `self` is left as is.
    pub fn compose(&self, op: Arc<dyn Operator>) -> Queryable {
        let mut stages = self.stages.clone();
        stages.push(op);
        Queryable {
            rows: Arc::clone(&self.rows),
            stages,
        }
    }

    pub fn compose_all(&self, ops: impl IntoIterator<Item = Arc<dyn Operator>>) -> Queryable {
        ops.into_iter().fold(self.clone(), |q, op| q.compose(op))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn stages(&self) -> &[Arc<dyn Operator>] {
        &self.stages
    }

    pub fn source_len(&self) -> usize {
        self.rows.len()
    }

    pub fn execute(&self) -> Result<Vec<Value>> {
        run_stages(self.rows.to_vec(), &self.stages)
    }
}

pub(crate) fn run_stages(mut rows: Vec<Value>, stages: &[Arc<dyn Operator>]) -> Result<Vec<Value>> {
    for stage in stages {
        let before = rows.len();
        rows = stage.apply(rows)?;
        trace!(stage = stage.name(), before, after = rows.len(), "stage applied");
    }
    Ok(rows)
}
