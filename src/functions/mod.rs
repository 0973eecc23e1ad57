use crate::errors::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for pluggable aggregation methods (`Amount with sum as Total`).
pub trait AggregateFunction: Send + Sync {
    fn name(&self) -> &'static str;
    /// Receives the member values of every row in the group, nulls included.
    fn call(&self, values: &[Value]) -> Result<Value>;
}

/// Thread-safe aggregation method registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn AggregateFunction>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.inner.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("functions", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn with_builtins() -> Self {
        let mut map: HashMap<&'static str, Arc<dyn AggregateFunction>> = HashMap::new();
        map.insert("sum", Arc::new(builtins::Sum));
        map.insert("min", Arc::new(builtins::Min));
        map.insert("max", Arc::new(builtins::Max));
        map.insert("average", Arc::new(builtins::Average));
        map.insert("countdistinct", Arc::new(builtins::CountDistinct));
        Self { inner: Arc::new(map) }
    }

    pub fn register<F: AggregateFunction + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AggregateFunction>> {
        self.inner.get(name).cloned()
    }
}

pub mod builtins {
    use super::*;
    use crate::comparison::{key_fingerprint, sort_order};
    use itertools::Itertools;
    use std::cmp::Ordering;

    fn non_null(values: &[Value]) -> impl Iterator<Item = &Value> {
        values.iter().filter(|v| !v.is_null())
    }

    fn number(v: &Value) -> Result<f64> {
        v.as_f64().ok_or_else(|| {
            crate::errors::ApplyError::Evaluation(format!("cannot aggregate non-numeric value {v}"))
        })
    }

    /// Keeps integer sums integral.
    fn number_value(f: f64, integral: bool) -> Value {
        if integral && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            Value::from(f as i64)
        } else {
            Value::from(f)
        }
    }

    fn extreme(values: &[Value], wanted: Ordering) -> Value {
        non_null(values)
            .fold(None::<&Value>, |best, v| match best {
                Some(b) if sort_order(v, b) != wanted => Some(b),
                _ => Some(v),
            })
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub struct Sum;
    impl AggregateFunction for Sum {
        fn name(&self) -> &'static str { "sum" }
        fn call(&self, values: &[Value]) -> Result<Value> {
            let integral = non_null(values).all(|v| v.is_i64() || v.is_u64());
            let total = non_null(values).map(number).sum::<Result<f64>>()?;
            Ok(number_value(total, integral))
        }
    }

    pub struct Min;
    impl AggregateFunction for Min {
        fn name(&self) -> &'static str { "min" }
        fn call(&self, values: &[Value]) -> Result<Value> {
            Ok(extreme(values, Ordering::Less))
        }
    }

    pub struct Max;
    impl AggregateFunction for Max {
        fn name(&self) -> &'static str { "max" }
        fn call(&self, values: &[Value]) -> Result<Value> {
            Ok(extreme(values, Ordering::Greater))
        }
    }

    pub struct Average;
    impl AggregateFunction for Average {
        fn name(&self) -> &'static str { "average" }
        fn call(&self, values: &[Value]) -> Result<Value> {
            let nums = non_null(values).map(number).collect::<Result<Vec<_>>>()?;
            if nums.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::from(nums.iter().sum::<f64>() / nums.len() as f64))
        }
    }

    pub struct CountDistinct;
    impl AggregateFunction for CountDistinct {
        fn name(&self) -> &'static str { "countdistinct" }
        fn call(&self, values: &[Value]) -> Result<Value> {
            let n = non_null(values)
                .unique_by(|v| key_fingerprint(v))
                .count();
            Ok(Value::from(n as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, values: Value) -> Value {
        let registry = Registry::with_builtins();
        let values = values.as_array().cloned().unwrap_or_default();
        registry.get(name).unwrap().call(&values).unwrap()
    }

    #[test]
    fn builtins_ignore_nulls() {
        assert_eq!(call("sum", json!([1, null, 2])), json!(3));
        assert_eq!(call("sum", json!([1.5, 2])), json!(3.5));
        assert_eq!(call("min", json!([3, null, 1])), json!(1));
        assert_eq!(call("max", json!(["b", "c", "a"])), json!("c"));
        assert_eq!(call("average", json!([1, 2, null])), json!(1.5));
        assert_eq!(call("countdistinct", json!(["a", "b", "a", null])), json!(2));
    }

    #[test]
    fn countdistinct_treats_equal_numbers_as_one() {
        assert_eq!(call("countdistinct", json!([1, 1.0, 2, 2.5])), json!(3));
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(call("sum", json!([])), json!(0));
        assert_eq!(call("min", json!([])), json!(null));
        assert_eq!(call("average", json!([null])), json!(null));
    }

    #[test]
    fn sum_rejects_text() {
        let registry = Registry::with_builtins();
        assert!(registry.get("sum").unwrap().call(&[json!("x")]).is_err());
    }

    struct First;
    impl AggregateFunction for First {
        fn name(&self) -> &'static str { "first" }
        fn call(&self, values: &[Value]) -> Result<Value> {
            Ok(values.first().cloned().unwrap_or(Value::Null))
        }
    }

    #[test]
    fn custom_functions_can_be_registered() {
        let mut registry = Registry::with_builtins();
        assert!(registry.get("first").is_none());
        registry.register(First);
        assert_eq!(registry.get("first").unwrap().call(&[json!(9)]).unwrap(), json!(9));
    }
}
