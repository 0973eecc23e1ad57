use serde::{Deserialize, Serialize};

/// Host-wide query capabilities, used to validate clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefaultQuerySettings {
    pub enable_filter: bool,
    pub enable_order_by: bool,
    pub enable_count: bool,
    pub max_top: Option<u64>,
}

impl Default for DefaultQuerySettings {
    fn default() -> Self {
        Self {
            enable_filter: true,
            enable_order_by: true,
            enable_count: true,
            max_top: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleNullPropagation {
    /// Chosen by the source; the in-memory source propagates nulls.
    #[default]
    Default,
    True,
    False,
}

/// Settings for one application of a clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuerySettings {
    pub handle_null_propagation: HandleNullPropagation,
}

impl QuerySettings {
    pub fn with_null_propagation(mut self, option: HandleNullPropagation) -> Self {
        self.handle_null_propagation = option;
        self
    }

    /// Whether member access on a null yields null instead of failing.
    pub fn propagates_nulls(&self) -> bool {
        !matches!(self.handle_null_propagation, HandleNullPropagation::False)
    }
}
