// action.rs — The proposed operation an agent submits for checking.
//
// An Action is immutable once submitted: the engine only ever borrows it.
// A retry after BLOCK must be a new Action (new id), which is why there are
// builder methods but no setters.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A proposed side-effecting operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    /// Unique identifier for this submission.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// What the agent wants to do (e.g., "delete_file", "report_cost").
    pub kind: String,

    /// Structured attributes the enforcers evaluate.
    ///
    /// Anything an enforcer would otherwise have to look up externally
    /// (cheapest alternative cost, key references) is resolved by the caller
    /// into a parameter here.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Cost the agent expects to incur.
    #[serde(default)]
    pub declared_cost: f64,

    /// Risk tags the agent declares (e.g., "irreversible", "credential").
    #[serde(default)]
    pub declared_risk_tags: BTreeSet<String>,

    /// The task this action belongs to.
    pub task_id: String,

    /// When the action was proposed.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Action {
    /// Create an action with no parameters, zero cost and no risk tags.
    pub fn new(task_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            parameters: BTreeMap::new(),
            declared_cost: 0.0,
            declared_risk_tags: BTreeSet::new(),
            task_id: task_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.declared_cost = cost;
        self
    }

    pub fn with_risk_tag(mut self, tag: impl Into<String>) -> Self {
        self.declared_risk_tags.insert(tag.into());
        self
    }

    pub fn has_risk_tag(&self, tag: &str) -> bool {
        self.declared_risk_tags.contains(tag)
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }

    /// Look up a boolean parameter.
    ///
    /// `Ok(None)` means absent; `Err` means present with the wrong type,
    /// which enforcers report as a config error.
    pub fn param_bool(&self, key: &str) -> Result<Option<bool>, ParamError> {
        match self.parameters.get(key) {
            None => Ok(None),
            Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(ParamError::new(key, "a boolean")),
        }
    }

    /// Look up a numeric parameter (same absent/malformed split as `param_bool`).
    pub fn param_f64(&self, key: &str) -> Result<Option<f64>, ParamError> {
        match self.parameters.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| ParamError::new(key, "a number")),
        }
    }

    /// Look up a string parameter (same absent/malformed split as `param_bool`).
    pub fn param_str(&self, key: &str) -> Result<Option<&str>, ParamError> {
        match self.parameters.get(key) {
            None => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ParamError::new(key, "a string")),
        }
    }
}

/// A parameter was present but had the wrong JSON type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamError {
    pub key: String,
    pub expected: &'static str,
}

impl ParamError {
    fn new(key: &str, expected: &'static str) -> Self {
        Self {
            key: key.to_string(),
            expected,
        }
    }
}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parameter '{}' must be {}", self.key, self.expected)
    }
}

/// What actually happened when an allowed action was executed.
///
/// Passed to `after_action` so post-condition enforcers can compare the
/// outcome against what the action declared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    /// Whether the operation completed.
    #[serde(default)]
    pub succeeded: bool,

    /// Cost actually incurred, if the executor measured it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,

    /// Number of side effects produced (files written, messages sent, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<u64>,

    /// Free-form executor output, kept for the caller; enforcers ignore it.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ActionResult {
    /// A successful execution with no measurements attached.
    pub fn success() -> Self {
        Self {
            succeeded: true,
            ..Self::default()
        }
    }

    /// A failed execution.
    pub fn failure() -> Self {
        Self::default()
    }

    pub fn with_actual_cost(mut self, cost: f64) -> Self {
        self.actual_cost = Some(cost);
        self
    }

    pub fn with_side_effects(mut self, count: u64) -> Self {
        self.side_effects = Some(count);
        self
    }
}
