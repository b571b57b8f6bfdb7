//! Action types for cloud resource reconciliation

use serde::{Deserialize, Serialize};

/// A resolved request for one declared entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action<R> {
    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource kind (e.g., "vpc", "slb-listener", "dns-record")
    pub resource_type: String,

    /// Declared name of the entry
    pub name: String,

    /// Provider-shaped payload
    pub request: R,
}

impl<R> Action<R> {
    pub fn create(resource_type: impl Into<String>, name: impl Into<String>, request: R) -> Self {
        Self {
            action_type: ActionType::Create,
            resource_type: resource_type.into(),
            name: name.into(),
            request,
        }
    }

    pub fn update(resource_type: impl Into<String>, name: impl Into<String>, request: R) -> Self {
        Self {
            action_type: ActionType::Update,
            resource_type: resource_type.into(),
            name: name.into(),
            request,
        }
    }

    pub fn delete(resource_type: impl Into<String>, name: impl Into<String>, request: R) -> Self {
        Self {
            action_type: ActionType::Delete,
            resource_type: resource_type.into(),
            name: name.into(),
            request,
        }
    }

    /// Identifier used in logs and apply results (`vpc:main`)
    pub fn id(&self) -> String {
        format!("{}:{}", self.resource_type, self.name)
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
        }
    }
}

/// Result of applying a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Actions whose provider error was benign
    pub skipped: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult {
            action_id,
            message,
        });
    }

    pub fn add_skipped(&mut self, action_id: String, message: String) {
        self.skipped.push(ActionResult {
            action_id,
            message,
        });
    }

    /// Messages of successful actions in execution order
    pub fn messages(&self) -> Vec<&str> {
        self.succeeded.iter().map(|r| r.message.as_str()).collect()
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// ID of the action
    pub action_id: String,

    /// Provider id or outcome message
    pub message: String,
}

/// Ordered actions for one resource kind, plus the declared entries left alone
#[derive(Debug, Clone)]
pub struct Plan<R> {
    pub actions: Vec<Action<R>>,

    /// Declared names that already exist remotely
    pub unchanged: Vec<String>,
}

impl<R> Plan<R> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            unchanged: Vec::new(),
        }
    }

    pub fn push(&mut self, action: Action<R>) {
        self.actions.push(action);
    }

    pub fn keep(&mut self, name: impl Into<String>) {
        self.unchanged.push(name.into());
    }

    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action<R>> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.unchanged.len(),
        }
    }
}

impl<R> Default for Plan<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FromIterator<Action<R>> for Plan<R> {
    fn from_iter<I: IntoIterator<Item = Action<R>>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
            unchanged: Vec::new(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}
