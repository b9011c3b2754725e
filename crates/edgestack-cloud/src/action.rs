//! Planned changes to a deployed stack

use crate::provider::ResourceConfig;
use crate::template::Output;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A planned change to one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Logical id of the resource
    pub id: String,

    pub action_type: ActionType,

    /// CloudFormation type (e.g. "AWS::S3::Bucket")
    pub resource_type: String,

    pub description: String,

    /// Desired resource for create/update, absent for delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<ResourceConfig>,
}

impl Action {
    pub fn create(config: ResourceConfig) -> Self {
        Self {
            id: config.id.clone(),
            action_type: ActionType::Create,
            resource_type: config.resource_type.clone(),
            description: format!("Create {} {}", config.resource_type, config.id),
            desired: Some(config),
        }
    }

    pub fn update(config: ResourceConfig, reason: &str) -> Self {
        Self {
            id: config.id.clone(),
            action_type: ActionType::Update,
            resource_type: config.resource_type.clone(),
            description: format!("Update {} {} ({})", config.resource_type, config.id, reason),
            desired: Some(config),
        }
    }

    pub fn no_op(config: ResourceConfig) -> Self {
        Self {
            id: config.id.clone(),
            action_type: ActionType::NoOp,
            resource_type: config.resource_type.clone(),
            description: format!("{} {} is up to date", config.resource_type, config.id),
            desired: Some(config),
        }
    }

    pub fn delete(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let id = id.into();
        let resource_type = resource_type.into();
        Self {
            description: format!("Delete {} {}", resource_type, id),
            id,
            action_type: ActionType::Delete,
            resource_type,
            desired: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of applying a plan or destroying a stack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<ActionResult>,

    pub failed: Vec<ActionResult>,

    /// Resources left in place because of a `Retain` deletion policy
    #[serde(default)]
    pub retained: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult {
            action_id,
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, action_id: String, error: String) {
        self.failed.push(ActionResult {
            action_id,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }

    pub fn add_retained(&mut self, action_id: String) {
        self.retained.push(action_id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,

    pub success: bool,

    pub message: String,

    pub error: Option<String>,
}

/// Actions for one stack, in logical id order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub stack_name: String,

    pub actions: Vec<Action>,

    /// Output expressions to evaluate once the resources exist
    #[serde(default)]
    pub outputs: BTreeMap<String, Output>,

    /// Values for template parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    pub has_changes: bool,
}

impl Plan {
    pub fn new(stack_name: impl Into<String>, actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            stack_name: stack_name.into(),
            actions,
            outputs: BTreeMap::new(),
            parameters: BTreeMap::new(),
            has_changes,
        }
    }

    pub fn empty(stack_name: impl Into<String>) -> Self {
        Self::new(stack_name, Vec::new())
    }

    pub fn with_outputs(mut self, outputs: BTreeMap<String, Output>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

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
