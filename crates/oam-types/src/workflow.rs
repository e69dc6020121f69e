//! `Workflow`/`WorkflowState`: the ordered/parallel step
//! declarations on an Application, and the per-step execution state machine
//! embedded in `Application.status.workflow`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub name: String,

    #[serde(rename = "type")]
    pub step_type: String,

    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,

    /// A boolean expression (evaluated against prior step outputs); `false`
    /// ⇒ the step is `skipped`.
    #[serde(rename = "if", default)]
    pub if_condition: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub inputs: Vec<StepInput>,

    #[serde(default)]
    pub outputs: Vec<StepOutput>,

    #[serde(default)]
    pub sub_steps: Vec<WorkflowStep>,

    /// Maximum retry attempts on `failed` (default 0).
    #[serde(default)]
    pub retries: u32,

    /// `fail-workflow` (default) or `continue-on-failure`.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    FailWorkflow,
    ContinueOnFailure,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    pub from: String,
    pub parameter_key: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    pub name: String,
    pub value_from: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    #[serde(default)]
    pub phase: WorkflowPhase,

    #[serde(default)]
    pub steps: Vec<StepStatus>,

    /// Step outputs bound by name, consumable by subsequent steps' `inputs`
    /// for data-passing between steps. Later writes win on name collision.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,

    /// Present only while the workflow is suspended.
    #[serde(default)]
    pub suspend: Option<SuspendState>,

    /// The instant the current restart cycle is anchored to: reset to "now"
    /// every time the workflow actually restarts, so a recurring
    /// `app.oam.dev/restart-workflow` schedule computes its next instant
    /// from the most recent restart rather than drifting forward from
    /// wherever it was first observed.
    #[serde(default)]
    pub restart_reference: Option<Time>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowPhase {
    #[default]
    Initializing,
    Executing,
    Suspending,
    Suspended,
    Succeeded,
    Failed,
    Terminated,
}

impl WorkflowPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Terminated)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuspendState {
    #[serde(default)]
    pub message: Option<String>,
    /// Wall-clock instant the suspend should auto-resume, if `duration` was given.
    #[serde(default)]
    pub resume_at: Option<Time>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub phase: StepPhase,

    #[serde(default)]
    pub start_time: Option<Time>,
    #[serde(default)]
    pub end_time: Option<Time>,
    #[serde(default)]
    pub first_execute_time: Option<Time>,
    #[serde(default)]
    pub last_execute_time: Option<Time>,

    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,

    /// Attempts made so far, for the step's `retries` budget.
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StepPhase {
    #[default]
    Pending,
    Running,
    Waiting,
    Suspended,
    Succeeded,
    Failed,
    Skipped,
}

impl StepPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_workflow_phases() {
        assert!(WorkflowPhase::Succeeded.is_terminal());
        assert!(WorkflowPhase::Failed.is_terminal());
        assert!(WorkflowPhase::Terminated.is_terminal());
        assert!(!WorkflowPhase::Executing.is_terminal());
        assert!(!WorkflowPhase::Suspended.is_terminal());
    }

    #[test]
    fn terminal_step_phases() {
        assert!(StepPhase::Succeeded.is_terminal());
        assert!(StepPhase::Skipped.is_terminal());
        assert!(!StepPhase::Waiting.is_terminal());
    }
}
