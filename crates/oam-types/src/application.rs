//! The `Application` custom resource: the user-facing document
//! this whole system renders and dispatches.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowState;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "Application",
    plural = "applications",
    namespaced,
    status = "ApplicationStatus",
    crates(kube_core = "kube::core", k8s_openapi = "k8s_openapi", schemars = "schemars")
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub components: Vec<Component>,

    #[serde(default)]
    pub policies: Vec<Policy>,

    #[serde(default)]
    pub workflow: Option<Workflow>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,

    #[serde(rename = "type")]
    pub component_type: String,

    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub traits: Vec<ComponentTrait>,

    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTrait {
    #[serde(rename = "type")]
    pub trait_type: String,

    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,

    #[serde(rename = "type")]
    pub policy_type: String,

    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default)]
    pub steps: Vec<crate::workflow::WorkflowStep>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub status: ApplicationPhase,

    #[serde(default)]
    pub conditions: Vec<ApplicationCondition>,

    #[serde(default)]
    pub services: Vec<ServiceStatus>,

    #[serde(default)]
    pub workflow: Option<WorkflowState>,

    /// Name of the most recently recorded `ApplicationRevision`.
    #[serde(default)]
    pub latest_revision: Option<String>,

    /// Content hash of `latest_revision`, so the next reconcile can tell
    /// whether the current spec still matches it without re-fetching the
    /// revision object.
    #[serde(default)]
    pub latest_revision_hash: Option<String>,

    /// The `app.oam.dev/publish-version` annotation value this Application
    /// was last reconciled against, so a changed value can be detected even
    /// when it doesn't itself change `application_spec`'s content hash.
    #[serde(default)]
    pub observed_publish_version: Option<String>,

    /// The raw `app.oam.dev/restart-workflow` annotation value whose
    /// one-shot (`at`/bare-duration-with-`!`) form has already fired, so it
    /// is not re-applied on every subsequent reconcile once its instant has
    /// passed.
    #[serde(default)]
    pub applied_restart_schedule: Option<String>,
}

/// Application `status.status` rollup.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ApplicationPhase {
    #[default]
    Initializing,
    Rendering,
    Running,
    Unhealthy,
    WorkflowSuspending,
    WorkflowTerminated,
    WorkflowFailed,
}

/// One of the well-known status conditions: `Parsed`,
/// `ReferenceResolved`, `Rendered`, `PolicyApplied`, `WorkflowFinished`,
/// `Ready`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: bool,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: Time,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub healthy: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub traits: Vec<TraitStatus>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraitStatus {
    #[serde(rename = "type")]
    pub trait_type: String,
    pub healthy: bool,
    #[serde(default)]
    pub message: String,
}
