//! The wire-shaped data model: `Application`, the three Definition
//! kinds, `ApplicationRevision`, `ResourceTracker`, and `WorkflowState`.
//!
//! Every CRD-shaped type here follows the same authoring convention
//! (`kube::CustomResource` + `schemars::JsonSchema` +
//! `serde::{Serialize, Deserialize}`, `camelCase` wire fields).

pub mod application;
pub mod definition;
pub mod placement;
pub mod revision;
pub mod tracker;
pub mod workflow;

pub use application::{
    Application, ApplicationCondition, ApplicationPhase, ApplicationSpec, ApplicationStatus,
    Component, ComponentTrait, Policy, ServiceStatus, TraitStatus, Workflow,
};
pub use definition::{
    ComponentDefinition, ComponentDefinitionSpec, DefinitionStatus, Schematic,
    TraitDefinition, TraitDefinitionSpec, WorkflowStepDefinition, WorkflowStepDefinitionSpec,
    WorkloadGroupVersionKind, WorkloadTypeDescriptor,
};
pub use placement::PlacementDecision;
pub use revision::{ApplicationRevision, ApplicationRevisionSpec};
pub use tracker::{ResourceOwner, ResourceTracker, ResourceTrackerSpec, TrackedResource};
pub use workflow::{
    FailurePolicy, StepInput, StepOutput, StepPhase, StepStatus, SuspendState, WorkflowPhase,
    WorkflowState, WorkflowStep,
};
