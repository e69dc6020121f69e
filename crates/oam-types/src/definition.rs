//! The three Definition kinds: `ComponentDefinition`,
//! `TraitDefinition`, `WorkflowStepDefinition`. All three share a
//! `schematic.template` (the template-expression source) and an
//! optional `status` block (`healthPolicy`/`customStatus`/`details`),
//! and carry an immutable `version`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The template source plus whatever little metadata the evaluator needs.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schematic {
    pub template: String,
}

/// Health/status expression blocks, stored in the round-trip-preserving
/// string form: authored
/// as a native record, normalized to string on write, parsed back to a
/// record on read, except when the source carries package/import
/// directives, in which case the string form is preserved verbatim.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionStatus {
    /// Must define a boolean-valued `isHealth` when rendered.
    #[serde(default)]
    pub health_policy: Option<String>,
    /// Must define a string-valued `message` when rendered.
    #[serde(default)]
    pub custom_status: Option<String>,
    /// Primitive-valued fields, plus local-prefixed helper fields.
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "ComponentDefinition",
    plural = "componentdefinitions",
    namespaced,
    crates(kube_core = "kube::core", k8s_openapi = "k8s_openapi", schemars = "schemars")
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinitionSpec {
    /// Semantic version string; immutable once set for this `(name, version)`.
    pub version: String,

    /// `apiVersion`+`kind` of the workload this component renders, or a
    /// reference to a previously registered workload-type definition.
    pub workload: WorkloadTypeDescriptor,

    pub schematic: Schematic,

    #[serde(default)]
    pub status: Option<DefinitionStatus>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadTypeDescriptor {
    #[serde(default)]
    pub definition: Option<WorkloadGroupVersionKind>,
    #[serde(default)]
    pub r#type: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadGroupVersionKind {
    pub api_version: String,
    pub kind: String,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "TraitDefinition",
    plural = "traitdefinitions",
    namespaced,
    crates(kube_core = "kube::core", k8s_openapi = "k8s_openapi", schemars = "schemars")
)]
#[serde(rename_all = "camelCase")]
pub struct TraitDefinitionSpec {
    pub version: String,

    /// Workload kinds this trait may attach to; the wildcard token `"*"`
    /// means "any".
    #[serde(default)]
    pub applies_to_workloads: Vec<String>,

    /// Trait-definition names this trait may not be combined with on the
    /// same component.
    #[serde(default)]
    pub conflicts_with: Vec<String>,

    /// Whether applying this trait requires disrupting running pods.
    #[serde(default)]
    pub pod_disruptive: bool,

    pub schematic: Schematic,

    #[serde(default)]
    pub status: Option<DefinitionStatus>,
}

impl TraitDefinitionSpec {
    pub const ANY_WORKLOAD: &'static str = "*";

    pub fn applies_to(&self, workload_kind: &str) -> bool {
        self.applies_to_workloads.is_empty()
            || self
                .applies_to_workloads
                .iter()
                .any(|w| w == Self::ANY_WORKLOAD || w == workload_kind)
    }
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "WorkflowStepDefinition",
    plural = "workflowstepdefinitions",
    namespaced,
    crates(kube_core = "kube::core", k8s_openapi = "k8s_openapi", schemars = "schemars")
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepDefinitionSpec {
    pub version: String,
    pub schematic: Schematic,
    #[serde(default)]
    pub status: Option<DefinitionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_applies_to_any_workload() {
        let spec = TraitDefinitionSpec {
            version: "1.0.0".into(),
            applies_to_workloads: vec!["*".into()],
            conflicts_with: vec![],
            pod_disruptive: false,
            schematic: Schematic::default(),
            status: None,
        };
        assert!(spec.applies_to("webservice"));
        assert!(spec.applies_to("worker"));
    }

    #[test]
    fn specific_workload_list_is_exclusive() {
        let spec = TraitDefinitionSpec {
            version: "1.0.0".into(),
            applies_to_workloads: vec!["webservice".into()],
            conflicts_with: vec![],
            pod_disruptive: false,
            schematic: Schematic::default(),
            status: None,
        };
        assert!(spec.applies_to("webservice"));
        assert!(!spec.applies_to("worker"));
    }
}
