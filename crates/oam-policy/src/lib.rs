//! The Policy Engine: topology, override, env-binding,
//! shared-resource, and health-scope-binding policy families, plus the
//! evaluation order that turns an Application's `policies[]` plus its
//! resolved components into placement decisions and effective properties.

pub mod env_binding;
pub mod error;
pub mod health_scope;
pub mod override_policy;
pub mod selector;
pub mod shared;
pub mod topology;

pub use env_binding::{EnvBindingPolicy, EnvConfig};
pub use error::{Error, Result};
pub use health_scope::{HealthScope, HealthScopeBindingPolicy};
pub use override_policy::{ComponentOverride, OverridePolicy};
pub use selector::ComponentSelector;
pub use shared::SharedResourcePolicy;
pub use topology::{ClusterDirectory, EmptyClusterDirectory, TopologyPolicy};

use oam_types::{Component, PlacementDecision, Policy};

/// The well-known policy type names the core recognizes and specially
/// orchestrates. Any other `policy.type` is kept opaque and
/// passed through untouched for a workflow step to consume directly.
const TOPOLOGY: &str = "topology";
const OVERRIDE: &str = "override";
const ENV_BINDING: &str = "env-binding";
const SHARED_RESOURCE: &str = "shared-resource";
const HEALTH_SCOPE_BINDING: &str = "health-scope-binding";

/// Every policy of a recognized family, parsed out of an Application's
/// `policies[]`. Unknown policy types are not represented here at all —
/// callers that need one look it up directly from the raw `Policy` list.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    pub topology: Vec<(String, TopologyPolicy)>,
    pub overrides: Vec<(String, OverridePolicy)>,
    pub env_bindings: Vec<(String, EnvBindingPolicy)>,
    pub shared_resources: Vec<(String, SharedResourcePolicy)>,
    pub health_scopes: Vec<(String, HealthScopeBindingPolicy)>,
}

impl PolicySet {
    /// Parses the recognized families out of `policies`, in declaration
    /// order (evaluation order step 1: "Parse all policies; unknown types
    /// are kept as opaque").
    pub fn parse(policies: &[Policy]) -> Result<Self> {
        let mut set = Self::default();
        for policy in policies {
            let properties = serde_json::Value::Object(policy.properties.clone());
            match policy.policy_type.as_str() {
                TOPOLOGY => {
                    let parsed: TopologyPolicy = serde_json::from_value(properties).map_err(|source| {
                        error::Error::MalformedPolicy {
                            name: policy.name.clone(),
                            policy_type: policy.policy_type.clone(),
                            source,
                        }
                    })?;
                    set.topology.push((policy.name.clone(), parsed));
                }
                OVERRIDE => {
                    let parsed: OverridePolicy = serde_json::from_value(properties).map_err(|source| {
                        error::Error::MalformedPolicy {
                            name: policy.name.clone(),
                            policy_type: policy.policy_type.clone(),
                            source,
                        }
                    })?;
                    set.overrides.push((policy.name.clone(), parsed));
                }
                ENV_BINDING => {
                    let parsed: EnvBindingPolicy = serde_json::from_value(properties).map_err(|source| {
                        error::Error::MalformedPolicy {
                            name: policy.name.clone(),
                            policy_type: policy.policy_type.clone(),
                            source,
                        }
                    })?;
                    set.env_bindings.push((policy.name.clone(), parsed));
                }
                SHARED_RESOURCE => {
                    let parsed: SharedResourcePolicy = serde_json::from_value(properties).map_err(|source| {
                        error::Error::MalformedPolicy {
                            name: policy.name.clone(),
                            policy_type: policy.policy_type.clone(),
                            source,
                        }
                    })?;
                    set.shared_resources.push((policy.name.clone(), parsed));
                }
                HEALTH_SCOPE_BINDING => {
                    let parsed: HealthScopeBindingPolicy = serde_json::from_value(properties).map_err(|source| {
                        error::Error::MalformedPolicy {
                            name: policy.name.clone(),
                            policy_type: policy.policy_type.clone(),
                            source,
                        }
                    })?;
                    set.health_scopes.push((policy.name.clone(), parsed));
                }
                _ => {
                    // Opaque: a workflow step (e.g. a custom step type) may
                    // still consume this policy directly from `ApplicationSpec`.
                }
            }
        }
        Ok(set)
    }

    /// Evaluation order step 2: placement decisions from every `topology`
    /// policy. `env-binding` placements are intentionally not folded in
    /// here — they are only realized when a `deploy`/`deploy2env` workflow
    /// step explicitly names an env.
    pub fn placements(&self, default_namespace: &str, directory: &dyn ClusterDirectory) -> Vec<PlacementDecision> {
        if self.topology.is_empty() {
            return vec![PlacementDecision::control_plane(default_namespace)];
        }
        let mut placements: Vec<PlacementDecision> = self
            .topology
            .iter()
            .flat_map(|(_, policy)| policy.placements(default_namespace, directory))
            .collect();
        placements.sort();
        placements.dedup();
        placements
    }

    /// Evaluation order step 3: effective component properties after every
    /// `override` policy has applied its patch, in declaration order.
    pub fn effective_components(&self, components: &[Component]) -> Result<Vec<Component>> {
        let mut effective = components.to_vec();
        for (name, policy) in &self.overrides {
            policy.apply(name, &mut effective)?;
        }
        Ok(effective)
    }

    /// True when `component_name` carries the shared-resource marker in
    /// any `shared-resource` policy.
    pub fn is_shared(&self, component_name: &str) -> bool {
        self.shared_resources
            .iter()
            .any(|(_, policy)| policy.is_shared(component_name))
    }

    /// The health scopes `component_name` belongs to, across every
    /// `health-scope-binding` policy.
    pub fn health_scopes_for(&self, component_name: &str) -> Vec<&str> {
        self.health_scopes
            .iter()
            .flat_map(|(_, policy)| policy.scopes_for(component_name))
            .collect()
    }

    /// Looks up a named env across every `env-binding` policy (a
    /// `deploy2env` step's `env` property names one of these).
    pub fn env(&self, name: &str) -> Option<&EnvConfig> {
        self.env_bindings.iter().find_map(|(_, policy)| policy.env(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(name: &str, policy_type: &str, properties: serde_json::Value) -> Policy {
        Policy {
            name: name.to_owned(),
            policy_type: policy_type.to_owned(),
            properties: properties.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn parses_recognized_families_and_ignores_unknown_types() {
        let policies = vec![
            policy("topo", "topology", json!({"clusters": ["east"]})),
            policy("custom", "my-custom-policy", json!({"foo": "bar"})),
        ];
        let set = PolicySet::parse(&policies).unwrap();
        assert_eq!(set.topology.len(), 1);
    }

    #[test]
    fn no_topology_policy_falls_back_to_control_plane() {
        let set = PolicySet::default();
        let placements = set.placements("default", &EmptyClusterDirectory);
        assert_eq!(placements, vec![PlacementDecision::control_plane("default")]);
    }

    #[test]
    fn multiple_topology_policies_union_and_dedupe_placements() {
        let policies = vec![
            policy("a", "topology", json!({"clusters": ["east"], "namespace": "prod"})),
            policy("b", "topology", json!({"clusters": ["east", "west"], "namespace": "prod"})),
        ];
        let set = PolicySet::parse(&policies).unwrap();
        let placements = set.placements("default", &EmptyClusterDirectory);
        assert_eq!(placements.len(), 2);
    }
}
