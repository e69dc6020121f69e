//! The `env-binding` policy family: named environments, each carrying its
//! own placement and override, consumed explicitly by the `deploy` and
//! `deploy2env` workflow steps rather than folded
//! into the default render plan — see the crate-level docs for why.

use serde::{Deserialize, Serialize};

use crate::override_policy::OverridePolicy;
use crate::topology::{ClusterDirectory, TopologyPolicy};
use oam_types::PlacementDecision;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfig {
    pub name: String,
    #[serde(default)]
    pub placement: TopologyPolicy,
    #[serde(default)]
    pub r#override: OverridePolicy,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvBindingPolicy {
    #[serde(default)]
    pub envs: Vec<EnvConfig>,
}

impl EnvBindingPolicy {
    pub fn env(&self, name: &str) -> Option<&EnvConfig> {
        self.envs.iter().find(|env| env.name == name)
    }
}

impl EnvConfig {
    /// The components effective for this env: `base` with this env's
    /// override patch applied on top.
    pub fn effective_components(
        &self,
        policy_name: &str,
        base: &[oam_types::Component],
    ) -> crate::error::Result<Vec<oam_types::Component>> {
        let mut components = base.to_vec();
        self.r#override.apply(policy_name, &mut components)?;
        Ok(components)
    }

    pub fn placements(&self, default_namespace: &str, directory: &dyn ClusterDirectory) -> Vec<PlacementDecision> {
        self.placement.placements(default_namespace, directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::override_policy::ComponentOverride;
    use crate::topology::EmptyClusterDirectory;
    use oam_types::Component;
    use serde_json::json;

    #[test]
    fn looks_up_env_by_name() {
        let policy = EnvBindingPolicy {
            envs: vec![EnvConfig {
                name: "staging".into(),
                placement: TopologyPolicy::default(),
                r#override: OverridePolicy::default(),
            }],
        };
        assert!(policy.env("staging").is_some());
        assert!(policy.env("prod").is_none());
    }

    #[test]
    fn effective_components_apply_the_envs_override() {
        let base = vec![Component {
            name: "frontend".into(),
            component_type: "webservice".into(),
            properties: json!({"replicas": 1}).as_object().cloned().unwrap(),
            traits: Vec::new(),
            depends_on: Vec::new(),
        }];
        let env = EnvConfig {
            name: "prod".into(),
            placement: TopologyPolicy {
                clusters: vec!["prod-cluster".into()],
                ..Default::default()
            },
            r#override: OverridePolicy {
                components: vec![ComponentOverride {
                    name: "frontend".into(),
                    properties: json!({"replicas": 5}).as_object().cloned().unwrap(),
                }],
            },
        };
        let effective = env.effective_components("env-binding", &base).unwrap();
        assert_eq!(effective[0].properties.get("replicas"), Some(&json!(5)));
        let placements = env.placements("default", &EmptyClusterDirectory);
        assert_eq!(placements[0].cluster, "prod-cluster");
    }
}
