//! The `override` policy family: a partial patch applied to named
//! components' `properties`, computed before rendering.

use serde::{Deserialize, Serialize};

use crate::error::{Error, OverrideMergeSnafu, Result};
use snafu::ResultExt;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOverride {
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverridePolicy {
    #[serde(default)]
    pub components: Vec<ComponentOverride>,
}

impl OverridePolicy {
    /// Applies every matching component override's properties patch onto
    /// `components`, in declaration order. Unknown override targets are
    /// reported rather than silently ignored — a typo in an override's
    /// component name should not pass silently.
    pub fn apply(
        &self,
        policy_name: &str,
        components: &mut [oam_types::Component],
    ) -> Result<()> {
        for component_override in &self.components {
            let target = components
                .iter_mut()
                .find(|c| c.name == component_override.name)
                .ok_or_else(|| Error::UnknownOverrideTarget {
                    name: policy_name.to_owned(),
                    component: component_override.name.clone(),
                })?;

            let base = serde_json::Value::Object(target.properties.clone());
            let patch = serde_json::Value::Object(component_override.properties.clone());
            let merged = oam_render::patch::merge(&target.name, "", &base, &patch).context(OverrideMergeSnafu {
                name: policy_name.to_owned(),
                component: target.name.clone(),
            })?;
            target.properties = merged.as_object().cloned().unwrap_or_default();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oam_types::Component;
    use serde_json::json;

    fn component(name: &str, properties: serde_json::Value) -> Component {
        Component {
            name: name.to_owned(),
            component_type: "webservice".to_owned(),
            properties: properties.as_object().cloned().unwrap_or_default(),
            traits: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn override_patches_matching_component_properties() {
        let mut components = vec![component("frontend", json!({"image": "nginx", "replicas": 1}))];
        let policy = OverridePolicy {
            components: vec![ComponentOverride {
                name: "frontend".into(),
                properties: json!({"replicas": 3}).as_object().cloned().unwrap(),
            }],
        };
        policy.apply("prod-override", &mut components).unwrap();
        assert_eq!(components[0].properties.get("replicas"), Some(&json!(3)));
        assert_eq!(components[0].properties.get("image"), Some(&json!("nginx")));
    }

    #[test]
    fn override_of_unknown_component_is_rejected() {
        let mut components = vec![component("frontend", json!({}))];
        let policy = OverridePolicy {
            components: vec![ComponentOverride {
                name: "backend".into(),
                properties: Default::default(),
            }],
        };
        let err = policy.apply("prod-override", &mut components).unwrap_err();
        assert!(matches!(err, Error::UnknownOverrideTarget { .. }));
    }
}
