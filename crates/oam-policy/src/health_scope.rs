//! The `health-scope-binding` policy family: groups components into a
//! named scope whose aggregate health is reported together by the
//! Status Aggregator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthScope {
    pub name: String,
    #[serde(default)]
    pub component_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthScopeBindingPolicy {
    #[serde(default)]
    pub scopes: Vec<HealthScope>,
}

impl HealthScopeBindingPolicy {
    /// The scopes a component belongs to, by name. A component may
    /// belong to more than one scope.
    pub fn scopes_for(&self, component_name: &str) -> Vec<&str> {
        self.scopes
            .iter()
            .filter(|scope| scope.component_names.iter().any(|name| name == component_name))
            .map(|scope| scope.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_scopes_containing_a_component() {
        let policy = HealthScopeBindingPolicy {
            scopes: vec![
                HealthScope { name: "frontend-scope".into(), component_names: vec!["web".into(), "cdn".into()] },
                HealthScope { name: "backend-scope".into(), component_names: vec!["api".into()] },
            ],
        };
        assert_eq!(policy.scopes_for("web"), vec!["frontend-scope"]);
        assert!(policy.scopes_for("unrelated").is_empty());
    }
}
