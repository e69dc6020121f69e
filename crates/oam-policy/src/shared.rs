//! The `shared-resource` policy family: marks the listed components'
//! rendered resources as shared across Applications, so the Dispatcher
//! does not treat a second Application's ownership claim as a conflict
//! a second Application's resources.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SharedResourcePolicy {
    #[serde(default)]
    pub component_names: Vec<String>,
}

impl SharedResourcePolicy {
    pub fn is_shared(&self, component_name: &str) -> bool {
        self.component_names.iter().any(|name| name == component_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_listed_components_are_shared() {
        let policy = SharedResourcePolicy {
            component_names: vec!["shared-db".into()],
        };
        assert!(policy.is_shared("shared-db"));
        assert!(!policy.is_shared("frontend"));
    }
}
