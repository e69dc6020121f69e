//! Well-known label and annotation keys carried on every rendered resource
//! and on the Application object itself.
//!
//! Constants for the keys plus a small typed map wrapper instead of passing
//! raw `BTreeMap<String, String>` around everywhere.

use std::collections::BTreeMap;

/// The name of the Application that owns a rendered resource.
pub const APP_NAME_LABEL: &str = "app.oam.dev/name";
/// The component within the Application that rendered this resource.
pub const APP_COMPONENT_LABEL: &str = "app.oam.dev/component";
/// The workload-definition name used to render the component's primary resource.
pub const WORKLOAD_TYPE_LABEL: &str = "workload.oam.dev/type";
/// The trait-definition name, present only on trait-owned auxiliary resources.
pub const TRAIT_TYPE_LABEL: &str = "trait.oam.dev/type";
/// A stable logical name distinguishing multiple resources owned by one trait.
pub const TRAIT_RESOURCE_LABEL: &str = "trait.oam.dev/resource";
/// A stable logical name distinguishing multiple auxiliary resources owned
/// directly by a component (as opposed to one of its traits).
pub const RESOURCE_NAME_LABEL: &str = "oam.dev/resource-name";

/// `app.oam.dev/publish-version`: changing this value forces a new Revision
/// and a workflow restart.
pub const PUBLISH_VERSION_ANNOTATION: &str = "app.oam.dev/publish-version";
/// `app.oam.dev/restart-workflow`: an RFC3339 timestamp, a duration, or a
/// recurring duration. Exactly one form may be set.
pub const RESTART_WORKFLOW_ANNOTATION: &str = "app.oam.dev/restart-workflow";
/// Comma-separated component names opted into external rollout control.
pub const ROLLING_COMPONENTS_ANNOTATION: &str = "app.oam.dev/rolling-components";

/// An ordered, deduplicated set of label or annotation key/value pairs.
///
/// Kept as a thin wrapper rather than a bare `BTreeMap` so call sites read
/// as "these are Kubernetes key/value metadata" rather than "some map".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValuePairs(BTreeMap<String, String>);

impl KeyValuePairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_all(&self, expected: &[(&str, &str)]) -> bool {
        expected
            .iter()
            .all(|(key, value)| self.get(key) == Some(*value))
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for KeyValuePairs {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for KeyValuePairs {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Builds the required label set for a component's primary workload resource.
pub fn workload_labels(app_name: &str, component_name: &str, workload_type: &str) -> KeyValuePairs {
    let mut labels = KeyValuePairs::new();
    labels
        .insert(APP_NAME_LABEL, app_name)
        .insert(APP_COMPONENT_LABEL, component_name)
        .insert(WORKLOAD_TYPE_LABEL, workload_type);
    labels
}

/// Builds the required label set for a component-owned auxiliary resource
/// (an `outputs.<key>` entry in the component's own template).
pub fn auxiliary_labels(app_name: &str, component_name: &str, resource_name: &str) -> KeyValuePairs {
    let mut labels = KeyValuePairs::new();
    labels
        .insert(APP_NAME_LABEL, app_name)
        .insert(APP_COMPONENT_LABEL, component_name)
        .insert(RESOURCE_NAME_LABEL, resource_name);
    labels
}

/// Builds the required label set for a trait-owned auxiliary resource.
pub fn trait_labels(
    app_name: &str,
    component_name: &str,
    trait_type: &str,
    resource_name: &str,
) -> KeyValuePairs {
    let mut labels = KeyValuePairs::new();
    labels
        .insert(APP_NAME_LABEL, app_name)
        .insert(APP_COMPONENT_LABEL, component_name)
        .insert(TRAIT_TYPE_LABEL, trait_type)
        .insert(TRAIT_RESOURCE_LABEL, resource_name);
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_labels_carry_required_keys() {
        let labels = workload_labels("website", "frontend", "webservice");
        assert!(labels.contains_all(&[
            (APP_NAME_LABEL, "website"),
            (APP_COMPONENT_LABEL, "frontend"),
            (WORKLOAD_TYPE_LABEL, "webservice"),
        ]));
    }

    #[test]
    fn trait_labels_carry_resource_name() {
        let labels = trait_labels("website", "frontend", "cpuscaler", "frontend-scaler");
        assert_eq!(labels.get(TRAIT_RESOURCE_LABEL), Some("frontend-scaler"));
    }

    #[test]
    fn auxiliary_labels_carry_resource_name_without_a_trait_type() {
        let labels = auxiliary_labels("website", "frontend", "frontend-config");
        assert_eq!(labels.get(RESOURCE_NAME_LABEL), Some("frontend-config"));
        assert_eq!(labels.get(TRAIT_TYPE_LABEL), None);
    }
}
