//! `ResourceTracker`: persistent record of every resource an Application
//! owns, across clusters. Modelled as a CRD-shaped companion object owned
//! by the Application, keeping controller bookkeeping in the cluster's own
//! declarative store rather than a side database.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::placement::PlacementDecision;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "ResourceTracker",
    plural = "resourcetrackers",
    namespaced,
    crates(kube_core = "kube::core", k8s_openapi = "k8s_openapi", schemars = "schemars")
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTrackerSpec {
    /// The Application this tracker belongs to.
    pub application: String,

    #[serde(default)]
    pub entries: Vec<TrackedResource>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedResource {
    pub placement: PlacementDecision,
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: Option<String>,
    pub owner: ResourceOwner,
    pub generation_applied: i64,
    /// True when this resource carries the shared-resource marker:
    /// garbage collection reference-counts instead of deleting
    /// on first orphaning.
    #[serde(default)]
    pub shared: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOwner {
    pub component: String,
    #[serde(default)]
    pub r#trait: Option<String>,
}

impl ResourceTrackerSpec {
    /// Entries present in `self` but absent from `desired` are orphans to
    /// delete.
    pub fn orphans<'a>(&'a self, desired: &[TrackedResource]) -> Vec<&'a TrackedResource> {
        self.entries
            .iter()
            .filter(|entry| !desired.iter().any(|d| same_identity(entry, d)))
            .collect()
    }
}

fn same_identity(a: &TrackedResource, b: &TrackedResource) -> bool {
    a.placement == b.placement
        && a.api_version == b.api_version
        && a.kind == b.kind
        && a.name == b.name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> TrackedResource {
        TrackedResource {
            placement: PlacementDecision::control_plane("default"),
            api_version: "v1".into(),
            kind: "ConfigMap".into(),
            name: name.into(),
            uid: Some("uid-1".into()),
            owner: ResourceOwner {
                component: "frontend".into(),
                r#trait: None,
            },
            generation_applied: 1,
            shared: false,
        }
    }

    #[test]
    fn orphans_are_entries_missing_from_desired() {
        let tracker = ResourceTrackerSpec {
            application: "website".into(),
            entries: vec![entry("a"), entry("b")],
        };
        let desired = vec![entry("a")];
        let orphans = tracker.orphans(&desired);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].name, "b");
    }

    #[test]
    fn empty_desired_set_orphans_everything() {
        let tracker = ResourceTrackerSpec {
            application: "website".into(),
            entries: vec![entry("a"), entry("b")],
        };
        assert_eq!(tracker.orphans(&[]).len(), 2);
    }
}
