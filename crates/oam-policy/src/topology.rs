//! The `topology` policy family: which clusters/namespace a component's
//! rendered resources land in.

use std::collections::BTreeMap;

use oam_types::PlacementDecision;
use serde::{Deserialize, Serialize};

/// A directory of registered clusters and their labels, consulted only
/// when a topology declares `clusterLabelSelector` instead of an explicit
/// `clusters` list. The production implementation is `oam-dispatch`'s
/// `ClusterClientPool`; kept as a trait here so the Policy Engine stays
/// free of any cluster-client dependency.
pub trait ClusterDirectory {
    fn clusters_matching(&self, selector: &BTreeMap<String, String>) -> Vec<String>;
}

/// A directory with no registered clusters; `clusterLabelSelector` always
/// resolves to an empty set. Useful for tests and for deployments that
/// only ever name clusters explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyClusterDirectory;

impl ClusterDirectory for EmptyClusterDirectory {
    fn clusters_matching(&self, _selector: &BTreeMap<String, String>) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyPolicy {
    #[serde(default)]
    pub clusters: Vec<String>,
    #[serde(default)]
    pub cluster_label_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl TopologyPolicy {
    /// Resolves this policy into concrete placement decisions. An empty
    /// policy (no `clusters`, no selector) is not itself meaningful —
    /// callers fall back to the control-plane default when no topology
    /// policy at all is present.
    pub fn placements(&self, default_namespace: &str, directory: &dyn ClusterDirectory) -> Vec<PlacementDecision> {
        let namespace = self.namespace.clone().unwrap_or_else(|| default_namespace.to_owned());
        let clusters = if !self.clusters.is_empty() {
            self.clusters.clone()
        } else if !self.cluster_label_selector.is_empty() {
            directory.clusters_matching(&self.cluster_label_selector)
        } else {
            vec![PlacementDecision::CONTROL_PLANE.to_owned()]
        };
        clusters
            .into_iter()
            .map(|cluster| PlacementDecision {
                cluster,
                namespace: namespace.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_clusters_produce_one_placement_each() {
        let policy = TopologyPolicy {
            clusters: vec!["east".into(), "west".into()],
            cluster_label_selector: BTreeMap::new(),
            namespace: Some("prod".into()),
        };
        let placements = policy.placements("default", &EmptyClusterDirectory);
        assert_eq!(
            placements,
            vec![
                PlacementDecision { cluster: "east".into(), namespace: "prod".into() },
                PlacementDecision { cluster: "west".into(), namespace: "prod".into() },
            ]
        );
    }

    #[test]
    fn empty_policy_falls_back_to_control_plane() {
        let policy = TopologyPolicy::default();
        let placements = policy.placements("default", &EmptyClusterDirectory);
        assert_eq!(placements, vec![PlacementDecision::control_plane("default")]);
    }

    #[test]
    fn missing_namespace_falls_back_to_application_namespace() {
        let policy = TopologyPolicy {
            clusters: vec!["east".into()],
            cluster_label_selector: BTreeMap::new(),
            namespace: None,
        };
        let placements = policy.placements("default", &EmptyClusterDirectory);
        assert_eq!(placements[0].namespace, "default");
    }
}
