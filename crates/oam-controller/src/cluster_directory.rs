//! A live-cluster-backed `clusterLabelSelector` resolver.
//!
//! `oam_policy::topology::ClusterDirectory::clusters_matching` is
//! synchronous, called from inside the (equally synchronous) policy
//! evaluation pipeline, so it cannot itself make a network call. Instead
//! this directory holds a label snapshot kept fresh by a background task
//! that periodically re-reads a `ConfigMap` (one key per registered
//! cluster name, value a comma-separated `key=value` label list) and swaps
//! the whole map in atomically via `arc_swap::ArcSwap`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use oam_policy::topology::ClusterDirectory;

/// Name of the `ConfigMap`, in the controller's own namespace, that
/// registers known clusters and their labels.
pub const DIRECTORY_CONFIG_MAP: &str = "oam-cluster-directory";

const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

pub struct ConfigMapClusterDirectory {
    snapshot: ArcSwap<BTreeMap<String, BTreeMap<String, String>>>,
}

impl Default for ConfigMapClusterDirectory {
    fn default() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(BTreeMap::new()),
        }
    }
}

impl ConfigMapClusterDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reads `oam-cluster-directory` once and replaces the snapshot. A
    /// missing ConfigMap is treated as "no clusters registered yet" rather
    /// than an error, since a deployment that only ever names clusters
    /// explicitly never needs to create one.
    pub async fn refresh_once(&self, client: kube::Client, namespace: &str) {
        let api: Api<ConfigMap> = Api::namespaced(client, namespace);
        let config_map = match api.get_opt(DIRECTORY_CONFIG_MAP).await {
            Ok(config_map) => config_map,
            Err(err) => {
                tracing::warn!(%err, "failed to read the cluster directory ConfigMap; keeping the previous snapshot");
                return;
            }
        };

        let Some(config_map) = config_map else {
            self.snapshot.store(Arc::new(BTreeMap::new()));
            return;
        };

        let mut parsed = BTreeMap::new();
        if let Some(data) = config_map.data {
            for (cluster, raw_labels) in data {
                parsed.insert(cluster, parse_label_list(&raw_labels));
            }
        }
        self.snapshot.store(Arc::new(parsed));
    }

    /// Spawns a background task that calls [`Self::refresh_once`] on a
    /// fixed interval for as long as `self` is alive.
    pub fn spawn_refresh(self: &Arc<Self>, client: kube::Client, namespace: String) {
        let directory = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                directory.refresh_once(client.clone(), &namespace).await;
                tokio::time::sleep(REFRESH_INTERVAL).await;
            }
        });
    }
}

impl ClusterDirectory for ConfigMapClusterDirectory {
    fn clusters_matching(&self, selector: &BTreeMap<String, String>) -> Vec<String> {
        let snapshot = self.snapshot.load();
        let mut clusters: Vec<String> = snapshot
            .iter()
            .filter(|(_, labels)| selector.iter().all(|(key, value)| labels.get(key) == Some(value)))
            .map(|(cluster, _)| cluster.clone())
            .collect();
        clusters.sort();
        clusters
    }
}

fn parse_label_list(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_key_value_labels() {
        let labels = parse_label_list("region=east, tier=prod");
        assert_eq!(labels.get("region"), Some(&"east".to_owned()));
        assert_eq!(labels.get("tier"), Some(&"prod".to_owned()));
    }

    #[test]
    fn unregistered_directory_matches_nothing() {
        let directory = ConfigMapClusterDirectory::default();
        let mut selector = BTreeMap::new();
        selector.insert("region".to_owned(), "east".to_owned());
        assert!(directory.clusters_matching(&selector).is_empty());
    }

    #[test]
    fn matches_clusters_whose_labels_are_a_superset_of_the_selector() {
        let directory = ConfigMapClusterDirectory::default();
        let mut snapshot = BTreeMap::new();
        snapshot.insert("east-1".to_owned(), parse_label_list("region=east,tier=prod"));
        snapshot.insert("west-1".to_owned(), parse_label_list("region=west,tier=prod"));
        directory.snapshot.store(Arc::new(snapshot));

        let mut selector = BTreeMap::new();
        selector.insert("region".to_owned(), "east".to_owned());
        assert_eq!(directory.clusters_matching(&selector), vec!["east-1".to_owned()]);
    }
}
