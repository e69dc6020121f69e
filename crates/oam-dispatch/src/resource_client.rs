//! The cluster-facing surface the Workflow Executor's `apply`/`read`/
//! `delete` primitives are implemented against. Kept as a
//! trait, implemented by [`crate::Dispatcher`], so `oam-workflow` depends on
//! this narrow interface rather than the whole dispatch/tracker machinery.

use std::collections::BTreeMap;

use oam_types::{PlacementDecision, ResourceOwner};

use crate::Result;

/// What a `delete` primitive targets: an exact name, or everything matching
/// a label selector (`delete(value, filter?, cluster?)`).
#[derive(Debug, Clone)]
pub enum DeleteTarget {
    Name(String),
    LabelSelector(BTreeMap<String, String>),
}

#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// Idempotent upsert of `manifest` into `placement`'s cluster, tagged
    /// with `owner`. Returns the server-side view. `shared` disables
    /// exclusive-owner semantics for this one apply.
    async fn apply(
        &self,
        placement: &PlacementDecision,
        manifest: serde_json::Value,
        owner: ResourceOwner,
        shared: bool,
    ) -> Result<serde_json::Value>;

    /// Fetches a resource by `(apiVersion, kind, namespace, name)`. A
    /// missing resource is `Ok(None)`, not an error — the `read` primitive
    /// exposes this as `{value: null, err: "not found"}` rather than
    /// failing the step outright.
    async fn read(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>>;

    /// Deletes by name or by label selector, returning the number of
    /// resources removed.
    async fn delete(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        target: DeleteTarget,
    ) -> Result<u32>;

    /// Lists resources matching a label selector. Used by `list-config` and
    /// `collect-service-endpoints`, which both need the matching set
    /// itself rather than just a deletion count.
    async fn list(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        label_selector: &BTreeMap<String, String>,
    ) -> Result<Vec<serde_json::Value>>;
}
