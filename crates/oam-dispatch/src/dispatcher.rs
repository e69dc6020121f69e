//! Applies a [`RenderPlan`] across every placement decision, records what
//! was applied in a [`ResourceTrackerSpec`], and garbage-collects resources
//! that fall out of a re-render: tag + apply + record identity, then diff tracked
//! ids against a fresh list, delete the rest) generalize here to fan out
//! over many clusters instead of one implicit one.

use std::collections::BTreeMap;

use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::discovery;
use kube::ResourceExt;
use snafu::{IntoError, OptionExt, ResultExt};

use oam_render::{ComponentRender, RenderPlan, RenderedResource};
use oam_types::{PlacementDecision, ResourceOwner, ResourceTrackerSpec, TrackedResource};

use crate::cluster_client::ClusterClientPool;
use crate::error::{
    ApplySnafu, DeleteSnafu, DiscoverySnafu, ListSnafu, MissingGvkSnafu, MissingNamespaceSnafu, ReadSnafu, Result,
};
use crate::resource_client::{DeleteTarget, ResourceClient};
use crate::strategy::DispatchStrategy;

/// The field manager name server-side apply records ownership under.
const FIELD_MANAGER: &str = "oam-controller";

pub struct Dispatcher {
    pool: ClusterClientPool,
    strategy: DispatchStrategy,
}

impl Dispatcher {
    pub fn new(pool: ClusterClientPool, strategy: DispatchStrategy) -> Self {
        Self { pool, strategy }
    }

    /// Applies every resource in `plan` to its placement(s), then diffs the
    /// new tracker entries against `previous` and deletes orphans. `is_shared`
    /// decides whether a component's resources carry the shared-resource
    /// marker; shared resources are never deleted by this pass since another
    /// Application may still reference them. Applies run up to `parallelism`
    /// at a time (bounded-parallel per-cluster dispatch).
    pub async fn apply_plan(
        &self,
        app_name: &str,
        generation: i64,
        plan: &RenderPlan,
        previous: &ResourceTrackerSpec,
        is_shared: &dyn Fn(&str) -> bool,
        parallelism: usize,
    ) -> Result<ResourceTrackerSpec> {
        use futures::stream::{self, StreamExt};

        let pending: Vec<_> = plan.resources_by_placement().collect();
        let entries: Vec<TrackedResource> = stream::iter(pending)
            .map(|(placement, component, resource)| {
                let shared = is_shared(&component.name);
                self.apply_tracked(app_name, generation, placement, resource, shared)
            })
            .buffer_unordered(parallelism.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        if self.strategy.deletes_orphans() {
            let orphans: Vec<TrackedResource> = previous.orphans(&entries).into_iter().cloned().collect();
            for orphan in &orphans {
                if orphan.shared {
                    tracing::debug!(resource = %orphan.name, "skipping shared resource during garbage collection");
                    continue;
                }
                self.delete_tracked(orphan).await?;
            }
        }

        Ok(ResourceTrackerSpec {
            application: app_name.to_owned(),
            entries,
        })
    }

    async fn apply_tracked(
        &self,
        _app_name: &str,
        generation: i64,
        placement: &PlacementDecision,
        resource: &RenderedResource,
        shared: bool,
    ) -> Result<TrackedResource> {
        let manifest = resource.manifest.clone();
        let (api_version, kind, name, namespace) = manifest_identity(&manifest)?;

        let uid = if self.strategy.applies() {
            let applied = self.apply_dynamic(placement, &api_version, &kind, &namespace, manifest).await?;
            applied.uid()
        } else {
            self.read_dynamic(placement, &api_version, &kind, &namespace, &name)
                .await?
                .and_then(|obj| obj.uid())
        };

        Ok(TrackedResource {
            placement: placement.clone(),
            api_version,
            kind,
            name,
            uid,
            owner: resource.origin.clone().into(),
            generation_applied: generation,
            shared,
        })
    }

    async fn delete_tracked(&self, entry: &TrackedResource) -> Result<()> {
        let api = self
            .api_for(&entry.placement, &entry.api_version, &entry.kind, &entry.placement.namespace)
            .await?;
        match api.delete(&entry.name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(source) => Err(DeleteSnafu {
                cluster: entry.placement.cluster.clone(),
                kind: entry.kind.clone(),
                name: entry.name.clone(),
            }
            .into_error(source)),
        }
    }

    /// Discovers the API resource for `(api_version, kind)` and builds a
    /// namespaced `Api<DynamicObject>` for it. Every `ResourceClient` caller
    /// already knows which namespace it means (the Application's own, or a
    /// cross-namespace output's), so this never needs to consult discovery
    /// scope the way a generic client would.
    async fn api_for(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
    ) -> Result<Api<DynamicObject>> {
        let client = self.pool.get(&placement.cluster).await?;
        let gvk = parse_gvk(api_version, kind);
        let (resource, _caps) = discovery::pinned_kind(&client, &gvk).await.context(DiscoverySnafu {
            cluster: placement.cluster.clone(),
            gvk: format!("{api_version}/{kind}"),
        })?;
        Ok(Api::namespaced_with(client, namespace, &resource))
    }

    async fn apply_dynamic(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        manifest: serde_json::Value,
    ) -> Result<DynamicObject> {
        let name = manifest
            .pointer("/metadata/name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let object: DynamicObject = serde_json::from_value(manifest).context(crate::error::DeserializeSnafu {
            name: name.clone(),
        })?;
        let api = self.api_for(placement, api_version, kind, namespace).await?;
        let patch_params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &patch_params, &Patch::Apply(&object))
            .await
            .context(ApplySnafu {
                cluster: placement.cluster.clone(),
                kind: kind.to_owned(),
                name,
            })
    }

    async fn read_dynamic(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let api = self.api_for(placement, api_version, kind, namespace).await?;
        match api.get(name).await {
            Ok(object) => Ok(Some(object)),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(source) => Err(ReadSnafu {
                cluster: placement.cluster.clone(),
                kind: kind.to_owned(),
                name: name.to_owned(),
            }
            .into_error(source)),
        }
    }
}

#[async_trait::async_trait]
impl ResourceClient for Dispatcher {
    async fn apply(
        &self,
        placement: &PlacementDecision,
        manifest: serde_json::Value,
        _owner: ResourceOwner,
        _shared: bool,
    ) -> Result<serde_json::Value> {
        let (api_version, kind, _name, namespace) = manifest_identity(&manifest)?;
        if !self.strategy.applies() {
            return Ok(manifest);
        }
        let applied = self.apply_dynamic(placement, &api_version, &kind, &namespace, manifest).await?;
        serde_json::to_value(applied).context(crate::error::DeserializeSnafu {
            name: kind,
        })
    }

    async fn read(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>> {
        let object = self.read_dynamic(placement, api_version, kind, namespace, name).await?;
        object
            .map(|obj| {
                serde_json::to_value(obj).context(crate::error::DeserializeSnafu {
                    name: name.to_owned(),
                })
            })
            .transpose()
    }

    async fn delete(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        target: DeleteTarget,
    ) -> Result<u32> {
        let api = self.api_for(placement, api_version, kind, namespace).await?;
        match target {
            DeleteTarget::Name(name) => match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => Ok(1),
                Err(kube::Error::Api(response)) if response.code == 404 => Ok(0),
                Err(source) => Err(DeleteSnafu {
                    cluster: placement.cluster.clone(),
                    kind: kind.to_owned(),
                    name,
                }
                .into_error(source)),
            },
            DeleteTarget::LabelSelector(labels) => {
                let selector = label_selector_string(&labels);
                let list_params = ListParams::default().labels(&selector);
                let candidates = api.list(&list_params).await.context(ListSnafu {
                    cluster: placement.cluster.clone(),
                    kind: kind.to_owned(),
                    namespace: namespace.to_owned(),
                })?;
                let mut deleted = 0;
                for candidate in &candidates {
                    let name = candidate.name_any();
                    match api.delete(&name, &DeleteParams::default()).await {
                        Ok(_) => deleted += 1,
                        Err(kube::Error::Api(response)) if response.code == 404 => {}
                        Err(source) => {
                            return Err(DeleteSnafu {
                                cluster: placement.cluster.clone(),
                                kind: kind.to_owned(),
                                name,
                            }
                            .into_error(source));
                        }
                    }
                }
                Ok(deleted)
            }
        }
    }

    async fn list(
        &self,
        placement: &PlacementDecision,
        api_version: &str,
        kind: &str,
        namespace: &str,
        label_selector: &BTreeMap<String, String>,
    ) -> Result<Vec<serde_json::Value>> {
        let api = self.api_for(placement, api_version, kind, namespace).await?;
        let selector = label_selector_string(label_selector);
        let list_params = ListParams::default().labels(&selector);
        let candidates = api.list(&list_params).await.context(ListSnafu {
            cluster: placement.cluster.clone(),
            kind: kind.to_owned(),
            namespace: namespace.to_owned(),
        })?;
        candidates
            .into_iter()
            .map(|object| {
                serde_json::to_value(object).context(crate::error::DeserializeSnafu {
                    name: kind.to_owned(),
                })
            })
            .collect()
    }
}

fn manifest_identity(manifest: &serde_json::Value) -> Result<(String, String, String, String)> {
    let api_version = manifest
        .pointer("/apiVersion")
        .and_then(serde_json::Value::as_str)
        .with_context(|| MissingGvkSnafu {
            name: manifest
                .pointer("/metadata/name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<unnamed>")
                .to_owned(),
        })?
        .to_owned();
    let kind = manifest
        .pointer("/kind")
        .and_then(serde_json::Value::as_str)
        .with_context(|| MissingGvkSnafu {
            name: manifest
                .pointer("/metadata/name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<unnamed>")
                .to_owned(),
        })?
        .to_owned();
    let name = manifest
        .pointer("/metadata/name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let namespace = manifest
        .pointer("/metadata/namespace")
        .and_then(serde_json::Value::as_str)
        .with_context(|| MissingNamespaceSnafu { name: name.clone() })?
        .to_owned();
    Ok((api_version, kind, name, namespace))
}

fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

fn label_selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_v1_group_as_empty() {
        let gvk = parse_gvk("v1", "ConfigMap");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");
    }

    #[test]
    fn parses_grouped_api_version() {
        let gvk = parse_gvk("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
    }

    #[test]
    fn label_selector_joins_pairs_with_commas() {
        let mut labels = BTreeMap::new();
        labels.insert("app.oam.dev/name".to_owned(), "website".to_owned());
        labels.insert("app.oam.dev/component".to_owned(), "frontend".to_owned());
        assert_eq!(
            label_selector_string(&labels),
            "app.oam.dev/component=frontend,app.oam.dev/name=website"
        );
    }

    #[test]
    fn manifest_identity_requires_namespace() {
        let manifest = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cfg"}
        });
        let err = manifest_identity(&manifest).unwrap_err();
        assert!(matches!(err, crate::Error::MissingNamespace { .. }));
    }
}
