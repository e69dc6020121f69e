//! Backing store for `create-config`/`read-config`/`delete-config`/
//! `list-config`: workflow-managed configuration held as `v1/Secret`
//! objects, the same way KubeVela-style config templates and Stackable's
//! own credential Secrets are both just labeled Secrets under the hood.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use oam_dispatch::{DeleteTarget, ResourceClient};
use oam_types::{PlacementDecision, ResourceOwner};

const CONFIG_LABEL: &str = "workflow.oam.dev/config";

#[derive(Clone)]
pub struct ConfigStore {
    resources: Arc<dyn ResourceClient>,
}

impl ConfigStore {
    pub fn new(resources: Arc<dyn ResourceClient>) -> Self {
        Self { resources }
    }

    pub async fn create(
        &self,
        placement: &PlacementDecision,
        namespace: &str,
        name: &str,
        owner: ResourceOwner,
        data: &BTreeMap<String, String>,
    ) -> oam_dispatch::Result<()> {
        let encoded: BTreeMap<&String, String> = data.iter().map(|(k, v)| (k, BASE64.encode(v))).collect();
        let manifest = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": { CONFIG_LABEL: "true" },
            },
            "type": "Opaque",
            "data": encoded,
        });
        self.resources.apply(placement, manifest, owner, false).await?;
        Ok(())
    }

    pub async fn read(
        &self,
        placement: &PlacementDecision,
        namespace: &str,
        name: &str,
    ) -> oam_dispatch::Result<Option<BTreeMap<String, String>>> {
        let Some(secret) = self.resources.read(placement, "v1", "Secret", namespace, name).await? else {
            return Ok(None);
        };
        let data = secret
            .pointer("/data")
            .and_then(serde_json::Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(key, value)| {
                        let encoded = value.as_str()?;
                        let decoded = BASE64.decode(encoded).ok()?;
                        String::from_utf8(decoded).ok().map(|decoded| (key.clone(), decoded))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(data))
    }

    pub async fn delete(&self, placement: &PlacementDecision, namespace: &str, name: &str) -> oam_dispatch::Result<()> {
        self.resources
            .delete(placement, "v1", "Secret", namespace, DeleteTarget::Name(name.to_owned()))
            .await?;
        Ok(())
    }

    pub async fn list(&self, placement: &PlacementDecision, namespace: &str) -> oam_dispatch::Result<Vec<String>> {
        let mut selector = BTreeMap::new();
        selector.insert(CONFIG_LABEL.to_owned(), "true".to_owned());
        let secrets = self.resources.list(placement, "v1", "Secret", namespace, &selector).await?;
        Ok(secrets
            .iter()
            .filter_map(|secret| secret.pointer("/metadata/name").and_then(serde_json::Value::as_str))
            .map(str::to_owned)
            .collect())
    }
}
