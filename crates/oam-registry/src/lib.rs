//! The Definition Registry: stores, validates, and serves
//! Component/Trait/WorkflowStep Definitions by `(kind, name, version)`, and
//! serves the *current* (latest, unless pinned) definition for a name.
//!
//! Backed in-process by a content-addressed map guarded by a `tokio::sync
//! ::RwLock`, with a broadcast channel standing in for the `kube::runtime
//! ::reflector` watch feed `oam-controller` wires this into at the edge.

mod error;
mod validate;

pub use error::{Error, Result};

use std::collections::BTreeMap;
use std::sync::Arc;

use semver::Version;
use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, broadcast};

use oam_types::{ComponentDefinitionSpec, TraitDefinitionSpec, WorkflowStepDefinitionSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionKind {
    Component,
    Trait,
    WorkflowStep,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Component => "Component",
            Self::Trait => "Trait",
            Self::WorkflowStep => "WorkflowStep",
        };
        f.write_str(name)
    }
}

/// The kind-specific payload of a Definition, independent of its wire CRD
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionSpec {
    Component(ComponentDefinitionSpec),
    Trait(TraitDefinitionSpec),
    WorkflowStep(WorkflowStepDefinitionSpec),
}

impl DefinitionSpec {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Component(_) => DefinitionKind::Component,
            Self::Trait(_) => DefinitionKind::Trait,
            Self::WorkflowStep(_) => DefinitionKind::WorkflowStep,
        }
    }

    pub fn template(&self) -> &str {
        match self {
            Self::Component(spec) => &spec.schematic.template,
            Self::Trait(spec) => &spec.schematic.template,
            Self::WorkflowStep(spec) => &spec.schematic.template,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            Self::Component(spec) => &spec.version,
            Self::Trait(spec) => &spec.version,
            Self::WorkflowStep(spec) => &spec.version,
        }
    }

}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDefinition {
    pub name: String,
    pub spec: DefinitionSpec,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub enum DefinitionEvent {
    Put(StoredDefinition),
    Delete { name: String, version: String },
}

fn content_hash(template: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// All versions of one `(kind, name)`, keyed by parsed semver for ordering.
#[derive(Debug, Default)]
struct VersionedEntry {
    versions: BTreeMap<Version, StoredDefinition>,
}

#[derive(Debug, Default)]
struct Store {
    components: BTreeMap<String, VersionedEntry>,
    traits: BTreeMap<String, VersionedEntry>,
    workflow_steps: BTreeMap<String, VersionedEntry>,
}

impl Store {
    fn table_mut(&mut self, kind: DefinitionKind) -> &mut BTreeMap<String, VersionedEntry> {
        match kind {
            DefinitionKind::Component => &mut self.components,
            DefinitionKind::Trait => &mut self.traits,
            DefinitionKind::WorkflowStep => &mut self.workflow_steps,
        }
    }

    fn table(&self, kind: DefinitionKind) -> &BTreeMap<String, VersionedEntry> {
        match kind {
            DefinitionKind::Component => &self.components,
            DefinitionKind::Trait => &self.traits,
            DefinitionKind::WorkflowStep => &self.workflow_steps,
        }
    }
}

pub struct DefinitionRegistry {
    store: RwLock<Store>,
    events: broadcast::Sender<DefinitionEvent>,
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store: RwLock::new(Store::default()),
            events,
        }
    }

    pub fn watch(&self, _kind: DefinitionKind) -> broadcast::Receiver<DefinitionEvent> {
        self.events.subscribe()
    }

    /// Validates and stores a Definition. Rejects a `(name, version)` that
    /// already exists with *different* content, since Definitions are
    /// append-only; resubmitting byte-identical content is accepted
    /// idempotently.
    pub async fn put(&self, name: &str, spec: DefinitionSpec) -> Result<()> {
        validate::validate(&spec)?;

        let version = Version::parse(spec.version())
            .map_err(|source| Error::InvalidVersion {
                name: name.to_owned(),
                version: spec.version().to_owned(),
                source,
            })?;
        let hash = content_hash(spec.template());
        let kind = spec.kind();

        let mut store = self.store.write().await;
        let entry = store.table_mut(kind).entry(name.to_owned()).or_default();

        if let Some(existing) = entry.versions.get(&version) {
            if existing.content_hash == hash {
                return Ok(());
            }
            return Err(Error::Immutable {
                name: name.to_owned(),
                version: spec.version().to_owned(),
            });
        }

        let stored = StoredDefinition {
            name: name.to_owned(),
            spec,
            content_hash: hash,
        };
        entry.versions.insert(version, stored.clone());
        drop(store);

        let _ = self.events.send(DefinitionEvent::Put(stored));
        Ok(())
    }

    /// Fetches a Definition by name, optionally pinned to an exact version;
    /// otherwise the latest (current) version is returned.
    pub async fn get(
        &self,
        kind: DefinitionKind,
        name: &str,
        version: Option<&str>,
    ) -> Result<StoredDefinition> {
        let store = self.store.read().await;
        let entry = store
            .table(kind)
            .get(name)
            .ok_or_else(|| Error::NotFound {
                kind,
                name: name.to_owned(),
            })?;

        match version {
            Some(pinned) => {
                let pinned = Version::parse(pinned).map_err(|source| Error::InvalidVersion {
                    name: name.to_owned(),
                    version: pinned.to_owned(),
                    source,
                })?;
                entry
                    .versions
                    .get(&pinned)
                    .cloned()
                    .ok_or_else(|| Error::NotFound {
                        kind,
                        name: name.to_owned(),
                    })
            }
            None => entry
                .versions
                .last_key_value()
                .map(|(_, def)| def.clone())
                .ok_or_else(|| Error::NotFound {
                    kind,
                    name: name.to_owned(),
                }),
        }
    }

    /// Lists the current version of every Definition of `kind`, optionally
    /// filtered by a label predicate.
    pub async fn list(
        &self,
        kind: DefinitionKind,
        selector: Option<&dyn Fn(&StoredDefinition) -> bool>,
    ) -> Vec<StoredDefinition> {
        let store = self.store.read().await;
        store
            .table(kind)
            .values()
            .filter_map(|entry| entry.versions.last_key_value().map(|(_, def)| def.clone()))
            .filter(|def| selector.is_none_or(|predicate| predicate(def)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oam_types::{Schematic, WorkloadTypeDescriptor};

    fn component(version: &str, template: &str) -> DefinitionSpec {
        DefinitionSpec::Component(ComponentDefinitionSpec {
            version: version.to_owned(),
            workload: WorkloadTypeDescriptor {
                definition: Some(oam_types::WorkloadGroupVersionKind {
                    api_version: "apps/v1".into(),
                    kind: "Deployment".into(),
                }),
                r#type: None,
            },
            schematic: Schematic {
                template: template.to_owned(),
            },
            status: None,
        })
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let registry = DefinitionRegistry::new();
        registry
            .put("webservice", component("1.0.0", "output: { kind: \"Deployment\" }"))
            .await
            .unwrap();
        let got = registry
            .get(DefinitionKind::Component, "webservice", None)
            .await
            .unwrap();
        assert_eq!(got.spec.version(), "1.0.0");
    }

    #[tokio::test]
    async fn get_returns_latest_when_unpinned() {
        let registry = DefinitionRegistry::new();
        registry
            .put("webservice", component("1.0.0", "output: {}"))
            .await
            .unwrap();
        registry
            .put("webservice", component("2.0.0", "output: {}"))
            .await
            .unwrap();
        let got = registry
            .get(DefinitionKind::Component, "webservice", None)
            .await
            .unwrap();
        assert_eq!(got.spec.version(), "2.0.0");
    }

    #[tokio::test]
    async fn changing_an_existing_versions_content_is_rejected() {
        let registry = DefinitionRegistry::new();
        registry
            .put("worker", component("1.0.0", "output: { kind: \"Job\" }"))
            .await
            .unwrap();
        let err = registry
            .put("worker", component("1.0.0", "output: { kind: \"CronJob\" }"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Immutable { .. }));
    }

    #[tokio::test]
    async fn resubmitting_identical_content_is_idempotent() {
        let registry = DefinitionRegistry::new();
        let spec = component("1.0.0", "output: { kind: \"Job\" }");
        registry.put("worker", spec.clone()).await.unwrap();
        registry.put("worker", spec).await.unwrap();
    }

    #[tokio::test]
    async fn missing_definition_is_not_found() {
        let registry = DefinitionRegistry::new();
        let err = registry
            .get(DefinitionKind::Component, "nope", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
