//! Background reflector-style tasks that keep the in-process
//! [`DefinitionRegistry`] synchronized with the `ComponentDefinition`/
//! `TraitDefinition`/`WorkflowStepDefinition` custom resources on the
//! cluster, via `kube::runtime::watcher`.

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Config};
use kube::{Api, ResourceExt};
use oam_registry::{DefinitionRegistry, DefinitionSpec};
use oam_types::{ComponentDefinition, TraitDefinition, WorkflowStepDefinition};

/// Spawns one watcher task per Definition kind. Each just feeds `put` with
/// whatever the apiserver reports; `put`'s own content-hash/immutability
/// check absorbs a watcher replaying the same object on reconnect or
/// resync.
pub fn spawn_all(client: kube::Client, registry: Arc<DefinitionRegistry>) {
    spawn_component_watcher(client.clone(), Arc::clone(&registry));
    spawn_trait_watcher(client.clone(), Arc::clone(&registry));
    spawn_workflow_step_watcher(client, registry);
}

fn spawn_component_watcher(client: kube::Client, registry: Arc<DefinitionRegistry>) {
    tokio::spawn(async move {
        let api: Api<ComponentDefinition> = Api::all(client);
        let mut stream = Box::pin(watcher::watcher(api, Config::default()).applied_objects());
        while let Some(event) = stream.next().await {
            match event {
                Ok(definition) => {
                    let name = definition.name_any();
                    if let Err(err) = registry.put(&name, DefinitionSpec::Component(definition.spec)).await {
                        tracing::warn!(%err, name, "failed to register ComponentDefinition");
                    }
                }
                Err(err) => tracing::warn!(%err, "ComponentDefinition watch stream error"),
            }
        }
    });
}

fn spawn_trait_watcher(client: kube::Client, registry: Arc<DefinitionRegistry>) {
    tokio::spawn(async move {
        let api: Api<TraitDefinition> = Api::all(client);
        let mut stream = Box::pin(watcher::watcher(api, Config::default()).applied_objects());
        while let Some(event) = stream.next().await {
            match event {
                Ok(definition) => {
                    let name = definition.name_any();
                    if let Err(err) = registry.put(&name, DefinitionSpec::Trait(definition.spec)).await {
                        tracing::warn!(%err, name, "failed to register TraitDefinition");
                    }
                }
                Err(err) => tracing::warn!(%err, "TraitDefinition watch stream error"),
            }
        }
    });
}

fn spawn_workflow_step_watcher(client: kube::Client, registry: Arc<DefinitionRegistry>) {
    tokio::spawn(async move {
        let api: Api<WorkflowStepDefinition> = Api::all(client);
        let mut stream = Box::pin(watcher::watcher(api, Config::default()).applied_objects());
        while let Some(event) = stream.next().await {
            match event {
                Ok(definition) => {
                    let name = definition.name_any();
                    if let Err(err) = registry.put(&name, DefinitionSpec::WorkflowStep(definition.spec)).await {
                        tracing::warn!(%err, name, "failed to register WorkflowStepDefinition");
                    }
                }
                Err(err) => tracing::warn!(%err, "WorkflowStepDefinition watch stream error"),
            }
        }
    });
}
