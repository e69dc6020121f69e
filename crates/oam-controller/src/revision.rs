//! `ApplicationRevision` naming, content-hashing, creation, and retention.
//! Keeps controller bookkeeping as CRD-shaped companion objects owned by
//! the primary resource rather than an external store, with simple
//! count-based garbage collection.

use std::collections::BTreeSet;

use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use oam_render::ResolvedApplication;
use oam_types::{Application, ApplicationRevision, ApplicationRevisionSpec, ApplicationSpec};
use snafu::ResultExt;

use crate::error::{Error, KubeSnafu, OwnerReferenceSnafu, Result};

const FIELD_MANAGER: &str = "oam-controller";

/// Builds the `{kind}/{name}@{version}` manifest a revision records, one
/// entry per component/trait Definition the render pipeline actually
/// resolved for this generation.
pub fn resolved_definitions(resolved: &ResolvedApplication) -> Vec<String> {
    let mut entries = BTreeSet::new();
    for resolved_component in resolved.components.values() {
        entries.insert(format!(
            "Component/{}@{}",
            resolved_component.component.component_type, resolved_component.definition.version
        ));
        for resolved_trait in &resolved_component.traits {
            entries.insert(format!(
                "Trait/{}@{}",
                resolved_trait.component_trait.trait_type, resolved_trait.definition.version
            ));
        }
    }
    entries.into_iter().collect()
}

/// Parses the `<app>-v<N>` naming convention back into `N`, so the caller
/// can pick the next revision number without re-deriving it from
/// `metadata.generation` — which, unlike the revision counter, does not
/// advance on an annotation-only change such as a `publish-version` bump.
pub fn parse_revision_number(latest_revision: Option<&str>) -> i64 {
    latest_revision
        .and_then(|name| name.rsplit_once("-v"))
        .and_then(|(_, suffix)| suffix.parse().ok())
        .unwrap_or(0)
}

/// Creates (or, for an unchanged `revision_number`, leaves alone) the
/// `ApplicationRevision` named `<app>-v<revision_number>`. Returns
/// `(name, content_hash)`.
pub async fn record_revision(
    client: &kube::Client,
    application: &Application,
    application_spec: &ApplicationSpec,
    resolved_definitions: Vec<String>,
    revision_number: i64,
) -> Result<(String, String)> {
    let namespace = application.namespace().ok_or_else(|| Error::MissingNamespace {
        name: application.name_any(),
    })?;
    let app_name = application.name_any();
    let name = ApplicationRevisionSpec::name_for(&app_name, revision_number);
    let content_hash = ApplicationRevisionSpec::content_hash(application_spec, &resolved_definitions);

    let owner = application.controller_owner_ref(&()).context(OwnerReferenceSnafu {
        name: app_name.clone(),
    })?;

    let revision = ApplicationRevision {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: ApplicationRevisionSpec {
            application: app_name,
            generation: revision_number,
            application_spec: application_spec.clone(),
            resolved_definitions,
            content_hash: content_hash.clone(),
        },
    };

    let api: Api<ApplicationRevision> = Api::namespaced(client.clone(), &namespace);
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&revision))
        .await
        .context(KubeSnafu)?;

    Ok((name, content_hash))
}

/// Deletes every `ApplicationRevision` belonging to `app_name` beyond the
/// most recent `limit` generations.
pub async fn garbage_collect(client: &kube::Client, namespace: &str, app_name: &str, limit: usize) -> Result<()> {
    let api: Api<ApplicationRevision> = Api::namespaced(client.clone(), namespace);
    let list = api.list(&Default::default()).await.context(KubeSnafu)?;
    let mut owned: Vec<_> = list.into_iter().filter(|revision| revision.spec.application == app_name).collect();
    if owned.len() <= limit {
        return Ok(());
    }
    owned.sort_by_key(|revision| revision.spec.generation);
    let excess = owned.len() - limit;

    for revision in owned.into_iter().take(excess) {
        let name = revision.name_any();
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(response)) if response.code == 404 => {}
            Err(source) => return Err(Error::Kube { source }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oam_types::Schematic;

    #[test]
    fn resolved_definitions_dedupe_and_sort() {
        use oam_render::{ResolvedComponent, ResolvedTrait};
        use oam_types::{Component, ComponentDefinitionSpec, ComponentTrait, TraitDefinitionSpec, WorkloadTypeDescriptor};

        let component_def = ComponentDefinitionSpec {
            version: "1.0.0".into(),
            workload: WorkloadTypeDescriptor { definition: None, r#type: Some("webservice".into()) },
            schematic: Schematic { template: String::new() },
            status: None,
        };
        let trait_def = TraitDefinitionSpec {
            version: "2.0.0".into(),
            applies_to_workloads: vec![],
            conflicts_with: vec![],
            pod_disruptive: false,
            schematic: Schematic { template: String::new() },
            status: None,
        };

        let mut components = indexmap::IndexMap::new();
        components.insert(
            "frontend".to_owned(),
            ResolvedComponent {
                component: Component {
                    name: "frontend".into(),
                    component_type: "webservice".into(),
                    properties: Default::default(),
                    traits: vec![],
                    depends_on: vec![],
                },
                definition: component_def,
                traits: vec![ResolvedTrait {
                    component_trait: ComponentTrait {
                        trait_type: "scaler".into(),
                        properties: Default::default(),
                    },
                    definition: trait_def,
                }],
            },
        );
        let resolved = ResolvedApplication {
            order: vec!["frontend".to_owned()],
            components,
        };

        let entries = resolved_definitions(&resolved);
        assert_eq!(entries, vec!["Component/webservice@1.0.0".to_owned(), "Trait/scaler@2.0.0".to_owned()]);
    }
}
