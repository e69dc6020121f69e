//! Integration coverage for the trait-patch strategic-merge scenario: a
//! `sidecar` trait patches a `webservice` component's container list by the
//! `name` key, and re-rendering the same Application/Definition pair must
//! produce the same two-container list every time (idempotence of merge,
//! determinism of render).

use async_trait::async_trait;
use indexmap::IndexMap;

use oam_render::{
    ProcessingClient, RenderContext, ResolvedApplication, ResolvedComponent, ResolvedTrait, render_components,
};
use oam_types::{
    Component, ComponentDefinitionSpec, ComponentTrait, Schematic, TraitDefinitionSpec, WorkloadGroupVersionKind,
    WorkloadTypeDescriptor,
};

struct UnusedProcessingClient;

#[async_trait]
impl ProcessingClient for UnusedProcessingClient {
    async fn call(
        &self,
        _method: &str,
        _url: &str,
        _body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, String> {
        Err("no trait in this fixture declares a processing block".to_owned())
    }
}

fn webservice_definition() -> ComponentDefinitionSpec {
    ComponentDefinitionSpec {
        version: "1.0.0".into(),
        workload: WorkloadTypeDescriptor {
            definition: Some(WorkloadGroupVersionKind {
                api_version: "apps/v1".into(),
                kind: "Deployment".into(),
            }),
            r#type: None,
        },
        schematic: Schematic {
            template: r#"
                parameter: { image: "app:1" }
                output: {
                    apiVersion: "apps/v1"
                    kind: "Deployment"
                    metadata: { name: context.name }
                    spec: {
                        template: {
                            spec: {
                                containers: [ { name: "main", image: parameter.image } ]
                            }
                        }
                    }
                }
            "#
            .into(),
        },
        status: None,
    }
}

fn sidecar_definition() -> TraitDefinitionSpec {
    TraitDefinitionSpec {
        version: "1.0.0".into(),
        applies_to_workloads: vec!["*".into()],
        conflicts_with: vec![],
        pod_disruptive: false,
        schematic: Schematic {
            template: r#"
                patch: {
                    spec: {
                        template: {
                            spec: {
                                "$patchKey/containers": "name"
                                containers: [ { name: "fluentd", image: "fluentd:1" } ]
                            }
                        }
                    }
                }
            "#
            .into(),
        },
        status: None,
    }
}

fn resolved_application() -> ResolvedApplication {
    let component = Component {
        name: "frontend".into(),
        component_type: "webservice".into(),
        properties: serde_json::Map::new(),
        traits: vec![ComponentTrait {
            trait_type: "sidecar".into(),
            properties: serde_json::Map::new(),
        }],
        depends_on: Vec::new(),
    };

    let resolved_trait = ResolvedTrait {
        component_trait: component.traits[0].clone(),
        definition: sidecar_definition(),
    };

    let resolved_component = ResolvedComponent {
        component,
        definition: webservice_definition(),
        traits: vec![resolved_trait],
    };

    let mut components = IndexMap::new();
    components.insert("frontend".to_owned(), resolved_component);
    ResolvedApplication {
        order: vec!["frontend".to_owned()],
        components,
    }
}

fn containers_of(manifest: &serde_json::Value) -> &Vec<serde_json::Value> {
    manifest["spec"]["template"]["spec"]["containers"]
        .as_array()
        .expect("patched workload manifest carries a containers list")
}

#[tokio::test]
async fn strategic_merge_appends_sidecar_without_duplicating_main_container() {
    let resolved = resolved_application();
    let processing_client = UnusedProcessingClient;
    let ctx = RenderContext {
        application_name: "website",
        namespace: "default",
        app_revision: "website-v1",
        app_revision_num: 1,
        processing_client: &processing_client,
    };

    let renders = render_components(&resolved, &ctx).await.expect("render succeeds");
    let workload = &renders[0].workload.as_ref().expect("primary workload rendered").manifest;
    let containers = containers_of(workload);

    assert_eq!(containers.len(), 2, "main container plus the patched-in sidecar, no duplicates");
    assert_eq!(containers[0]["name"], "main");
    assert_eq!(containers[0]["image"], "app:1");
    assert_eq!(containers[1]["name"], "fluentd");
    assert_eq!(containers[1]["image"], "fluentd:1");
}

#[tokio::test]
async fn re_rendering_the_same_application_is_deterministic() {
    let resolved = resolved_application();
    let processing_client = UnusedProcessingClient;
    let ctx = RenderContext {
        application_name: "website",
        namespace: "default",
        app_revision: "website-v1",
        app_revision_num: 1,
        processing_client: &processing_client,
    };

    let first = render_components(&resolved, &ctx).await.expect("render succeeds");
    let second = render_components(&resolved, &ctx).await.expect("render succeeds");

    let first_workload = &first[0].workload.as_ref().unwrap().manifest;
    let second_workload = &second[0].workload.as_ref().unwrap().manifest;
    assert_eq!(first_workload, second_workload, "re-rendering the same inputs is referentially transparent");
    assert_eq!(
        containers_of(first_workload).len(),
        2,
        "merging the same patch twice over two independent renders never duplicates elements"
    );
}
