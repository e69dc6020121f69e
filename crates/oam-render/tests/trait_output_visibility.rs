//! A later trait must see an earlier trait's own `outputs.<key>` through
//! `context.outputs`, not just the component definition's own outputs
//! (spec ordering guarantee: "trait `n` may read `context.output` ... and
//! `context.outputs.<key>` of traits 0..n-1").

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
                output: {
                    apiVersion: "apps/v1"
                    kind: "Deployment"
                    metadata: { name: context.name }
                }
            "#
            .into(),
        },
        status: None,
    }
}

fn first_trait_definition() -> TraitDefinitionSpec {
    TraitDefinitionSpec {
        version: "1.0.0".into(),
        applies_to_workloads: vec!["*".into()],
        conflicts_with: vec![],
        pod_disruptive: false,
        schematic: Schematic {
            template: r#"
                outputs: {
                    marker: { apiVersion: "v1", kind: "ConfigMap", data: { tag: "from-first-trait" } }
                }
            "#
            .into(),
        },
        status: None,
    }
}

fn second_trait_definition() -> TraitDefinitionSpec {
    TraitDefinitionSpec {
        version: "1.0.0".into(),
        applies_to_workloads: vec!["*".into()],
        conflicts_with: vec![],
        pod_disruptive: false,
        schematic: Schematic {
            // References the first trait's own `outputs.marker`, which only
            // exists in `context.outputs` if the renderer folds each
            // trait's outputs back into the scope before the next trait runs.
            template: r#"
                outputs: {
                    derived: { apiVersion: "v1", kind: "ConfigMap", data: { tag: context.outputs.marker.data.tag } }
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
        traits: vec![
            ComponentTrait {
                trait_type: "first".into(),
                properties: serde_json::Map::new(),
            },
            ComponentTrait {
                trait_type: "second".into(),
                properties: serde_json::Map::new(),
            },
        ],
        depends_on: Vec::new(),
    };

    let traits = vec![
        ResolvedTrait {
            component_trait: component.traits[0].clone(),
            definition: first_trait_definition(),
        },
        ResolvedTrait {
            component_trait: component.traits[1].clone(),
            definition: second_trait_definition(),
        },
    ];

    let resolved_component = ResolvedComponent {
        component,
        definition: webservice_definition(),
        traits,
    };

    let mut components = IndexMap::new();
    components.insert("frontend".to_owned(), resolved_component);
    ResolvedApplication {
        order: vec!["frontend".to_owned()],
        components,
    }
}

#[tokio::test]
async fn later_trait_reads_earlier_traits_outputs_through_context() {
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
    let auxiliary = &renders[0].auxiliary;

    let derived = auxiliary
        .iter()
        .find(|resource| resource.logical_name == "derived")
        .expect("second trait's outputs.derived resource is rendered");

    assert_eq!(
        derived.manifest["data"]["tag"], "from-first-trait",
        "context.outputs.marker from the first trait must be visible while rendering the second trait's outputs"
    );
}
