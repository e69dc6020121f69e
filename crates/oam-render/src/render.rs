//! Evaluates a resolved Application into a [`ComponentRender`] per
//! component: binds `parameter`/`context`, evaluates `output`/`outputs`,
//! folds each trait's `processing` and `patch` on top in declaration order.

use async_trait::async_trait;
use indexmap::IndexMap;
use oam_core::kvp;
use oam_expr::ast::RecordField;
use oam_expr::{Scope, Value, eval_record};

use crate::error::Error;
use crate::patch;
use crate::plan::{ComponentRender, RenderedResource, ResourceOrigin, StatusContext};
use crate::resolver::{ResolvedApplication, ResolvedComponent, ResolvedTrait};
use crate::Result;

/// Side-effecting HTTP call a trait's `processing` block may issue. Kept as
/// a trait so tests can supply a canned response instead of reaching the
/// network.
#[async_trait]
pub trait ProcessingClient: Send + Sync {
    async fn call(
        &self,
        method: &str,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, String>;
}

/// The production [`ProcessingClient`], backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestProcessingClient {
    client: reqwest::Client,
}

#[async_trait]
impl ProcessingClient for ReqwestProcessingClient {
    async fn call(
        &self,
        method: &str,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, String> {
        let mut builder = match method.to_ascii_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            other => return Err(format!("unsupported HTTP method {other:?}")),
        };
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await.map_err(|err| err.to_string())?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| err.to_string())
    }
}

/// Values a render pass needs from the caller and cannot derive from the
/// Application spec alone.
pub struct RenderContext<'a> {
    pub application_name: &'a str,
    pub namespace: &'a str,
    pub app_revision: &'a str,
    pub app_revision_num: i64,
    pub processing_client: &'a dyn ProcessingClient,
}

pub async fn render_components(
    resolved: &ResolvedApplication,
    ctx: &RenderContext<'_>,
) -> Result<Vec<ComponentRender>> {
    let mut renders = Vec::with_capacity(resolved.order.len());
    for name in &resolved.order {
        let resolved_component = resolved
            .components
            .get(name)
            .expect("resolver only orders components it also resolved");
        renders.push(render_component(resolved_component, ctx).await?);
    }
    Ok(renders)
}

async fn render_component(
    resolved: &ResolvedComponent,
    ctx: &RenderContext<'_>,
) -> Result<ComponentRender> {
    let component = &resolved.component;
    let fields = oam_expr::parse_template(&resolved.definition.schematic.template)
        .map_err(|source| Error::ParseError {
            component: component.name.clone(),
            source,
        })?;
    let blocks = oam_expr::TemplateBlocks::from_fields(&fields);

    let user_properties = Value::from(serde_json::Value::Object(component.properties.clone()));
    let parameter = oam_expr::template::bind_parameter(
        blocks.parameter.as_deref().unwrap_or(&[]),
        &user_properties,
    )
    .map_err(|err| Error::from_eval(&component.name, err))?;

    let mut context_fields = IndexMap::new();
    context_fields.insert("name".to_owned(), Value::String(component.name.clone()));
    context_fields.insert("appName".to_owned(), Value::String(ctx.application_name.to_owned()));
    context_fields.insert("namespace".to_owned(), Value::String(ctx.namespace.to_owned()));
    context_fields.insert("appRevision".to_owned(), Value::String(ctx.app_revision.to_owned()));
    context_fields.insert("appRevisionNum".to_owned(), Value::Int(ctx.app_revision_num));
    context_fields.insert("output".to_owned(), Value::Null);
    context_fields.insert("outputs".to_owned(), Value::Record(IndexMap::new()));

    let mut scope = Scope::new()
        .bind("parameter", parameter)
        .bind("context", Value::Record(context_fields));

    let workload_labels = kvp::workload_labels(ctx.application_name, &component.name, &component.component_type);

    let mut workload_manifest = eval_record(blocks.output.as_deref().unwrap_or(&[]), &scope, "output")
        .map_err(|err| Error::from_eval(&component.name, err))?;
    let mut workload = value_to_resource(
        workload_manifest.clone(),
        ResourceOrigin {
            component: component.name.clone(),
            r#trait: None,
        },
        "output".to_owned(),
        Some(component.component_type.clone()),
        workload_labels.clone(),
        ctx.namespace,
    );

    let mut auxiliary = Vec::new();
    let mut outputs_scope = IndexMap::new();
    let mut trait_statuses = IndexMap::new();
    for (key, output_fields) in &blocks.outputs {
        let rendered = eval_record(output_fields, &scope, &format!("outputs.{key}"))
            .map_err(|err| Error::from_eval(&component.name, err))?;
        outputs_scope.insert(key.clone(), rendered.clone());
        let labels = kvp::auxiliary_labels(ctx.application_name, &component.name, key);
        auxiliary.push(value_to_resource(
            rendered,
            ResourceOrigin {
                component: component.name.clone(),
                r#trait: None,
            },
            key.clone(),
            None,
            labels,
            ctx.namespace,
        ));
    }

    set_context_output(&mut scope, workload_manifest.clone(), Value::Record(outputs_scope.clone()));

    for resolved_trait in &resolved.traits {
        let ResolvedTrait {
            component_trait,
            definition,
        } = resolved_trait;

        let trait_fields = oam_expr::parse_template(&definition.schematic.template)
            .map_err(|source| Error::ParseError {
                component: component.name.clone(),
                source,
            })?;
        let trait_blocks = oam_expr::TemplateBlocks::from_fields(&trait_fields);

        let trait_user_properties =
            Value::from(serde_json::Value::Object(component_trait.properties.clone()));
        let trait_parameter = oam_expr::template::bind_parameter(
            trait_blocks.parameter.as_deref().unwrap_or(&[]),
            &trait_user_properties,
        )
        .map_err(|err| Error::from_eval(&component.name, err))?;

        let mut trait_scope = scope.clone().bind("parameter", trait_parameter);

        if let Some(processing_fields) = &trait_blocks.processing {
            let processing_request = eval_record(processing_fields, &trait_scope, "processing")
                .map_err(|err| Error::from_eval(&component.name, err))?;
            let processing_output = run_processing(&component.name, &component_trait.trait_type, &processing_request, ctx).await?;
            let mut processing_record = IndexMap::new();
            processing_record.insert("output".to_owned(), Value::from(processing_output));
            trait_scope = trait_scope.bind("processing", Value::Record(processing_record));
        }

        let resource_prefix = format!("traits.{}", component_trait.trait_type);
        for (key, output_fields) in &trait_blocks.outputs {
            let rendered = eval_record(output_fields, &trait_scope, &format!("{resource_prefix}.outputs.{key}"))
                .map_err(|err| Error::from_eval(&component.name, err))?;
            outputs_scope.insert(key.clone(), rendered.clone());
            let labels = kvp::trait_labels(ctx.application_name, &component.name, &component_trait.trait_type, key);
            auxiliary.push(value_to_resource(
                rendered,
                ResourceOrigin {
                    component: component.name.clone(),
                    r#trait: Some(component_trait.trait_type.clone()),
                },
                key.clone(),
                None,
                labels,
                ctx.namespace,
            ));
        }
        if let Some(output_fields) = &trait_blocks.output {
            let rendered = eval_record(output_fields, &trait_scope, &format!("{resource_prefix}.output"))
                .map_err(|err| Error::from_eval(&component.name, err))?;
            let labels = kvp::trait_labels(
                ctx.application_name,
                &component.name,
                &component_trait.trait_type,
                &component_trait.trait_type,
            );
            auxiliary.push(value_to_resource(
                rendered,
                ResourceOrigin {
                    component: component.name.clone(),
                    r#trait: Some(component_trait.trait_type.clone()),
                },
                component_trait.trait_type.clone(),
                None,
                labels,
                ctx.namespace,
            ));
        }

        if let Some(patch_fields) = &trait_blocks.patch {
            let patch_value = eval_record(patch_fields, &trait_scope, &format!("{resource_prefix}.patch"))
                .map_err(|err| Error::from_eval(&component.name, err))?;
            let patch_json: serde_json::Value = patch_value.into();
            workload_manifest = Value::from(patch::merge(
                &component.name,
                "",
                &serde_json::Value::from(workload_manifest.clone()),
                &patch_json,
            )?);
            workload = value_to_resource(
                workload_manifest.clone(),
                ResourceOrigin {
                    component: component.name.clone(),
                    r#trait: None,
                },
                "output".to_owned(),
                Some(component.component_type.clone()),
                workload_labels.clone(),
                ctx.namespace,
            );
        }

        set_context_output(&mut scope, workload_manifest.clone(), Value::Record(outputs_scope.clone()));

        let trait_status = if trait_blocks.health_policy.is_some()
            || trait_blocks.custom_status.is_some()
            || trait_blocks.status_details.is_some()
        {
            Some(StatusContext {
                health_policy: trait_blocks.health_policy.clone(),
                custom_status: trait_blocks.custom_status.clone(),
                status_details: trait_blocks.status_details.clone(),
                scope: trait_scope,
            })
        } else {
            None
        };
        // trait_status recorded below once all traits have applied their patches.
        trait_statuses.insert(component_trait.trait_type.clone(), trait_status);
    }

    let component_status = if blocks.health_policy.is_some()
        || blocks.custom_status.is_some()
        || blocks.status_details.is_some()
    {
        Some(StatusContext {
            health_policy: blocks.health_policy.clone(),
            custom_status: blocks.custom_status.clone(),
            status_details: blocks.status_details.clone(),
            scope: scope.clone(),
        })
    } else {
        None
    };

    Ok(ComponentRender {
        name: component.name.clone(),
        workload_type: component.component_type.clone(),
        workload: Some(workload),
        auxiliary,
        component_status,
        trait_statuses: trait_statuses
            .into_iter()
            .filter_map(|(k, v)| v.map(|status| (k, status)))
            .collect(),
    })
}

async fn run_processing(
    component: &str,
    trait_type: &str,
    request: &Value,
    ctx: &RenderContext<'_>,
) -> Result<serde_json::Value> {
    let record = request.as_record().ok_or_else(|| Error::ProcessingFailed {
        component: component.to_owned(),
        trait_type: trait_type.to_owned(),
        message: "processing block must evaluate to a record".to_owned(),
    })?;
    let method = record
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_owned();
    let url = record
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ProcessingFailed {
            component: component.to_owned(),
            trait_type: trait_type.to_owned(),
            message: "processing block is missing a url".to_owned(),
        })?
        .to_owned();
    let body = record.get("body").cloned().map(serde_json::Value::from);

    ctx.processing_client
        .call(&method, &url, body)
        .await
        .map_err(|message| Error::ProcessingFailed {
            component: component.to_owned(),
            trait_type: trait_type.to_owned(),
            message,
        })
}

fn set_context_output(scope: &mut Scope, output: Value, outputs: Value) {
    let updated = match scope.get("context") {
        Some(Value::Record(fields)) => {
            let mut fields = fields.clone();
            fields.insert("output".to_owned(), output);
            fields.insert("outputs".to_owned(), outputs);
            Value::Record(fields)
        }
        _ => Value::Record(IndexMap::new()),
    };
    *scope = scope.clone().bind("context", updated);
}

fn value_to_resource(
    value: Value,
    origin: ResourceOrigin,
    logical_name: String,
    workload_type: Option<String>,
    labels: kvp::KeyValuePairs,
    namespace: &str,
) -> RenderedResource {
    let mut manifest: serde_json::Value = value.into();
    let cross_namespace = apply_namespace_and_labels(&mut manifest, namespace, labels);
    RenderedResource {
        origin,
        logical_name,
        workload_type,
        manifest,
        cross_namespace,
    }
}

/// Fills `metadata.namespace` with the Application's namespace unless the
/// manifest already declares a different one, and merges in the required
/// label set. Returns whether the final namespace differs from the
/// Application's own.
fn apply_namespace_and_labels(
    manifest: &mut serde_json::Value,
    namespace: &str,
    labels: kvp::KeyValuePairs,
) -> bool {
    let metadata = manifest
        .as_object_mut()
        .map(|root| {
            root.entry("metadata")
                .or_insert_with(|| serde_json::json!({}))
        })
        .and_then(|m| m.as_object_mut());

    let Some(metadata) = metadata else {
        return false;
    };

    let existing_namespace = metadata.get("namespace").and_then(|v| v.as_str()).map(str::to_owned);
    let cross_namespace = match &existing_namespace {
        Some(existing) if existing != namespace => true,
        _ => false,
    };
    if existing_namespace.is_none() {
        metadata.insert("namespace".to_owned(), serde_json::Value::String(namespace.to_owned()));
    }

    let label_map = metadata
        .entry("labels")
        .or_insert_with(|| serde_json::json!({}));
    if let Some(label_object) = label_map.as_object_mut() {
        for (key, value) in labels.into_map() {
            label_object.insert(key, serde_json::Value::String(value));
        }
    }

    cross_namespace
}
