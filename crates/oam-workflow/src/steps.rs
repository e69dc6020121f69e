//! The built-in workflow step type library: the named step
//! types an Application's `workflow.steps[].type` may reference, each
//! expressed in terms of [`WorkflowPrimitive`] where one fits, or directly
//! against [`Handles`] for the handful (`list`-shaped steps, component
//! rendering, config bookkeeping) the primitive library doesn't cover.
//!
//! Property parsing is deliberately permissive: a missing optional property
//! falls back to the step's own placement/namespace, and only a genuinely
//! required property raises [`crate::error::Error::MalformedProperties`].

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use oam_dispatch::DeleteTarget;
use oam_types::{PlacementDecision, ResourceOwner, WorkflowStep};
use snafu::{OptionExt, ResultExt};

use crate::error::{InvalidTimeoutSnafu, MalformedPropertiesSnafu, Result, UnknownStepTypeSnafu};
use crate::primitive::{Handles, PrimitiveOutcome, WorkflowPrimitive};

type Properties = serde_json::Map<String, serde_json::Value>;

/// Executes one built-in step, dispatching on `step.type`. Property/shape
/// errors that mean the step was authored wrong return `Err`; runtime
/// failures against a live cluster or endpoint come back as
/// `Ok(PrimitiveOutcome::Failed(_))` so the caller applies the step's
/// `failure_policy` uniformly regardless of which step type produced them.
pub async fn execute_builtin(step: &WorkflowStep, default_placement: &PlacementDecision, handles: &Handles) -> Result<PrimitiveOutcome> {
    let name = step.name.as_str();
    let properties = &step.properties;

    match step.step_type.as_str() {
        "apply-component" => {
            let component = require_str(name, properties, "component")?.to_owned();
            let env = str_prop(properties, "env").map(str::to_owned);
            Ok(outcome_of(handles.components.apply_component(&component, env.as_deref()).await))
        }
        "deploy" => {
            let components = string_list(properties, "components");
            let env = str_prop(properties, "env").map(str::to_owned);
            Ok(outcome_of(handles.components.deploy(&components, env.as_deref()).await))
        }
        "deploy2env" => {
            let components = string_list(properties, "components");
            let env = require_str(name, properties, "env")?.to_owned();
            Ok(outcome_of(handles.components.deploy(&components, Some(&env)).await))
        }
        "apply-object" => {
            let manifest = require_value(name, properties, "value")?;
            let owner = owner_of(name, properties);
            let shared = bool_prop(properties, "shared");
            let primitive = WorkflowPrimitive::Apply {
                placement: placement_of(properties, default_placement),
                manifest,
                owner,
                shared,
            };
            Ok(primitive.execute(handles).await)
        }
        "read-object" => {
            let primitive = WorkflowPrimitive::Read {
                placement: placement_of(properties, default_placement),
                api_version: require_str(name, properties, "apiVersion")?.to_owned(),
                kind: require_str(name, properties, "kind")?.to_owned(),
                namespace: namespace_of(properties, default_placement),
                name: require_str(name, properties, "name")?.to_owned(),
            };
            Ok(primitive.execute(handles).await)
        }
        "export-data" => Ok(PrimitiveOutcome::Done(properties.get("value").cloned().unwrap_or(serde_json::Value::Null))),
        "export-service" => {
            let primitive = WorkflowPrimitive::Read {
                placement: placement_of(properties, default_placement),
                api_version: "v1".to_owned(),
                kind: "Service".to_owned(),
                namespace: namespace_of(properties, default_placement),
                name: require_str(name, properties, "name")?.to_owned(),
            };
            Ok(match primitive.execute(handles).await {
                PrimitiveOutcome::Done(service) => PrimitiveOutcome::Done(project_service(&service)),
                other => other,
            })
        }
        "export2config" => {
            let namespace = namespace_of(properties, default_placement);
            let config_name = require_str(name, properties, "name")?.to_owned();
            let data = string_map(properties, "data");
            let owner = owner_of(name, properties);
            let target = PlacementDecision {
                cluster: placement_of(properties, default_placement).cluster,
                namespace: namespace.clone(),
            };
            match handles.configs.create(&target, &namespace, &config_name, owner, &data).await {
                Ok(()) => Ok(PrimitiveOutcome::Done(serde_json::json!({ "name": config_name }))),
                Err(source) => Ok(PrimitiveOutcome::Failed(source.to_string())),
            }
        }
        "export2secret" => {
            let namespace = namespace_of(properties, default_placement);
            let secret_name = require_str(name, properties, "name")?.to_owned();
            let data = string_map(properties, "data");
            let owner = owner_of(name, properties);
            let shared = bool_prop(properties, "shared");
            let primitive = WorkflowPrimitive::Apply {
                placement: PlacementDecision {
                    cluster: placement_of(properties, default_placement).cluster,
                    namespace: namespace.clone(),
                },
                manifest: secret_manifest(&secret_name, &namespace, &data),
                owner,
                shared,
            };
            Ok(primitive.execute(handles).await)
        }
        "notification" | "request" | "webhook" | "build-push-image" => {
            let method = str_prop(properties, "method").unwrap_or("POST").to_owned();
            let url = require_str(name, properties, "url")?.to_owned();
            let body = properties.get("body").cloned();
            let headers = string_map(properties, "headers");
            let primitive = WorkflowPrimitive::HttpDo { method, url, body, headers };
            Ok(primitive.execute(handles).await)
        }
        "suspend" => {
            let message = str_prop(properties, "message").map(str::to_owned);
            let duration = str_prop(properties, "duration")
                .map(oam_core::time::parse_duration)
                .transpose()
                .context(InvalidTimeoutSnafu { step: name.to_owned() })?;
            let primitive = WorkflowPrimitive::Suspend { message, duration };
            Ok(primitive.execute(handles).await)
        }
        "restart-workflow" => Ok(PrimitiveOutcome::Done(serde_json::json!({ "restartWorkflow": true }))),
        "check-metrics" => {
            let url = require_str(name, properties, "metricsUrl")?.to_owned();
            let condition = require_str(name, properties, "condition")?.to_owned();
            let headers = string_map(properties, "headers");
            let primitive = WorkflowPrimitive::HttpDo { method: "GET".to_owned(), url, body: None, headers };
            match primitive.execute(handles).await {
                PrimitiveOutcome::Done(value) => match evaluate_metric_condition(name, &condition, &value) {
                    Ok(true) => Ok(PrimitiveOutcome::Done(value)),
                    Ok(false) => Ok(PrimitiveOutcome::Waiting(Some(format!("metrics condition {condition:?} not yet satisfied")))),
                    Err(message) => Ok(PrimitiveOutcome::Failed(message)),
                },
                other => Ok(other),
            }
        }
        "clean-jobs" => {
            let primitive = WorkflowPrimitive::Delete {
                placement: placement_of(properties, default_placement),
                api_version: "batch/v1".to_owned(),
                kind: "Job".to_owned(),
                namespace: namespace_of(properties, default_placement),
                target: DeleteTarget::LabelSelector(label_selector(properties, "labelSelector")),
            };
            Ok(primitive.execute(handles).await)
        }
        "collect-service-endpoints" => {
            let selector = label_selector(properties, "labelSelector");
            let namespace = namespace_of(properties, default_placement);
            let target = placement_of(properties, default_placement);
            match handles.resources.list(&target, "v1", "Service", &namespace, &selector).await {
                Ok(services) => Ok(PrimitiveOutcome::Done(serde_json::Value::Array(
                    services.iter().map(project_service).collect(),
                ))),
                Err(source) => Ok(PrimitiveOutcome::Failed(source.to_string())),
            }
        }
        "depends-on-app" => {
            let app_name = require_str(name, properties, "name")?.to_owned();
            let namespace = namespace_of(properties, default_placement);
            let target = placement_of(properties, default_placement);
            match handles.resources.read(&target, "core.oam.dev/v1beta1", "Application", &namespace, &app_name).await {
                Ok(Some(app)) => {
                    let phase = app.pointer("/status/status").and_then(serde_json::Value::as_str).unwrap_or("initializing");
                    if phase == "running" {
                        Ok(PrimitiveOutcome::Done(app))
                    } else {
                        Ok(PrimitiveOutcome::Waiting(Some(format!("application {app_name:?} is {phase}"))))
                    }
                }
                Ok(None) => Ok(PrimitiveOutcome::Waiting(Some(format!("application {app_name:?} not found")))),
                Err(source) => Ok(PrimitiveOutcome::Failed(source.to_string())),
            }
        }
        "create-config" => {
            let namespace = namespace_of(properties, default_placement);
            let config_name = require_str(name, properties, "name")?.to_owned();
            let data = string_map(properties, "config");
            let owner = owner_of(name, properties);
            let target = PlacementDecision {
                cluster: placement_of(properties, default_placement).cluster,
                namespace: namespace.clone(),
            };
            match handles.configs.create(&target, &namespace, &config_name, owner, &data).await {
                Ok(()) => Ok(PrimitiveOutcome::Done(serde_json::json!({ "name": config_name }))),
                Err(source) => Ok(PrimitiveOutcome::Failed(source.to_string())),
            }
        }
        "read-config" => {
            let namespace = namespace_of(properties, default_placement);
            let config_name = require_str(name, properties, "name")?.to_owned();
            let target = placement_of(properties, default_placement);
            match handles.configs.read(&target, &namespace, &config_name).await {
                Ok(Some(data)) => Ok(PrimitiveOutcome::Done(serde_json::to_value(data).unwrap_or(serde_json::Value::Null))),
                Ok(None) => Ok(PrimitiveOutcome::Done(serde_json::Value::Null)),
                Err(source) => Ok(PrimitiveOutcome::Failed(source.to_string())),
            }
        }
        "delete-config" => {
            let namespace = namespace_of(properties, default_placement);
            let config_name = require_str(name, properties, "name")?.to_owned();
            let target = placement_of(properties, default_placement);
            match handles.configs.delete(&target, &namespace, &config_name).await {
                Ok(()) => Ok(PrimitiveOutcome::Done(serde_json::Value::Null)),
                Err(source) => Ok(PrimitiveOutcome::Failed(source.to_string())),
            }
        }
        "list-config" => {
            let namespace = namespace_of(properties, default_placement);
            let target = placement_of(properties, default_placement);
            match handles.configs.list(&target, &namespace).await {
                Ok(names) => Ok(PrimitiveOutcome::Done(serde_json::json!(names))),
                Err(source) => Ok(PrimitiveOutcome::Failed(source.to_string())),
            }
        }
        other => UnknownStepTypeSnafu {
            step: name.to_owned(),
            step_type: other.to_owned(),
        }
        .fail(),
    }
}

fn outcome_of(result: std::result::Result<serde_json::Value, String>) -> PrimitiveOutcome {
    match result {
        Ok(value) => PrimitiveOutcome::Done(value),
        Err(message) => PrimitiveOutcome::Failed(message),
    }
}

fn str_prop<'a>(properties: &'a Properties, key: &str) -> Option<&'a str> {
    properties.get(key).and_then(serde_json::Value::as_str)
}

fn bool_prop(properties: &Properties, key: &str) -> bool {
    properties.get(key).and_then(serde_json::Value::as_bool).unwrap_or(false)
}

fn require_str<'a>(step: &str, properties: &'a Properties, key: &str) -> Result<&'a str> {
    str_prop(properties, key).context(MalformedPropertiesSnafu {
        step: step.to_owned(),
        message: format!("missing required string property {key:?}"),
    })
}

fn require_value(step: &str, properties: &Properties, key: &str) -> Result<serde_json::Value> {
    properties.get(key).cloned().context(MalformedPropertiesSnafu {
        step: step.to_owned(),
        message: format!("missing required property {key:?}"),
    })
}

fn string_list(properties: &Properties, key: &str) -> Vec<String> {
    properties
        .get(key)
        .and_then(serde_json::Value::as_array)
        .map(|items| items.iter().filter_map(|item| item.as_str().map(str::to_owned)).collect())
        .unwrap_or_default()
}

fn string_map(properties: &Properties, key: &str) -> BTreeMap<String, String> {
    properties
        .get(key)
        .and_then(serde_json::Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(field, value)| value.as_str().map(|value| (field.clone(), value.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}

fn label_selector(properties: &Properties, key: &str) -> BTreeMap<String, String> {
    string_map(properties, key)
}

fn namespace_of(properties: &Properties, default_placement: &PlacementDecision) -> String {
    str_prop(properties, "namespace").unwrap_or(&default_placement.namespace).to_owned()
}

fn placement_of(properties: &Properties, default_placement: &PlacementDecision) -> PlacementDecision {
    PlacementDecision {
        cluster: str_prop(properties, "cluster").unwrap_or(&default_placement.cluster).to_owned(),
        namespace: namespace_of(properties, default_placement),
    }
}

fn owner_of(step: &str, properties: &Properties) -> ResourceOwner {
    ResourceOwner {
        component: str_prop(properties, "component").unwrap_or(step).to_owned(),
        r#trait: None,
    }
}

fn project_service(service: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "name": service.pointer("/metadata/name").cloned().unwrap_or(serde_json::Value::Null),
        "clusterIP": service.pointer("/spec/clusterIP").cloned().unwrap_or(serde_json::Value::Null),
        "ports": service.pointer("/spec/ports").cloned().unwrap_or(serde_json::Value::Null),
    })
}

/// Evaluates a `check-metrics` step's boolean `condition` expression against
/// the scraped response, bound as `value`: a gating step that keeps
/// `waiting` until a metrics query satisfies a threshold expression, used by
/// canary/progressive-rollout traits between `deploy` steps.
fn evaluate_metric_condition(step: &str, condition: &str, value: &serde_json::Value) -> std::result::Result<bool, String> {
    let (rest, ast) = oam_expr::parser::expr(condition.trim())
        .map_err(|_| format!("step {step:?}: could not parse check-metrics condition {condition:?}"))?;
    if !rest.trim().is_empty() {
        return Err(format!("step {step:?}: trailing input after check-metrics condition {condition:?}"));
    }
    let scope = oam_expr::Scope::new().bind("value", oam_expr::Value::from(value.clone()));
    oam_expr::eval_expr(&ast, &scope, step)
        .map(|evaluated| evaluated.is_truthy())
        .map_err(|err| format!("step {step:?}: check-metrics condition failed to evaluate: {err}"))
}

fn secret_manifest(name: &str, namespace: &str, data: &BTreeMap<String, String>) -> serde_json::Value {
    let encoded: BTreeMap<&String, String> = data.iter().map(|(key, value)| (key, BASE64.encode(value))).collect();
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace },
        "type": "Opaque",
        "data": encoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_service_into_endpoint_summary() {
        let service = serde_json::json!({
            "metadata": { "name": "frontend" },
            "spec": { "clusterIP": "10.0.0.5", "ports": [{ "port": 80 }] },
        });
        let projected = project_service(&service);
        assert_eq!(projected["name"], "frontend");
        assert_eq!(projected["clusterIP"], "10.0.0.5");
    }

    #[test]
    fn namespace_of_falls_back_to_default_placement() {
        let default_placement = PlacementDecision::control_plane("prod");
        let properties = Properties::new();
        assert_eq!(namespace_of(&properties, &default_placement), "prod");
    }

    #[test]
    fn namespace_of_prefers_explicit_property() {
        let default_placement = PlacementDecision::control_plane("prod");
        let mut properties = Properties::new();
        properties.insert("namespace".to_owned(), serde_json::Value::String("staging".to_owned()));
        assert_eq!(namespace_of(&properties, &default_placement), "staging");
    }
}
