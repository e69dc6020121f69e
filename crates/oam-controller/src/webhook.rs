//! Scoped-down admission webhook: validates Component/Trait/WorkflowStep
//! Definitions against the same immutability rule the Definition Registry
//! enforces on `put`, at the cluster boundary rather than only once an
//! in-process watch event lands. Deliberately thinner than a full
//! `stackable-webhook`-style crate: no TLS termination or certificate rotation here,
//! since this handler is meant to sit behind a terminating proxy rather than
//! own the `ValidatingWebhookConfiguration` lifecycle itself.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};

use oam_registry::{DefinitionRegistry, DefinitionSpec};
use oam_types::{ComponentDefinition, TraitDefinition, WorkflowStepDefinition};

/// Mounts one POST route per Definition kind under `/validate/...`, the same
/// path convention derived from a `ValidatingWebhookConfiguration`
/// name.
pub fn router(registry: Arc<DefinitionRegistry>) -> Router {
    Router::new()
        .route("/validate/componentdefinitions", post(validate_component))
        .route("/validate/traitdefinitions", post(validate_trait))
        .route("/validate/workflowstepdefinitions", post(validate_workflow_step))
        .with_state(registry)
}

/// Runs the shared immutability check and folds the Registry's verdict into
/// an `AdmissionResponse`, reusing `DefinitionRegistry::put` itself rather
/// than re-implementing its version/content-hash comparison here.
async fn admit<R>(
    registry: &DefinitionRegistry,
    request: AdmissionRequest<R>,
    to_spec: impl FnOnce(R) -> DefinitionSpec,
) -> AdmissionResponse {
    let response = AdmissionResponse::from(&request);
    let name = request.name.clone();
    let Some(object) = request.object else {
        return response.deny("admission request carried no object to validate");
    };

    match registry.put(&name, to_spec(object)).await {
        Ok(()) => response,
        Err(source) => response.deny(source.to_string()),
    }
}

async fn validate_component(
    State(registry): State<Arc<DefinitionRegistry>>,
    Json(review): Json<AdmissionReview<ComponentDefinition>>,
) -> Json<AdmissionReview<ComponentDefinition>> {
    let response = match AdmissionRequest::try_from(review) {
        Ok(request) => admit(&registry, request, |definition| DefinitionSpec::Component(definition.spec)).await,
        Err(err) => AdmissionResponse::invalid(format!("failed to decode admission request: {err}")),
    };
    Json(response.into_review())
}

async fn validate_trait(
    State(registry): State<Arc<DefinitionRegistry>>,
    Json(review): Json<AdmissionReview<TraitDefinition>>,
) -> Json<AdmissionReview<TraitDefinition>> {
    let response = match AdmissionRequest::try_from(review) {
        Ok(request) => admit(&registry, request, |definition| DefinitionSpec::Trait(definition.spec)).await,
        Err(err) => AdmissionResponse::invalid(format!("failed to decode admission request: {err}")),
    };
    Json(response.into_review())
}

async fn validate_workflow_step(
    State(registry): State<Arc<DefinitionRegistry>>,
    Json(review): Json<AdmissionReview<WorkflowStepDefinition>>,
) -> Json<AdmissionReview<WorkflowStepDefinition>> {
    let response = match AdmissionRequest::try_from(review) {
        Ok(request) => admit(&registry, request, |definition| DefinitionSpec::WorkflowStep(definition.spec)).await,
        Err(err) => AdmissionResponse::invalid(format!("failed to decode admission request: {err}")),
    };
    Json(response.into_review())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oam_types::{ComponentDefinitionSpec, Schematic, WorkloadTypeDescriptor};

    fn component_spec(version: &str) -> ComponentDefinitionSpec {
        ComponentDefinitionSpec {
            version: version.to_owned(),
            workload: WorkloadTypeDescriptor { definition: None, r#type: Some("webservice".into()) },
            schematic: Schematic { template: "output: {}".into() },
            status: None,
        }
    }

    #[tokio::test]
    async fn second_put_with_identical_template_is_idempotent() {
        let registry = DefinitionRegistry::new();
        registry.put("webservice", DefinitionSpec::Component(component_spec("1.0.0"))).await.unwrap();
        let second = registry.put("webservice", DefinitionSpec::Component(component_spec("1.0.0"))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn admit_denies_a_mutated_resubmission() {
        let registry = DefinitionRegistry::new();
        registry.put("webservice", DefinitionSpec::Component(component_spec("1.0.0"))).await.unwrap();

        let mut mutated = component_spec("1.0.0");
        mutated.schematic.template = "output: {replicas: 3}".into();
        let outcome = registry.put("webservice", DefinitionSpec::Component(mutated)).await;
        assert!(outcome.is_err());
    }
}
