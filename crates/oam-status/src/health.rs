//! Per-component/trait health evaluation: fetches live cluster state for a
//! rendered resource set, rebinds it into the [`StatusContext`] captured at
//! render time, and re-evaluates `healthPolicy`/`customStatus`/`details`
//! read-only. None of this touches the render pipeline.

use indexmap::IndexMap;
use oam_dispatch::ResourceClient;
use oam_expr::ast::RecordField;
use oam_expr::{Scope, Value, eval_record};
use oam_render::{ComponentRender, RenderedResource, StatusContext};
use oam_types::PlacementDecision;
use snafu::ResultExt;

use crate::error::{ReadLiveStateSnafu, Result};

/// The result of re-evaluating one component's or trait's `healthPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
    /// An expression referenced a field that isn't populated yet, or the
    /// evaluation itself failed. Per aggregator policy this never flips a
    /// previously healthy rollup to unhealthy; it only withholds `running`.
    Unknown,
}

/// The three status blocks a Definition's template may declare, evaluated
/// against live state. `health` is `None` when the Definition declared no
/// `healthPolicy` at all, meaning the component is unconditionally healthy.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub health: Option<Health>,
    pub message: String,
    pub details: serde_json::Value,
}

/// Fetches the live form of a component's workload and every auxiliary
/// resource it rendered, keyed by `logical_name` the same way
/// `context.outputs` is keyed at render time.
pub async fn fetch_live(
    resources: &dyn ResourceClient,
    placement: &PlacementDecision,
    render: &ComponentRender,
) -> Result<(Value, Value)> {
    let workload = match &render.workload {
        Some(resource) => read_resource(resources, placement, resource).await?,
        None => Value::Null,
    };

    let mut outputs = IndexMap::new();
    for auxiliary in &render.auxiliary {
        let value = read_resource(resources, placement, auxiliary).await?;
        outputs.insert(auxiliary.logical_name.clone(), value);
    }

    Ok((workload, Value::Record(outputs)))
}

async fn read_resource(
    resources: &dyn ResourceClient,
    placement: &PlacementDecision,
    resource: &RenderedResource,
) -> Result<Value> {
    let api_version = resource
        .manifest
        .get("apiVersion")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let kind = resource
        .manifest
        .get("kind")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let metadata = resource.manifest.get("metadata");
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    let live = resources
        .read(placement, api_version, kind, namespace, name)
        .await
        .context(ReadLiveStateSnafu {
            kind: kind.to_owned(),
            name: name.to_owned(),
            namespace: namespace.to_owned(),
        })?;

    Ok(live.map(Value::from).unwrap_or(Value::Null))
}

/// Re-evaluates one `StatusContext` against freshly observed state.
/// `include_output` is `false` for traits: they see `context.outputs` but
/// never `context.output`, since a trait doesn't own a primary workload
pub fn evaluate(ctx: Option<&StatusContext>, live_output: Value, live_outputs: Value, include_output: bool) -> Evaluation {
    let Some(ctx) = ctx else {
        return Evaluation::default();
    };

    let bound_output = if include_output { live_output } else { Value::Null };
    let scope = ctx.with_live_output(bound_output, live_outputs);

    let mut eval_error = None;
    let health = ctx
        .health_policy
        .as_ref()
        .map(|fields| evaluate_health(fields, &scope, &mut eval_error));

    let message = ctx
        .custom_status
        .as_ref()
        .and_then(|fields| eval_record(fields, &scope, "customStatus").ok())
        .and_then(|value| {
            value
                .as_record()
                .and_then(|record| record.get("message"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .or(eval_error)
        .unwrap_or_default();

    let details = ctx
        .status_details
        .as_ref()
        .and_then(|fields| eval_record(fields, &scope, "details").ok())
        .map(serde_json::Value::from)
        .unwrap_or(serde_json::Value::Null);

    Evaluation { health, message, details }
}

fn evaluate_health(fields: &[RecordField], scope: &Scope, eval_error: &mut Option<String>) -> Health {
    match eval_record(fields, scope, "healthPolicy") {
        Ok(value) => match value.as_record().and_then(|record| record.get("isHealth")).and_then(Value::as_bool) {
            Some(true) => Health::Healthy,
            Some(false) => Health::Unhealthy,
            None => {
                *eval_error = Some("healthPolicy did not resolve a boolean isHealth field".to_owned());
                Health::Unknown
            }
        },
        Err(err) => {
            *eval_error = Some(err.to_string());
            Health::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use oam_expr::ast::{Expr, Literal, RecordField};

    use super::*;

    fn healthy_fields() -> Vec<RecordField> {
        vec![RecordField::Required {
            name: "isHealth".to_owned(),
            value: Expr::Literal(Literal::Bool(true)),
        }]
    }

    #[test]
    fn absent_health_policy_is_unconditionally_healthy() {
        let evaluation = evaluate(None, Value::Null, Value::Record(IndexMap::new()), true);
        assert!(evaluation.health.is_none());
    }

    #[test]
    fn declared_health_policy_evaluates_against_rebound_scope() {
        let ctx = StatusContext {
            health_policy: Some(healthy_fields()),
            custom_status: None,
            status_details: None,
            scope: Scope::new(),
        };
        let evaluation = evaluate(Some(&ctx), Value::Null, Value::Record(IndexMap::new()), true);
        assert_eq!(evaluation.health, Some(Health::Healthy));
    }
}
