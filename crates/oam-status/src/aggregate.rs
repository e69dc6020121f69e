//! Rolls up per-component/trait [`Evaluation`]s into an `ApplicationStatus`:
//! `status.services`, `status.status`, and the `Ready` condition. Condition
//! bookkeeping only bumps `last_transition_time` when the status value
//! actually changes.

use jiff::Timestamp;
use oam_core::time::to_k8s_time;
use oam_dispatch::ResourceClient;
use oam_render::RenderPlan;
use oam_types::{ApplicationCondition, ApplicationPhase, ApplicationStatus, ServiceStatus, TraitStatus, WorkflowPhase, WorkflowState};

use crate::error::Result;
use crate::health::{self, Evaluation, Health};

const READY_CONDITION: &str = "Ready";

/// Re-evaluates every component and trait in `plan` against live cluster
/// state and produces the new `status.services`/`status.status`/
/// `status.conditions` for the Application. `workflow` and `previous` feed
/// in whatever the controller already knows: the workflow phase can
/// override the component-health-derived phase, and `previous.conditions`
/// is consulted so a condition's `last_transition_time` only moves when its
/// status actually changes.
pub async fn aggregate(
    plan: &RenderPlan,
    resources: &dyn ResourceClient,
    workflow: Option<&WorkflowState>,
    previous: Option<&ApplicationStatus>,
    now: Timestamp,
) -> Result<ApplicationStatus> {
    let mut services = Vec::with_capacity(plan.components.len());
    let mut worst = Health::Healthy;

    for component in &plan.components {
        // A component may be replicated across several placements; it's
        // reported healthy only when every placement agrees.
        let mut component_health = None;
        let mut component_message = String::new();
        let mut traits = Vec::with_capacity(component.trait_statuses.len());

        for placement in &plan.placements {
            let (live_output, live_outputs) = health::fetch_live(resources, placement, component).await?;

            let evaluation = health::evaluate(
                component.component_status.as_ref(),
                live_output.clone(),
                live_outputs.clone(),
                true,
            );
            merge_health(&mut component_health, evaluation.health);
            if component_message.is_empty() {
                component_message = evaluation.message;
            }

            if traits.is_empty() {
                for (trait_type, ctx) in &component.trait_statuses {
                    let trait_eval = health::evaluate(Some(ctx), live_output.clone(), live_outputs.clone(), false);
                    let trait_health = health_of(&trait_eval);
                    merge_health(&mut component_health, Some(trait_health));
                    traits.push(TraitStatus {
                        trait_type: trait_type.clone(),
                        healthy: trait_health == Health::Healthy,
                        message: trait_eval.message,
                    });
                }
            }
        }

        let resolved = component_health.unwrap_or(Health::Healthy);
        worst = worse(worst, resolved);
        services.push(ServiceStatus {
            name: component.name.clone(),
            healthy: resolved == Health::Healthy,
            message: component_message,
            traits,
        });
    }

    let phase = resolve_phase(worst, workflow);
    let ready = phase == ApplicationPhase::Running;
    let conditions = upsert_ready_condition(previous.map(|p| p.conditions.as_slice()), ready, &phase, now);

    Ok(ApplicationStatus {
        status: phase,
        conditions,
        services,
        workflow: workflow.cloned(),
        latest_revision: previous.and_then(|p| p.latest_revision.clone()),
        latest_revision_hash: previous.and_then(|p| p.latest_revision_hash.clone()),
        observed_publish_version: previous.and_then(|p| p.observed_publish_version.clone()),
        applied_restart_schedule: previous.and_then(|p| p.applied_restart_schedule.clone()),
    })
}

fn health_of(evaluation: &Evaluation) -> Health {
    evaluation.health.unwrap_or(Health::Healthy)
}

fn merge_health(slot: &mut Option<Health>, next: Option<Health>) {
    let Some(next) = next else { return };
    *slot = Some(match *slot {
        Some(current) => worse(current, next),
        None => next,
    });
}

/// `Unhealthy` dominates `Unknown` dominates `Healthy`: an unknown
/// expression never flips a healthy component to unhealthy, but an
/// already-unhealthy one stays unhealthy.
fn worse(a: Health, b: Health) -> Health {
    match (a, b) {
        (Health::Unhealthy, _) | (_, Health::Unhealthy) => Health::Unhealthy,
        (Health::Unknown, _) | (_, Health::Unknown) => Health::Unknown,
        _ => Health::Healthy,
    }
}

/// Workflow-derived phases take precedence over the component health
/// rollup: a suspended or failed workflow is surfaced regardless of how
/// healthy the components it already applied happen to be.
fn resolve_phase(worst: Health, workflow: Option<&WorkflowState>) -> ApplicationPhase {
    if let Some(workflow) = workflow {
        match workflow.phase {
            WorkflowPhase::Suspending => return ApplicationPhase::WorkflowSuspending,
            WorkflowPhase::Suspended => return ApplicationPhase::WorkflowSuspending,
            WorkflowPhase::Failed => return ApplicationPhase::WorkflowFailed,
            WorkflowPhase::Terminated => return ApplicationPhase::WorkflowTerminated,
            WorkflowPhase::Initializing | WorkflowPhase::Executing => return ApplicationPhase::Rendering,
            WorkflowPhase::Succeeded => {}
        }
    }

    match worst {
        Health::Healthy => ApplicationPhase::Running,
        Health::Unknown => ApplicationPhase::Rendering,
        Health::Unhealthy => ApplicationPhase::Unhealthy,
    }
}

fn upsert_ready_condition(
    previous: Option<&[ApplicationCondition]>,
    ready: bool,
    phase: &ApplicationPhase,
    now: Timestamp,
) -> Vec<ApplicationCondition> {
    let existing = previous.and_then(|conditions| {
        conditions
            .iter()
            .find(|condition| condition.condition_type == READY_CONDITION)
    });

    let last_transition_time = match existing {
        Some(condition) if condition.status == ready => condition.last_transition_time.clone(),
        _ => to_k8s_time(now),
    };

    let updated = ApplicationCondition {
        condition_type: READY_CONDITION.to_owned(),
        status: ready,
        reason: phase.to_string(),
        message: if ready {
            "all components healthy".to_owned()
        } else {
            format!("application status is {phase}")
        },
        last_transition_time,
    };

    let mut conditions: Vec<ApplicationCondition> = previous
        .map(|list| list.iter().filter(|c| c.condition_type != READY_CONDITION).cloned().collect())
        .unwrap_or_default();
    conditions.push(updated);
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_dominates_unknown_and_healthy() {
        assert_eq!(worse(Health::Healthy, Health::Unknown), Health::Unknown);
        assert_eq!(worse(Health::Unknown, Health::Unhealthy), Health::Unhealthy);
        assert_eq!(worse(Health::Healthy, Health::Healthy), Health::Healthy);
    }

    #[test]
    fn unknown_blocks_running_without_reporting_unhealthy() {
        assert_eq!(resolve_phase(Health::Unknown, None), ApplicationPhase::Rendering);
        assert_eq!(resolve_phase(Health::Healthy, None), ApplicationPhase::Running);
        assert_eq!(resolve_phase(Health::Unhealthy, None), ApplicationPhase::Unhealthy);
    }

    #[test]
    fn suspended_workflow_overrides_healthy_components() {
        let workflow = WorkflowState {
            phase: WorkflowPhase::Suspended,
            ..Default::default()
        };
        assert_eq!(
            resolve_phase(Health::Healthy, Some(&workflow)),
            ApplicationPhase::WorkflowSuspending
        );
    }

    #[test]
    fn ready_condition_keeps_transition_time_when_status_is_unchanged() {
        let now: Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();
        let later: Timestamp = "2026-01-01T01:00:00Z".parse().unwrap();
        let first = upsert_ready_condition(None, true, &ApplicationPhase::Running, now);
        let second = upsert_ready_condition(Some(&first), true, &ApplicationPhase::Running, later);
        assert_eq!(
            first[0].last_transition_time.0,
            second[0].last_transition_time.0
        );
    }

    #[test]
    fn ready_condition_bumps_transition_time_on_status_change() {
        let now: Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();
        let later: Timestamp = "2026-01-01T01:00:00Z".parse().unwrap();
        let first = upsert_ready_condition(None, true, &ApplicationPhase::Running, now);
        let second = upsert_ready_condition(Some(&first), false, &ApplicationPhase::Unhealthy, later);
        assert_ne!(
            first[0].last_transition_time.0,
            second[0].last_transition_time.0
        );
    }
}
