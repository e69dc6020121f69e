//! The Workflow Executor: advances an Application's
//! `workflow.steps` against a [`WorkflowState`] one reconcile at a time,
//! respecting `dependsOn`, `if`, retries, suspend, and `failure_policy`.
//!
//! [`WorkflowExecutor::tick`] is the whole surface: it takes the step
//! declarations and the current state, runs whatever is now ready, and
//! returns. It never blocks waiting on a suspended or `waiting` step — the
//! caller re-invokes `tick` on its own reconcile cadence, the same way a
//! `kube::runtime::Controller` re-drives a resource's reconcile function
//! rather than a step handler parking a thread.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use jiff::Timestamp;
use oam_expr::{Scope, Value};
use oam_types::{
    FailurePolicy, PlacementDecision, StepPhase, StepStatus, SuspendState, WorkflowPhase, WorkflowState, WorkflowStep,
};
use snafu::{OptionExt, ResultExt};

use crate::error::{
    ConditionEvalSnafu, DependencyCycleSnafu, Result, UnknownDependencySnafu, UnknownInputSnafu, UnresolvableOutputSnafu,
};
use crate::primitive::{Handles, PrimitiveOutcome};
use crate::steps::execute_builtin;

/// Base attempt plus this many retries, regardless of what a step's own
/// `retries` property requests: a misconfigured step can't
/// wedge the executor in an unbounded retry loop.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// At least one step changed phase this tick.
    Progressed,
    /// Nothing changed: every ready step is mid-retry-backoff, or the
    /// workflow is suspended and not yet due to resume.
    Idle,
    /// The workflow reached `Succeeded`, `Failed`, or `Terminated`.
    Terminal,
}

pub struct WorkflowExecutor<'a> {
    handles: &'a Handles,
    default_placement: PlacementDecision,
    parallelism: usize,
}

impl<'a> WorkflowExecutor<'a> {
    pub fn new(handles: &'a Handles, default_placement: PlacementDecision, parallelism: usize) -> Self {
        Self {
            handles,
            default_placement,
            parallelism: parallelism.max(1),
        }
    }

    pub async fn tick(&self, steps: &[WorkflowStep], state: &mut WorkflowState, now: Timestamp) -> Result<TickOutcome> {
        if state.phase.is_terminal() {
            return Ok(TickOutcome::Terminal);
        }

        if let Some(suspend) = state.suspend.clone() {
            let due = suspend
                .resume_at
                .as_ref()
                .map(|resume_at| now >= oam_core::time::from_k8s_time(resume_at))
                .unwrap_or(false);
            if !due {
                return Ok(TickOutcome::Idle);
            }
            state.suspend = None;
        }

        check_dependency_graph(steps)?;
        ensure_step_statuses(steps, state);

        if state.phase == WorkflowPhase::Initializing || state.phase == WorkflowPhase::Suspended {
            state.phase = WorkflowPhase::Executing;
        }

        // The `suspend` primitive always re-suspends when run again, so a
        // step never un-suspends on its own. Once the workflow-level suspend
        // marker is gone (auto-resume due, or an external resume signal),
        // whatever step parked the workflow at `suspended` is done: complete
        // it here so its dependents unblock on this same tick.
        for status in state.steps.iter_mut() {
            if status.phase == StepPhase::Suspended {
                status.phase = StepPhase::Succeeded;
                status.reason = "Resumed".to_owned();
                status.end_time = Some(oam_core::time::to_k8s_time(now));
            }
        }

        let mut slots = self.parallelism;
        let mut progressed = false;

        for index in 0..steps.len() {
            if slots == 0 {
                break;
            }
            let step = &steps[index];

            if state.steps[index].phase.is_terminal() {
                continue;
            }
            match dependency_state(step, steps, &state.steps) {
                DependencyState::Pending => continue,
                DependencyState::Blocked => {
                    let status = &mut state.steps[index];
                    status.phase = StepPhase::Skipped;
                    status.reason = "UpstreamFailed".to_owned();
                    status.end_time = Some(oam_core::time::to_k8s_time(now));
                    progressed = true;
                    continue;
                }
                DependencyState::Ready => {}
            }
            if !retry_due(&state.steps[index], now) {
                continue;
            }

            let ready = match &step.if_condition {
                Some(raw) => evaluate_condition(&step.name, raw, &state.context)?,
                None => true,
            };
            if !ready {
                let status = &mut state.steps[index];
                status.phase = StepPhase::Skipped;
                status.reason = "ConditionFalse".to_owned();
                status.end_time = Some(oam_core::time::to_k8s_time(now));
                progressed = true;
                continue;
            }

            slots -= 1;
            progressed = true;
            self.run_step(step, index, state, now).await?;
        }

        if state.phase == WorkflowPhase::Suspended {
            return Ok(if progressed { TickOutcome::Progressed } else { TickOutcome::Idle });
        }

        if state.steps.iter().all(|status| status.phase.is_terminal()) {
            state.phase = if state.steps.iter().any(|status| status.phase == StepPhase::Failed) {
                WorkflowPhase::Failed
            } else {
                WorkflowPhase::Succeeded
            };
            return Ok(TickOutcome::Terminal);
        }

        Ok(if progressed { TickOutcome::Progressed } else { TickOutcome::Idle })
    }

    async fn run_step(&self, step: &WorkflowStep, index: usize, state: &mut WorkflowState, now: Timestamp) -> Result<()> {
        {
            let status = &mut state.steps[index];
            status.first_execute_time.get_or_insert_with(|| oam_core::time::to_k8s_time(now));
            status.last_execute_time = Some(oam_core::time::to_k8s_time(now));
            status.start_time.get_or_insert_with(|| oam_core::time::to_k8s_time(now));
            status.attempts += 1;
            status.phase = StepPhase::Running;
        }

        let outcome = if step.step_type == "steps" {
            let mut local_context = state.context.clone();
            bind_inputs_into(step, &mut local_context)?;
            let outcome = run_sub_steps(&step.sub_steps, &local_context, &self.default_placement, self.handles).await?;
            if let PrimitiveOutcome::Done(ref value) = outcome {
                if let Some(merged) = value.get("context").and_then(serde_json::Value::as_object) {
                    for (key, value) in merged {
                        state.context.insert(key.clone(), value.clone());
                    }
                }
            }
            outcome
        } else {
            let properties = bind_inputs(step, &state.context)?;
            let mut executed = step.clone();
            executed.properties = properties;
            execute_builtin(&executed, &self.default_placement, self.handles).await?
        };

        self.apply_outcome(step, index, state, outcome, now)
    }

    fn apply_outcome(
        &self,
        step: &WorkflowStep,
        index: usize,
        state: &mut WorkflowState,
        outcome: PrimitiveOutcome,
        now: Timestamp,
    ) -> Result<()> {
        match outcome {
            PrimitiveOutcome::Done(value) => {
                resolve_outputs(step, &value, &mut state.context)?;
                let restarted = step.step_type == "restart-workflow";
                let status = &mut state.steps[index];
                status.phase = StepPhase::Succeeded;
                status.end_time = Some(oam_core::time::to_k8s_time(now));
                status.reason = "Succeeded".to_owned();
                status.message.clear();
                if restarted {
                    restart_other_steps(state, index);
                }
                Ok(())
            }
            PrimitiveOutcome::Waiting(message) => {
                let status = &mut state.steps[index];
                status.phase = StepPhase::Waiting;
                status.reason = "Waiting".to_owned();
                status.message = message.unwrap_or_default();
                Ok(())
            }
            PrimitiveOutcome::Suspend { message, duration } => {
                let resume_at = duration.map(|duration| oam_core::time::to_k8s_time(add_duration(now, duration)));
                state.suspend = Some(SuspendState {
                    message: message.clone(),
                    resume_at,
                });
                state.phase = WorkflowPhase::Suspended;
                let status = &mut state.steps[index];
                status.phase = StepPhase::Suspended;
                status.reason = "Suspended".to_owned();
                status.message = message.unwrap_or_default();
                Ok(())
            }
            PrimitiveOutcome::Failed(message) => {
                let budget = step.retries.min(MAX_ATTEMPTS.saturating_sub(1)) + 1;
                let status = &mut state.steps[index];
                if status.attempts < budget {
                    status.phase = StepPhase::Pending;
                    status.reason = "Retrying".to_owned();
                    status.message = message;
                    return Ok(());
                }
                status.phase = StepPhase::Failed;
                status.end_time = Some(oam_core::time::to_k8s_time(now));
                status.reason = "Failed".to_owned();
                status.message = message;
                if step.failure_policy == FailurePolicy::ContinueOnFailure {
                    state
                        .context
                        .insert(format!("{}.failure", step.name), serde_json::Value::Bool(true));
                }
                Ok(())
            }
        }
    }
}

fn add_duration(base: Timestamp, duration: Duration) -> Timestamp {
    jiff::Span::try_from(duration)
        .ok()
        .and_then(|span| base.checked_add(span).ok())
        .unwrap_or(base)
}

/// Resets every step but `except` back to `Pending`, clearing the shared
/// context, so the next tick re-runs the workflow from its start. `except`
/// stays `Succeeded` so the `restart-workflow` step itself never re-fires.
fn restart_other_steps(state: &mut WorkflowState, except: usize) {
    for (index, status) in state.steps.iter_mut().enumerate() {
        if index == except {
            continue;
        }
        *status = StepStatus {
            id: status.id.clone(),
            name: status.name.clone(),
            phase: StepPhase::Pending,
            start_time: None,
            end_time: None,
            first_execute_time: None,
            last_execute_time: None,
            reason: String::new(),
            message: String::new(),
            attempts: 0,
        };
    }
    state.context.clear();
}

fn ensure_step_statuses(steps: &[WorkflowStep], state: &mut WorkflowState) {
    let known: HashSet<&str> = state.steps.iter().map(|status| status.name.as_str()).collect();
    for (index, step) in steps.iter().enumerate() {
        if !known.contains(step.name.as_str()) {
            state.steps.push(StepStatus {
                id: format!("step-{index}"),
                name: step.name.clone(),
                phase: StepPhase::Pending,
                start_time: None,
                end_time: None,
                first_execute_time: None,
                last_execute_time: None,
                reason: String::new(),
                message: String::new(),
                attempts: 0,
            });
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DependencyState {
    /// At least one dependency has not reached a terminal phase yet.
    Pending,
    /// Every dependency is terminal, but one failed under `FailWorkflow` —
    /// this step must never run and is marked `Skipped` instead.
    Blocked,
    /// Every dependency is terminal and none blocks this step from running.
    Ready,
}

/// A dependency counts as cleared for DAG-gating purposes if it `Succeeded`,
/// was `Skipped`, or `Failed` under `ContinueOnFailure` (the "finished with a
/// failure sentinel" semantics from the workflow's `dependsOn` contract). A
/// `Failed` dependency under the default `FailWorkflow` policy instead blocks
/// every step depending on it, since that failure is terminal for the whole
/// workflow.
fn dependency_state(step: &WorkflowStep, steps: &[WorkflowStep], statuses: &[StepStatus]) -> DependencyState {
    let mut blocked = false;
    for dependency in &step.depends_on {
        let Some(status) = statuses.iter().find(|status| status.name == *dependency) else {
            return DependencyState::Pending;
        };
        if !status.phase.is_terminal() {
            return DependencyState::Pending;
        }
        if status.phase == StepPhase::Failed {
            let policy = steps
                .iter()
                .find(|candidate| candidate.name == *dependency)
                .map_or(FailurePolicy::FailWorkflow, |candidate| candidate.failure_policy);
            if policy != FailurePolicy::ContinueOnFailure {
                blocked = true;
            }
        }
    }
    if blocked {
        DependencyState::Blocked
    } else {
        DependencyState::Ready
    }
}

fn retry_due(status: &StepStatus, now: Timestamp) -> bool {
    match status.phase {
        StepPhase::Waiting => true,
        StepPhase::Pending if status.attempts == 0 => true,
        StepPhase::Pending => status.last_execute_time.as_ref().is_none_or(|last| {
            now.as_second() - oam_core::time::from_k8s_time(last).as_second() >= RETRY_BACKOFF_SECS
        }),
        _ => false,
    }
}

/// Validates `dependsOn` references and checks for cycles via Kahn's
/// algorithm, mirroring `oam_render::resolver`'s component-level check at
/// the step level.
fn check_dependency_graph(steps: &[WorkflowStep]) -> Result<()> {
    let names: HashSet<&str> = steps.iter().map(|step| step.name.as_str()).collect();
    for step in steps {
        for dependency in &step.depends_on {
            if !names.contains(dependency.as_str()) {
                return UnknownDependencySnafu {
                    step: step.name.clone(),
                    depends_on: dependency.clone(),
                }
                .fail();
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = steps.iter().map(|step| (step.name.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        for dependency in &step.depends_on {
            if let Some(degree) = in_degree.get_mut(step.name.as_str()) {
                *degree += 1;
            }
            dependents.entry(dependency.as_str()).or_default().push(step.name.as_str());
        }
    }

    let mut queue: Vec<&str> = steps
        .iter()
        .map(|step| step.name.as_str())
        .filter(|name| in_degree.get(name).copied() == Some(0))
        .collect();
    queue.sort_unstable();

    let mut visited = 0usize;
    let mut cursor = 0;
    while cursor < queue.len() {
        let name = queue[cursor];
        cursor += 1;
        visited += 1;

        let mut newly_ready = Vec::new();
        if let Some(children) = dependents.get(name) {
            for &child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        newly_ready.push(child);
                    }
                }
            }
        }
        newly_ready.sort_unstable();
        queue.extend(newly_ready);
    }

    if visited != steps.len() {
        let stuck = steps
            .iter()
            .map(|step| step.name.as_str())
            .find(|name| !queue.contains(name))
            .unwrap_or("<unknown>");
        return DependencyCycleSnafu { step: stuck.to_owned() }.fail();
    }

    Ok(())
}

fn bind_inputs(step: &WorkflowStep, context: &BTreeMap<String, serde_json::Value>) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut properties = step.properties.clone();
    for input in &step.inputs {
        let value = context.get(&input.from).cloned().context(UnknownInputSnafu {
            step: step.name.clone(),
            parameter_key: input.parameter_key.clone(),
            from: input.from.clone(),
        })?;
        properties.insert(input.parameter_key.clone(), value);
    }
    Ok(properties)
}

fn bind_inputs_into(step: &WorkflowStep, context: &mut BTreeMap<String, serde_json::Value>) -> Result<()> {
    for input in &step.inputs {
        let value = context.get(&input.from).cloned().context(UnknownInputSnafu {
            step: step.name.clone(),
            parameter_key: input.parameter_key.clone(),
            from: input.from.clone(),
        })?;
        context.insert(input.parameter_key.clone(), value);
    }
    Ok(())
}

fn resolve_outputs(step: &WorkflowStep, result: &serde_json::Value, context: &mut BTreeMap<String, serde_json::Value>) -> Result<()> {
    if step.outputs.is_empty() {
        return Ok(());
    }
    let scope = Scope::new().bind("output", Value::from(result.clone()));
    for output in &step.outputs {
        let ast = parse_expr_str(&output.value_from).context(UnresolvableOutputSnafu {
            step: step.name.clone(),
            name: output.name.clone(),
            value_from: output.value_from.clone(),
        })?;
        let value = oam_expr::eval_expr(&ast, &scope, &step.name).map_err(|_| crate::error::Error::UnresolvableOutput {
            step: step.name.clone(),
            name: output.name.clone(),
            value_from: output.value_from.clone(),
        })?;
        context.insert(output.name.clone(), serde_json::Value::from(value));
    }
    Ok(())
}

fn evaluate_condition(step_name: &str, raw: &str, context: &BTreeMap<String, serde_json::Value>) -> Result<bool> {
    let scope = Scope::new().bind("context", context_to_value(context));
    let ast = parse_expr_str(raw).context(ConditionEvalSnafu {
        step: step_name.to_owned(),
        source: oam_expr::EvalError::Call {
            path: step_name.to_owned(),
            message: format!("could not parse `if` expression {raw:?}"),
        },
    })?;
    let value = oam_expr::eval_expr(&ast, &scope, step_name).context(ConditionEvalSnafu {
        step: step_name.to_owned(),
    })?;
    Ok(value.is_truthy())
}

fn context_to_value(context: &BTreeMap<String, serde_json::Value>) -> Value {
    let object: serde_json::Map<String, serde_json::Value> = context.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
    Value::from(serde_json::Value::Object(object))
}

fn parse_expr_str(raw: &str) -> Option<oam_expr::ast::Expr> {
    let (rest, parsed) = oam_expr::parser::expr(raw.trim()).ok()?;
    rest.trim().is_empty().then_some(parsed)
}

/// Runs a `steps` grouping step's nested sequence to completion within one
/// tick. Kept synchronous end-to-end (no persisted per-sub-step state
/// across ticks) since the primitives a sub-step group composes are
/// idempotent applies/reads rather than long external waits; a `Waiting`
/// or `Suspend` from any sub-step bubbles straight up and the whole group
/// retries from its first sub-step on the next tick.
async fn run_sub_steps(
    sub_steps: &[WorkflowStep],
    context: &BTreeMap<String, serde_json::Value>,
    default_placement: &PlacementDecision,
    handles: &Handles,
) -> Result<PrimitiveOutcome> {
    let mut local_context = context.clone();
    let mut last = serde_json::Value::Null;

    for sub_step in sub_steps {
        if let Some(raw) = &sub_step.if_condition {
            if !evaluate_condition(&sub_step.name, raw, &local_context)? {
                continue;
            }
        }

        let properties = bind_inputs(sub_step, &local_context)?;
        let mut executed = sub_step.clone();
        executed.properties = properties;

        let outcome = execute_builtin(&executed, default_placement, handles).await?;
        match outcome {
            PrimitiveOutcome::Done(value) => {
                resolve_outputs(sub_step, &value, &mut local_context)?;
                last = value;
            }
            PrimitiveOutcome::Failed(message) if sub_step.failure_policy == FailurePolicy::ContinueOnFailure => {
                local_context.insert(format!("{}.failure", sub_step.name), serde_json::Value::Bool(true));
            }
            other => return Ok(other),
        }
    }

    Ok(PrimitiveOutcome::Done(serde_json::json!({
        "context": local_context,
        "result": last,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, step_type: &str, depends_on: &[&str]) -> WorkflowStep {
        WorkflowStep {
            name: name.to_owned(),
            step_type: step_type.to_owned(),
            properties: serde_json::Map::new(),
            if_condition: None,
            timeout: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            sub_steps: Vec::new(),
            retries: 0,
            failure_policy: FailurePolicy::FailWorkflow,
        }
    }

    #[test]
    fn accepts_a_linear_chain() {
        let steps = vec![step("a", "log", &[]), step("b", "log", &["a"])];
        assert!(check_dependency_graph(&steps).is_ok());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let steps = vec![step("a", "log", &["missing"])];
        let err = check_dependency_graph(&steps).unwrap_err();
        assert!(matches!(err, crate::error::Error::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_a_cycle() {
        let steps = vec![step("a", "log", &["b"]), step("b", "log", &["a"])];
        let err = check_dependency_graph(&steps).unwrap_err();
        assert!(matches!(err, crate::error::Error::DependencyCycle { .. }));
    }

    #[test]
    fn retry_due_allows_first_attempt_immediately() {
        let status = StepStatus {
            id: "step-0".to_owned(),
            name: "a".to_owned(),
            phase: StepPhase::Pending,
            start_time: None,
            end_time: None,
            first_execute_time: None,
            last_execute_time: None,
            reason: String::new(),
            message: String::new(),
            attempts: 0,
        };
        let now: Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();
        assert!(retry_due(&status, now));
    }

    #[test]
    fn retry_due_backs_off_between_attempts() {
        let now: Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();
        let status = StepStatus {
            id: "step-0".to_owned(),
            name: "a".to_owned(),
            phase: StepPhase::Pending,
            start_time: None,
            end_time: None,
            first_execute_time: None,
            last_execute_time: Some(oam_core::time::to_k8s_time(now)),
            reason: String::new(),
            message: String::new(),
            attempts: 1,
        };
        assert!(!retry_due(&status, now));
        assert!(retry_due(&status, add_duration(now, Duration::from_secs(6))));
    }
}
