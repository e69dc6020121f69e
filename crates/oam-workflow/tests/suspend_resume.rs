//! `apply-component(api)` -> `suspend(message:"await")` ->
//! `apply-component(web)`. After the first step succeeds, the workflow must
//! go `suspended` carrying the message, and the third step must not run
//! until an external resume clears the suspend.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use oam_dispatch::{DeleteTarget, ResourceClient};
use oam_types::{FailurePolicy, PlacementDecision, StepPhase, WorkflowPhase, WorkflowState, WorkflowStep};
use oam_workflow::component::ComponentApplier;
use oam_workflow::config::ConfigStore;
use oam_workflow::http::HttpClient;
use oam_workflow::primitive::Handles;
use oam_workflow::{TickOutcome, WorkflowExecutor};

struct RecordingComponentApplier {
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl ComponentApplier for RecordingComponentApplier {
    async fn apply_component(&self, component: &str, _env: Option<&str>) -> Result<serde_json::Value, String> {
        self.applied.lock().unwrap().push(component.to_owned());
        Ok(serde_json::json!({ "applied": component }))
    }

    async fn deploy(&self, _components: &[String], _env: Option<&str>) -> Result<serde_json::Value, String> {
        unreachable!("this fixture's workflow only uses apply-component")
    }
}

struct UnusedResourceClient;

#[async_trait]
impl ResourceClient for UnusedResourceClient {
    async fn apply(
        &self,
        _placement: &PlacementDecision,
        _manifest: serde_json::Value,
        _owner: oam_types::ResourceOwner,
        _shared: bool,
    ) -> oam_dispatch::Result<serde_json::Value> {
        unreachable!("this fixture's workflow never applies a raw object")
    }

    async fn read(
        &self,
        _placement: &PlacementDecision,
        _api_version: &str,
        _kind: &str,
        _namespace: &str,
        _name: &str,
    ) -> oam_dispatch::Result<Option<serde_json::Value>> {
        unreachable!("this fixture's workflow never reads a raw object")
    }

    async fn delete(
        &self,
        _placement: &PlacementDecision,
        _api_version: &str,
        _kind: &str,
        _namespace: &str,
        _target: DeleteTarget,
    ) -> oam_dispatch::Result<u32> {
        unreachable!("this fixture's workflow never deletes a raw object")
    }

    async fn list(
        &self,
        _placement: &PlacementDecision,
        _api_version: &str,
        _kind: &str,
        _namespace: &str,
        _label_selector: &BTreeMap<String, String>,
    ) -> oam_dispatch::Result<Vec<serde_json::Value>> {
        unreachable!("this fixture's workflow never lists raw objects")
    }
}

struct UnusedHttpClient;

#[async_trait]
impl HttpClient for UnusedHttpClient {
    async fn do_request(
        &self,
        _method: &str,
        _url: &str,
        _body: Option<serde_json::Value>,
        _headers: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, String> {
        unreachable!("this fixture's workflow never issues an HTTP call")
    }
}

fn step(name: &str, step_type: &str, properties: serde_json::Map<String, serde_json::Value>, depends_on: &[&str]) -> WorkflowStep {
    WorkflowStep {
        name: name.to_owned(),
        step_type: step_type.to_owned(),
        properties,
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

fn workflow_steps() -> Vec<WorkflowStep> {
    let mut apply_api = serde_json::Map::new();
    apply_api.insert("component".to_owned(), serde_json::Value::String("api".to_owned()));

    let mut suspend_props = serde_json::Map::new();
    suspend_props.insert("message".to_owned(), serde_json::Value::String("await".to_owned()));

    let mut apply_web = serde_json::Map::new();
    apply_web.insert("component".to_owned(), serde_json::Value::String("web".to_owned()));

    vec![
        step("step1", "apply-component", apply_api, &[]),
        step("step2", "suspend", suspend_props, &["step1"]),
        step("step3", "apply-component", apply_web, &["step2"]),
    ]
}

#[tokio::test]
async fn suspend_blocks_downstream_step_until_resumed() {
    let applier = Arc::new(RecordingComponentApplier { applied: Mutex::new(Vec::new()) });
    let resources: Arc<dyn ResourceClient> = Arc::new(UnusedResourceClient);
    let handles = Handles {
        resources: resources.clone(),
        http: Arc::new(UnusedHttpClient),
        components: applier.clone(),
        configs: ConfigStore::new(resources),
    };

    let executor = WorkflowExecutor::new(&handles, PlacementDecision::control_plane("default"), 5);
    let steps = workflow_steps();
    let mut state = WorkflowState::default();
    let now: jiff::Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();

    let outcome = executor.tick(&steps, &mut state, now).await.unwrap();
    assert_eq!(outcome, TickOutcome::Progressed);
    assert_eq!(state.phase, WorkflowPhase::Suspended);
    assert_eq!(state.steps[0].phase, StepPhase::Succeeded);
    assert_eq!(state.steps[1].phase, StepPhase::Suspended);
    assert_eq!(state.steps[1].message, "await");
    assert_eq!(state.steps[2].phase, StepPhase::Pending);
    assert_eq!(applier.applied.lock().unwrap().as_slice(), ["api"]);

    // Ticking again while still suspended (no duration: never auto-resumes)
    // changes nothing — suspending twice, and re-ticking while suspended,
    // is idempotent.
    let idle = executor.tick(&steps, &mut state, now).await.unwrap();
    assert_eq!(idle, TickOutcome::Idle);
    assert_eq!(state.steps[2].phase, StepPhase::Pending);
    assert_eq!(applier.applied.lock().unwrap().as_slice(), ["api"]);

    // External resume: clears the suspend marker the way a resume signal
    // would, without touching any step's recorded phase.
    state.suspend = None;

    let outcome = executor.tick(&steps, &mut state, now).await.unwrap();
    assert_eq!(outcome, TickOutcome::Terminal);
    assert_eq!(state.phase, WorkflowPhase::Succeeded);
    assert_eq!(state.steps[2].phase, StepPhase::Succeeded);
    assert_eq!(applier.applied.lock().unwrap().as_slice(), ["api", "web"]);
}
