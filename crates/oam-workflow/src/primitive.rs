//! The workflow primitive library: `apply`, `read`,
//! `delete`, `httpDo`, `conditionalWait`, `fail`, `suspend`, `log`. `steps`
//! (running a nested sequence) is not a primitive here — it is the
//! executor's own recursion over `WorkflowStep::sub_steps`.
//!
//! Each variant is data: building one never touches the network. Only
//! [`WorkflowPrimitive::execute`] does I/O, against the [`Handles`] bound
//! for one workflow run. This keeps step handlers (which build primitives
//! from a step's properties) trivially testable without a live cluster.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use oam_dispatch::{DeleteTarget, ResourceClient};
use oam_types::{PlacementDecision, ResourceOwner};

use crate::component::ComponentApplier;
use crate::config::ConfigStore;
use crate::http::HttpClient;

/// The collaborators a workflow run is bound against. Cheap to clone: every
/// field is a shared, `Sync` handle.
#[derive(Clone)]
pub struct Handles {
    pub resources: Arc<dyn ResourceClient>,
    pub http: Arc<dyn HttpClient>,
    pub components: Arc<dyn ComponentApplier>,
    pub configs: ConfigStore,
}

#[derive(Debug, Clone)]
pub enum WorkflowPrimitive {
    Apply {
        placement: PlacementDecision,
        manifest: serde_json::Value,
        owner: ResourceOwner,
        shared: bool,
    },
    Read {
        placement: PlacementDecision,
        api_version: String,
        kind: String,
        namespace: String,
        name: String,
    },
    Delete {
        placement: PlacementDecision,
        api_version: String,
        kind: String,
        namespace: String,
        target: DeleteTarget,
    },
    HttpDo {
        method: String,
        url: String,
        body: Option<serde_json::Value>,
        headers: BTreeMap<String, String>,
    },
    /// Evaluates to `Done` once `condition` is true; otherwise the step
    /// stays `Waiting` and the executor re-ticks it on the next reconcile.
    ConditionalWait { condition: bool, message: Option<String> },
    Fail { message: String },
    Suspend {
        message: Option<String>,
        duration: Option<Duration>,
    },
    Log { message: String },
}

#[derive(Debug, Clone)]
pub enum PrimitiveOutcome {
    Done(serde_json::Value),
    Waiting(Option<String>),
    Suspend {
        message: Option<String>,
        duration: Option<Duration>,
    },
    Failed(String),
}

impl WorkflowPrimitive {
    pub async fn execute(self, handles: &Handles) -> PrimitiveOutcome {
        match self {
            Self::Apply {
                placement,
                manifest,
                owner,
                shared,
            } => match handles.resources.apply(&placement, manifest, owner, shared).await {
                Ok(value) => PrimitiveOutcome::Done(value),
                Err(source) => PrimitiveOutcome::Failed(source.to_string()),
            },
            Self::Read {
                placement,
                api_version,
                kind,
                namespace,
                name,
            } => match handles.resources.read(&placement, &api_version, &kind, &namespace, &name).await {
                Ok(Some(value)) => PrimitiveOutcome::Done(value),
                Ok(None) => PrimitiveOutcome::Done(serde_json::Value::Null),
                Err(source) => PrimitiveOutcome::Failed(source.to_string()),
            },
            Self::Delete {
                placement,
                api_version,
                kind,
                namespace,
                target,
            } => match handles.resources.delete(&placement, &api_version, &kind, &namespace, target).await {
                Ok(count) => PrimitiveOutcome::Done(serde_json::json!({ "deleted": count })),
                Err(source) => PrimitiveOutcome::Failed(source.to_string()),
            },
            Self::HttpDo { method, url, body, headers } => match handles.http.do_request(&method, &url, body, &headers).await {
                Ok(value) => PrimitiveOutcome::Done(value),
                Err(source) => PrimitiveOutcome::Failed(source.to_string()),
            },
            Self::ConditionalWait { condition, message } => {
                if condition {
                    PrimitiveOutcome::Done(serde_json::Value::Bool(true))
                } else {
                    PrimitiveOutcome::Waiting(message)
                }
            }
            Self::Fail { message } => PrimitiveOutcome::Failed(message),
            Self::Suspend { message, duration } => PrimitiveOutcome::Suspend { message, duration },
            Self::Log { message } => {
                tracing::info!(target: "oam_workflow::log", "{message}");
                PrimitiveOutcome::Done(serde_json::Value::Null)
            }
        }
    }
}
