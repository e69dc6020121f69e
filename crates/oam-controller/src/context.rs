//! The shared state every Application reconcile runs against: a `kube::Client`
//! for the control plane, the in-process Definition Registry, the pooled
//! multi-cluster dispatch client, and the operator-wide CLI options.

use std::sync::Arc;

use oam_core::cli::ControllerOpts;
use oam_dispatch::Dispatcher;
use oam_policy::ClusterDirectory;
use oam_registry::DefinitionRegistry;
use oam_render::ReqwestProcessingClient;
use oam_workflow::ReqwestHttpClient;

/// Collaborators threaded through every reconcile, shared across concurrent
/// reconciles of different Applications. The cluster client pool lives
/// inside `dispatcher` itself rather than as a separate field here — every
/// cluster-facing operation in a reconcile goes through the Dispatcher, so
/// nothing else needs direct pool access.
pub struct Context {
    pub client: kube::Client,
    pub registry: Arc<DefinitionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub cluster_directory: Arc<dyn ClusterDirectory + Send + Sync>,
    pub processing_client: Arc<ReqwestProcessingClient>,
    pub http_client: Arc<ReqwestHttpClient>,
    pub opts: ControllerOpts,
}
