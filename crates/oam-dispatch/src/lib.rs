//! The Dispatcher & Resource Tracker: applies a rendered
//! [`oam_render::RenderPlan`] across one or more clusters via server-side
//! apply, and garbage-collects resources that a re-render no longer
//! produces. Generalized from one implicit cluster to a pool keyed by
//! [`oam_types::PlacementDecision`].

mod cluster_client;
mod dispatcher;
mod error;
mod resource_client;
mod strategy;

pub use cluster_client::{ClusterClientFactory, ClusterClientPool, KubeconfigClusterClientFactory};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use resource_client::{DeleteTarget, ResourceClient};
pub use strategy::DispatchStrategy;
