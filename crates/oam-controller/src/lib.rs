//! Wires the Definition Registry, Policy Engine, Template Engine, Dispatcher,
//! Workflow Executor and Status Aggregator into one Application reconcile
//! loop, and exposes the admission webhook that enforces Definition
//! immutability at the cluster boundary (redundantly with the Registry's own
//! `put` check, the same belt-and-suspenders pattern applied between a
//! CRD's own validation and its `ValidatingWebhookConfiguration`).

pub mod cluster_directory;
pub mod component_applier;
pub mod context;
pub mod definitions;
pub mod error;
pub mod reconcile;
pub mod revision;
pub mod webhook;

pub use context::Context;
pub use error::Error;
