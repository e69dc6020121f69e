//! The Workflow Executor: a DAG/state-machine runner over an
//! Application's `workflow.steps`, the built-in step type library those
//! steps dispatch to, and the primitive library (`apply`/`read`/`delete`/
//! `httpDo`/`conditionalWait`/`fail`/`suspend`/`log`) the step library is
//! built from.
//!
//! Deliberately decoupled from `oam-render`/`oam-policy`: the executor
//! drives steps against [`component::ComponentApplier`] and
//! [`oam_dispatch::ResourceClient`] traits rather than the rendering
//! pipeline directly, so this crate never depends on the template engine or
//! policy evaluation. `oam-controller` wires the concrete implementations
//! together.

pub mod component;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod primitive;
pub mod steps;

pub use component::ComponentApplier;
pub use config::ConfigStore;
pub use error::{Error, Result};
pub use executor::{TickOutcome, WorkflowExecutor};
pub use http::{HttpClient, ReqwestHttpClient};
pub use primitive::{Handles, PrimitiveOutcome, WorkflowPrimitive};
