//! The top-level tagged error the reconcile loop raises, composing every
//! sub-crate's own error type the same way each of them composes their own
//! collaborators' errors (named variants, explicit `source:` fields, never
//! a blanket `From`).

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("kubernetes API error: {source}"))]
    Kube { source: kube::Error },

    #[snafu(display("finalizer bookkeeping failed: {source}"))]
    Finalizer {
        source: Box<kube::runtime::finalizer::Error<Error>>,
    },

    #[snafu(display("resolving or rendering components: {source}"))]
    Render { source: oam_render::Error },

    #[snafu(display("evaluating policies: {source}"))]
    Policy { source: oam_policy::Error },

    #[snafu(display("dispatching rendered resources: {source}"))]
    Dispatch { source: oam_dispatch::Error },

    #[snafu(display("advancing the workflow: {source}"))]
    Workflow { source: oam_workflow::Error },

    #[snafu(display("aggregating status: {source}"))]
    Status { source: oam_status::Error },

    #[snafu(display("definition registry error: {source}"))]
    Registry { source: oam_registry::Error },

    #[snafu(display("parsing {annotation} on application {application:?}: {source}"))]
    Annotation {
        application: String,
        annotation: &'static str,
        source: oam_core::time::Error,
    },

    #[snafu(display("application {name:?} has no namespace"))]
    MissingNamespace { name: String },

    #[snafu(display("application {name:?} has no name/uid yet to build an owner reference from"))]
    OwnerReference { name: String },

    #[snafu(display("serializing {what}: {source}"))]
    Serialize { what: String, source: serde_json::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
