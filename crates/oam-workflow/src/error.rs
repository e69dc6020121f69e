//! Tagged errors the executor and built-in step handlers raise. A step
//! failing is not itself an `Err` here — that is surfaced as a `Failed`
//! [`crate::step::StepOutcome`] so the executor can apply the step's
//! `failure_policy`. These variants are the ones that mean the executor
//! itself could not make progress.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("step {step:?}: unknown step type {step_type:?}"))]
    UnknownStepType { step: String, step_type: String },

    #[snafu(display("step {step:?}: malformed properties: {message}"))]
    MalformedProperties { step: String, message: String },

    #[snafu(display("step {step:?}: input {parameter_key:?} references unknown context key {from:?}"))]
    UnknownInput {
        step: String,
        parameter_key: String,
        from: String,
    },

    #[snafu(display("step {step:?}: output {name:?} references unresolvable path {value_from:?}"))]
    UnresolvableOutput { step: String, name: String, value_from: String },

    #[snafu(display("step {step:?}: `if` condition failed to evaluate: {source}"))]
    ConditionEval { step: String, source: oam_expr::EvalError },

    #[snafu(display("step {step:?}: invalid timeout: {source}"))]
    InvalidTimeout { step: String, source: oam_core::time::Error },

    #[snafu(display("step {step:?}: dispatch error: {source}"))]
    Dispatch { step: String, source: oam_dispatch::Error },

    #[snafu(display("step {step:?}: request error: {source}"))]
    Http { step: String, source: reqwest::Error },

    #[snafu(display("dependsOn cycle detected involving step {step:?}"))]
    DependencyCycle { step: String },

    #[snafu(display("step {step:?} depends on unknown step {depends_on:?}"))]
    UnknownDependency { step: String, depends_on: String },
}

pub type Result<T> = std::result::Result<T, Error>;
