//! The tagged error kinds the Template Engine and Parser/Resolver raise
//! (never a bare `String`), mirroring the distinctions callers need to
//! surface as status conditions.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("component {component:?} has unknown type {type_name:?}"))]
    DefinitionMissing { component: String, type_name: String },

    #[snafu(display("{component}: failed to parse template: {source}"))]
    ParseError { component: String, source: oam_expr::ParseError },

    #[snafu(display("{component}.{field_path}: {source}"))]
    UnificationError {
        component: String,
        field_path: String,
        source: oam_expr::EvalError,
    },

    #[snafu(display("{component}.{field_path}: reference not found"))]
    ReferenceNotFound { component: String, field_path: String },

    #[snafu(display("{component}.{field_path}: type mismatch"))]
    TypeMismatch { component: String, field_path: String },

    #[snafu(display("{component}.{field_path}: required field never resolved to a concrete value"))]
    IncompleteValue { component: String, field_path: String },

    #[snafu(display("patch conflict on component {component:?} at {json_path}: {message}"))]
    PatchConflict {
        component: String,
        json_path: String,
        message: String,
    },

    #[snafu(display("component {component:?} trait {trait_type:?}: processing block failed: {message}"))]
    ProcessingFailed {
        component: String,
        trait_type: String,
        message: String,
    },

    #[snafu(display("component {component:?}: trait {trait_type:?} does not apply to workload {workload_kind:?}"))]
    TraitNotApplicable {
        component: String,
        trait_type: String,
        workload_kind: String,
    },

    #[snafu(display("component {component:?}: traits {first:?} and {second:?} conflict"))]
    TraitConflict {
        component: String,
        first: String,
        second: String,
    },

    #[snafu(display("dependsOn cycle detected involving component {component:?}"))]
    DependencyCycle { component: String },

    #[snafu(display("component {component:?} depends on unknown component {depends_on:?}"))]
    UnknownDependency { component: String, depends_on: String },

    #[snafu(display("registry error: {source}"))]
    Registry { source: oam_registry::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Maps an [`oam_expr::EvalError`] produced while evaluating `component`'s
    /// template into one of this crate's tagged variants, preserving the
    /// field path callers surface in status conditions.
    pub fn from_eval(component: &str, err: oam_expr::EvalError) -> Self {
        match err {
            oam_expr::EvalError::ReferenceNotFound { path, .. } => Error::ReferenceNotFound {
                component: component.to_owned(),
                field_path: path,
            },
            oam_expr::EvalError::TypeMismatch { path, .. } => Error::TypeMismatch {
                component: component.to_owned(),
                field_path: path,
            },
            oam_expr::EvalError::IncompleteValue { path } => Error::IncompleteValue {
                component: component.to_owned(),
                field_path: path,
            },
            oam_expr::EvalError::Unify { path, .. } => Error::UnificationError {
                component: component.to_owned(),
                field_path: path.clone(),
                source: oam_expr::EvalError::IncompleteValue { path },
            },
            other => Error::UnificationError {
                component: component.to_owned(),
                field_path: String::new(),
                source: other,
            },
        }
    }
}
