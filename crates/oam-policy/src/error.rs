//! Tagged errors the Policy Engine raises while parsing and applying
//! policies, mirroring the Template Engine's convention of never
//! collapsing to a bare `String`.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("policy {name:?} of type {policy_type:?} has malformed properties: {source}"))]
    MalformedPolicy {
        name: String,
        policy_type: String,
        source: serde_json::Error,
    },

    #[snafu(display("override policy {name:?} targets unknown component {component:?}"))]
    UnknownOverrideTarget { name: String, component: String },

    #[snafu(display("env-binding policy {name:?} declares env {env:?} with no placement and no cluster-label-selector resolver available"))]
    UnresolvedClusterSelector { name: String, env: String },

    #[snafu(display("applying override {name:?} to component {component:?}: {source}"))]
    OverrideMerge {
        name: String,
        component: String,
        source: oam_render::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
