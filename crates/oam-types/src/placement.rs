//! A placement decision: where a rendered resource should be applied.
//! Produced by the Policy Engine's topology/env-binding evaluation,
//! consumed by the Dispatcher.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct PlacementDecision {
    /// Empty string means the control-plane cluster.
    #[serde(default)]
    pub cluster: String,
    pub namespace: String,
}

impl PlacementDecision {
    pub const CONTROL_PLANE: &'static str = "";

    pub fn control_plane(namespace: impl Into<String>) -> Self {
        Self {
            cluster: Self::CONTROL_PLANE.to_owned(),
            namespace: namespace.into(),
        }
    }

    pub fn is_control_plane(&self) -> bool {
        self.cluster.is_empty()
    }
}
