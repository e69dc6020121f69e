//! `ApplicationRevision`: an immutable snapshot of an
//! Application spec plus the Definitions resolved at that time, named
//! `<app>-v<N>` and retained by count and age.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::application::ApplicationSpec;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.oam.dev",
    version = "v1beta1",
    kind = "ApplicationRevision",
    plural = "applicationrevisions",
    namespaced,
    crates(kube_core = "kube::core", k8s_openapi = "k8s_openapi", schemars = "schemars")
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRevisionSpec {
    pub application: String,
    pub generation: i64,
    pub application_spec: ApplicationSpec,

    /// `{kind}/{name}@{version}` for every Definition resolved while
    /// rendering this revision — enough to reproduce the render
    /// deterministically even if the registry's
    /// "current" version for a name later moves on.
    #[serde(default)]
    pub resolved_definitions: Vec<String>,

    pub content_hash: String,
}

impl ApplicationRevisionSpec {
    /// Computes the content hash used to decide whether two specs
    /// (and their resolved Definitions) are byte-identical.
    pub fn content_hash(application_spec: &ApplicationSpec, resolved_definitions: &[String]) -> String {
        let mut hasher = Sha256::new();
        if let Ok(spec_json) = serde_json::to_vec(application_spec) {
            hasher.update(&spec_json);
        }
        for def in resolved_definitions {
            hasher.update(def.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// The `<app>-v<N>` naming convention.
    pub fn name_for(application: &str, generation: i64) -> String {
        format!("{application}-v{generation}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_spec_and_definitions_hash_identically() {
        let spec = ApplicationSpec {
            components: vec![],
            policies: vec![],
            workflow: None,
        };
        let defs = vec!["Component/webservice@1.0.0".to_owned()];
        assert_eq!(
            ApplicationRevisionSpec::content_hash(&spec, &defs),
            ApplicationRevisionSpec::content_hash(&spec, &defs)
        );
    }

    #[test]
    fn changed_definitions_change_the_hash() {
        let spec = ApplicationSpec {
            components: vec![],
            policies: vec![],
            workflow: None,
        };
        let a = ApplicationRevisionSpec::content_hash(&spec, &["Component/webservice@1.0.0".to_owned()]);
        let b = ApplicationRevisionSpec::content_hash(&spec, &["Component/webservice@2.0.0".to_owned()]);
        assert_ne!(a, b);
    }

    #[test]
    fn revision_name_follows_app_v_generation_convention() {
        assert_eq!(ApplicationRevisionSpec::name_for("website", 3), "website-v3");
    }
}
