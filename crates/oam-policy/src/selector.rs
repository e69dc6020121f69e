//! A tiny label-selector shape shared by `Override`/`Topology` matching.
//! Components in this data model carry no first-class label field, so a
//! selector matches against whatever the caller passes in (conventionally
//! a `labels` sub-object of the component's `properties`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl ComponentSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}
