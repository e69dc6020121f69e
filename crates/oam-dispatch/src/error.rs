//! Tagged errors the Dispatcher raises while applying, reading, or
//! deleting resources against a cluster, or looking up a cluster client.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("building a client for cluster {cluster:?}: {source}"))]
    ClientConfig {
        cluster: String,
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("building a client for cluster {cluster:?}: {source}"))]
    ClientBuild { cluster: String, source: kube::Error },

    #[snafu(display("resource {name:?} is missing apiVersion/kind"))]
    MissingGvk { name: String },

    #[snafu(display("resource {name:?} is missing metadata.namespace"))]
    MissingNamespace { name: String },

    #[snafu(display("discovering API resource for {gvk} in cluster {cluster:?}: {source}"))]
    Discovery {
        cluster: String,
        gvk: String,
        source: kube::Error,
    },

    #[snafu(display("applying {kind} {name:?} to cluster {cluster:?}: {source}"))]
    Apply {
        cluster: String,
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("reading {kind} {name:?} from cluster {cluster:?}: {source}"))]
    Read {
        cluster: String,
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("deleting {kind} {name:?} from cluster {cluster:?}: {source}"))]
    Delete {
        cluster: String,
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("listing {kind} in cluster {cluster:?} namespace {namespace:?}: {source}"))]
    List {
        cluster: String,
        kind: String,
        namespace: String,
        source: kube::Error,
    },

    #[snafu(display("resource {name:?} could not be parsed back from its dynamic representation: {source}"))]
    Deserialize {
        name: String,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
