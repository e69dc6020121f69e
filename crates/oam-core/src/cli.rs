//! Operator-wide CLI options: a `clap::Parser` struct for the handful of
//! knobs every process in this workspace needs (which namespace(s) to
//! watch, how parallel dispatch and workflow execution may be).

use clap::Parser;

/// Shared CLI options for the `oam-controller` binary.
#[derive(Debug, Clone, Parser)]
pub struct ControllerOpts {
    /// Restrict reconciliation to this namespace. Unset watches all namespaces.
    #[arg(long, env = "OAM_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Upper bound on concurrent per-cluster dispatch operations within one
    /// Application's reconcile pass.
    #[arg(long, env = "OAM_DISPATCH_PARALLELISM", default_value_t = 5)]
    pub dispatch_parallelism: usize,

    /// Upper bound on concurrently running workflow steps with no unmet
    /// dependencies.
    #[arg(long, env = "OAM_WORKFLOW_PARALLELISM", default_value_t = 5)]
    pub workflow_parallelism: usize,

    /// Number of ApplicationRevisions retained per Application.
    #[arg(long, env = "OAM_REVISION_HISTORY_LIMIT", default_value_t = 10)]
    pub revision_history_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parallelism_and_namespace_scope() {
        let opts = ControllerOpts::parse_from(["oam-controller"]);
        assert_eq!(opts.dispatch_parallelism, 5);
        assert_eq!(opts.workflow_parallelism, 5);
        assert_eq!(opts.watch_namespace, None);
    }
}
