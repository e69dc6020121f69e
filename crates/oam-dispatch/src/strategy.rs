//! How the Dispatcher should treat an apply pass: resources may be patched
//! for real, only read back (paused reconciliation), or not touched at all
//! (dry run).

/// This control plane's three modes are
/// `Apply` (default), `ReconciliationPaused` (get only, used while an
/// Application is paused but its status must still reflect live state),
/// and `DryRun` (render without ever touching the cluster, used by `oam
/// -controller crd`/plan-preview tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    Apply,
    ReconciliationPaused,
    DryRun,
}

impl DispatchStrategy {
    /// Orphaned resources are only deleted under the default strategy;
    /// a paused or dry-run reconcile must not mutate cluster state.
    pub const fn deletes_orphans(self) -> bool {
        matches!(self, Self::Apply)
    }

    pub const fn applies(self) -> bool {
        matches!(self, Self::Apply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_apply_deletes_orphans() {
        assert!(DispatchStrategy::Apply.deletes_orphans());
        assert!(!DispatchStrategy::ReconciliationPaused.deletes_orphans());
        assert!(!DispatchStrategy::DryRun.deletes_orphans());
    }
}
