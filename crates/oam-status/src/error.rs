//! Tagged errors the aggregator can raise. These are
//! deliberately narrow: a failing `healthPolicy`/`customStatus` expression is
//! never one of them, since the aggregator policy is to downgrade those to
//! an "unknown" component status rather than fail the reconcile.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("reading live state of {kind} {name:?} in namespace {namespace:?}: {source}"))]
    ReadLiveState {
        kind: String,
        name: String,
        namespace: String,
        source: oam_dispatch::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
