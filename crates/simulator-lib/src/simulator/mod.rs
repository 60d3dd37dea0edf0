//! Scheduling simulation contracts
//!
//! The projector and the synthesizer only need a throwaway snapshot to stage
//! a node and an admission checker to ask whether a pod fits on it. Both are
//! traits so callers can plug in a full scheduler framework; the basic
//! implementations here cover the predicates the autoscaler relies on.

mod predicates;
mod snapshot;

pub use predicates::{BasicPredicateChecker, PredicateChecker, PredicateError};
pub use snapshot::{BasicClusterSnapshot, ClusterSnapshot, SnapshotError};
