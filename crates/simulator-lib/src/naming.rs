//! Identifier sources for synthesized node and pod names

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Supplies the numeric suffix appended to synthesized names
pub trait NameSource: Send + Sync {
    fn next_suffix(&self) -> u64;
}

/// Random non-negative 63-bit suffixes from the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNameSource;

impl NameSource for RandomNameSource {
    fn next_suffix(&self) -> u64 {
        rand::rng().random_range(0..i64::MAX as u64)
    }
}

/// Monotonic counter, for reproducible names in tests and dry runs
#[derive(Debug, Default)]
pub struct SequentialNameSource {
    next: AtomicU64,
}

impl SequentialNameSource {
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl NameSource for SequentialNameSource {
    fn next_suffix(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// `template-node-for-<group>-<suffix>`
pub fn template_node_name(group: &str, names: &dyn NameSource) -> String {
    format!("template-node-for-{}-{}", group, names.next_suffix())
}

/// `<daemonset>-pod-<suffix>`
pub fn daemon_pod_name(daemonset: &str, names: &dyn NameSource) -> String {
    format!("{}-pod-{}", daemonset, names.next_suffix())
}
