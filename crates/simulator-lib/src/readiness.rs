//! Node readiness evaluation
//!
//! Classifies a node as ready or not from its status conditions and the
//! reserved not-ready taint, and reports the latest relevant transition.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, NodeCondition};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use thiserror::Error;

/// Taint set by the node readiness controller while a node is not yet usable
pub const NODE_NOT_READY_TAINT: &str = "zalando.org/node-not-ready";

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_DISK_PRESSURE: &str = "DiskPressure";
pub const CONDITION_NETWORK_UNAVAILABLE: &str = "NetworkUnavailable";

const STATUS_TRUE: &str = "True";
const STATUS_FALSE: &str = "False";
const STATUS_UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("readiness information not found")]
    ReadinessNotFound,
}

/// Readiness verdict for a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessState {
    pub ready: bool,
    /// Latest transition among the Ready, DiskPressure and
    /// NetworkUnavailable conditions
    pub last_transition: Option<DateTime<Utc>>,
}

/// Evaluate the readiness of a node.
///
/// A missing Ready condition is an error: the node cannot be classified.
pub fn readiness_state(node: &Node) -> Result<ReadinessState, ReadinessError> {
    let mut can_be_ready = true;
    let mut ready_found = false;
    let mut last_transition: Option<DateTime<Utc>> = None;

    for cond in node_conditions(node) {
        let relevant = match cond.type_.as_str() {
            CONDITION_READY => {
                ready_found = true;
                if cond.status == STATUS_FALSE || cond.status == STATUS_UNKNOWN {
                    can_be_ready = false;
                }
                true
            }
            CONDITION_DISK_PRESSURE | CONDITION_NETWORK_UNAVAILABLE => {
                if cond.status == STATUS_TRUE {
                    can_be_ready = false;
                }
                true
            }
            _ => false,
        };

        if relevant {
            if let Some(Time(ts)) = &cond.last_transition_time {
                if last_transition.map_or(true, |current| current < *ts) {
                    last_transition = Some(*ts);
                }
            }
        }
    }

    if !ready_found {
        return Err(ReadinessError::ReadinessNotFound);
    }

    if !is_node_extended_ready(node) {
        can_be_ready = false;
    }

    Ok(ReadinessState {
        ready: can_be_ready,
        last_transition,
    })
}

/// True if the node is ready and not cordoned. Evaluation errors count as
/// not ready.
pub fn is_node_ready_and_schedulable(node: &Node) -> bool {
    match readiness_state(node) {
        Ok(state) if state.ready => !is_unschedulable(node),
        _ => false,
    }
}

/// False if the node still carries the not-ready taint
pub fn is_node_extended_ready(node: &Node) -> bool {
    !node
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .is_some_and(|taints| taints.iter().any(|t| t.key == NODE_NOT_READY_TAINT))
}

/// True if the node is administratively cordoned
pub fn is_unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
}

/// Copy of the node with its Ready condition forced to False.
///
/// The replacement condition comes first and uses the node creation
/// timestamp as its transition time; other conditions are kept in order.
pub fn unready_node_copy(node: &Node) -> Node {
    let mut copy = node.clone();
    let unready = NodeCondition {
        type_: CONDITION_READY.to_string(),
        status: STATUS_FALSE.to_string(),
        last_transition_time: node.metadata.creation_timestamp.clone(),
        ..Default::default()
    };

    let mut conditions = vec![unready];
    conditions.extend(
        node_conditions(node)
            .iter()
            .filter(|c| c.type_ != CONDITION_READY)
            .cloned(),
    );

    copy.status.get_or_insert_with(Default::default).conditions = Some(conditions);
    copy
}

fn node_conditions(node: &Node) -> &[NodeCondition] {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
}
