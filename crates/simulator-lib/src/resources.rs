//! Resource quantity arithmetic
//!
//! Quantities are compared in milli-units so that CPU (`100m`) and memory
//! (`8Gi`) share one integer representation.

use k8s_openapi::api::core::v1::{Container, Node, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use thiserror::Error;

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_PODS: &str = "pods";

/// Resource name -> amount in milli-units
pub type MilliResources = BTreeMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("invalid quantity {0:?}")]
    InvalidQuantity(String),
    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Parse a quantity into milli-units, rounding up.
pub fn milli_value(quantity: &Quantity) -> Result<i64, ResourceError> {
    let raw = quantity.0.trim();
    let invalid = || ResourceError::InvalidQuantity(quantity.0.clone());

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    if number.is_empty() {
        return Err(invalid());
    }
    let number: f64 = number.parse().map_err(|_| invalid())?;

    // Scale factor from one unit of the suffix to milli-units.
    let factor = match suffix {
        "" => 1e3,
        "n" => 1e-6,
        "u" => 1e-3,
        "m" => 1.0,
        "k" => 1e6,
        "M" => 1e9,
        "G" => 1e12,
        "T" => 1e15,
        "P" => 1e18,
        "E" => 1e21,
        "Ki" => 1024f64 * 1e3,
        "Mi" => 1024f64.powi(2) * 1e3,
        "Gi" => 1024f64.powi(3) * 1e3,
        "Ti" => 1024f64.powi(4) * 1e3,
        "Pi" => 1024f64.powi(5) * 1e3,
        "Ei" => 1024f64.powi(6) * 1e3,
        other => match other.strip_prefix(['e', 'E']) {
            Some(exp) => 10f64.powi(exp.parse::<i32>().map_err(|_| invalid())?) * 1e3,
            None => return Err(invalid()),
        },
    };

    let exact = number * factor;
    let nearest = exact.round();
    let milli = if (exact - nearest).abs() < 1e-6 {
        nearest
    } else {
        exact.ceil()
    };
    if !milli.is_finite() || milli > i64::MAX as f64 || milli < i64::MIN as f64 {
        return Err(ResourceError::OutOfRange(quantity.0.clone()));
    }
    Ok(milli as i64)
}

/// Parse a quantity into whole units, rounding up
pub fn value(quantity: &Quantity) -> Result<i64, ResourceError> {
    let milli = milli_value(quantity)?;
    Ok(milli.div_euclid(1000) + i64::from(milli.rem_euclid(1000) != 0))
}

fn to_milli(list: Option<&BTreeMap<String, Quantity>>) -> Result<MilliResources, ResourceError> {
    let mut out = MilliResources::new();
    for (name, quantity) in list.into_iter().flatten() {
        out.insert(name.clone(), milli_value(quantity)?);
    }
    Ok(out)
}

fn container_requests(container: &Container) -> Result<MilliResources, ResourceError> {
    to_milli(container.resources.as_ref().and_then(|r| r.requests.as_ref()))
}

/// Effective requests of a pod: the sum over regular containers, raised to
/// the largest single init container request where that is higher.
pub fn pod_requests(pod: &Pod) -> Result<MilliResources, ResourceError> {
    let mut total = MilliResources::new();
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(total);
    };

    for container in &spec.containers {
        for (name, amount) in container_requests(container)? {
            *total.entry(name).or_insert(0) += amount;
        }
    }

    for container in spec.init_containers.iter().flatten() {
        for (name, amount) in container_requests(container)? {
            let entry = total.entry(name).or_insert(0);
            *entry = (*entry).max(amount);
        }
    }

    Ok(total)
}

/// Allocatable resources of a node, falling back to capacity when the
/// node reports no allocatable figures
pub fn node_allocatable(node: &Node) -> Result<MilliResources, ResourceError> {
    let status = node.status.as_ref();
    let allocatable = status.and_then(|s| s.allocatable.as_ref());
    match allocatable {
        Some(list) if !list.is_empty() => to_milli(Some(list)),
        _ => to_milli(status.and_then(|s| s.capacity.as_ref())),
    }
}

/// CPU cores and memory bytes from the node's capacity; missing or
/// negative values count as zero
pub fn node_cores_and_memory(node: &Node) -> Result<(i64, i64), ResourceError> {
    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref());
    let get = |name: &str| -> Result<i64, ResourceError> {
        match capacity.and_then(|c| c.get(name)) {
            Some(q) => Ok(value(q)?.max(0)),
            None => Ok(0),
        }
    };
    Ok((get(RESOURCE_CPU)?, get(RESOURCE_MEMORY)?))
}

/// Copy limit-only entries into requests for every regular container.
///
/// The API server defaults requests from limits on admission; the
/// predicate checker sees pods before that happens.
pub fn copy_limits_to_requests(spec: &mut PodSpec) {
    for container in &mut spec.containers {
        let Some(resources) = container.resources.as_mut() else {
            continue;
        };
        let Some(limits) = resources.limits.as_ref() else {
            continue;
        };
        let requests = resources.requests.get_or_insert_with(BTreeMap::new);
        for (name, quantity) in limits {
            requests
                .entry(name.clone())
                .or_insert_with(|| quantity.clone());
        }
    }
}
