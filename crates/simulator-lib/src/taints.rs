//! Taint filtering and toleration matching

use k8s_openapi::api::core::v1::{Taint, Toleration};
use std::collections::HashSet;
use tracing::debug;

/// Taint keys that template nodes must not carry
pub type TaintKeySet = HashSet<String>;

pub const EFFECT_NO_SCHEDULE: &str = "NoSchedule";
pub const EFFECT_NO_EXECUTE: &str = "NoExecute";

/// Parse a comma separated list of taint keys, ignoring blanks
pub fn parse_taint_keys(raw: &str) -> TaintKeySet {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drop every taint whose key is in `ignored`
pub fn sanitize_taints(taints: &[Taint], ignored: &TaintKeySet) -> Vec<Taint> {
    taints
        .iter()
        .filter(|taint| {
            let keep = !ignored.contains(&taint.key);
            if !keep {
                debug!(taint = %taint.key, "Removing ignored taint from template node");
            }
            keep
        })
        .cloned()
        .collect()
}

/// True if the toleration tolerates the taint
pub fn tolerates(toleration: &Toleration, taint: &Taint) -> bool {
    if let Some(effect) = toleration.effect.as_deref() {
        if !effect.is_empty() && effect != taint.effect {
            return false;
        }
    }

    let key = toleration.key.as_deref().unwrap_or_default();
    let operator = toleration.operator.as_deref().unwrap_or("Equal");
    match operator {
        // An empty key with Exists matches every taint.
        "Exists" => key.is_empty() || key == taint.key,
        "Equal" | "" => {
            key == taint.key
                && toleration.value.as_deref().unwrap_or_default()
                    == taint.value.as_deref().unwrap_or_default()
        }
        _ => false,
    }
}

/// First NoSchedule or NoExecute taint not tolerated by the given tolerations
pub fn first_untolerated<'a>(taints: &'a [Taint], tolerations: &[Toleration]) -> Option<&'a Taint> {
    taints
        .iter()
        .filter(|t| t.effect == EFFECT_NO_SCHEDULE || t.effect == EFFECT_NO_EXECUTE)
        .find(|t| !tolerations.iter().any(|tol| tolerates(tol, t)))
}
