//! Structural comparison of desired arguments against observed state
//!
//! Comparison is one-sided: a desired object matches when every key it
//! shares with the observed object matches. Keys only the controller
//! reports, and keys only the caller supplied, are ignored. Arrays are
//! compared as multisets.

use serde_json::{Map, Number, Value};

fn numbers_match(desired: &Number, observed: &Number) -> bool {
    if let (Some(a), Some(b)) = (desired.as_i64(), observed.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (desired.as_u64(), observed.as_u64()) {
        return a == b;
    }
    match (desired.as_f64(), observed.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Whether `desired` is satisfied by `observed`
///
/// A desired `null` places no constraint.
pub fn values_match(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            match have.get(key) {
                Some(actual) => values_match(value, actual),
                None => true,
            }
        }),
        (Value::Array(want), Value::Array(have)) => multiset_match(want, have),
        (Value::Number(a), Value::Number(b)) => numbers_match(a, b),
        (a, b) => a == b,
    }
}

/// Every desired element is matched by a distinct observed element
fn multiset_match(desired: &[Value], observed: &[Value]) -> bool {
    if desired.len() != observed.len() {
        return false;
    }

    // Bipartite matching by augmenting paths; subset semantics mean an
    // element may match several candidates, so a greedy pass is not enough.
    let edges: Vec<Vec<usize>> = desired
        .iter()
        .map(|want| {
            observed
                .iter()
                .enumerate()
                .filter(|(_, have)| values_match(want, have))
                .map(|(index, _)| index)
                .collect()
        })
        .collect();

    let mut owner: Vec<Option<usize>> = vec![None; observed.len()];
    for start in 0..desired.len() {
        let mut visited = vec![false; observed.len()];
        if !augment(start, &edges, &mut owner, &mut visited) {
            return false;
        }
    }
    true
}

fn augment(
    node: usize,
    edges: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &candidate in &edges[node] {
        if visited[candidate] {
            continue;
        }
        visited[candidate] = true;
        let free = match owner[candidate] {
            None => true,
            Some(other) => augment(other, edges, owner, visited),
        };
        if free {
            owner[candidate] = Some(node);
            return true;
        }
    }
    false
}

/// Desired keys whose values differ from the observed object
///
/// Keys absent from the observed object are not reported.
pub fn differing_keys(desired: &Map<String, Value>, observed: &Value) -> Vec<String> {
    let Some(have) = observed.as_object() else {
        return Vec::new();
    };
    desired
        .iter()
        .filter(|(key, value)| {
            have.get(key.as_str())
                .map(|actual| !values_match(value, actual))
                .unwrap_or(false)
        })
        .map(|(key, _)| key.clone())
        .collect()
}
