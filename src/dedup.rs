use std::collections::HashSet;

use crate::cleaner::CleanedParameter;

/// Canonical identity of a parameter name. Shared by the per-input dedup and
/// the aggregator so both layers agree on what counts as a duplicate.
pub fn identity_key(name: &str) -> String {
    name.to_lowercase()
}

pub fn dedupe(params: Vec<CleanedParameter>) -> Vec<CleanedParameter> {
    let mut seen = HashSet::with_capacity(params.len());
    params.into_iter().filter(|p| seen.insert(identity_key(&p.name))).collect()
}
