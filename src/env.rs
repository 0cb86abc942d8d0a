//! Environment variable snapshotting rules.
//!
//! A pure function over an iterator of `(name, value)` pairs rather than
//! `std::env::vars()` directly, so it is unit-testable without touching
//! process-global state.

use rustc_hash::FxHashMap;
use serde_json::Value;

const HYPERFLEET_PREFIX: &str = "HYPERFLEET_";

/// Snapshots `vars` into `v.env`'s shape: every `HYPERFLEET_*` variable is
/// dual-keyed, once under its full name and once with the prefix stripped,
/// so `env.HYPERFLEET_REGION` and `env.REGION` both resolve. Every other
/// variable passes through unprefixed under its own name, for `env.<NAME>`
/// parameter sources that name an arbitrary variable.
#[must_use]
pub fn snapshot_env(vars: impl Iterator<Item = (String, String)>) -> FxHashMap<String, Value> {
    let mut snapshot = FxHashMap::default();
    for (name, value) in vars {
        let json_value = Value::String(value);
        if let Some(stripped) = name.strip_prefix(HYPERFLEET_PREFIX) {
            snapshot.insert(stripped.to_string(), json_value.clone());
        }
        snapshot.insert(name, json_value);
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperfleet_prefixed_variable_is_dual_keyed() {
        let vars = vec![("HYPERFLEET_REGION".to_string(), "us-east".to_string())];
        let snapshot = snapshot_env(vars.into_iter());
        assert_eq!(
            snapshot.get("HYPERFLEET_REGION"),
            Some(&Value::String("us-east".to_string()))
        );
        assert_eq!(
            snapshot.get("REGION"),
            Some(&Value::String("us-east".to_string()))
        );
    }

    #[test]
    fn unprefixed_variable_passes_through_under_its_own_name() {
        let vars = vec![("PATH".to_string(), "/usr/bin".to_string())];
        let snapshot = snapshot_env(vars.into_iter());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("PATH"), Some(&Value::String("/usr/bin".to_string())));
    }

    #[test]
    fn empty_iterator_yields_empty_snapshot() {
        let snapshot = snapshot_env(std::iter::empty());
        assert!(snapshot.is_empty());
    }
}
