//! The value map threaded through workflow interpretation.
//!
//! `ValueMap` is the sole data structure flowing through the interpreter: a
//! mapping from string to arbitrary JSON-shaped value. It is never aliased
//! across tasks — each task receives the predecessor's output by value and
//! produces the successor's input, passed straight through with no merge
//! step since task execution here is strictly sequential.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Reserved top-level keys populated by the engine as execution proceeds.
pub mod keys {
    pub const EVENT: &str = "event";
    pub const ENV: &str = "env";
    pub const PARAMS: &str = "params";
    pub const CONTENT: &str = "content";
    pub const RESPONSE: &str = "response";
    pub const RESOURCES: &str = "resources";
    pub const ADAPTER: &str = "adapter";
}

/// The JSON-shaped state threaded through the interpreter.
///
/// # Examples
///
/// ```
/// use hyperfleet_engine::value_map::ValueMap;
/// use serde_json::json;
///
/// let mut v = ValueMap::new();
/// v.set("clusterId", json!("c-1"));
/// assert_eq!(v.get("clusterId"), Some(&json!("c-1")));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueMap(FxHashMap<String, Value>);

impl ValueMap {
    /// Creates an empty value map.
    #[must_use]
    pub fn new() -> Self {
        Self(FxHashMap::default())
    }

    /// Seeds a fresh value map for a new execution: the raw event payload
    /// under `event`, and the environment snapshot under `env`.
    #[must_use]
    pub fn for_event(event: Value, env: FxHashMap<String, Value>) -> Self {
        let mut v = Self::new();
        v.set(keys::EVENT, event);
        v.set(keys::ENV, Value::Object(env.into_iter().collect()));
        v.set(keys::PARAMS, Value::Object(Default::default()));
        v.set(keys::RESOURCES, Value::Object(Default::default()));
        v
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the whole map as a `serde_json::Value::Object`, the shape
    /// expressions evaluate against.
    #[must_use]
    pub fn as_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Builds a `ValueMap` back from a `serde_json::Value::Object`, the
    /// shape an `export` transform or a runner's replacement output
    /// produces.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map.into_iter().collect()),
            other => {
                let mut v = Self::new();
                v.set("value", other);
                v
            }
        }
    }

    /// Mirrors a resolved key into both the map root and `params`, keeping
    /// `Set`'s invariant that `v'.params[k] == v'[k]` for every key it writes.
    pub fn set_param(&mut self, key: &str, value: Value) {
        self.set(key, value.clone());
        let params = self
            .0
            .entry(keys::PARAMS.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = params {
            map.insert(key.to_string(), value);
        } else {
            *params = Value::Object(
                std::iter::once((key.to_string(), value)).collect(),
            );
        }
    }

    #[must_use]
    pub fn params(&self) -> Option<&serde_json::Map<String, Value>> {
        self.get(keys::PARAMS).and_then(Value::as_object)
    }

    #[must_use]
    pub fn event(&self) -> Option<&Value> {
        self.get(keys::EVENT)
    }

    #[must_use]
    pub fn resources(&self) -> Option<&serde_json::Map<String, Value>> {
        self.get(keys::RESOURCES).and_then(Value::as_object)
    }

    /// Records a resource under `resources.<name>`, creating the `resources`
    /// object if it does not already exist.
    pub fn set_resource(&mut self, name: &str, value: Value) {
        let resources = self
            .0
            .entry(keys::RESOURCES.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = resources {
            map.insert(name.to_string(), value);
        } else {
            *resources = Value::Object(std::iter::once((name.to_string(), value)).collect());
        }
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        v.as_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_param_mirrors_into_root_and_params() {
        let mut v = ValueMap::new();
        v.set_param("clusterId", json!("c-1"));
        assert_eq!(v.get("clusterId"), Some(&json!("c-1")));
        assert_eq!(
            v.params().and_then(|p| p.get("clusterId")),
            Some(&json!("c-1"))
        );
    }

    #[test]
    fn set_resource_creates_object_once() {
        let mut v = ValueMap::new();
        v.set_resource("cm1", json!({"kind": "ConfigMap"}));
        v.set_resource("cm2", json!({"kind": "Secret"}));
        let resources = v.resources().unwrap();
        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn roundtrip_through_json() {
        let mut v = ValueMap::new();
        v.set("a", json!(1));
        let roundtripped = ValueMap::from_json(v.as_json());
        assert_eq!(roundtripped.get("a"), Some(&json!(1)));
    }
}
