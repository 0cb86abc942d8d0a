//! The `k8s-read` task: resolves a single key out of a Secret or ConfigMap,
//! addressed as `<namespace>/<name>.<key>`.

use super::TaskRunner;
use crate::context::ExecCtx;
use crate::error::{EngineError, ExtractError, K8sError};
use crate::k8s::{GroupVersionKind, K8sTransport};
use crate::value_map::ValueMap;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct K8sReadRunner {
    transport: Arc<dyn K8sTransport>,
}

impl K8sReadRunner {
    #[must_use]
    pub fn new(transport: Arc<dyn K8sTransport>) -> Self {
        Self { transport }
    }

    /// Resolves one `{kind, ref: "<ns>/<name>.<key>", required, default}`
    /// entry against the transport.
    async fn resolve_one(&self, entry: &Value) -> Result<(String, Value), EngineError> {
        let kind = entry
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("Secret");
        let reference = entry
            .get("ref")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::Extract(ExtractError::MissingRequired {
                    name: "ref".to_string(),
                    source: "k8s-read entry".to_string(),
                })
            })?;
        let required = entry
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let default = entry.get("default").cloned();
        let as_key = entry
            .get("as")
            .and_then(Value::as_str)
            .unwrap_or(reference)
            .to_string();

        let (namespace, name, key) = parse_ref(reference).ok_or_else(|| {
            EngineError::Extract(ExtractError::MissingRequired {
                name: as_key.clone(),
                source: reference.to_string(),
            })
        })?;

        let gvk = GroupVersionKind::parse("v1", kind);
        let object = self.transport.get(&gvk, Some(&namespace), &name).await?;

        let value = object
            .as_ref()
            .and_then(|obj| lookup_data_key(obj, kind, &key));

        match value {
            Some(v) => Ok((as_key, v)),
            None if required => Err(EngineError::Extract(ExtractError::MissingRequired {
                name: as_key,
                source: reference.to_string(),
            })),
            None => Ok((as_key, default.unwrap_or(Value::Null))),
        }
    }
}

#[async_trait]
impl TaskRunner for K8sReadRunner {
    async fn call(
        &self,
        with: ValueMap,
        v: ValueMap,
        _ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        let with = with.as_json();
        let entries = with
            .get("refs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut next = v;
        for entry in &entries {
            let (key, value) = self.resolve_one(entry).await?;
            next.set(key, value);
        }
        Ok(next)
    }
}

/// Splits `<namespace>/<name>.<key>` into its three parts. Both the `/` and
/// the final `.` are required; the name may not itself contain a `.` ahead
/// of the key separator since the key is always the last segment.
fn parse_ref(reference: &str) -> Option<(String, String, String)> {
    let (namespace, rest) = reference.split_once('/')?;
    let (name, key) = rest.rsplit_once('.')?;
    Some((namespace.to_string(), name.to_string(), key.to_string()))
}

/// Secrets and ConfigMaps both store their payload under a top-level `data`
/// map; Secret values are base64-encoded by the API server and are decoded
/// here so callers always see plain text.
fn lookup_data_key(obj: &Value, kind: &str, key: &str) -> Option<Value> {
    let raw = obj.get("data")?.get(key)?.as_str()?;
    if kind.eq_ignore_ascii_case("secret") {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD.decode(raw).ok()?;
        Some(Value::String(String::from_utf8(decoded).ok()?))
    } else {
        Some(Value::String(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecCtx {
        ExecCtx::new(CancellationToken::new())
    }

    struct FakeK8s {
        object: Option<Value>,
    }

    #[async_trait]
    impl K8sTransport for FakeK8s {
        async fn get(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<Option<Value>, K8sError> {
            Ok(self.object.clone())
        }

        async fn list_by_selector(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _label_selector: &str,
        ) -> Result<Vec<Value>, K8sError> {
            Ok(Vec::new())
        }

        async fn create(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            manifest: Value,
        ) -> Result<Value, K8sError> {
            Ok(manifest)
        }

        async fn update(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            manifest: Value,
        ) -> Result<Value, K8sError> {
            Ok(manifest)
        }

        async fn delete(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<(), K8sError> {
            Ok(())
        }
    }

    #[test]
    fn parses_namespace_name_and_key() {
        let (ns, name, key) = parse_ref("default/db-creds.password").unwrap();
        assert_eq!(ns, "default");
        assert_eq!(name, "db-creds");
        assert_eq!(key, "password");
    }

    #[tokio::test]
    async fn resolves_configmap_value_as_top_level_key() {
        let transport = FakeK8s {
            object: Some(json!({"data": {"url": "https://example.test"}})),
        };
        let runner = K8sReadRunner::new(Arc::new(transport));
        let mut with = ValueMap::new();
        with.set(
            "refs",
            json!([{"kind": "ConfigMap", "ref": "default/cfg.url", "as": "apiUrl"}]),
        );
        let result = runner.call(with, ValueMap::new(), &ctx()).await.unwrap();
        assert_eq!(result.get("apiUrl"), Some(&json!("https://example.test")));
    }

    #[tokio::test]
    async fn missing_required_ref_fails() {
        let transport = FakeK8s { object: None };
        let runner = K8sReadRunner::new(Arc::new(transport));
        let mut with = ValueMap::new();
        with.set(
            "refs",
            json!([{"kind": "Secret", "ref": "default/missing.token"}]),
        );
        let result = runner.call(with, ValueMap::new(), &ctx()).await;
        assert!(matches!(result, Err(EngineError::Extract(_))));
    }

    #[tokio::test]
    async fn missing_optional_ref_falls_back_to_default() {
        let transport = FakeK8s { object: None };
        let runner = K8sReadRunner::new(Arc::new(transport));
        let mut with = ValueMap::new();
        with.set(
            "refs",
            json!([{"kind": "Secret", "ref": "default/missing.token", "required": false, "default": "fallback"}]),
        );
        let result = runner.call(with, ValueMap::new(), &ctx()).await.unwrap();
        assert_eq!(result.get("default/missing.token"), Some(&json!("fallback")));
    }
}
