//! The `resources` task: a sequential wrapper over [`super::k8s::K8sRunner`]
//! invocations. Halts at the first failure; resources successfully applied
//! before the failure remain recorded.

use super::k8s::K8sRunner;
use super::TaskRunner;
use crate::context::ExecCtx;
use crate::error::EngineError;
use crate::k8s::K8sTransport;
use crate::value_map::ValueMap;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct ResourcesRunner {
    k8s: K8sRunner,
}

impl ResourcesRunner {
    #[must_use]
    pub fn new(transport: Arc<dyn K8sTransport>, annotation_domain: String) -> Self {
        Self {
            k8s: K8sRunner::new(transport, annotation_domain),
        }
    }
}

#[async_trait]
impl TaskRunner for ResourcesRunner {
    async fn call(
        &self,
        with: ValueMap,
        v: ValueMap,
        ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        let entries = with
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut current = v;
        for entry in entries {
            let item_with = ValueMap::from_json(entry);
            current = self.k8s.call(item_with, current, ctx).await?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::K8sError;
    use crate::k8s::GroupVersionKind;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecCtx {
        ExecCtx::new(CancellationToken::new())
    }

    struct FakeK8s {
        objects: Mutex<std::collections::HashMap<String, Value>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl K8sTransport for FakeK8s {
        async fn get(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            name: &str,
        ) -> Result<Option<Value>, K8sError> {
            Ok(self.objects.lock().unwrap().get(name).cloned())
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
            let name = manifest["metadata"]["name"].as_str().unwrap().to_string();
            if self.fail_on.as_deref() == Some(name.as_str()) {
                return Err(K8sError::Other {
                    kind: "ConfigMap".to_string(),
                    name,
                    reason: "simulated failure".to_string(),
                });
            }
            self.objects.lock().unwrap().insert(name, manifest.clone());
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

    fn item(name: &str) -> Value {
        json!({
            "name": name,
            "manifest": {
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": name, "namespace": "default"},
            },
        })
    }

    #[tokio::test]
    async fn halts_on_first_failure_preserving_prior_resources() {
        let transport = Arc::new(FakeK8s {
            objects: Mutex::new(std::collections::HashMap::new()),
            fail_on: Some("cm2".to_string()),
        });
        let runner = ResourcesRunner::new(transport, "hyperfleet.io".to_string());
        let mut with = ValueMap::new();
        with.set("items", json!([item("cm1"), item("cm2"), item("cm3")]));

        let result = runner.call(with, ValueMap::new(), &ctx()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn applies_all_entries_in_order() {
        let transport = Arc::new(FakeK8s {
            objects: Mutex::new(std::collections::HashMap::new()),
            fail_on: None,
        });
        let runner = ResourcesRunner::new(transport, "hyperfleet.io".to_string());
        let mut with = ValueMap::new();
        with.set("items", json!([item("cm1"), item("cm2")]));

        let result = runner.call(with, ValueMap::new(), &ctx()).await.unwrap();
        let resources = result.resources().unwrap();
        assert!(resources.contains_key("cm1"));
        assert!(resources.contains_key("cm2"));
    }
}
