//! The `k8s` task: one generation-tracked apply step for a single schemaless
//! resource. Built directly over [`K8sTransport`] — discovery, the decision
//! table, and the recreate sequence are each separate private functions so
//! the decision logic is testable without a live cluster.

use super::TaskRunner;
use crate::context::ExecCtx;
use crate::error::{EngineError, ExpressionError, K8sError};
use crate::expr::template;
use crate::k8s::{GroupVersionKind, K8sTransport};
use crate::value_map::ValueMap;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Poll interval for the recreate sequence's NotFound wait (design value).
const RECREATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Create,
    Skip,
    Update,
    Recreate,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Skip => "skip",
            Operation::Update => "update",
            Operation::Recreate => "recreate",
        }
    }
}

pub struct K8sRunner {
    transport: Arc<dyn K8sTransport>,
    annotation_domain: String,
}

impl K8sRunner {
    #[must_use]
    pub fn new(transport: Arc<dyn K8sTransport>, annotation_domain: String) -> Self {
        Self {
            transport,
            annotation_domain,
        }
    }

    fn generation_key(&self) -> String {
        format!("{}/generation", self.annotation_domain)
    }
}

#[async_trait]
impl TaskRunner for K8sRunner {
    async fn call(
        &self,
        with: ValueMap,
        v: ValueMap,
        ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        let with = with.as_json();
        let name = with
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| K8sError::Other {
                kind: "unknown".to_string(),
                name: String::new(),
                reason: "k8s task requires a `name` field".to_string(),
            })?
            .to_string();

        let raw_manifest = with.get("manifest").cloned().unwrap_or(Value::Null);
        let params = v.params().cloned().map(Value::Object).unwrap_or(Value::Null);
        let manifest =
            render_manifest(&raw_manifest, &params).map_err(crate::error::EngineError::Expression)?;

        let api_version = manifest
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field_error(&name, "apiVersion"))?;
        let kind = manifest
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field_error(&name, "kind"))?;
        let manifest_name = manifest
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field_error(&name, "metadata.name"))?
            .to_string();
        let manifest_namespace = manifest
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let gvk = GroupVersionKind::parse(api_version, kind);
        let recreate_on_change = with
            .get("recreateOnChange")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let discovery = with.get("discovery");
        let namespace = discovery
            .and_then(|d| d.get("namespace"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| manifest_namespace.clone());

        let existing = self
            .discover_existing(&gvk, discovery, namespace.as_deref(), &manifest_name)
            .await?;

        let new_gen = generation_of(&manifest, &self.generation_key());
        let existing_gen = existing
            .as_ref()
            .map(|e| generation_of(e, &self.generation_key()))
            .unwrap_or(0);

        let (operation, reason) = match &existing {
            None => (Operation::Create, "no existing resource".to_string()),
            Some(_) if new_gen == existing_gen => {
                (Operation::Skip, format!("generation unchanged at {new_gen}"))
            }
            Some(_) if !recreate_on_change => (
                Operation::Update,
                format!("generation differs ({existing_gen} -> {new_gen})"),
            ),
            Some(_) => (
                Operation::Recreate,
                format!("generation differs ({existing_gen} -> {new_gen}), recreateOnChange set"),
            ),
        };

        let result_object = self
            .execute(
                operation,
                &gvk,
                namespace.as_deref(),
                &manifest_name,
                manifest,
                existing,
                ctx,
            )
            .await?;

        let mut next = v;
        next.set("operation", Value::String(operation.as_str().to_string()));
        next.set("operationReason", Value::String(reason));
        next.set_resource(&name, result_object);
        Ok(next)
    }
}

impl K8sRunner {
    async fn discover_existing(
        &self,
        gvk: &GroupVersionKind,
        discovery: Option<&Value>,
        namespace: Option<&str>,
        manifest_name: &str,
    ) -> Result<Option<Value>, EngineError> {
        let by_name = discovery
            .and_then(|d| d.get("byName"))
            .and_then(Value::as_str);
        let selector = discovery
            .and_then(|d| d.get("bySelectors"))
            .and_then(|s| s.get("labelSelector"))
            .and_then(Value::as_str);

        if let Some(selector) = selector {
            let candidates = self
                .transport
                .list_by_selector(gvk, namespace, selector)
                .await?;
            return Ok(pick_largest_generation(candidates, &self.generation_key()));
        }

        let lookup_name = by_name.unwrap_or(manifest_name);
        Ok(self.transport.get(gvk, namespace, lookup_name).await?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        operation: Operation,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        manifest: Value,
        existing: Option<Value>,
        ctx: &ExecCtx,
    ) -> Result<Value, EngineError> {
        match operation {
            Operation::Create => Ok(self.transport.create(gvk, namespace, manifest).await?),
            Operation::Skip => Ok(existing.unwrap_or(manifest)),
            Operation::Update => {
                let merged = carry_identity(manifest, existing.as_ref());
                Ok(self.transport.update(gvk, namespace, merged).await?)
            }
            Operation::Recreate => {
                self.transport.delete(gvk, namespace, name).await?;
                self.poll_until_absent(gvk, namespace, name, ctx).await?;
                Ok(self.transport.create(gvk, namespace, manifest).await?)
            }
        }
    }

    async fn poll_until_absent(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        ctx: &ExecCtx,
    ) -> Result<(), EngineError> {
        loop {
            if self.transport.get(gvk, namespace, name).await?.is_none() {
                return Ok(());
            }
            tokio::select! {
                () = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                () = tokio::time::sleep(RECREATE_POLL_INTERVAL) => {}
            }
        }
    }
}

/// Recursively renders `{{ .path }}` mustache placeholders in every string
/// leaf of `manifest`, using `params` as the template's data root. Leaves
/// with no `{{` pass through unchanged, per the template renderer's own
/// invariant.
fn render_manifest(manifest: &Value, params: &Value) -> Result<Value, ExpressionError> {
    match manifest {
        Value::String(s) if s.contains("{{") => {
            Ok(Value::String(template::render(s, params)?))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_manifest(item, params))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, val)| Ok((k.clone(), render_manifest(val, params)?)))
            .collect::<Result<serde_json::Map<_, _>, ExpressionError>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn generation_of(obj: &Value, key: &str) -> i64 {
    obj.get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Picks the candidate with the largest generation annotation, tie-breaking
/// by object name ascending.
fn pick_largest_generation(candidates: Vec<Value>, generation_key: &str) -> Option<Value> {
    candidates.into_iter().max_by(|a, b| {
        let gen_a = generation_of(a, generation_key);
        let gen_b = generation_of(b, generation_key);
        gen_a.cmp(&gen_b).then_with(|| {
            let name_a = a
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let name_b = b
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            // Reversed so that, under equal generation, `max_by` selects the
            // alphabetically-first name (ascending tie-break).
            name_b.cmp(name_a)
        })
    })
}

/// Carries the existing object's `resourceVersion` and `uid` onto the
/// rendered manifest before an update.
fn carry_identity(mut manifest: Value, existing: Option<&Value>) -> Value {
    let Some(existing) = existing else {
        return manifest;
    };
    let resource_version = existing
        .get("metadata")
        .and_then(|m| m.get("resourceVersion"))
        .cloned();
    let uid = existing.get("metadata").and_then(|m| m.get("uid")).cloned();

    if let Some(metadata) = manifest.get_mut("metadata").and_then(Value::as_object_mut) {
        if let Some(rv) = resource_version {
            metadata.insert("resourceVersion".to_string(), rv);
        }
        if let Some(uid) = uid {
            metadata.insert("uid".to_string(), uid);
        }
    }
    manifest
}

fn missing_field_error(name: &str, field: &str) -> EngineError {
    EngineError::K8s(K8sError::Other {
        kind: "unknown".to_string(),
        name: name.to_string(),
        reason: format!("manifest is missing required field `{field}`"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecCtx {
        ExecCtx::new(CancellationToken::new())
    }

    #[derive(Default)]
    struct FakeK8s {
        existing: Mutex<Option<Value>>,
        deleted: Mutex<bool>,
    }

    #[async_trait]
    impl K8sTransport for FakeK8s {
        async fn get(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<Option<Value>, K8sError> {
            Ok(self.existing.lock().unwrap().clone())
        }

        async fn list_by_selector(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _label_selector: &str,
        ) -> Result<Vec<Value>, K8sError> {
            Ok(self.existing.lock().unwrap().iter().cloned().collect())
        }

        async fn create(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            manifest: Value,
        ) -> Result<Value, K8sError> {
            *self.existing.lock().unwrap() = Some(manifest.clone());
            Ok(manifest)
        }

        async fn update(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            manifest: Value,
        ) -> Result<Value, K8sError> {
            *self.existing.lock().unwrap() = Some(manifest.clone());
            Ok(manifest)
        }

        async fn delete(
            &self,
            _gvk: &GroupVersionKind,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<(), K8sError> {
            *self.deleted.lock().unwrap() = true;
            *self.existing.lock().unwrap() = None;
            Ok(())
        }
    }

    fn manifest(generation: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "cm1",
                "namespace": "default",
                "annotations": {"hyperfleet.io/generation": generation},
            },
            "data": {},
        })
    }

    fn with(generation: &str, recreate: bool) -> ValueMap {
        let mut w = ValueMap::new();
        w.set("name", json!("cm1"));
        w.set("manifest", manifest(generation));
        w.set("recreateOnChange", json!(recreate));
        w
    }

    #[tokio::test]
    async fn first_apply_creates_then_second_skips() {
        let runner = K8sRunner::new(Arc::new(FakeK8s::default()), "hyperfleet.io".to_string());
        let first = runner
            .call(with("3", false), ValueMap::new(), &ctx())
            .await
            .unwrap();
        assert_eq!(first.get("operation"), Some(&json!("create")));

        let second = runner
            .call(with("3", false), ValueMap::new(), &ctx())
            .await
            .unwrap();
        assert_eq!(second.get("operation"), Some(&json!("skip")));
    }

    #[tokio::test]
    async fn generation_bump_without_recreate_updates() {
        let transport = Arc::new(FakeK8s::default());
        let runner = K8sRunner::new(transport, "hyperfleet.io".to_string());
        runner
            .call(with("3", false), ValueMap::new(), &ctx())
            .await
            .unwrap();
        let bumped = runner
            .call(with("4", false), ValueMap::new(), &ctx())
            .await
            .unwrap();
        assert_eq!(bumped.get("operation"), Some(&json!("update")));
    }

    #[tokio::test]
    async fn generation_bump_with_recreate_flag_recreates() {
        let transport = Arc::new(FakeK8s::default());
        let runner = K8sRunner::new(transport, "hyperfleet.io".to_string());
        runner
            .call(with("3", true), ValueMap::new(), &ctx())
            .await
            .unwrap();
        let recreated = runner
            .call(with("4", true), ValueMap::new(), &ctx())
            .await
            .unwrap();
        assert_eq!(recreated.get("operation"), Some(&json!("recreate")));
    }

    #[test]
    fn tie_break_picks_larger_generation() {
        let a = json!({"metadata": {"name": "a", "annotations": {"g": "1"}}});
        let b = json!({"metadata": {"name": "b", "annotations": {"g": "2"}}});
        let winner = pick_largest_generation(vec![a, b], "g").unwrap();
        assert_eq!(winner["metadata"]["name"], json!("b"));
    }

    #[test]
    fn tie_break_on_equal_generation_picks_ascending_name() {
        let a = json!({"metadata": {"name": "alpha", "annotations": {"g": "5"}}});
        let b = json!({"metadata": {"name": "beta", "annotations": {"g": "5"}}});
        let winner = pick_largest_generation(vec![b, a], "g").unwrap();
        assert_eq!(winner["metadata"]["name"], json!("alpha"));
    }

    #[test]
    fn render_manifest_leaves_plain_strings_untouched() {
        let manifest = json!({"metadata": {"name": "cm1"}, "data": {"k": "v"}});
        let rendered = render_manifest(&manifest, &json!({})).unwrap();
        assert_eq!(rendered, manifest);
    }

    #[test]
    fn render_manifest_substitutes_params_path() {
        let manifest = json!({"data": {"cluster": "{{ .clusterId }}"}});
        let params = json!({"clusterId": "c-1"});
        let rendered = render_manifest(&manifest, &params).unwrap();
        assert_eq!(rendered["data"]["cluster"], json!("c-1"));
    }
}
