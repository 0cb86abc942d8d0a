//! The Kubernetes transport seam: a trait the `k8s`/`k8s-read` runners
//! program against, plus a `kube`-backed implementation operating on
//! schemaless [`kube::api::DynamicObject`]s (this engine never compiles
//! against generated per-CRD types, since it manages resources it did not
//! author).

use crate::error::K8sError;
use async_trait::async_trait;
use serde_json::Value;

/// A resource's group/version/kind, parsed out of a manifest's
/// `apiVersion`/`kind` fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Splits a Kubernetes `apiVersion` (`"v1"` or `"apps/v1"`) and `kind`
    /// into a `GroupVersionKind`.
    #[must_use]
    pub fn parse(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self {
                group: group.to_string(),
                version: version.to_string(),
                kind: kind.to_string(),
            },
            None => Self {
                group: String::new(),
                version: api_version.to_string(),
                kind: kind.to_string(),
            },
        }
    }
}

/// Abstraction over the handful of Kubernetes operations the apply
/// algorithm needs: get-by-name, list-by-selector, create, update, delete.
/// Object-safe so it can be shared as `Arc<dyn K8sTransport>`.
#[async_trait]
pub trait K8sTransport: Send + Sync {
    /// Fetches one resource by name. `Ok(None)` means not found — the
    /// transport translates a 404 into this, not into `Err`, since absence
    /// is a normal apply-algorithm outcome.
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, K8sError>;

    /// Lists resources matching a label selector within a namespace.
    async fn list_by_selector(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Value>, K8sError>;

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        manifest: Value,
    ) -> Result<Value, K8sError>;

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        manifest: Value,
    ) -> Result<Value, K8sError>;

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), K8sError>;
}

/// `kube`-backed implementation. Resolves each `GroupVersionKind` to an
/// `ApiResource` via cluster discovery, caching nothing across calls — the
/// apply algorithm's call volume per execution is small (single digits),
/// not enough to justify a caching layer.
pub struct KubeK8sTransport {
    client: kube::Client,
}

impl KubeK8sTransport {
    #[must_use]
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    async fn api_for(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<kube::Api<kube::api::DynamicObject>, K8sError> {
        let kube_gvk = kube::core::GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
        let (ar, _caps) = kube::discovery::pinned_kind(&self.client, &kube_gvk)
            .await
            .map_err(|e| K8sError::Other {
                kind: gvk.kind.clone(),
                name: String::new(),
                reason: format!("discovery failed: {e}"),
            })?;

        Ok(match namespace {
            Some(ns) => kube::Api::namespaced_with(self.client.clone(), ns, &ar),
            None => kube::Api::all_with(self.client.clone(), &ar),
        })
    }
}

#[async_trait]
impl K8sTransport for KubeK8sTransport {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, K8sError> {
        let api = self.api_for(gvk, namespace).await?;
        match api.get(name).await {
            Ok(obj) => Ok(Some(serde_json::to_value(obj).map_err(|e| K8sError::Other {
                kind: gvk.kind.clone(),
                name: name.to_string(),
                reason: e.to_string(),
            })?)),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(e) => Err(map_kube_error(gvk, name, e)),
        }
    }

    async fn list_by_selector(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Value>, K8sError> {
        let api = self.api_for(gvk, namespace).await?;
        let params = kube::api::ListParams::default().labels(label_selector);
        let list = api
            .list(&params)
            .await
            .map_err(|e| map_kube_error(gvk, "", e))?;
        list.items
            .into_iter()
            .map(|obj| {
                serde_json::to_value(obj).map_err(|e| K8sError::Other {
                    kind: gvk.kind.clone(),
                    name: String::new(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        manifest: Value,
    ) -> Result<Value, K8sError> {
        let name = manifest_name(&manifest);
        let api = self.api_for(gvk, namespace).await?;
        let obj: kube::api::DynamicObject =
            serde_json::from_value(manifest).map_err(|e| K8sError::Other {
                kind: gvk.kind.clone(),
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let created = api
            .create(&kube::api::PostParams::default(), &obj)
            .await
            .map_err(|e| map_kube_error(gvk, &name, e))?;
        serde_json::to_value(created).map_err(|e| K8sError::Other {
            kind: gvk.kind.clone(),
            name,
            reason: e.to_string(),
        })
    }

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        manifest: Value,
    ) -> Result<Value, K8sError> {
        let name = manifest_name(&manifest);
        let api = self.api_for(gvk, namespace).await?;
        let obj: kube::api::DynamicObject =
            serde_json::from_value(manifest).map_err(|e| K8sError::Other {
                kind: gvk.kind.clone(),
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let updated = api
            .replace(&name, &kube::api::PostParams::default(), &obj)
            .await
            .map_err(|e| map_kube_error(gvk, &name, e))?;
        serde_json::to_value(updated).map_err(|e| K8sError::Other {
            kind: gvk.kind.clone(),
            name,
            reason: e.to_string(),
        })
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), K8sError> {
        let api = self.api_for(gvk, namespace).await?;
        match api.delete(name, &kube::api::DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(map_kube_error(gvk, name, e)),
        }
    }
}

fn manifest_name(manifest: &Value) -> String {
    manifest
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn map_kube_error(gvk: &GroupVersionKind, name: &str, err: kube::Error) -> K8sError {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => K8sError::NotFound {
            kind: gvk.kind.clone(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.reason == "AlreadyExists" => K8sError::AlreadyExists {
            kind: gvk.kind.clone(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 => K8sError::Conflict {
            kind: gvk.kind.clone(),
            name: name.to_string(),
        },
        other => K8sError::Other {
            kind: gvk.kind.clone(),
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_v1_with_no_group() {
        let gvk = GroupVersionKind::parse("v1", "ConfigMap");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");
    }

    #[test]
    fn parses_grouped_api_version() {
        let gvk = GroupVersionKind::parse("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
    }
}
