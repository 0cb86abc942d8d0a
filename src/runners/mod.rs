//! Named task runner implementations and the registry `CallFunction`
//! dispatches through.
//!
//! `CallHttp` and `Try` are core AST nodes the interpreter dispatches
//! itself (see [`crate::interpreter`]); everything reachable only via
//! `CallFunction` lives here, one file per runner, registered once at
//! startup into a read-only-after-construction [`TaskRegistry`].

pub mod condition;
pub mod extract;
pub mod http;
pub mod k8s;
pub mod k8s_read;
pub mod resources;
pub mod template;
pub mod try_;

use crate::context::ExecCtx;
use crate::error::EngineError;
use crate::value_map::ValueMap;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Built-in task identifiers dispatchable via `CallFunction`. Unknown names
/// produce [`EngineError::UnknownTask`].
pub const BUILTIN_NAMES: &[&str] = &[
    "extract",
    "k8s",
    "k8s-read",
    "resources",
    "condition",
    "cel",
    "template",
];

/// One named, evaluated-argument task implementation.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn call(
        &self,
        with: ValueMap,
        v: ValueMap,
        ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError>;
}

/// A write-once, read-many lookup table from task name to implementation.
/// Populated once at process startup by [`TaskRegistry::builtin`]; never
/// mutated afterward, so concurrent reads across executions need no
/// synchronization.
pub struct TaskRegistry {
    runners: FxHashMap<&'static str, Arc<dyn TaskRunner>>,
}

impl TaskRegistry {
    /// An empty registry — every `CallFunction` lookup fails with
    /// `UnknownTask`. Useful for interpreter unit tests that never exercise
    /// custom task dispatch.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            runners: FxHashMap::default(),
        }
    }

    /// Builds the registry of built-in runners, bound to the supplied
    /// Kubernetes transport (the only dependency any built-in runner needs
    /// beyond the value map it is called with).
    #[must_use]
    pub fn builtin(k8s_transport: Arc<dyn crate::k8s::K8sTransport>, annotation_domain: String) -> Self {
        let mut runners: FxHashMap<&'static str, Arc<dyn TaskRunner>> = FxHashMap::default();
        runners.insert("extract", Arc::new(extract::ExtractRunner));
        runners.insert(
            "k8s",
            Arc::new(k8s::K8sRunner::new(k8s_transport.clone(), annotation_domain.clone())),
        );
        runners.insert(
            "k8s-read",
            Arc::new(k8s_read::K8sReadRunner::new(k8s_transport.clone())),
        );
        runners.insert(
            "resources",
            Arc::new(resources::ResourcesRunner::new(k8s_transport, annotation_domain)),
        );
        runners.insert("condition", Arc::new(condition::ConditionRunner));
        runners.insert("cel", Arc::new(condition::ConditionRunner));
        runners.insert("template", Arc::new(template::TemplateRunner));
        Self { runners }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskRunner>> {
        self.runners.get(name).cloned()
    }

    /// Registers (or overrides) a custom runner under `name`, for
    /// embedders extending the built-in set. Intended to be called only
    /// during startup wiring, before the registry is shared.
    pub fn register(&mut self, name: &'static str, runner: Arc<dyn TaskRunner>) {
        self.runners.insert(name, runner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_resolves_nothing() {
        let registry = TaskRegistry::empty();
        assert!(registry.get("extract").is_none());
    }

    #[test]
    fn builtin_names_matches_the_constructed_registry() {
        let transport: Arc<dyn crate::k8s::K8sTransport> = Arc::new(NullK8sTransport);
        let registry = TaskRegistry::builtin(transport, "hyperfleet.io".to_string());
        for name in BUILTIN_NAMES {
            assert!(registry.get(name).is_some(), "{name} missing from builtin registry");
        }
    }

    struct NullK8sTransport;

    #[async_trait]
    impl crate::k8s::K8sTransport for NullK8sTransport {
        async fn get(
            &self,
            _gvk: &crate::k8s::GroupVersionKind,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<Option<serde_json::Value>, crate::error::K8sError> {
            Ok(None)
        }

        async fn list_by_selector(
            &self,
            _gvk: &crate::k8s::GroupVersionKind,
            _namespace: Option<&str>,
            _label_selector: &str,
        ) -> Result<Vec<serde_json::Value>, crate::error::K8sError> {
            Ok(Vec::new())
        }

        async fn create(
            &self,
            _gvk: &crate::k8s::GroupVersionKind,
            _namespace: Option<&str>,
            manifest: serde_json::Value,
        ) -> Result<serde_json::Value, crate::error::K8sError> {
            Ok(manifest)
        }

        async fn update(
            &self,
            _gvk: &crate::k8s::GroupVersionKind,
            _namespace: Option<&str>,
            manifest: serde_json::Value,
        ) -> Result<serde_json::Value, crate::error::K8sError> {
            Ok(manifest)
        }

        async fn delete(
            &self,
            _gvk: &crate::k8s::GroupVersionKind,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<(), crate::error::K8sError> {
            Ok(())
        }
    }
}
