//! Resources phase: one `resources` task, conditional on
//! `${ .allMatched == true }` when preconditions exist.
//!
//! Legacy resource entries pass through to `runners::resources::ResourcesRunner`
//! largely unchanged — the manifest's own mustache placeholders are rendered
//! at apply time by `runners::k8s::K8sRunner::render_manifest` against
//! `v.params`, so the translator does not need to convert them to jq (unlike
//! the post phase's header/endpoint/body fields, which the HTTP runner
//! evaluates through the jq substrate instead).

use crate::ast::{TaskItem, TaskNode};
use crate::expr::Expr;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    pub manifest: Value,
    #[serde(default)]
    pub discovery: Option<Value>,
    #[serde(default, rename = "recreateOnChange")]
    pub recreate_on_change: bool,
}

/// Builds the single `resources` task, guarded on `allMatched` when
/// `has_preconditions` is true.
#[must_use]
pub fn build(resources: &[ResourceDef], has_preconditions: bool) -> TaskItem {
    let items: Vec<Value> = resources
        .iter()
        .map(|r| {
            serde_json::json!({
                "name": r.name,
                "manifest": r.manifest,
                "discovery": r.discovery,
                "recreateOnChange": r.recreate_on_change,
            })
        })
        .collect();

    let mut with = FxHashMap::default();
    with.insert("items".to_string(), Expr::literal(Value::Array(items)));

    let mut item = TaskItem::new(
        "resources",
        TaskNode::CallFunction {
            name: "resources".to_string(),
            with,
        },
    );
    if has_preconditions {
        item = item.with_if(Expr::parse("${ .allMatched == true }"));
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guards_on_all_matched_when_preconditions_present() {
        let resources = vec![ResourceDef {
            name: "cm1".to_string(),
            manifest: json!({"apiVersion": "v1", "kind": "ConfigMap"}),
            discovery: None,
            recreate_on_change: false,
        }];
        let item = build(&resources, true);
        assert!(item.if_guard.is_some());
    }

    #[test]
    fn no_guard_without_preconditions() {
        let resources = vec![ResourceDef {
            name: "cm1".to_string(),
            manifest: json!({"apiVersion": "v1", "kind": "ConfigMap"}),
            discovery: None,
            recreate_on_change: false,
        }];
        let item = build(&resources, false);
        assert!(item.if_guard.is_none());
    }
}
