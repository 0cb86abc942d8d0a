//! Params phase: resolves every declared parameter's source
//! (`event.`/`env.`/`secret.`/`configmap.`) and mirrors the result into
//! `v.params`.
//!
//! This implementation always emits exactly one trailing `Set` node
//! (covering every declared param, whatever its source) so that every
//! param ends up mirrored into `v.params` per `Set`'s universal invariant
//! — the `k8s-read` task is prepended only when at least one param sources
//! from `secret.`/`configmap.`.

use crate::ast::{TaskItem, TaskNode};
use crate::expr::Expr;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

/// One `spec.params[]` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
}

/// Builds the params-phase task list.
#[must_use]
pub fn build(params: &[ParamDef]) -> Vec<TaskItem> {
    if params.is_empty() {
        return Vec::new();
    }

    let mut tasks = Vec::new();

    let secret_refs: Vec<&ParamDef> = params
        .iter()
        .filter(|p| p.source.starts_with("secret.") || p.source.starts_with("configmap."))
        .collect();

    if !secret_refs.is_empty() {
        tasks.push(build_k8s_read(&secret_refs));
    }

    tasks.push(build_set(params));
    tasks
}

fn build_k8s_read(refs: &[&ParamDef]) -> TaskItem {
    let entries: Vec<Value> = refs
        .iter()
        .map(|p| {
            let (kind, reference) = if let Some(r) = p.source.strip_prefix("secret.") {
                ("Secret", r)
            } else {
                ("ConfigMap", p.source.strip_prefix("configmap.").unwrap_or(&p.source))
            };
            serde_json::json!({
                "kind": kind,
                "ref": reference,
                "as": p.name,
                "required": p.required,
                "default": p.default,
            })
        })
        .collect();

    let mut with = FxHashMap::default();
    with.insert("refs".to_string(), Expr::literal(Value::Array(entries)));
    TaskItem::new("params-secrets", TaskNode::CallFunction {
        name: "k8s-read".to_string(),
        with,
    })
}

fn build_set(params: &[ParamDef]) -> TaskItem {
    let mut fields = FxHashMap::default();
    for p in params {
        let default_lit = p
            .default
            .as_ref()
            .map(super::condition::jq_literal)
            .unwrap_or_else(|| "null".to_string());

        let expr_src = if let Some(path) = p.source.strip_prefix("event.") {
            format!("${{ .event.{path} // {default_lit} }}")
        } else if let Some(name) = p.source.strip_prefix("env.") {
            format!("${{ .env.{name} // {default_lit} }}")
        } else {
            // Already resolved onto the root by the k8s-read task.
            format!("${{ .{} }}", p.name)
        };
        fields.insert(p.name.clone(), Expr::parse(&expr_src));
    }
    TaskItem::new("params", TaskNode::Set(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_event_env_sources_emit_single_set_task() {
        let params = vec![
            ParamDef {
                name: "clusterId".to_string(),
                source: "event.id".to_string(),
                required: true,
                default: None,
                type_: None,
            },
            ParamDef {
                name: "region".to_string(),
                source: "env.REGION".to_string(),
                required: false,
                default: Some(Value::String("us-east".to_string())),
                type_: None,
            },
        ];
        let tasks = build(&params);
        assert_eq!(tasks.len(), 1);
        assert!(matches!(tasks[0].node, TaskNode::Set(_)));
    }

    #[test]
    fn secret_source_prepends_k8s_read_task() {
        let params = vec![ParamDef {
            name: "apiKey".to_string(),
            source: "secret.default/creds.token".to_string(),
            required: true,
            default: None,
            type_: None,
        }];
        let tasks = build(&params);
        assert_eq!(tasks.len(), 2);
        assert!(matches!(
            &tasks[0].node,
            TaskNode::CallFunction { name, .. } if name == "k8s-read"
        ));
        assert!(matches!(tasks[1].node, TaskNode::Set(_)));
    }
}
