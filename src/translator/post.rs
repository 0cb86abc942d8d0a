//! Post phase: a `Do` containing a `Set` (or `condition` fallback) per
//! payload, then per post-action an HTTP call with optional `Try` retry.
//!
//! Headers, URLs, and bodies convert mustache `{{ .x }}` placeholders into
//! `${ .x }` / string-interpolated jq form via [`super::mustache_to_jq`].

use super::mustache_to_jq;
use crate::ast::{BackoffPolicy, RetryPolicy, TaskItem, TaskNode};
use crate::expr::Expr;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

/// CEL-only markers (mirrors `runners::condition::CEL_ONLY_MARKERS`): a
/// payload field whose raw template contains one of these cannot be folded
/// into a plain `Set` entry, since it isn't a mustache placeholder our jq
/// subset can express. It is instead emitted as its own `condition` task.
const CEL_ONLY_MARKERS: &[&str] = &[".filter(", ".map(", ".exists(", ".all(", ".size()", "has("];

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSpec {
    #[serde(default)]
    pub payloads: Vec<PayloadDef>,
    #[serde(default)]
    pub post_actions: Vec<PostActionDef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PayloadDef {
    pub name: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    /// An out-of-scope external build-system hook: recognized but never
    /// dereferenced. Carried through as an inert literal so it remains
    /// visible rather than silently dropped.
    #[serde(default, rename = "buildRef")]
    pub build_ref: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostActionDef {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub retry_attempts: u32,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Builds the post phase's single top-level `Do` task item.
pub fn build(post: &PostSpec) -> Result<TaskItem, crate::error::TranslateError> {
    let mut items = Vec::new();

    for payload in &post.payloads {
        items.push(build_payload(payload));
    }

    for (i, action) in post.post_actions.iter().enumerate() {
        items.push(build_post_action(i, action));
    }

    Ok(TaskItem::new("post", TaskNode::Do(items)))
}

fn build_payload(payload: &PayloadDef) -> TaskItem {
    let needs_fallback = payload
        .fields
        .values()
        .any(|v| v.as_str().is_some_and(|s| CEL_ONLY_MARKERS.iter().any(|m| s.contains(m))));

    if needs_fallback {
        let mut sub_items = Vec::new();
        for (key, value) in &payload.fields {
            let raw = value.as_str().unwrap_or_default();
            let mut with = FxHashMap::default();
            with.insert("expression".to_string(), Expr::literal(Value::String(raw.to_string())));
            with.insert("as".to_string(), Expr::literal(Value::String(key.clone())));
            sub_items.push(TaskItem::new(
                format!("{}-{key}", payload.name),
                TaskNode::CallFunction {
                    name: "condition".to_string(),
                    with,
                },
            ));
        }
        return TaskItem::new(payload.name.clone(), TaskNode::Do(sub_items));
    }

    let mut fields = FxHashMap::default();
    for (key, value) in &payload.fields {
        let expr = match value {
            Value::String(s) => match mustache_to_jq(s) {
                Value::String(rendered) => Expr::parse(&rendered),
                other => Expr::literal(other),
            },
            other => Expr::literal(other.clone()),
        };
        fields.insert(key.clone(), expr);
    }
    if let Some(build_ref) = &payload.build_ref {
        fields.insert("__buildRef".to_string(), Expr::literal(build_ref.clone()));
    }
    TaskItem::new(payload.name.clone(), TaskNode::Set(fields))
}

fn build_post_action(index: usize, action: &PostActionDef) -> TaskItem {
    let method = match action.method.to_ascii_uppercase().as_str() {
        "GET" => crate::ast::HttpMethod::Get,
        "PUT" => crate::ast::HttpMethod::Put,
        "PATCH" => crate::ast::HttpMethod::Patch,
        "DELETE" => crate::ast::HttpMethod::Delete,
        _ => crate::ast::HttpMethod::Post,
    };

    let endpoint = match mustache_to_jq(&action.endpoint) {
        Value::String(s) => Expr::parse(&s),
        other => Expr::literal(other),
    };

    let mut headers = FxHashMap::default();
    for (k, v) in &action.headers {
        let expr = match mustache_to_jq(v) {
            Value::String(rendered) => Expr::parse(&rendered),
            other => Expr::literal(other),
        };
        headers.insert(k.clone(), expr);
    }

    let body = action.body.as_ref().map(|b| crate::ast::BodySpec::Expr(convert_body(b)));

    let call = TaskItem::new(
        format!("post-action-{index}"),
        TaskNode::CallHttp {
            method,
            endpoint,
            headers,
            body,
            output: crate::ast::OutputMode::Content,
            timeout: None,
        },
    );

    if action.retry_attempts > 0 {
        TaskItem::new(
            format!("post-action-{index}-try"),
            TaskNode::Try {
                try_: vec![call],
                catch: None,
                retry: RetryPolicy {
                    max_attempts: action.retry_attempts,
                    backoff: BackoffPolicy::Constant,
                },
            },
        )
    } else {
        call
    }
}

fn convert_body(value: &Value) -> Expr {
    match value {
        Value::String(s) => match mustache_to_jq(s) {
            Value::String(rendered) => Expr::parse(&rendered),
            other => Expr::literal(other),
        },
        Value::Object(map) => {
            let converted: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), convert_body(v).0))
                .collect();
            Expr::literal(Value::Object(converted))
        }
        Value::Array(items) => {
            let converted: Vec<Value> = items.iter().map(|v| convert_body(v).0).collect();
            Expr::literal(Value::Array(converted))
        }
        other => Expr::literal(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_without_cel_markers_becomes_set_node() {
        let mut fields = serde_json::Map::new();
        fields.insert("status".to_string(), json!("{{ .params.status }}"));
        let payload = PayloadDef {
            name: "result".to_string(),
            fields,
            build_ref: None,
        };
        let item = build_payload(&payload);
        assert!(matches!(item.node, TaskNode::Set(_)));
    }

    #[test]
    fn payload_with_cel_marker_falls_back_to_condition_tasks() {
        let mut fields = serde_json::Map::new();
        fields.insert("active".to_string(), json!("items.filter(x, x.on)"));
        let payload = PayloadDef {
            name: "result".to_string(),
            fields,
            build_ref: None,
        };
        let item = build_payload(&payload);
        match item.node {
            TaskNode::Do(items) => {
                assert_eq!(items.len(), 1);
                assert!(matches!(
                    &items[0].node,
                    TaskNode::CallFunction { name, .. } if name == "condition"
                ));
            }
            other => panic!("expected Do node, got {other:?}"),
        }
    }

    #[test]
    fn post_action_with_retries_wraps_in_try() {
        let action = PostActionDef {
            endpoint: "https://api/result".to_string(),
            method: "POST".to_string(),
            headers: Default::default(),
            body: None,
            retry_attempts: 2,
        };
        let item = build_post_action(0, &action);
        assert!(matches!(item.node, TaskNode::Try { .. }));
    }

    #[test]
    fn post_action_without_retries_is_bare_call() {
        let action = PostActionDef {
            endpoint: "https://api/result".to_string(),
            method: "POST".to_string(),
            headers: Default::default(),
            body: None,
            retry_attempts: 0,
        };
        let item = build_post_action(0, &action);
        assert!(matches!(item.node, TaskNode::CallHttp { .. }));
    }
}
