//! Preconditions phase.
//!
//! For each precondition in order: emit a task whose node runs the HTTP
//! call, computes `<name>`, the precondition's captured fields, and the
//! `<snake(name)>_ok` flag, then (for `retryAttempts > 0`) wraps the whole
//! thing in `Try` with a catch that marks `_ok` false on exhaustion.
//!
//! The legacy schema's `export` field fully *replaces* `v`, which would
//! drop every key accumulated so far (`params`, prior `_ok`
//! flags, `resources`) unless the export expression re-enumerated them all.
//! Rather than build that enumeration (impossible to do generically — the
//! translator doesn't know the full key set ahead of time), each
//! precondition's HTTP call carries no `export`; a trailing `Set` node reads
//! `.content`/`.response` left at the root by the HTTP runner and mirrors
//! the named fields into `params` without touching anything else. This is
//! recorded as an Open Question resolution in DESIGN.md.
//!
//! Guarding: each precondition after the first gets an `if` guard
//! conjoining every predecessor's `_ok` flag (short-circuit). A trailing
//! `Set` computes `allMatched` and a cascading `notMetReason` naming the
//! first failing precondition by its original (non-snake) name.

use super::condition::{condition_to_jq, jq_literal, snake_case};
use super::mustache_to_jq;
use crate::ast::{BackoffPolicy, CatchClause, RetryPolicy, TaskItem, TaskNode};
use crate::error::TranslateError;
use crate::expr::Expr;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionDef {
    pub name: String,
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<super::condition::ConditionDef>,
    #[serde(default)]
    pub retry_attempts: u32,
    /// Field names pulled from the response body (`.content.<field>`) into
    /// the value map under the same key, alongside `<name>` and `_ok`.
    #[serde(default)]
    pub capture: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Builds the preconditions-phase task list.
pub fn build(preconditions: &[PreconditionDef]) -> Result<Vec<TaskItem>, TranslateError> {
    if preconditions.is_empty() {
        return Ok(Vec::new());
    }

    let mut tasks = Vec::new();
    let mut predecessor_ok_flags: Vec<String> = Vec::new();

    for precondition in preconditions {
        let item = build_one(precondition, &predecessor_ok_flags)?;
        tasks.push(item);
        predecessor_ok_flags.push(snake_case(&precondition.name));
    }

    tasks.push(build_summary(preconditions));
    Ok(tasks)
}

fn build_one(
    precondition: &PreconditionDef,
    predecessor_ok_flags: &[String],
) -> Result<TaskItem, TranslateError> {
    let ok_key = format!("{}_ok", snake_case(&precondition.name));

    let conditions_jq = if precondition.conditions.is_empty() {
        "true".to_string()
    } else {
        let fragments: Result<Vec<String>, TranslateError> = precondition
            .conditions
            .iter()
            .map(|c| condition_to_jq(c))
            .collect();
        let fragments = fragments?;
        fragments
            .into_iter()
            .map(|f| format!("({f})"))
            .collect::<Vec<_>>()
            .join(" and ")
    };

    let http_call = build_http_call(precondition);

    let mut summary_fields = FxHashMap::default();
    summary_fields.insert(precondition.name.clone(), Expr::parse("${ .content }"));
    for field in &precondition.capture {
        summary_fields.insert(field.clone(), Expr::parse(&format!("${{ .content.{field} }}")));
    }
    summary_fields.insert(ok_key.clone(), Expr::parse(&format!("${{ {conditions_jq} }}")));
    let summary_set = TaskItem::new(format!("{}-summary", precondition.name), TaskNode::Set(summary_fields));

    let node = if precondition.retry_attempts > 0 {
        let mut catch_fields = FxHashMap::default();
        catch_fields.insert(ok_key.clone(), Expr::literal(Value::Bool(false)));
        TaskNode::Try {
            try_: vec![http_call, summary_set],
            catch: Some(CatchClause {
                binding: "error".to_string(),
                items: vec![TaskItem::new(
                    format!("{}-catch", precondition.name),
                    TaskNode::Set(catch_fields),
                )],
            }),
            retry: RetryPolicy {
                max_attempts: precondition.retry_attempts,
                backoff: BackoffPolicy::Constant,
            },
        }
    } else {
        TaskNode::Do(vec![http_call, summary_set])
    };

    let mut item = TaskItem::new(precondition.name.clone(), node);
    if !predecessor_ok_flags.is_empty() {
        let guard = predecessor_ok_flags
            .iter()
            .map(|f| format!(".{f}"))
            .collect::<Vec<_>>()
            .join(" and ");
        item = item.with_if(Expr::parse(&format!("${{ {guard} }}")));
    }
    Ok(item)
}

fn build_http_call(precondition: &PreconditionDef) -> TaskItem {
    let method = match precondition.method.to_ascii_uppercase().as_str() {
        "POST" => crate::ast::HttpMethod::Post,
        "PUT" => crate::ast::HttpMethod::Put,
        "PATCH" => crate::ast::HttpMethod::Patch,
        "DELETE" => crate::ast::HttpMethod::Delete,
        _ => crate::ast::HttpMethod::Get,
    };

    let endpoint_expr = match mustache_to_jq(&precondition.endpoint) {
        Value::String(s) => Expr::parse(&s),
        other => Expr::literal(other),
    };

    let mut headers = FxHashMap::default();
    for (k, v) in &precondition.headers {
        headers.insert(k.clone(), expr_from_template(v));
    }

    TaskItem::new(
        format!("{}-call", precondition.name),
        TaskNode::CallHttp {
            method,
            endpoint: endpoint_expr,
            headers,
            body: None,
            output: crate::ast::OutputMode::Content,
            timeout: None,
        },
    )
}

fn expr_from_template(s: &str) -> Expr {
    match mustache_to_jq(s) {
        Value::String(rendered) => Expr::parse(&rendered),
        other => Expr::literal(other),
    }
}

fn build_summary(preconditions: &[PreconditionDef]) -> TaskItem {
    let ok_flags: Vec<String> = preconditions
        .iter()
        .map(|p| format!(".{}_ok", snake_case(&p.name)))
        .collect();
    let all_matched_expr = format!("${{ {} }}", ok_flags.join(" and "));

    let mut reason_expr = "null".to_string();
    for p in preconditions.iter().rev() {
        let flag = format!(".{}_ok", snake_case(&p.name));
        let reason_lit = jq_literal(&Value::String(format!("{} failed", p.name)));
        reason_expr = format!("if {flag} then {reason_expr} else {reason_lit} end");
    }

    let mut fields = FxHashMap::default();
    fields.insert("allMatched".to_string(), Expr::parse(&all_matched_expr));
    fields.insert("notMetReason".to_string(), Expr::parse(&format!("${{ {reason_expr} }}")));
    TaskItem::new("preconditions-summary", TaskNode::Set(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn precondition(name: &str, retry: u32) -> PreconditionDef {
        PreconditionDef {
            name: name.to_string(),
            endpoint: "https://api/clusters/C1".to_string(),
            method: "GET".to_string(),
            headers: Default::default(),
            conditions: vec![super::super::condition::ConditionDef {
                field: "status".to_string(),
                operator: "equals".to_string(),
                value: Some(json!("ready")),
            }],
            retry_attempts: retry,
            capture: vec![],
        }
    }

    #[test]
    fn single_precondition_without_retry_has_no_guard() {
        let tasks = build(&[precondition("check-cluster", 0)]).unwrap();
        // [precondition task, summary task]
        assert_eq!(tasks.len(), 2);
        assert!(tasks[0].if_guard.is_none());
        assert!(matches!(tasks[0].node, TaskNode::Do(_)));
    }

    #[test]
    fn retrying_precondition_wraps_in_try_with_catch() {
        let tasks = build(&[precondition("check-cluster", 3)]).unwrap();
        match &tasks[0].node {
            TaskNode::Try { retry, catch, .. } => {
                assert_eq!(retry.max_attempts, 3);
                assert!(catch.is_some());
            }
            other => panic!("expected Try node, got {other:?}"),
        }
    }

    #[test]
    fn second_precondition_guards_on_first_ok_flag() {
        let tasks = build(&[precondition("a", 0), precondition("b", 0)]).unwrap();
        // [a, b, summary]
        assert!(tasks[1].if_guard.is_some());
    }
}
