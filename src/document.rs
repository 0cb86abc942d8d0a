//! The workflow document: identity, metadata, and the ordered top-level task
//! list. Built once per adapter process and shared (`Arc`) across every
//! execution.
//!
//! Task items are parsed by hand rather than via `#[derive(Deserialize)]`:
//! the wire shape is a tagged union keyed by which of `set`/`do`/`try`/
//! `callHttp`/`callFunction` is present on the object, which doesn't map
//! cleanly onto serde's adjacently/internally tagged enum support without
//! contorting the in-memory [`crate::ast::TaskNode`] shape to match the wire
//! shape. A small recursive-descent reader here keeps the two decoupled.

use crate::ast::{BackoffPolicy, BodySpec, CatchClause, HttpMethod, OutputMode, RetryPolicy, TaskItem, TaskNode};
use crate::error::LoadError;
use crate::expr::Expr;
use crate::result::Phase;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A loaded, validated workflow — either parsed directly from a Workflow
/// document or produced by [`crate::translator::translate`] from a legacy
/// `AdapterConfig`. Immutable after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowDocument {
    pub name: String,
    pub version: String,
    pub namespace_label: Option<String>,
    pub tags: FxHashMap<String, String>,
    pub tasks: Vec<TaskItem>,
    /// Start index (into `tasks`) of each translated phase, in order. Left
    /// empty for a Workflow-native document, which has no phase structure
    /// of its own — the façade falls back to recording the whole run under
    /// `Phase::Execution` in that case.
    pub phase_starts: Vec<(Phase, usize)>,
}

impl WorkflowDocument {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            namespace_label: None,
            tags: FxHashMap::default(),
            tasks: Vec::new(),
            phase_starts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<TaskItem>) -> Self {
        self.tasks = tasks;
        self
    }

    #[must_use]
    pub fn with_phase_starts(mut self, phase_starts: Vec<(Phase, usize)>) -> Self {
        self.phase_starts = phase_starts;
        self
    }

    /// Splits `tasks` into `(Phase, &[TaskItem])` runs per `phase_starts`,
    /// falling back to a single `Phase::Execution` run over every task when
    /// no phase boundaries were recorded (the Workflow-native case).
    #[must_use]
    pub fn phases(&self) -> Vec<(Phase, &[TaskItem])> {
        if self.phase_starts.is_empty() {
            return vec![(Phase::Execution, &self.tasks[..])];
        }

        let mut out = Vec::with_capacity(self.phase_starts.len());
        for (i, (phase, start)) in self.phase_starts.iter().enumerate() {
            let end = self
                .phase_starts
                .get(i + 1)
                .map_or(self.tasks.len(), |(_, next_start)| *next_start);
            out.push((*phase, &self.tasks[*start..end]));
        }
        out
    }
}

/// The two accepted top-level document shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `{ apiVersion, kind: "AdapterConfig", metadata, spec }`.
    Legacy,
    /// `{ document: { dsl, ... }, do: [...] }`.
    Workflow,
}

/// Inspects a parsed JSON value and decides which document format it is,
/// without attempting to fully parse either shape: legacy is detected by
/// `kind == "AdapterConfig"`, Workflow by presence of `document.dsl`.
pub fn detect_format(raw: &Value) -> Result<DocumentFormat, LoadError> {
    let obj = raw.as_object().ok_or(LoadError::FormatUndetected)?;

    if obj.get("kind").and_then(Value::as_str) == Some("AdapterConfig") {
        return Ok(DocumentFormat::Legacy);
    }

    let has_dsl = obj
        .get("document")
        .and_then(Value::as_object)
        .is_some_and(|doc| doc.contains_key("dsl"));
    if has_dsl {
        return Ok(DocumentFormat::Workflow);
    }

    Err(LoadError::FormatUndetected)
}

/// Parses `raw` (already-deserialized JSON or YAML-via-`serde_yaml`'s
/// `Value` bridge) into a [`WorkflowDocument`], auto-detecting format and
/// dispatching to the Workflow-native parser or the legacy translator.
///
/// The legacy branch is a thin seam over [`crate::translator::translate`];
/// this function owns only format detection and the Workflow-native parse.
pub fn load(raw: Value) -> Result<WorkflowDocument, LoadError> {
    match detect_format(&raw)? {
        DocumentFormat::Legacy => {
            let cfg: crate::translator::AdapterConfig =
                serde_json::from_value(raw).map_err(|e| LoadError::Parse(e.to_string()))?;
            crate::translator::translate(&cfg).map_err(|e| LoadError::Validation(e.to_string()))
        }
        DocumentFormat::Workflow => parse_workflow_native(raw),
    }
}

fn parse_workflow_native(raw: Value) -> Result<WorkflowDocument, LoadError> {
    let obj = raw.as_object().ok_or(LoadError::FormatUndetected)?;
    let doc_meta = obj
        .get("document")
        .and_then(Value::as_object)
        .ok_or_else(|| LoadError::Parse("missing `document` block".to_string()))?;

    let name = doc_meta
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string();
    let version = doc_meta
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0")
        .to_string();
    let namespace_label = doc_meta
        .get("namespace")
        .and_then(Value::as_str)
        .map(str::to_string);

    let tasks_raw = obj
        .get("do")
        .and_then(Value::as_array)
        .ok_or_else(|| LoadError::Parse("missing `do` task list".to_string()))?;

    let tasks = tasks_raw
        .iter()
        .map(parse_task_item)
        .collect::<Result<Vec<TaskItem>, LoadError>>()?;

    Ok(WorkflowDocument {
        name,
        version,
        namespace_label,
        tags: FxHashMap::default(),
        tasks,
        phase_starts: Vec::new(),
    })
}

/// Parses one entry of a `do` list into a [`TaskItem`].
fn parse_task_item(raw: &Value) -> Result<TaskItem, LoadError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| LoadError::Parse("task item must be an object".to_string()))?;

    let key = obj
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| LoadError::Parse("task item missing `key`".to_string()))?
        .to_string();

    let node = if let Some(set) = obj.get("set").and_then(Value::as_object) {
        let mut fields = FxHashMap::default();
        for (k, v) in set {
            fields.insert(k.clone(), Expr::from_value(v.clone()));
        }
        TaskNode::Set(fields)
    } else if let Some(items) = obj.get("do").and_then(Value::as_array) {
        TaskNode::Do(parse_task_list(items)?)
    } else if let Some(try_obj) = obj.get("try").and_then(Value::as_object) {
        parse_try_node(try_obj)?
    } else if let Some(http_obj) = obj.get("callHttp").and_then(Value::as_object) {
        parse_call_http(http_obj)?
    } else if let Some(fn_obj) = obj.get("callFunction").and_then(Value::as_object) {
        parse_call_function(fn_obj)?
    } else {
        return Err(LoadError::Parse(format!(
            "task item `{key}` has no recognized node (set/do/try/callHttp/callFunction)"
        )));
    };

    let if_guard = obj.get("if").map(|v| Expr::from_value(v.clone()));
    let export = obj.get("export").map(|v| Expr::from_value(v.clone()));

    Ok(TaskItem {
        key,
        node,
        if_guard,
        export,
    })
}

fn parse_task_list(items: &[Value]) -> Result<Vec<TaskItem>, LoadError> {
    items.iter().map(parse_task_item).collect()
}

fn parse_try_node(try_obj: &serde_json::Map<String, Value>) -> Result<TaskNode, LoadError> {
    let try_items = try_obj
        .get("try")
        .and_then(Value::as_array)
        .ok_or_else(|| LoadError::Parse("`try` node missing `try` list".to_string()))?;
    let try_ = parse_task_list(try_items)?;

    let catch = match try_obj.get("catch").and_then(Value::as_object) {
        Some(catch_obj) => {
            let binding = catch_obj
                .get("as")
                .and_then(Value::as_str)
                .unwrap_or("error")
                .to_string();
            let items = catch_obj
                .get("do")
                .and_then(Value::as_array)
                .ok_or_else(|| LoadError::Parse("`catch` missing `do` list".to_string()))?;
            Some(CatchClause {
                binding,
                items: parse_task_list(items)?,
            })
        }
        None => None,
    };

    let retry = match try_obj.get("retry").and_then(Value::as_object) {
        Some(retry_obj) => {
            let max_attempts = retry_obj
                .get("maxAttempts")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            let backoff = match retry_obj.get("backoff").and_then(Value::as_str) {
                Some("linear") => BackoffPolicy::Linear,
                Some("exponential") => BackoffPolicy::Exponential,
                _ => BackoffPolicy::Constant,
            };
            RetryPolicy {
                max_attempts: max_attempts.max(1),
                backoff,
            }
        }
        None => RetryPolicy::default(),
    };

    Ok(TaskNode::Try { try_, catch, retry })
}

fn parse_call_http(http_obj: &serde_json::Map<String, Value>) -> Result<TaskNode, LoadError> {
    let method = match http_obj.get("method").and_then(Value::as_str) {
        Some("GET") | None => HttpMethod::Get,
        Some("POST") => HttpMethod::Post,
        Some("PUT") => HttpMethod::Put,
        Some("PATCH") => HttpMethod::Patch,
        Some("DELETE") => HttpMethod::Delete,
        Some(other) => {
            return Err(LoadError::Parse(format!("unknown HTTP method `{other}`")));
        }
    };

    let endpoint = http_obj
        .get("endpoint")
        .map(|v| Expr::from_value(v.clone()))
        .ok_or_else(|| LoadError::Parse("`callHttp` missing `endpoint`".to_string()))?;

    let mut headers = FxHashMap::default();
    if let Some(h) = http_obj.get("headers").and_then(Value::as_object) {
        for (k, v) in h {
            headers.insert(k.clone(), Expr::from_value(v.clone()));
        }
    }

    let body = match http_obj.get("body") {
        Some(Value::String(s)) if crate::expr::is_jq_expr(s) => {
            Some(BodySpec::Expr(Expr::parse(s)))
        }
        Some(Value::String(s)) => Some(BodySpec::Bytes(s.clone().into_bytes())),
        Some(other @ (Value::Object(_) | Value::Array(_))) => {
            Some(BodySpec::Expr(Expr::from_value(other.clone())))
        }
        _ => None,
    };

    let output = match http_obj.get("output").and_then(Value::as_str) {
        Some("content") | None => OutputMode::Content,
        Some("raw") => OutputMode::Raw,
        Some("response") => OutputMode::Response,
        Some(other) => {
            return Err(LoadError::Parse(format!("unknown output mode `{other}`")));
        }
    };

    let timeout = http_obj.get("timeout").map(|v| Expr::from_value(v.clone()));

    Ok(TaskNode::CallHttp {
        method,
        endpoint,
        headers,
        body,
        output,
        timeout,
    })
}

fn parse_call_function(fn_obj: &serde_json::Map<String, Value>) -> Result<TaskNode, LoadError> {
    let name = fn_obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| LoadError::Parse("`callFunction` missing `name`".to_string()))?
        .to_string();

    let mut with = FxHashMap::default();
    if let Some(w) = fn_obj.get("with").and_then(Value::as_object) {
        for (k, v) in w {
            with.insert(k.clone(), Expr::from_value(v.clone()));
        }
    }

    Ok(TaskNode::CallFunction { name, with })
}

/// Serializes a whole document back to the Workflow-native wire shape, the
/// inverse of [`load`]'s Workflow branch. Used by the `migrate` binary; the
/// engine itself never re-serializes a loaded document.
#[must_use]
pub fn document_to_json(doc: &WorkflowDocument) -> Value {
    serde_json::json!({
        "document": {
            "dsl": "1.0.0",
            "name": doc.name,
            "version": doc.version,
            "namespace": doc.namespace_label,
        },
        "do": doc.tasks.iter().map(task_item_to_json).collect::<Vec<_>>(),
    })
}

fn task_item_to_json(item: &TaskItem) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("key".to_string(), Value::String(item.key.clone()));
    if let Some(guard) = &item.if_guard {
        obj.insert("if".to_string(), guard.0.clone());
    }
    if let Some(export) = &item.export {
        obj.insert("export".to_string(), export.0.clone());
    }

    match &item.node {
        TaskNode::Set(fields) => {
            let map: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), v.0.clone()))
                .collect();
            obj.insert("set".to_string(), Value::Object(map));
        }
        TaskNode::Do(items) => {
            obj.insert(
                "do".to_string(),
                Value::Array(items.iter().map(task_item_to_json).collect()),
            );
        }
        TaskNode::Try { try_, catch, retry } => {
            let mut try_obj = serde_json::Map::new();
            try_obj.insert(
                "try".to_string(),
                Value::Array(try_.iter().map(task_item_to_json).collect()),
            );
            if let Some(catch) = catch {
                try_obj.insert(
                    "catch".to_string(),
                    serde_json::json!({
                        "as": catch.binding,
                        "do": catch.items.iter().map(task_item_to_json).collect::<Vec<_>>(),
                    }),
                );
            }
            let backoff = match retry.backoff {
                BackoffPolicy::Constant => "constant",
                BackoffPolicy::Linear => "linear",
                BackoffPolicy::Exponential => "exponential",
            };
            try_obj.insert(
                "retry".to_string(),
                serde_json::json!({"maxAttempts": retry.max_attempts, "backoff": backoff}),
            );
            obj.insert("try".to_string(), Value::Object(try_obj));
        }
        TaskNode::CallHttp {
            method,
            endpoint,
            headers,
            body,
            output,
            timeout,
        } => {
            let mut http_obj = serde_json::Map::new();
            http_obj.insert(
                "method".to_string(),
                Value::String(method.as_str().to_string()),
            );
            http_obj.insert("endpoint".to_string(), endpoint.0.clone());
            if !headers.is_empty() {
                let map: serde_json::Map<String, Value> = headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.0.clone()))
                    .collect();
                http_obj.insert("headers".to_string(), Value::Object(map));
            }
            if let Some(body) = body {
                let body_value = match body {
                    BodySpec::Bytes(b) => {
                        Value::String(String::from_utf8_lossy(b).into_owned())
                    }
                    BodySpec::Expr(e) => e.0.clone(),
                };
                http_obj.insert("body".to_string(), body_value);
            }
            let output_str = match output {
                OutputMode::Raw => "raw",
                OutputMode::Content => "content",
                OutputMode::Response => "response",
            };
            http_obj.insert("output".to_string(), Value::String(output_str.to_string()));
            if let Some(timeout) = timeout {
                http_obj.insert("timeout".to_string(), timeout.0.clone());
            }
            obj.insert("callHttp".to_string(), Value::Object(http_obj));
        }
        TaskNode::CallFunction { name, with } => {
            let map: serde_json::Map<String, Value> = with
                .iter()
                .map(|(k, v)| (k.clone(), v.0.clone()))
                .collect();
            obj.insert(
                "callFunction".to_string(),
                serde_json::json!({"name": name, "with": map}),
            );
        }
    }

    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_legacy_by_kind() {
        let raw = json!({"kind": "AdapterConfig"});
        assert_eq!(detect_format(&raw).unwrap(), DocumentFormat::Legacy);
    }

    #[test]
    fn detects_workflow_by_document_dsl() {
        let raw = json!({"document": {"dsl": "1.0.0"}, "do": []});
        assert_eq!(detect_format(&raw).unwrap(), DocumentFormat::Workflow);
    }

    #[test]
    fn undetected_format_is_an_error() {
        let raw = json!({"foo": "bar"});
        assert!(detect_format(&raw).is_err());
    }

    #[test]
    fn loads_minimal_set_document() {
        let raw = json!({
            "document": {"dsl": "1.0.0", "name": "minimal", "version": "1.0.0"},
            "do": [
                {"key": "a", "set": {"y": "${ .event.id }"}},
            ],
        });
        let doc = load(raw).unwrap();
        assert_eq!(doc.tasks.len(), 1);
        assert_eq!(doc.tasks[0].key, "a");
        assert!(matches!(doc.tasks[0].node, TaskNode::Set(_)));
    }

    #[test]
    fn round_trips_through_document_to_json() {
        let raw = json!({
            "document": {"dsl": "1.0.0", "name": "rt", "version": "1.0.0"},
            "do": [
                {"key": "a", "set": {"y": "${ .event.id }"}},
            ],
        });
        let doc = load(raw).unwrap();
        let serialized = document_to_json(&doc);
        let reloaded = load(serialized).unwrap();
        assert_eq!(doc.tasks.len(), reloaded.tasks.len());
        assert_eq!(doc.tasks[0].key, reloaded.tasks[0].key);
    }
}
