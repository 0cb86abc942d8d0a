//! The task AST.
//!
//! Five node kinds (`Set`, `Do`, `Try`, `CallHttp`, `CallFunction`), each
//! wrapped in a [`TaskItem`] carrying the universal `if` guard and optional
//! `export` transform described by the interpreter's dispatch loop.

use crate::expr::Expr;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One entry in a task list: a key (used for logging, `phase_outputs`
/// keying, and `resources` naming where relevant), the node itself, and the
/// two cross-cutting fields every node supports.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskItem {
    pub key: String,
    pub node: TaskNode,
    pub if_guard: Option<Expr>,
    pub export: Option<Expr>,
}

impl TaskItem {
    #[must_use]
    pub fn new(key: impl Into<String>, node: TaskNode) -> Self {
        Self {
            key: key.into(),
            node,
            if_guard: None,
            export: None,
        }
    }

    #[must_use]
    pub fn with_if(mut self, guard: Expr) -> Self {
        self.if_guard = Some(guard);
        self
    }

    #[must_use]
    pub fn with_export(mut self, export: Expr) -> Self {
        self.export = Some(export);
        self
    }
}

/// The five task kinds this engine interprets.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskNode {
    /// Assigns each entry's evaluated value into both `v` root and
    /// `v.params`.
    Set(FxHashMap<String, Expr>),
    /// Runs the nested items in order, threading the same value map.
    Do(Vec<TaskItem>),
    /// Retries the try-list per `retry`, optionally falling back to `catch`.
    Try {
        try_: Vec<TaskItem>,
        catch: Option<CatchClause>,
        retry: RetryPolicy,
    },
    /// Issues one outbound HTTP request.
    CallHttp {
        method: HttpMethod,
        endpoint: Expr,
        headers: FxHashMap<String, Expr>,
        body: Option<BodySpec>,
        output: OutputMode,
        timeout: Option<Expr>,
    },
    /// Dispatches to a named built-in runner (`k8s`, `k8s-read`, `resources`,
    /// `extract`, `condition`, `template`, or an embedder-registered custom
    /// runner) with an evaluated argument map.
    CallFunction {
        name: String,
        with: FxHashMap<String, Expr>,
    },
}

/// The binding name under which a `Try` node's catch list receives
/// `{ message: <last-error-display> }`, plus the nested item list.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    pub binding: String,
    pub items: Vec<TaskItem>,
}

/// `Try`'s retry policy: attempt ceiling and sleep shape between attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffPolicy::Constant,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// Backoff shape between retry attempts. `base` is a design-chosen constant
/// (1 second) owned by `runners::try_`, not encoded here, so this type stays
/// a pure strategy tag mirroring how the document format spells it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffPolicy {
    Constant,
    Linear,
    Exponential,
}

/// The subset of HTTP methods the document format may specify.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A `CallHttp` request body: either a literal byte payload (templates
/// already rendered at load time) or an expression evaluated against `v` at
/// call time, most commonly a jq object-construction expression.
#[derive(Clone, Debug, PartialEq)]
pub enum BodySpec {
    Bytes(Vec<u8>),
    Expr(Expr),
}

/// What a `CallHttp` node writes back into the value map on success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Only the raw response record (`response`/`content`) is written.
    Raw,
    /// The parsed JSON body (or raw string if not valid JSON) replaces `v`
    /// under `content`, alongside `response`.
    Content,
    /// The full `{statusCode, status, headers, body, content}` record
    /// replaces `v` under `response`.
    Response,
}
