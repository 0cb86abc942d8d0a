//! Per-execution context: the bits of state every runner needs but that
//! don't belong in the threaded [`crate::value_map::ValueMap`] because they
//! are read-only for the lifetime of one execution.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Built once per incoming event by [`crate::facade::Adapter::execute`].
/// Carries the raw event, the environment snapshot taken at execution
/// start (so a later-mutating process environment cannot make one
/// execution's behavior nondeterministic), and identifiers for log
/// correlation.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub event: Value,
    pub env: FxHashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub correlation_id: Uuid,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(event: Value, env: FxHashMap<String, Value>, started_at: DateTime<Utc>) -> Self {
        Self {
            event,
            env,
            started_at,
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// The cancellation/deadline seam threaded through every runner call and
/// every suspension point (`CallHttp`, `k8s`, `Try`'s backoff sleep).
///
/// Kept separate from `ExecutionContext` — the context is data about the
/// execution, `ExecCtx` is the live control-flow handle passed by
/// reference down the call tree.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    pub cancel: CancellationToken,
}

impl ExecCtx {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_context_generates_distinct_correlation_ids() {
        let a = ExecutionContext::new(Value::Null, FxHashMap::default(), Utc::now());
        let b = ExecutionContext::new(Value::Null, FxHashMap::default(), Utc::now());
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn exec_ctx_child_inherits_cancellation() {
        let ctx = ExecCtx::new(CancellationToken::new());
        let child = ctx.child();
        ctx.cancel.cancel();
        assert!(child.is_cancelled());
    }
}
