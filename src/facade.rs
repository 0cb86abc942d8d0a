//! The `Adapter` façade: wires a loaded [`crate::document::WorkflowDocument`]
//! together with its transport dependencies into a single broker-callback
//! entry point, folding every failure mode into an [`ExecutionResult`] so
//! the caller never has to match on `Result`.

use crate::ast::TaskItem;
use crate::context::{ExecCtx, ExecutionContext};
use crate::document::WorkflowDocument;
use crate::env;
use crate::http::HttpTransport;
use crate::interpreter::Interpreter;
use crate::k8s::K8sTransport;
use crate::result::{ExecutionResult, Phase};
use crate::runners::TaskRegistry;
use crate::value_map::ValueMap;
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The two collaborators every built-in runner needs beyond the value map
/// it is invoked with. Both are trait objects so embedders can supply fakes
/// in tests without a live network or cluster.
#[derive(Clone)]
pub struct EngineDeps {
    pub http: Arc<dyn HttpTransport>,
    pub k8s: Arc<dyn K8sTransport>,
}

/// Process-wide configuration an [`Adapter`] is built with. Not threaded
/// through [`Interpreter`] — `CallHttp` is dispatched by the interpreter
/// directly over `EngineDeps::http`, and the two settings here
/// (`annotation_domain`, `shutdown_grace`) are each consumed exactly once,
/// at façade construction and inside `into_handler` respectively, so they
/// live on the façade rather than riding along on every runner call.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Domain prefix for the generation-tracking annotation the `k8s` and
    /// `resources` runners stamp onto every managed resource.
    pub annotation_domain: String,
    /// `into_handler`'s per-event deadline. Design default 30s.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            annotation_domain: "hyperfleet.io".to_string(),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// A loaded workflow bound to its transports, ready to handle events.
///
/// Safe to share across concurrent calls: `document` and `registry` are
/// `Arc`'d and built once, `EngineDeps`'s trait objects are `Send + Sync`,
/// and `Interpreter::run_items` takes its `ValueMap` by value — no shared
/// mutable state crosses an execution boundary.
#[derive(Clone)]
pub struct Adapter {
    document: Arc<WorkflowDocument>,
    interpreter: Interpreter,
    config: Arc<EngineConfig>,
}

impl Adapter {
    #[must_use]
    pub fn new(document: Arc<WorkflowDocument>, deps: EngineDeps, config: EngineConfig) -> Self {
        let registry = Arc::new(TaskRegistry::builtin(deps.k8s, config.annotation_domain.clone()));
        let interpreter = Interpreter::new(registry, deps.http);
        Self {
            document,
            interpreter,
            config: Arc::new(config),
        }
    }

    /// Runs every task in the document against a freshly-seeded value map
    /// for `event`. Never returns `Err` — every failure mode (expression,
    /// transport, unknown task, cancellation) is folded into the returned
    /// `ExecutionResult`, so the broker callback always gets a normal
    /// value back.
    pub async fn execute(&self, event: Value) -> ExecutionResult {
        let env_snapshot = env::snapshot_env(std::env::vars());
        self.execute_with_env(event, env_snapshot, CancellationToken::new())
            .await
    }

    /// Same as [`Self::execute`] but takes an explicit environment snapshot
    /// and cancellation token, so tests can drive both deterministically.
    pub async fn execute_with_env(
        &self,
        event: Value,
        env_snapshot: FxHashMap<String, Value>,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let exec_ctx = ExecutionContext::new(event.clone(), env_snapshot.clone(), chrono::Utc::now());
        tracing::info!(correlation_id = %exec_ctx.correlation_id, "execution started");

        let mut v = ValueMap::for_event(event, env_snapshot);
        let ctx = ExecCtx::new(cancel);
        let mut phase_outputs = FxHashMap::default();

        for (phase, tasks) in self.document.phases() {
            v = match self.run_phase(phase, tasks, v, &ctx).await {
                Ok(v) => v,
                Err((error, partial)) => {
                    tracing::error!(
                        phase = phase.as_str(),
                        error_reason = error.reason(),
                        "execution failed"
                    );
                    return ExecutionResult::failed(phase, error, partial)
                        .with_phase_outputs(phase_outputs);
                }
            };
            phase_outputs.insert(phase, v.clone());
        }

        let skip = self.resources_skip_reason(&v);
        let mut result = ExecutionResult::success(v).with_phase_outputs(phase_outputs);
        if let Some(reason) = skip {
            result = result.with_skip(reason);
        }
        result
    }

    async fn run_phase(
        &self,
        _phase: Phase,
        tasks: &[TaskItem],
        v: ValueMap,
        ctx: &ExecCtx,
    ) -> Result<ValueMap, (crate::error::EngineError, ValueMap)> {
        let fallback = v.clone();
        self.interpreter
            .run_items(tasks, v, ctx)
            .await
            .map_err(|e| (e, fallback))
    }

    /// Resources were gated on `allMatched` and it evaluated false — not a
    /// failure: a precondition mismatch is a successful execution with
    /// `resources_skipped: true`.
    fn resources_skip_reason(&self, v: &ValueMap) -> Option<String> {
        match v.get("allMatched") {
            Some(Value::Bool(false)) => Some(
                v.get("notMetReason")
                    .and_then(Value::as_str)
                    .unwrap_or("preconditions not met")
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Wraps `execute` as a broker-callback-shaped closure, enforcing
    /// `config.shutdown_grace` via `tokio::time::timeout`. A timed-out
    /// execution's in-flight cancellation token is cancelled so any
    /// suspended runner surfaces `EngineError::Cancelled` rather than the
    /// process hanging past the deadline; the handler itself still returns
    /// a normal `ExecutionResult`.
    #[must_use]
    pub fn into_handler(self) -> impl Fn(Value) -> BoxFuture<'static, ExecutionResult> + Clone {
        move |event: Value| {
            let adapter = self.clone();
            Box::pin(async move {
                let env_snapshot = env::snapshot_env(std::env::vars());
                let cancel = CancellationToken::new();
                let timeout_cancel = cancel.clone();
                let deadline = adapter.config.shutdown_grace;

                match tokio::time::timeout(
                    deadline,
                    adapter.execute_with_env(event, env_snapshot, cancel),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        timeout_cancel.cancel();
                        ExecutionResult::failed(
                            Phase::Execution,
                            crate::error::EngineError::Cancelled,
                            ValueMap::new(),
                        )
                    }
                }
            })
        }
    }
}
