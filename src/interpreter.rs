//! The tree-walking task AST interpreter.
//!
//! Threads a [`ValueMap`] sequentially through a task list: no loops, no
//! goto, no parallelism — termination is linear.

use crate::ast::{TaskItem, TaskNode};
use crate::context::ExecCtx;
use crate::error::EngineError;
use crate::expr;
use crate::http::HttpTransport;
use crate::runners::TaskRegistry;
use crate::value_map::{keys, ValueMap};
use std::sync::Arc;
use tracing::instrument;

/// Walks a task list, threading `v` through each item in document order.
///
/// Holds the HTTP transport directly (rather than behind the task
/// registry) because `CallHttp` is a core AST node the interpreter
/// dispatches itself — only `CallFunction` goes through the named-lookup
/// registry.
#[derive(Clone)]
pub struct Interpreter {
    registry: Arc<TaskRegistry>,
    http: Arc<dyn HttpTransport>,
}

impl Interpreter {
    #[must_use]
    pub fn new(registry: Arc<TaskRegistry>, http: Arc<dyn HttpTransport>) -> Self {
        Self { registry, http }
    }

    /// Runs `items` in order against `v`, returning the final value map or
    /// the first error encountered. Errors are not caught here — they
    /// surface to the enclosing `Try` node or to [`crate::facade::Adapter`].
    pub async fn run_items(
        &self,
        items: &[TaskItem],
        mut v: ValueMap,
        ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        for item in items {
            v = self.run_item(item, v, ctx).await?;
        }
        Ok(v)
    }

    #[instrument(skip(self, v, ctx), fields(task_key = %item.key), err)]
    async fn run_item(
        &self,
        item: &TaskItem,
        v: ValueMap,
        ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        if let Some(guard) = &item.if_guard {
            if !expr::eval_guard(&guard.0, &v)? {
                return Ok(v);
            }
        }

        let raw_output = self.dispatch(&item.node, v.clone(), ctx).await?;

        let next = match &item.export {
            Some(export) => {
                let mut augmented = raw_output.clone();
                augmented.set(keys::CONTENT, raw_output.as_json());
                let exported = expr::eval_value(&export.0, &augmented)?;
                ValueMap::from_json(exported)
            }
            None => raw_output,
        };

        Ok(next)
    }

    async fn dispatch(
        &self,
        node: &TaskNode,
        v: ValueMap,
        ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        match node {
            TaskNode::Set(fields) => {
                let mut next = v;
                for (key, value_expr) in fields {
                    let evaluated = expr::eval_value(&value_expr.0, &next)?;
                    next.set_param(key, evaluated);
                }
                Ok(next)
            }
            TaskNode::Do(items) => Box::pin(self.run_items(items, v, ctx)).await,
            TaskNode::Try { try_, catch, retry } => {
                crate::runners::try_::run(self, try_, catch.as_ref(), *retry, v, ctx).await
            }
            TaskNode::CallHttp {
                method,
                endpoint,
                headers,
                body,
                output,
                timeout,
            } => {
                crate::runners::http::run(
                    self.http.as_ref(),
                    *method,
                    endpoint,
                    headers,
                    body.as_ref(),
                    *output,
                    timeout.as_ref(),
                    v,
                    ctx,
                )
                .await
            }
            TaskNode::CallFunction { name, with } => {
                let mut evaluated_with = ValueMap::new();
                for (k, expr_val) in with {
                    let value = expr::eval_value(&expr_val.0, &v)?;
                    evaluated_with.set(k, value);
                }
                let runner = self
                    .registry
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownTask { name: name.clone() })?;
                runner.call(evaluated_with, v, ctx).await
            }
        }
    }
}
