//! The `Try` node's retry state machine. Dispatched directly by the
//! interpreter, recursing back into
//! [`crate::interpreter::Interpreter::run_items`] for both the try-list and
//! the catch-list.

use crate::ast::{BackoffPolicy, CatchClause, RetryPolicy, TaskItem};
use crate::context::ExecCtx;
use crate::error::EngineError;
use crate::interpreter::Interpreter;
use crate::value_map::ValueMap;
use std::time::Duration;

/// Design-default backoff unit: the base delay a `Constant` policy always
/// uses and the unit `Linear`/`Exponential` scale from.
const BASE_DELAY: Duration = Duration::from_secs(1);

pub async fn run(
    interpreter: &Interpreter,
    try_items: &[TaskItem],
    catch: Option<&CatchClause>,
    retry: RetryPolicy,
    v: ValueMap,
    ctx: &ExecCtx,
) -> Result<ValueMap, EngineError> {
    let mut attempt = 1u32;
    loop {
        match interpreter.run_items(try_items, v.clone(), ctx).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt >= retry.max_attempts {
                    return match catch {
                        Some(clause) => run_catch(interpreter, clause, &err, v, ctx).await,
                        None => Err(err),
                    };
                }

                let delay = backoff_delay(retry.backoff, attempt);
                tokio::select! {
                    () = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

async fn run_catch(
    interpreter: &Interpreter,
    clause: &CatchClause,
    err: &EngineError,
    v: ValueMap,
    ctx: &ExecCtx,
) -> Result<ValueMap, EngineError> {
    let mut catch_v = v;
    catch_v.set(
        clause.binding.clone(),
        serde_json::json!({"message": err.to_string()}),
    );
    interpreter.run_items(&clause.items, catch_v, ctx).await
}

fn backoff_delay(policy: BackoffPolicy, attempt: u32) -> Duration {
    match policy {
        BackoffPolicy::Constant => BASE_DELAY,
        BackoffPolicy::Linear => BASE_DELAY * attempt,
        BackoffPolicy::Exponential => BASE_DELAY * 2u32.pow(attempt - 1),
    }
}
