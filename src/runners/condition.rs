//! The `condition`/`cel` task: evaluates `with.expression` as a jq-subset
//! expression. Registered under both names since the legacy schema's
//! condition fragments and this engine's own documents use the two names
//! interchangeably for the same mechanism.
//!
//! This crate ships no CEL evaluator (see DESIGN.md's Open Question
//! resolution): a source string containing a CEL-only construct is rejected
//! outright rather than silently mistranslated as jq.

use super::TaskRunner;
use crate::context::ExecCtx;
use crate::error::EngineError;
use crate::expr;
use crate::value_map::ValueMap;
use async_trait::async_trait;
use serde_json::Value;

/// Substrings that only make sense under full CEL semantics; any one of
/// these in the expression source means we cannot safely evaluate it as jq.
const CEL_ONLY_MARKERS: &[&str] = &[".filter(", ".map(", ".exists(", ".all(", ".size()", "has("];

pub struct ConditionRunner;

#[async_trait]
impl TaskRunner for ConditionRunner {
    async fn call(
        &self,
        with: ValueMap,
        v: ValueMap,
        _ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        let with = with.as_json();
        let expression = with.get("expression").and_then(Value::as_str).unwrap_or("");

        if let Some(marker) = CEL_ONLY_MARKERS.iter().find(|m| expression.contains(**m)) {
            return Err(EngineError::UnsupportedCel {
                detail: format!("expression `{expression}` uses `{marker}`"),
            });
        }

        let result = expr::jq::eval_str(expression, &v.as_json())?;
        let as_key = with.get("as").and_then(Value::as_str).unwrap_or("result");

        let mut next = v;
        next.set(as_key, result);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecCtx {
        ExecCtx::new(CancellationToken::new())
    }

    #[tokio::test]
    async fn evaluates_jq_expression_into_named_key() {
        let mut v = ValueMap::new();
        v.set("count", json!(3));
        let mut with = ValueMap::new();
        with.set("expression", json!("${ .count > 2 }"));
        with.set("as", json!("hasEnough"));
        let result = ConditionRunner.call(with, v, &ctx()).await.unwrap();
        assert_eq!(result.get("hasEnough"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn rejects_cel_only_constructs() {
        let mut with = ValueMap::new();
        with.set("expression", json!("items.filter(x, x.active)"));
        let result = ConditionRunner.call(with, ValueMap::new(), &ctx()).await;
        assert!(matches!(result, Err(EngineError::UnsupportedCel { .. })));
    }
}
