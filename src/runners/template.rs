//! The `template` task: exposes [`expr::template::render`] as a named task
//! for workflows that want mustache rendering outside the Kubernetes
//! manifest path.

use super::TaskRunner;
use crate::context::ExecCtx;
use crate::error::EngineError;
use crate::expr::template;
use crate::value_map::ValueMap;
use async_trait::async_trait;
use serde_json::Value;

pub struct TemplateRunner;

#[async_trait]
impl TaskRunner for TemplateRunner {
    async fn call(
        &self,
        with: ValueMap,
        v: ValueMap,
        _ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        let with = with.as_json();
        let source = with.get("source").and_then(Value::as_str).unwrap_or("");
        let as_key = with.get("as").and_then(Value::as_str).unwrap_or("result");

        let rendered = template::render(source, &v.as_json())?;

        let mut next = v;
        next.set(as_key, Value::String(rendered));
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
    async fn renders_placeholder_against_value_map() {
        let mut v = ValueMap::new();
        v.set("params", json!({"name": "cluster-a"}));
        let mut with = ValueMap::new();
        with.set("source", json!("hello {{ .params.name }}"));
        let result = TemplateRunner.call(with, v, &ctx()).await.unwrap();
        assert_eq!(result.get("result"), Some(&json!("hello cluster-a")));
    }
}
