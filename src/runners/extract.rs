//! The `extract` task: resolves a list of parameter definitions against the
//! event payload, environment, and K8s-backed secrets/configmaps, then
//! returns them under `params`.

use super::TaskRunner;
use crate::context::ExecCtx;
use crate::error::{EngineError, ExtractError};
use crate::value_map::ValueMap;
use async_trait::async_trait;
use serde_json::Value;

pub struct ExtractRunner;

#[async_trait]
impl TaskRunner for ExtractRunner {
    async fn call(
        &self,
        with: ValueMap,
        v: ValueMap,
        _ctx: &ExecCtx,
    ) -> Result<ValueMap, EngineError> {
        let with = with.as_json();
        let defs = with
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut next = v;
        for def in &defs {
            let (name, value) = resolve_one(def, &next)?;
            next.set_param(&name, value);
        }
        Ok(next)
    }
}

fn resolve_one(def: &Value, v: &ValueMap) -> Result<(String, Value), EngineError> {
    let name = def
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EngineError::Extract(ExtractError::MissingRequired {
                name: "<unnamed>".to_string(),
                source: "extract definition missing `name`".to_string(),
            })
        })?
        .to_string();
    let source = def
        .get("source")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EngineError::Extract(ExtractError::MissingRequired {
                name: name.clone(),
                source: "extract definition missing `source`".to_string(),
            })
        })?;
    let required = def.get("required").and_then(Value::as_bool).unwrap_or(false);
    let default = def.get("default").cloned();
    let target_type = def.get("type").and_then(Value::as_str);

    let resolved = resolve_source(source, v);
    let is_missing = matches!(&resolved, None) || matches!(&resolved, Some(Value::String(s)) if s.is_empty());

    let raw = if is_missing {
        if required {
            return Err(EngineError::Extract(ExtractError::MissingRequired {
                name,
                source: source.to_string(),
            }));
        }
        default.unwrap_or(Value::Null)
    } else {
        resolved.unwrap()
    };

    let coerced = match target_type {
        Some(t) => coerce(&name, &raw, t)?,
        None => raw,
    };

    Ok((name, coerced))
}

/// Resolves `source` against the value map per the documented grammar:
/// `event.`, `env.`, `secret.`/`configmap.`, or any other string treated as a
/// dot-path directly inside the event payload.
///
/// `secret.<ref>`/`configmap.<ref>` look the reference up as a flat
/// top-level key rather than a nested path: the translator resolves these
/// ahead of time into a `k8s-read` task, and `k8s_read::K8sReadRunner`
/// stores each resolved value under its raw `<ns>/<name>.<key>` reference as
/// the key by default, so that same string is the right lookup here.
fn resolve_source(source: &str, v: &ValueMap) -> Option<Value> {
    if let Some(path) = source.strip_prefix("event.") {
        v.event().and_then(|event| dot_path(event, path))
    } else if let Some(name) = source.strip_prefix("env.") {
        v.get("env").and_then(|env| env.get(name)).cloned()
    } else if let Some(reference) = source.strip_prefix("secret.") {
        v.get(reference).cloned()
    } else if let Some(reference) = source.strip_prefix("configmap.") {
        v.get(reference).cloned()
    } else {
        v.event().and_then(|event| dot_path(event, source))
    }
}

fn dot_path(root: &Value, path: &str) -> Option<Value> {
    path.split('.')
        .fold(Some(root), |acc, segment| acc?.get(segment))
        .cloned()
}

const TRUE_STRINGS: &[&str] = &["yes", "on", "1", "true"];
const FALSE_STRINGS: &[&str] = &["no", "off", "0", "false"];

fn coerce(name: &str, value: &Value, target_type: &str) -> Result<Value, EngineError> {
    let coercion_error = || {
        EngineError::Extract(ExtractError::Coercion {
            name: name.to_string(),
            target_type: target_type.to_string(),
            value: value.to_string(),
        })
    };

    match target_type {
        "string" => Ok(Value::String(stringify(value))),
        "int" | "int64" => match value {
            Value::Number(n) if n.is_i64() => Ok(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .map(|f| Value::Number((f.trunc() as i64).into()))
                .ok_or_else(coercion_error),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Value::Number(i.into()))
                .map_err(|_| coercion_error()),
            _ => Err(coercion_error()),
        },
        "float" | "float64" => match value {
            Value::Number(n) => Ok(Value::Number(
                serde_json::Number::from_f64(n.as_f64().ok_or_else(coercion_error)?)
                    .ok_or_else(coercion_error)?,
            )),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(coercion_error),
            _ => Err(coercion_error()),
        },
        "bool" => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => {
                let lower = s.to_ascii_lowercase();
                if TRUE_STRINGS.contains(&lower.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSE_STRINGS.contains(&lower.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(coercion_error())
                }
            }
            _ => Err(coercion_error()),
        },
        _ => Ok(value.clone()),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
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

    fn v_with_event(event: Value) -> ValueMap {
        ValueMap::for_event(event, rustc_hash::FxHashMap::default())
    }

    #[tokio::test]
    async fn resolves_event_path_and_mirrors_into_params() {
        let v = v_with_event(json!({"id": "c-1"}));
        let mut with = ValueMap::new();
        with.set(
            "params",
            json!([{"name": "clusterId", "source": "event.id", "required": true}]),
        );
        let result = ExtractRunner.call(with, v, &ctx()).await.unwrap();
        assert_eq!(result.get("clusterId"), Some(&json!("c-1")));
        assert_eq!(
            result.params().and_then(|p| p.get("clusterId")),
            Some(&json!("c-1"))
        );
    }

    #[tokio::test]
    async fn missing_required_param_fails() {
        let v = v_with_event(json!({}));
        let mut with = ValueMap::new();
        with.set(
            "params",
            json!([{"name": "clusterId", "source": "event.id", "required": true}]),
        );
        let result = ExtractRunner.call(with, v, &ctx()).await;
        assert!(matches!(result, Err(EngineError::Extract(_))));
    }

    #[tokio::test]
    async fn empty_string_is_treated_as_missing_for_defaulting() {
        let v = v_with_event(json!({"name": ""}));
        let mut with = ValueMap::new();
        with.set(
            "params",
            json!([{"name": "clusterName", "source": "event.name", "default": "unnamed"}]),
        );
        let result = ExtractRunner.call(with, v, &ctx()).await.unwrap();
        assert_eq!(result.get("clusterName"), Some(&json!("unnamed")));
    }

    #[test]
    fn coerces_bool_strings() {
        assert_eq!(
            coerce("x", &json!("yes"), "bool").unwrap(),
            json!(true)
        );
        assert_eq!(coerce("x", &json!("off"), "bool").unwrap(), json!(false));
        assert!(coerce("x", &json!("maybe"), "bool").is_err());
    }

    #[test]
    fn coerces_numeric_strings_strictly() {
        assert_eq!(coerce("x", &json!("42"), "int").unwrap(), json!(42));
        assert!(coerce("x", &json!("42.5"), "int").is_err());
    }

    #[test]
    fn float_coercion_truncates_to_int() {
        assert_eq!(coerce("x", &json!(42.9), "int").unwrap(), json!(42));
    }
}
