//! The expression substrate: two tightly coupled sub-languages evaluated
//! against the workflow value map.
//!
//! - [`template`] renders mustache-like `{{ .path }}` placeholders, strictly
//!   (a missing path is a render error). Only opted into explicitly by the
//!   Kubernetes manifest renderer and the `template` task — the interpreter
//!   itself never calls it directly.
//! - [`jq`] parses and evaluates `${ ... }` runtime expressions: a
//!   hand-written recursive-descent parser over the documented jq subset.
//!
//! [`eval_value`] implements the traversal rule shared by every other task
//! runner: descend maps and lists, and upon finding a string that begins
//! with `${` and ends with `}`, evaluate the inner program; every other
//! scalar (including strings without that shape) passes through unchanged.

pub mod jq;
pub mod template;

use crate::error::ExpressionError;
use crate::value_map::ValueMap;
use serde_json::Value;

/// A value-or-expression from the task AST.
///
/// Holds the raw JSON shape as loaded; evaluation re-walks it against the
/// current value map every time the owning node runs, via [`eval_value`].
/// There is deliberately no compiled/cached program here — expressions in
/// this engine are small and re-parsing per invocation keeps `Expr` a plain
/// JSON wrapper with no lifetime or interior-mutability concerns.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr(pub Value);

impl Expr {
    /// Wraps a literal JSON value that never participates in evaluation
    /// (e.g. a `bool`/`number` loaded directly from the document).
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Self(value)
    }

    /// Parses a single string field from the document into an `Expr`.
    ///
    /// This does not eagerly evaluate or deeply validate jq syntax — parse
    /// errors surface the first time the expression is evaluated, under the
    /// same `ExpressionError` variant evaluation errors use.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(Value::String(raw.to_string()))
    }

    /// Wraps a whole JSON object/array/scalar loaded from the document
    /// (e.g. a `Set` node's value map, or `CallHTTP`'s body).
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Evaluates this expression against the current value map.
    pub fn eval(&self, v: &ValueMap) -> Result<Value, ExpressionError> {
        eval_value(&self.0, v)
    }
}

/// Returns `true` if `s` has the `${ ... }` runtime-expression shape.
#[must_use]
pub fn is_jq_expr(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.starts_with("${") && trimmed.ends_with('}')
}

/// Recursively evaluates `value` against `v`: descends objects and arrays,
/// evaluates `${ ... }` string leaves via [`jq::eval_str`], and returns
/// every other scalar unchanged.
///
/// # Examples
///
/// ```
/// use hyperfleet_engine::expr::eval_value;
/// use hyperfleet_engine::value_map::ValueMap;
/// use serde_json::json;
///
/// let v = ValueMap::new();
/// assert_eq!(eval_value(&json!(42), &v).unwrap(), json!(42));
/// assert_eq!(eval_value(&json!("plain string"), &v).unwrap(), json!("plain string"));
/// ```
pub fn eval_value(value: &Value, v: &ValueMap) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => {
            if is_jq_expr(s) {
                jq::eval_str(s, &v.as_json())
            } else {
                Ok(Value::String(s.clone()))
            }
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_value(item, v)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, val) in map {
                out.insert(k.clone(), eval_value(val, v)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Evaluates `value` as a boolean guard (an `if` field). Non-truthy per jq
/// semantics: `null` and `false` are falsy, everything else is truthy.
pub fn eval_guard(value: &Value, v: &ValueMap) -> Result<bool, ExpressionError> {
    let evaluated = eval_value(value, v)?;
    Ok(jq::is_truthy(&evaluated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_string_passes_through_unchanged() {
        let v = ValueMap::new();
        assert_eq!(eval_value(&json!(true), &v).unwrap(), json!(true));
        assert_eq!(eval_value(&json!(null), &v).unwrap(), json!(null));
    }

    #[test]
    fn string_without_dollar_brace_passes_through_unchanged() {
        let v = ValueMap::new();
        assert_eq!(
            eval_value(&json!("hello world"), &v).unwrap(),
            json!("hello world")
        );
    }

    #[test]
    fn descends_nested_structures() {
        let mut v = ValueMap::new();
        v.set("event", json!({"id": "evt-1"}));
        let template = json!({"a": "${ .event.id }", "b": [1, "${ .event.id }"]});
        let result = eval_value(&template, &v).unwrap();
        assert_eq!(result, json!({"a": "evt-1", "b": [1, "evt-1"]}));
    }
}
