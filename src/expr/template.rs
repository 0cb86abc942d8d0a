//! Mustache-like template string rendering.
//!
//! Templates contain zero or more `{{ .path }}` placeholders and are
//! rendered by substituting each placeholder with the string form of the
//! value looked up along `.path` inside a supplied JSON data map.
//! Dot-separated keys traverse nested objects. Missing keys are a render
//! error — templates are strict by design, unlike the jq substrate's `//`
//! default.

use crate::error::ExpressionError;
use serde_json::Value;

/// Renders every `{{ .path }}` placeholder in `source` against `data`.
///
/// Helper functions (`lower`, `upper`, `title`, `trim`, `replace`,
/// `contains`, `hasPrefix`, `hasSuffix`, `default`, `quote`,
/// `int`/`int64`/`float64`/`string`, `now`, `date`) are applied as a pipe
/// suffix: `{{ .name | upper }}`.
///
/// # Examples
///
/// ```
/// use hyperfleet_engine::expr::template::render;
/// use serde_json::json;
///
/// let data = json!({"params": {"name": "cluster-a"}});
/// assert_eq!(render("hello {{ .params.name }}", &data).unwrap(), "hello cluster-a");
/// ```
pub fn render(source: &str, data: &Value) -> Result<String, ExpressionError> {
    if !source.contains("{{") {
        return Ok(source.to_string());
    }

    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(ExpressionError::Parse {
                source_text: source.to_string(),
                reason: "unterminated `{{` placeholder".to_string(),
            });
        };
        let inner = after_open[..end].trim();
        out.push_str(&render_placeholder(inner, data, source)?);
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn render_placeholder(inner: &str, data: &Value, source: &str) -> Result<String, ExpressionError> {
    let mut segments = inner.split('|').map(str::trim);
    let path_expr = segments.next().unwrap_or_default();
    let path = path_expr.strip_prefix('.').unwrap_or(path_expr);

    let mut current = if path.is_empty() {
        Some(data.clone())
    } else {
        lookup_path(data, path)
    };

    for helper in segments {
        current = Some(apply_helper(helper, current, data, source)?);
    }

    match current {
        Some(value) => Ok(stringify(&value)),
        None => Err(ExpressionError::MissingKey {
            source_text: source.to_string(),
            key: path.to_string(),
        }),
    }
}

fn lookup_path(data: &Value, path: &str) -> Option<Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn apply_helper(
    helper: &str,
    current: Option<Value>,
    data: &Value,
    source: &str,
) -> Result<Value, ExpressionError> {
    let (name, args) = parse_helper_call(helper);
    match name {
        "lower" => Ok(Value::String(stringify_opt(&current).to_lowercase())),
        "upper" => Ok(Value::String(stringify_opt(&current).to_uppercase())),
        "title" => Ok(Value::String(title_case(&stringify_opt(&current)))),
        "trim" => Ok(Value::String(stringify_opt(&current).trim().to_string())),
        "quote" => Ok(Value::String(format!("\"{}\"", stringify_opt(&current)))),
        "string" => Ok(Value::String(stringify_opt(&current))),
        "int" | "int64" => {
            let text = stringify_opt(&current);
            let parsed: i64 = text.trim().parse().map_err(|_| ExpressionError::TypeMismatch {
                source_text: source.to_string(),
                reason: format!("`{text}` is not an integer"),
            })?;
            Ok(Value::Number(parsed.into()))
        }
        "float64" => {
            let text = stringify_opt(&current);
            let parsed: f64 = text.trim().parse().map_err(|_| ExpressionError::TypeMismatch {
                source_text: source.to_string(),
                reason: format!("`{text}` is not a float"),
            })?;
            Ok(serde_json::Number::from_f64(parsed)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        "now" => Ok(Value::String(chrono::Utc::now().to_rfc3339())),
        "contains" => {
            let needle = args.first().cloned().unwrap_or_default();
            Ok(Value::Bool(stringify_opt(&current).contains(&needle)))
        }
        "hasPrefix" => {
            let prefix = args.first().cloned().unwrap_or_default();
            Ok(Value::Bool(stringify_opt(&current).starts_with(&prefix)))
        }
        "hasSuffix" => {
            let suffix = args.first().cloned().unwrap_or_default();
            Ok(Value::Bool(stringify_opt(&current).ends_with(&suffix)))
        }
        "replace" => {
            let from = args.first().cloned().unwrap_or_default();
            let to = args.get(1).cloned().unwrap_or_default();
            Ok(Value::String(stringify_opt(&current).replace(&from, &to)))
        }
        "default" => {
            let is_empty = match &current {
                None => true,
                Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                _ => false,
            };
            if is_empty {
                let default = args.first().cloned().unwrap_or_default();
                Ok(Value::String(default))
            } else {
                Ok(current.unwrap())
            }
        }
        "date" => {
            let layout = args.first().cloned().unwrap_or_else(|| "%Y-%m-%d".to_string());
            let when = stringify_opt(&current);
            let parsed = chrono::DateTime::parse_from_rfc3339(&when)
                .map(|dt| dt.format(&strftime_layout(&layout)).to_string())
                .unwrap_or(when);
            Ok(Value::String(parsed))
        }
        other => Err(ExpressionError::Parse {
            source_text: source.to_string(),
            reason: format!("unknown template helper `{other}`"),
        }),
    }
    .map(|v| {
        let _ = data;
        v
    })
}

fn stringify_opt(value: &Option<Value>) -> String {
    value.as_ref().map(stringify).unwrap_or_default()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses `name(arg1, arg2)` into its name and unquoted string arguments.
/// Bare `name` with no parens yields an empty argument list.
fn parse_helper_call(helper: &str) -> (&str, Vec<String>) {
    let Some(open) = helper.find('(') else {
        return (helper.trim(), Vec::new());
    };
    let name = helper[..open].trim();
    let Some(close) = helper.rfind(')') else {
        return (name, Vec::new());
    };
    let args = helper[open + 1..close]
        .split(',')
        .map(|a| a.trim().trim_matches('"').to_string())
        .filter(|a| !a.is_empty())
        .collect();
    (name, args)
}

/// Translates the handful of Go-`time`-style layout tokens this crate
/// documents into `strftime` directives understood by `chrono`.
fn strftime_layout(layout: &str) -> String {
    layout
        .replace("2006", "%Y")
        .replace("01", "%m")
        .replace("02", "%d")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_placeholders_returns_unchanged() {
        assert_eq!(render("plain text", &json!({})).unwrap(), "plain text");
    }

    #[test]
    fn renders_nested_path() {
        let data = json!({"a": {"b": {"c": "deep"}}});
        assert_eq!(render("value: {{ .a.b.c }}", &data).unwrap(), "value: deep");
    }

    #[test]
    fn missing_key_is_strict_error() {
        let data = json!({});
        assert!(render("{{ .missing }}", &data).is_err());
    }

    #[test]
    fn helper_pipeline_applies() {
        let data = json!({"name": "cluster-a"});
        assert_eq!(render("{{ .name | upper }}", &data).unwrap(), "CLUSTER-A");
    }

    #[test]
    fn default_helper_substitutes_when_empty() {
        let data = json!({"name": ""});
        assert_eq!(
            render("{{ .name | default(\"fallback\") }}", &data).unwrap(),
            "fallback"
        );
    }
}
