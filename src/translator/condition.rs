//! Condition-operator → jq fragment mapping, plus the small string helpers
//! the rest of the translator shares (`snake_case`, `jq_literal`).

use crate::error::TranslateError;
use serde_json::Value;

/// One `{ field, operator, value }` entry from a legacy precondition.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct ConditionDef {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Renders one condition as a jq boolean fragment evaluated against
/// `.content` (the precondition's captured HTTP response body). The caller
/// wraps the returned fragment in `${ ... }` and conjoins it with sibling
/// fragments.
pub fn condition_to_jq(cond: &ConditionDef) -> Result<String, TranslateError> {
    let path = format!(".content.{}", cond.field);

    let fragment = match cond.operator.as_str() {
        "equals" => format!("{path} == {}", jq_literal(value_or_missing(cond)?)),
        "notEquals" => format!("{path} != {}", jq_literal(value_or_missing(cond)?)),
        "contains" => format!("{path}.contains({})", jq_literal(value_or_missing(cond)?)),
        "notContains" => format!("not ({path}.contains({}))", jq_literal(value_or_missing(cond)?)),
        "startsWith" => format!("{path}.startswith({})", jq_literal(value_or_missing(cond)?)),
        "endsWith" => format!("{path}.endswith({})", jq_literal(value_or_missing(cond)?)),
        "gt" => format!("{path} > {}", jq_literal(value_or_missing(cond)?)),
        "gte" => format!("{path} >= {}", jq_literal(value_or_missing(cond)?)),
        "lt" => format!("{path} < {}", jq_literal(value_or_missing(cond)?)),
        "lte" => format!("{path} <= {}", jq_literal(value_or_missing(cond)?)),
        "in" => join_list(&path, cond, " or ", "==")?,
        "notIn" => join_list(&path, cond, " and ", "!=")?,
        "exists" => format!("{path} != null"),
        "notExists" => format!("{path} == null"),
        "empty" => format!("({path} == null or {path} == \"\" or {path} == [])"),
        "notEmpty" => format!("not ({path} == null or {path} == \"\" or {path} == [])"),
        "matches" => format!("{path}.test({})", jq_literal(value_or_missing(cond)?)),
        other => {
            return Err(TranslateError::UnsupportedOperator {
                field: cond.field.clone(),
                operator: other.to_string(),
            });
        }
    };
    Ok(fragment)
}

fn value_or_missing(cond: &ConditionDef) -> Result<&Value, TranslateError> {
    cond.value.as_ref().ok_or_else(|| TranslateError::MissingField {
        name: cond.field.clone(),
    })
}

fn join_list(path: &str, cond: &ConditionDef, glue: &str, op: &str) -> Result<String, TranslateError> {
    let list = value_or_missing(cond)?
        .as_array()
        .ok_or_else(|| TranslateError::MissingField {
            name: cond.field.clone(),
        })?;
    let parts: Vec<String> = list
        .iter()
        .map(|v| format!("{path} {op} {}", jq_literal(v)))
        .collect();
    Ok(format!("({})", parts.join(glue)))
}

/// Renders a JSON value as a jq literal (string quoting, pass-through for
/// number/bool/null/array).
#[must_use]
pub fn jq_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(jq_literal).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(_) => "null".to_string(),
    }
}

/// Converts an arbitrary legacy identifier (`"check-cluster"`,
/// `"CheckCluster"`, `"check cluster"`) into `snake_case` for `_ok` flag
/// names.
#[must_use]
pub fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in s.chars() {
        if c == '-' || c == ' ' || c == '_' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower_or_digit = false;
            continue;
        }
        if c.is_uppercase() {
            if prev_lower_or_digit && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_alphanumeric();
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snake_case_handles_kebab_and_camel() {
        assert_eq!(snake_case("check-cluster"), "check_cluster");
        assert_eq!(snake_case("CheckCluster"), "check_cluster");
        assert_eq!(snake_case("checkCluster"), "check_cluster");
    }

    #[test]
    fn equals_condition_renders_field_comparison() {
        let cond = ConditionDef {
            field: "status".to_string(),
            operator: "equals".to_string(),
            value: Some(json!("ready")),
        };
        assert_eq!(
            condition_to_jq(&cond).unwrap(),
            ".content.status == \"ready\""
        );
    }

    #[test]
    fn in_condition_becomes_disjunction() {
        let cond = ConditionDef {
            field: "status".to_string(),
            operator: "in".to_string(),
            value: Some(json!(["ready", "active"])),
        };
        assert_eq!(
            condition_to_jq(&cond).unwrap(),
            "(.content.status == \"ready\" or .content.status == \"active\")"
        );
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let cond = ConditionDef {
            field: "status".to_string(),
            operator: "fuzzyMatches".to_string(),
            value: Some(json!("ready")),
        };
        assert!(matches!(
            condition_to_jq(&cond),
            Err(TranslateError::UnsupportedOperator { .. })
        ));
    }
}
