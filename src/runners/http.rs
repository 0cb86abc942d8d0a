//! The `CallHttp` node's implementation. Dispatched directly by the
//! interpreter, not through [`super::TaskRegistry`] — there is no
//! `CallFunction` task named `http`.

use crate::ast::{BodySpec, HttpMethod, OutputMode};
use crate::context::ExecCtx;
use crate::error::EngineError;
use crate::expr::{self, Expr};
use crate::http::{HttpRequest, HttpTransport};
use crate::value_map::{keys, ValueMap};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Builds and executes one outbound HTTP request, then folds the response
/// into the value map.
///
/// Output mode selects the shape `content` takes: `raw` is the unparsed
/// body string, `content` is the body parsed as JSON (falling back to the
/// raw string when parsing fails), `response` is the full response record.
/// `response` itself always holds the full `{statusCode, status, headers,
/// body, content}` record regardless of output mode, so a caller can always
/// inspect the status code without needing `response` as the chosen mode.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    transport: &dyn HttpTransport,
    method: HttpMethod,
    endpoint: &Expr,
    headers: &FxHashMap<String, Expr>,
    body: Option<&BodySpec>,
    output: OutputMode,
    timeout: Option<&Expr>,
    v: ValueMap,
    ctx: &ExecCtx,
) -> Result<ValueMap, EngineError> {
    let url = stringify(&expr::eval_value(&endpoint.0, &v)?);

    let mut header_map: HashMap<String, String> = HashMap::new();
    for (k, expr_val) in headers {
        header_map.insert(k.clone(), stringify(&expr::eval_value(&expr_val.0, &v)?));
    }

    let has_content_type = header_map
        .keys()
        .any(|k| k.eq_ignore_ascii_case("content-type"));

    let body_bytes = match body {
        Some(BodySpec::Bytes(bytes)) => Some(bytes.clone()),
        Some(BodySpec::Expr(expr_val)) => {
            let evaluated = expr::eval_value(&expr_val.0, &v)?;
            if !has_content_type {
                header_map.insert("Content-Type".to_string(), "application/json".to_string());
            }
            Some(serde_json::to_vec(&evaluated).unwrap_or_default())
        }
        None => None,
    };

    let timeout_duration = match timeout {
        Some(expr_val) => expr::eval_value(&expr_val.0, &v)?
            .as_f64()
            .map(Duration::from_secs_f64),
        None => None,
    };

    let request = HttpRequest {
        method: method.as_str().to_string(),
        url: url.clone(),
        headers: header_map,
        body: body_bytes,
        timeout: timeout_duration,
    };

    let response = transport.send(request, &ctx.cancel).await?;

    let body_string = String::from_utf8_lossy(&response.body).into_owned();
    let parsed_content: Value =
        serde_json::from_str(&body_string).unwrap_or_else(|_| Value::String(body_string.clone()));

    let response_record = serde_json::json!({
        "statusCode": response.status_code,
        "status": reason_phrase(response.status_code),
        "headers": response.headers,
        "body": body_string,
        "content": parsed_content.clone(),
    });

    let content_value = match output {
        OutputMode::Raw => Value::String(body_string),
        OutputMode::Content => parsed_content,
        OutputMode::Response => response_record.clone(),
    };

    let mut next = v;
    next.set(keys::RESPONSE, response_record);
    next.set(keys::CONTENT, content_value);
    Ok(next)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A small, hand-written status-reason table; unrecognized codes fall back
/// to the bare numeric string rather than pulling in the full `http` crate
/// for a cosmetic field.
fn reason_phrase(code: u16) -> String {
    match code {
        200 => "200 OK".to_string(),
        201 => "201 Created".to_string(),
        202 => "202 Accepted".to_string(),
        204 => "204 No Content".to_string(),
        400 => "400 Bad Request".to_string(),
        401 => "401 Unauthorized".to_string(),
        403 => "403 Forbidden".to_string(),
        404 => "404 Not Found".to_string(),
        409 => "409 Conflict".to_string(),
        500 => "500 Internal Server Error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct FakeTransport {
        response: HttpResponse,
        captured: Mutex<Option<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn send(
            &self,
            request: HttpRequest,
            _cancel: &CancellationToken,
        ) -> Result<HttpResponse, HttpError> {
            *self.captured.lock().unwrap() = Some(request);
            Ok(self.response.clone())
        }
    }

    fn ctx() -> ExecCtx {
        ExecCtx::new(CancellationToken::new())
    }

    #[tokio::test]
    async fn content_mode_parses_json_body() {
        let transport = FakeTransport {
            response: HttpResponse {
                status_code: 200,
                headers: HashMap::new(),
                body: br#"{"status":"ready"}"#.to_vec(),
            },
            captured: Mutex::new(None),
        };
        let result = run(
            &transport,
            HttpMethod::Get,
            &Expr::literal(Value::String("https://api/clusters/c1".to_string())),
            &FxHashMap::default(),
            None,
            OutputMode::Content,
            None,
            ValueMap::new(),
            &ctx(),
        )
        .await
        .unwrap();
        assert_eq!(result.get(keys::CONTENT), Some(&serde_json::json!({"status": "ready"})));
    }

    #[tokio::test]
    async fn non_2xx_status_is_not_an_error() {
        let transport = FakeTransport {
            response: HttpResponse {
                status_code: 503,
                headers: HashMap::new(),
                body: b"unavailable".to_vec(),
            },
            captured: Mutex::new(None),
        };
        let result = run(
            &transport,
            HttpMethod::Get,
            &Expr::literal(Value::String("https://api/down".to_string())),
            &FxHashMap::default(),
            None,
            OutputMode::Raw,
            None,
            ValueMap::new(),
            &ctx(),
        )
        .await
        .unwrap();
        assert_eq!(result.get(keys::CONTENT), Some(&serde_json::json!("unavailable")));
    }

    #[tokio::test]
    async fn json_body_sets_default_content_type() {
        let transport = FakeTransport {
            response: HttpResponse {
                status_code: 200,
                headers: HashMap::new(),
                body: b"{}".to_vec(),
            },
            captured: Mutex::new(None),
        };
        run(
            &transport,
            HttpMethod::Post,
            &Expr::literal(Value::String("https://api/echo".to_string())),
            &FxHashMap::default(),
            Some(&BodySpec::Expr(Expr::from_value(serde_json::json!({"x": 1})))),
            OutputMode::Content,
            None,
            ValueMap::new(),
            &ctx(),
        )
        .await
        .unwrap();
        let captured = transport.captured.lock().unwrap().clone().unwrap();
        assert_eq!(
            captured.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }
}
