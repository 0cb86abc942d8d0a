//! The outbound HTTP transport seam: a trait the `CallHttp` runner programs
//! against, plus a `reqwest`-backed implementation wired in by the façade.
//!
//! Kept as a trait object rather than a concrete `reqwest::Client` field so
//! tests can supply fakes (`tests/common/fakes.rs`) without a live network.

use crate::error::HttpError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A fully-built outbound HTTP request, already past expression evaluation.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// The raw bytes and metadata of an HTTP response, before JSON parsing.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Abstraction over an outbound HTTP client, object-safe so it can be
/// shared as `Arc<dyn HttpTransport>` across concurrent executions.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError>;
}

/// `reqwest`-backed implementation, the transport the façade wires in for
/// production use.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
}

impl ReqwestHttpTransport {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestHttpTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| HttpError::Transport {
                endpoint: request.url.clone(),
                reason: e.to_string(),
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let send_future = builder.send();
        tokio::pin!(send_future);

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(HttpError::Cancelled { endpoint: request.url });
            }
            result = &mut send_future => result.map_err(|e| HttpError::Transport {
                endpoint: request.url.clone(),
                reason: e.to_string(),
            })?,
        };

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let body_future = response.bytes();
        tokio::pin!(body_future);
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(HttpError::Cancelled { endpoint: request.url });
            }
            result = &mut body_future => result
                .map_err(|e| HttpError::Transport {
                    endpoint: request.url.clone(),
                    reason: e.to_string(),
                })?
                .to_vec(),
        };

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}

/// A transport that always fails with [`HttpError::Transport`], used as a
/// placeholder dependency in interpreter unit tests that never exercise
/// `CallHttp`.
pub struct NullHttpTransport;

#[async_trait]
impl HttpTransport for NullHttpTransport {
    async fn send(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        Err(HttpError::Transport {
            endpoint: request.url,
            reason: "no HTTP transport configured".to_string(),
        })
    }
}
