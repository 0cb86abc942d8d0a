//! Fake [`HttpTransport`]/[`K8sTransport`] implementations for end-to-end
//! façade tests, standing in for the real `reqwest`/`kube` backends.

use async_trait::async_trait;
use hyperfleet_engine::error::{HttpError, K8sError};
use hyperfleet_engine::http::{HttpRequest, HttpResponse, HttpTransport};
use hyperfleet_engine::k8s::{GroupVersionKind, K8sTransport};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One scripted HTTP response: either a body to return or a transport
/// failure to simulate (e.g. for the retry scenario's "fails twice then
/// succeeds" script).
pub enum ScriptedResponse {
    Ok { status: u16, body: Value },
    Fail,
}

/// Replays a fixed script of responses in order, one per call, looping the
/// final entry if more calls arrive than scripted. Records the wall-clock
/// instant of each call so retry/backoff tests can assert on the deltas.
pub struct FakeHttpTransport {
    script: Mutex<Vec<ScriptedResponse>>,
    pub call_times: Mutex<Vec<Instant>>,
}

impl FakeHttpTransport {
    #[must_use]
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script),
            call_times: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeHttpTransport {
    async fn send(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        self.call_times.lock().unwrap().push(Instant::now());

        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.remove(0)
        } else {
            match script.first() {
                Some(ScriptedResponse::Ok { status, body }) => ScriptedResponse::Ok {
                    status: *status,
                    body: body.clone(),
                },
                Some(ScriptedResponse::Fail) => ScriptedResponse::Fail,
                None => ScriptedResponse::Fail,
            }
        };

        match next {
            ScriptedResponse::Ok { status, body } => Ok(HttpResponse {
                status_code: status,
                headers: HashMap::new(),
                body: serde_json::to_vec(&body).unwrap(),
            }),
            ScriptedResponse::Fail => Err(HttpError::Transport {
                endpoint: request.url,
                reason: "simulated transport failure".to_string(),
            }),
        }
    }
}

/// A key identifying one stored object: kind plus namespace/name.
fn object_key(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}/{}", gvk.kind, namespace.unwrap_or(""), name)
}

/// An in-memory Kubernetes double: `create`/`update`/`delete`/`get` all
/// operate on a single `Mutex<HashMap>`, enough to exercise the apply
/// decision table and the recreate sequence without a live cluster.
///
/// When `sticky_deletes` is set, `delete` marks the key deleted but `get`
/// keeps reporting the pre-delete object — used to simulate scenario 6's
/// "fake deletes never reach NotFound" cancellation test.
pub struct FakeK8sTransport {
    objects: Mutex<HashMap<String, Value>>,
    pub sticky_deletes: bool,
}

impl FakeK8sTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            sticky_deletes: false,
        }
    }

    #[must_use]
    pub fn sticky() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            sticky_deletes: true,
        }
    }

    pub fn seed(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str, object: Value) {
        self.objects
            .lock()
            .unwrap()
            .insert(object_key(gvk, namespace, name), object);
    }
}

impl Default for FakeK8sTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl K8sTransport for FakeK8sTransport {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, K8sError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&object_key(gvk, namespace, name))
            .cloned())
    }

    async fn list_by_selector(
        &self,
        _gvk: &GroupVersionKind,
        _namespace: Option<&str>,
        _label_selector: &str,
    ) -> Result<Vec<Value>, K8sError> {
        Ok(Vec::new())
    }

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        manifest: Value,
    ) -> Result<Value, K8sError> {
        let name = manifest["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.objects
            .lock()
            .unwrap()
            .insert(object_key(gvk, namespace, &name), manifest.clone());
        Ok(manifest)
    }

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        manifest: Value,
    ) -> Result<Value, K8sError> {
        let name = manifest["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.objects
            .lock()
            .unwrap()
            .insert(object_key(gvk, namespace, &name), manifest.clone());
        Ok(manifest)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), K8sError> {
        if !self.sticky_deletes {
            self.objects.lock().unwrap().remove(&object_key(gvk, namespace, name));
        }
        Ok(())
    }
}
