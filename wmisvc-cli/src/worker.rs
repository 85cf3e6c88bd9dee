//! Line-delimited JSON-RPC dispatch for `wmisvc-worker`.
//!
//! One [`Worker`] owns at most one connection, made by the `connect` method
//! and reused by every later `delete_path`.  The worker runs on a single
//! thread, which is also the thread the connection belongs to.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use wmisvc_core::{ServiceHandle, Wait, WmiError, WmiRuntime};

use crate::DEFAULT_NAMESPACE;

#[derive(Deserialize)]
struct Request {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct Response {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

fn request_error(message: impl Into<String>) -> Value {
    json!({ "kind": "request", "message": message.into() })
}

fn failure(err: WmiError) -> Value {
    serde_json::to_value(err.to_record()).unwrap_or_else(|_| request_error(err.to_string()))
}

/// Request dispatcher holding the current connection.
pub struct Worker<R: WmiRuntime> {
    service: Option<ServiceHandle<R>>,
}

impl<R: WmiRuntime> Default for Worker<R> {
    fn default() -> Self {
        Self { service: None }
    }
}

impl<R: WmiRuntime> Worker<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.service.is_some()
    }

    /// Handle one input line.  Blank lines produce no response.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }

        let resp = match serde_json::from_str::<Request>(line) {
            // Parse error -- use id=0 since we can't extract it.
            Err(e) => Response {
                id: 0,
                result: None,
                error: Some(request_error(format!("invalid JSON: {e}"))),
            },
            Ok(req) => match self.dispatch(&req.method, &req.params) {
                Ok(result) => Response {
                    id: req.id,
                    result: Some(result),
                    error: None,
                },
                Err(error) => Response {
                    id: req.id,
                    result: None,
                    error: Some(error),
                },
            },
        };

        Some(serde_json::to_string(&resp).unwrap_or_else(|_| {
            format!(r#"{{"id":{},"error":"response serialization failed"}}"#, resp.id)
        }))
    }

    fn dispatch(&mut self, method: &str, params: &Value) -> Result<Value, Value> {
        match method {
            "connect" => {
                let namespace = match params.get("namespace") {
                    None | Some(Value::Null) => DEFAULT_NAMESPACE,
                    Some(v) => v
                        .as_str()
                        .ok_or_else(|| request_error("param 'namespace' must be a string"))?,
                };
                // Drop the old connection only once the new one is up.
                let service = ServiceHandle::<R>::connect(namespace).map_err(failure)?;
                self.service = Some(service);
                Ok(json!({ "namespace": namespace }))
            }
            "disconnect" => Ok(Value::Bool(self.service.take().is_some())),
            "delete_path" => {
                let service = self
                    .service
                    .as_ref()
                    .ok_or_else(|| request_error("not connected"))?;
                let path = params
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| request_error("missing string param 'path'"))?;
                let wait = match params.get("timeout_ms") {
                    None | Some(Value::Null) => Wait::Infinite,
                    Some(v) => {
                        let ms = v.as_u64().ok_or_else(|| {
                            request_error("param 'timeout_ms' must be a non-negative integer")
                        })?;
                        Wait::Bounded(Duration::from_millis(ms))
                    }
                };
                service
                    .submit_delete(path, None)
                    .and_then(|pending| pending.wait_for(wait))
                    .map_err(failure)?;
                Ok(json!({ "deleted": path }))
            }
            "ping" => Ok(Value::String("pong".to_owned())),
            _ => Err(request_error(format!("unknown method: {method}"))),
        }
    }
}
