//! Scripted API server for exercising cluster calls in tests
//!
//! Each [`Exchange`] names one expected call and the reply to it. Calls may
//! arrive in any order; the first unused exchange with the same method and
//! path answers. The server stops once every exchange has been used and
//! returns what it received.

use http::{Request, Response, StatusCode};
use hyper::Body;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_test::mock;

use super::K8sClient;

enum Reply {
    Json(Value),
    Echo,
}

/// One expected call and its reply
pub struct Exchange {
    method: &'static str,
    path: String,
    status: u16,
    reply: Reply,
}

impl Exchange {
    fn new(method: &'static str, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            status: 200,
            reply: Reply::Json(json!({})),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// A create call answered with the object it posted
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            status: 201,
            reply: Reply::Echo,
            ..Self::new("POST", path)
        }
    }

    /// A delete call answered with a success status
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path).json(success())
    }

    pub fn json(mut self, body: Value) -> Self {
        self.reply = Reply::Json(body);
        self
    }

    /// Answer with an API error carrying this code
    pub fn fail(mut self, code: u16) -> Self {
        self.status = code;
        self.reply = Reply::Json(api_error(code));
        self
    }
}

/// A call the server received
#[derive(Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: Value,
}

impl Recorded {
    /// Decoded `labelSelector` query parameter
    pub fn label_selector(&self) -> Option<String> {
        self.query
            .split('&')
            .find_map(|pair| pair.strip_prefix("labelSelector="))
            .map(|v| v.replace("%3D", "=").replace("%2C", ",").replace("%2F", "/"))
    }
}

fn describe(pending: &[Exchange]) -> String {
    pending
        .iter()
        .map(|e| format!("{} {}", e.method, e.path))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Client backed by a server that answers `exchanges`
pub fn scripted(exchanges: Vec<Exchange>) -> (K8sClient, JoinHandle<Vec<Recorded>>) {
    let (service, mut handle) = mock::pair::<Request<Body>, Response<Body>>();

    let server = tokio::spawn(async move {
        let mut pending = exchanges;
        let mut recorded = Vec::new();

        while !pending.is_empty() {
            let next = tokio::time::timeout(Duration::from_secs(5), handle.next_request());
            let (request, send) = next
                .await
                .unwrap_or_else(|_| panic!("calls never made: {}", describe(&pending)))
                .expect("client dropped with calls still expected");

            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let query = request.uri().query().unwrap_or_default().to_string();

            let index = pending
                .iter()
                .position(|e| e.method == method && e.path == path)
                .unwrap_or_else(|| panic!("unexpected call {method} {path}"));
            let exchange = pending.remove(index);

            let bytes = hyper::body::to_bytes(request.into_body()).await.unwrap();
            let body: Value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };

            let reply = match exchange.reply {
                Reply::Json(value) => value,
                Reply::Echo => body.clone(),
            };
            send.send_response(
                Response::builder()
                    .status(StatusCode::from_u16(exchange.status).unwrap())
                    .header("content-type", "application/json")
                    .body(Body::from(reply.to_string()))
                    .unwrap(),
            );

            recorded.push(Recorded {
                method,
                path,
                query,
                body,
            });
        }

        recorded
    });

    let client = kube::Client::new(service, "default");
    (K8sClient::from_client(client), server)
}

/// List response holding `items`
pub fn list(items: Vec<Value>) -> Value {
    json!({"apiVersion": "v1", "kind": "List", "metadata": {}, "items": items})
}

pub fn success() -> Value {
    json!({"apiVersion": "v1", "kind": "Status", "metadata": {}, "status": "Success"})
}

pub fn api_error(code: u16) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": format!("scripted failure {code}"),
        "reason": "Scripted",
        "code": code,
    })
}
