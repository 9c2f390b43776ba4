//! Minimal Vault stand-in speaking the transit and KV v2 HTTP shapes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub namespace: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct Entry {
    custom_metadata: BTreeMap<String, String>,
    versions: Vec<Option<Map<String, Value>>>,
}

#[derive(Default)]
struct Inner {
    token: String,
    entries: HashMap<String, Entry>,
    requests: Vec<RecordedRequest>,
    nonce: u64,
    fail_next: usize,
    omit_ciphertext: bool,
}

#[derive(Clone)]
pub struct FakeVault {
    inner: Arc<Mutex<Inner>>,
}

impl FakeVault {
    /// Bind on an ephemeral port and serve from a background thread.
    pub fn start(token: &str) -> (Self, String) {
        let vault = Self {
            inner: Arc::new(Mutex::new(Inner {
                token: token.to_string(),
                ..Default::default()
            })),
        };
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind fake vault");
        listener.set_nonblocking(true).expect("nonblocking");
        let addr = listener.local_addr().expect("local addr");
        let app = Router::new().fallback(handle).with_state(vault.clone());
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("listener");
                axum::serve(listener, app).await.expect("serve");
            });
        });
        (vault, format!("http://{addr}"))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake vault lock")
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests as `"METHOD /v1/..."` lines.
    pub fn request_lines(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|req| format!("{} {}", req.method, req.path))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Answer the next `count` requests with 503.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Transit encrypt answers without a ciphertext field.
    pub fn omit_ciphertext(&self) {
        self.lock().omit_ciphertext = true;
    }

    /// Write a new version as an out-of-band operator would.
    pub fn put_data(&self, key: &str, data: Value) {
        let data = data.as_object().cloned().unwrap_or_default();
        self.lock()
            .entries
            .entry(key.to_string())
            .or_default()
            .versions
            .push(Some(data));
    }

    pub fn set_owner(&self, key: &str, owner: &str) {
        self.set_metadata(key, "managed_by", owner);
    }

    pub fn set_metadata(&self, key: &str, field: &str, value: &str) {
        self.lock()
            .entries
            .entry(key.to_string())
            .or_default()
            .custom_metadata
            .insert(field.into(), value.into());
    }

    /// Soft-delete the current version so data reads return `null`.
    pub fn soft_delete(&self, key: &str) {
        if let Some(entry) = self.lock().entries.get_mut(key) {
            entry.versions.push(None);
        }
    }

    pub fn data(&self, key: &str) -> Option<Value> {
        self.lock()
            .entries
            .get(key)
            .and_then(|entry| entry.versions.last().cloned().flatten())
            .map(Value::Object)
    }

    pub fn owner(&self, key: &str) -> Option<String> {
        self.lock()
            .entries
            .get(key)
            .and_then(|entry| entry.custom_metadata.get("managed_by").cloned())
    }

    pub fn custom_metadata(&self, key: &str) -> BTreeMap<String, String> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.custom_metadata.clone())
            .unwrap_or_default()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "errors": [message] }))).into_response()
}

async fn handle(
    State(vault): State<FakeVault>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(&vault, method, &uri, &headers, &body)
}

fn respond(
    vault: &FakeVault,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let mut inner = vault.lock();
    inner.requests.push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        namespace: headers
            .get("x-vault-namespace")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    let token = headers
        .get("x-vault-token")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if token != inner.token {
        return error(StatusCode::FORBIDDEN, "permission denied");
    }
    if inner.fail_next > 0 {
        inner.fail_next -= 1;
        return error(StatusCode::SERVICE_UNAVAILABLE, "Vault is sealed");
    }

    let Some(rest) = uri.path().strip_prefix("/v1/") else {
        return error(StatusCode::NOT_FOUND, "no handler for route");
    };
    let mut parts = rest.splitn(3, '/');
    let (Some(mount), Some(kind), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        return error(StatusCode::NOT_FOUND, "no handler for route");
    };
    let key = format!("{mount}/{path}");

    match (method, kind) {
        (Method::POST, "encrypt") => {
            if inner.omit_ciphertext {
                return Json(json!({ "data": {} })).into_response();
            }
            let Some(plaintext) = body["plaintext"].as_str() else {
                return error(StatusCode::BAD_REQUEST, "missing plaintext");
            };
            inner.nonce += 1;
            let ciphertext = format!("vault:v1:{}:{plaintext}", inner.nonce);
            Json(json!({ "data": { "ciphertext": ciphertext, "key_version": 1 } })).into_response()
        }
        (Method::POST, "decrypt") => {
            let plaintext = body["ciphertext"]
                .as_str()
                .and_then(|ct| ct.strip_prefix("vault:v1:"))
                .and_then(|rest| rest.split_once(':'))
                .map(|(_, plaintext)| plaintext.to_string());
            match plaintext {
                Some(plaintext) => {
                    Json(json!({ "data": { "plaintext": plaintext } })).into_response()
                }
                None => error(StatusCode::BAD_REQUEST, "invalid ciphertext"),
            }
        }
        (Method::GET, "metadata") => match inner.entries.get(&key) {
            Some(entry) => {
                let versions: Map<String, Value> = (1..=entry.versions.len())
                    .map(|n| (n.to_string(), json!({ "destroyed": false })))
                    .collect();
                Json(json!({
                    "data": {
                        "custom_metadata": entry.custom_metadata,
                        "current_version": entry.versions.len(),
                        "versions": versions,
                    }
                }))
                .into_response()
            }
            None => error(StatusCode::NOT_FOUND, ""),
        },
        (Method::POST, "metadata") => {
            let custom: BTreeMap<String, String> =
                serde_json::from_value(body["custom_metadata"].clone()).unwrap_or_default();
            inner.entries.entry(key).or_default().custom_metadata = custom;
            StatusCode::NO_CONTENT.into_response()
        }
        (Method::DELETE, "metadata") => {
            inner.entries.remove(&key);
            StatusCode::NO_CONTENT.into_response()
        }
        (Method::GET, "data") => match inner.entries.get(&key) {
            Some(entry) if !entry.versions.is_empty() => {
                let data = entry
                    .versions
                    .last()
                    .cloned()
                    .flatten()
                    .map(Value::Object)
                    .unwrap_or(Value::Null);
                Json(json!({
                    "data": {
                        "data": data,
                        "metadata": { "version": entry.versions.len() }
                    }
                }))
                .into_response()
            }
            _ => error(StatusCode::NOT_FOUND, ""),
        },
        (Method::POST, "data") => {
            let data = body["data"].as_object().cloned().unwrap_or_default();
            let entry = inner.entries.entry(key).or_default();
            entry.versions.push(Some(data));
            Json(json!({ "data": { "version": entry.versions.len() } })).into_response()
        }
        _ => error(StatusCode::NOT_FOUND, "no handler for route"),
    }
}
