use crate::client::VaultClient;
use reqwest::Method;
use serde_json::{Map, Value};
use std::sync::Arc;
use vaultsync_spec::{Error, Result, TransitApi};

/// Transit secrets engine reached over the Vault HTTP API.
#[derive(Clone, Debug)]
pub struct VaultTransit {
    client: Arc<VaultClient>,
}

impl VaultTransit {
    pub fn new(client: Arc<VaultClient>) -> Self {
        Self { client }
    }
}

impl TransitApi for VaultTransit {
    fn write(&self, path: &str, body: Map<String, Value>) -> Result<Map<String, Value>> {
        let api_path = format!("v1/{}", path.trim_start_matches('/'));
        let response = self
            .client
            .call(Method::POST, &api_path, Some(&Value::Object(body)))?
            .ok_or_else(|| Error::transport(format!("POST {api_path} failed: 404 Not Found")))?;
        Ok(response
            .get("data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default())
    }
}
