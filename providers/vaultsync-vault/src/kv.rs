//! KV version 2 engine over the Vault HTTP API.
//!
//! Metadata lives at `v1/{mount}/metadata/{path}` and versions at
//! `v1/{mount}/data/{path}`. A data read whose `data` is null (deleted or
//! destroyed current version) counts as absent.

use crate::client::VaultClient;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use vaultsync_spec::{Error, KvApi, KvMetadata, Result};

#[derive(Clone, Debug)]
pub struct VaultKv {
    client: Arc<VaultClient>,
}

impl VaultKv {
    pub fn new(client: Arc<VaultClient>) -> Self {
        Self { client }
    }

    fn api_path(kind: &str, mount: &str, path: &str) -> String {
        format!(
            "v1/{mount}/{kind}/{path}",
            mount = mount.trim_matches('/'),
            path = path.trim_matches('/')
        )
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct MetadataData {
    #[serde(default)]
    custom_metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    current_version: u64,
    #[serde(default)]
    versions: Option<BTreeMap<u64, Value>>, // serde understands numeric keys
}

#[derive(Deserialize)]
struct DataData {
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct WriteData {
    version: u64,
}

fn decode<T: for<'de> Deserialize<'de>>(what: &str, body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|err| Error::transport(format!("failed to decode vault {what} response: {err}")))
}

impl KvApi for VaultKv {
    fn read_metadata(&self, mount: &str, path: &str) -> Result<Option<KvMetadata>> {
        let api_path = Self::api_path("metadata", mount, path);
        let Some(body) = self.client.call(Method::GET, &api_path, None)? else {
            return Ok(None);
        };
        let parsed: Envelope<MetadataData> = decode("metadata", body)?;
        Ok(Some(KvMetadata {
            custom_metadata: parsed.data.custom_metadata.unwrap_or_default(),
            current_version: parsed.data.current_version,
            versions: parsed
                .data
                .versions
                .map(|versions| versions.into_keys().collect())
                .unwrap_or_default(),
        }))
    }

    fn write_metadata(
        &self,
        mount: &str,
        path: &str,
        custom_metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api_path = Self::api_path("metadata", mount, path);
        let body = json!({ "custom_metadata": custom_metadata });
        self.client
            .call(Method::POST, &api_path, Some(&body))?
            .ok_or_else(|| Error::transport(format!("POST {api_path} failed: 404 Not Found")))?;
        Ok(())
    }

    fn read_data(&self, mount: &str, path: &str) -> Result<Option<Map<String, Value>>> {
        let api_path = Self::api_path("data", mount, path);
        let Some(body) = self.client.call(Method::GET, &api_path, None)? else {
            return Ok(None);
        };
        let parsed: Envelope<DataData> = decode("data", body)?;
        Ok(parsed.data.data)
    }

    fn write_data(&self, mount: &str, path: &str, data: &Map<String, Value>) -> Result<u64> {
        let api_path = Self::api_path("data", mount, path);
        let body = json!({ "data": data });
        let response = self
            .client
            .call(Method::POST, &api_path, Some(&body))?
            .ok_or_else(|| Error::transport(format!("POST {api_path} failed: 404 Not Found")))?;
        let parsed: Envelope<WriteData> = decode("write", response)?;
        Ok(parsed.data.version)
    }

    fn delete_metadata(&self, mount: &str, path: &str) -> Result<()> {
        let api_path = Self::api_path("metadata", mount, path);
        // 404 means there is nothing left to delete.
        self.client.call(Method::DELETE, &api_path, None)?;
        Ok(())
    }
}
