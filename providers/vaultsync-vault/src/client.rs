use crate::config::{CertLoginConfig, VaultEndpointConfig};
use anyhow::{Context, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs;
use tracing::{debug, info};
use vaultsync_spec::{Error, Result};

/// Authenticated HTTP session with one Vault server.
#[derive(Clone, Debug)]
pub struct VaultClient {
    addr: String,
    token: String,
    namespace: Option<String>,
    http: Client,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

impl VaultClient {
    /// Build the HTTP client and resolve a token, logging in with the
    /// client certificate when one is configured.
    pub fn connect(config: &VaultEndpointConfig) -> anyhow::Result<Self> {
        let http = build_http_client(config)?;
        let mut client = Self {
            addr: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone().unwrap_or_default(),
            namespace: config.namespace.clone(),
            http,
        };
        if let Some(login) = &config.auth_login_cert {
            client.token = client.login_with_cert(login)?;
        }
        if client.token.is_empty() {
            bail!("no vault token available for {}", client.addr);
        }
        Ok(client)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn login_with_cert(&self, login: &CertLoginConfig) -> anyhow::Result<String> {
        let path = format!("v1/auth/{}/login", login.mount.trim_matches('/'));
        let mut request = self
            .http
            .post(self.url(&path))
            .json(&json!({ "name": login.name }));
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        let response = request
            .send()
            .with_context(|| format!("cert login against {} failed", self.addr))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("cert login failed: {status} {body}"));
        }
        let parsed: LoginResponse = serde_json::from_str(&body)
            .with_context(|| format!("failed to decode cert login response: {body}"))?;
        info!(addr = %self.addr, mount = %login.mount, "logged in with client certificate");
        Ok(parsed.auth.client_token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Send one request. `Ok(None)` means Vault answered 404; an empty
    /// success body comes back as `Value::Null`.
    pub fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        debug!(%method, path, "vault request");
        let mut builder = self
            .http
            .request(method.clone(), self.url(path))
            .header("X-Vault-Token", &self.token);
        if let Some(namespace) = &self.namespace {
            builder = builder.header("X-Vault-Namespace", namespace);
        }
        if let Some(payload) = body {
            builder = builder.json(payload);
        }
        let response = builder
            .send()
            .map_err(|err| Error::transport(format!("vault request failed: {err}")))?;

        let status = response.status();
        let text = response.text().unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                if text.trim().is_empty() {
                    return Ok(Some(Value::Null));
                }
                serde_json::from_str(&text).map(Some).map_err(|err| {
                    Error::transport(format!(
                        "failed to decode vault response for {path}: {err}; body={text}"
                    ))
                })
            }
            status => Err(Error::transport(format!(
                "{method} {path} failed: {status} {}",
                text.trim()
            ))),
        }
    }
}

fn build_http_client(config: &VaultEndpointConfig) -> anyhow::Result<Client> {
    let mut builder = Client::builder().timeout(config.timeout());
    if let Some(path) = &config.ca_cert_file {
        let ca = fs::read(path)
            .with_context(|| format!("failed to read ca_cert_file {}", path.display()))?;
        let cert = reqwest::Certificate::from_pem(&ca)
            .or_else(|_| reqwest::Certificate::from_der(&ca))
            .with_context(|| format!("failed to parse ca_cert_file {}", path.display()))?;
        builder = builder.add_root_certificate(cert);
    }
    if let Some(login) = &config.auth_login_cert {
        let mut pem = fs::read(&login.cert_file)
            .with_context(|| format!("failed to read cert_file {}", login.cert_file.display()))?;
        let key = fs::read(&login.key_file)
            .with_context(|| format!("failed to read key_file {}", login.key_file.display()))?;
        pem.push(b'\n');
        pem.extend_from_slice(&key);
        let identity = reqwest::Identity::from_pem(&pem)
            .context("failed to parse client certificate and key")?;
        builder = builder.identity(identity);
    }
    if config.insecure_skip_tls {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build().context("failed to build Vault HTTP client")
}
