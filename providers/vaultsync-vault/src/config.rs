use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vaultsync_core::RetryPolicy;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MAX_BACKOFF_MS: u64 = 60_000;

pub const TRANSIT_TOKEN_ENV: &str = "VAULTSYNC_TRANSIT_TOKEN";
pub const KV_TOKEN_ENV: &str = "VAULTSYNC_KV_TOKEN";
pub const MANAGED_BY_ENV: &str = "VAULTSYNC_MANAGED_BY";

/// Connection settings for one Vault server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEndpointConfig {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// PEM or DER bundle trusted in addition to the system roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub insecure_skip_tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_login_cert: Option<CertLoginConfig>,
}

/// TLS certificate auth method login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertLoginConfig {
    /// Name of the auth engine mount.
    pub mount: String,
    /// Certificate role to authenticate against.
    pub name: String,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default)]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

/// Everything needed to wire the transit and KV backends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub transit_vault: VaultEndpointConfig,
    pub kv_vault: VaultEndpointConfig,
    /// Transit engine mount, e.g. `transit`.
    pub transit_path: String,
    pub transit_key: String,
    /// KV v2 engine mount, e.g. `secret`.
    pub kv_path: String,
    /// Identity written to and required in `managed_by`.
    pub managed_by: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_attempts() -> usize {
    1
}

impl VaultEndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            bail!("{section}.endpoint must not be empty");
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            bail!("{section}.endpoint must be an http(s) URL: {}", self.endpoint);
        }
        if self.timeout_secs == 0 {
            bail!("{section}.timeout_secs must be greater than zero");
        }
        let has_token = self.token.as_deref().is_some_and(|t| !t.is_empty());
        if !has_token && self.auth_login_cert.is_none() {
            bail!("{section} needs a token or auth_login_cert");
        }
        Ok(())
    }
}

impl ProviderConfig {
    /// Read a TOML (or `.json`) file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::parse(&data, path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(data: &str, path: &Path) -> Result<Self> {
        if path.extension().map(|ext| ext == "json").unwrap_or(false) {
            serde_json::from_str(data)
                .with_context(|| format!("invalid json config {}", path.display()))
        } else {
            toml::from_str(data).with_context(|| format!("invalid toml config {}", path.display()))
        }
    }

    /// Tokens and identity may come from the environment instead of the file.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TRANSIT_TOKEN_ENV) {
            self.transit_vault.token = Some(token);
        }
        if let Ok(token) = std::env::var(KV_TOKEN_ENV) {
            self.kv_vault.token = Some(token);
        }
        if let Ok(managed_by) = std::env::var(MANAGED_BY_ENV) {
            self.managed_by = managed_by;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.transit_vault.validate("transit_vault")?;
        self.kv_vault.validate("kv_vault")?;
        for (field, value) in [
            ("transit_path", &self.transit_path),
            ("transit_key", &self.transit_key),
            ("kv_path", &self.kv_path),
            ("managed_by", &self.managed_by),
        ] {
            if value.trim_matches('/').trim().is_empty() {
                bail!("{field} must not be empty");
            }
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.backoff_ms > MAX_BACKOFF_MS {
            bail!("retry.backoff_ms must be at most {MAX_BACKOFF_MS}");
        }
        Ok(())
    }

    /// Non-fatal findings worth surfacing to the operator.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let endpoints = [
            ("transit_vault", &self.transit_vault),
            ("kv_vault", &self.kv_vault),
        ];
        for (section, endpoint) in endpoints {
            if endpoint.insecure_skip_tls {
                warnings.push(format!("{section}.insecure_skip_tls is enabled"));
            }
            if endpoint.endpoint.starts_with("http://") {
                warnings.push(format!("{section}.endpoint is not using TLS"));
            }
            if endpoint.token.is_some() && endpoint.auth_login_cert.is_some() {
                warnings.push(format!(
                    "{section} has both token and auth_login_cert; the cert login token wins"
                ));
            }
        }
        warnings
    }
}
