//! HashiCorp Vault backends for vaultsync.
//!
//! Transit and KV v2 may live on different Vault servers, so each gets its own
//! [`VaultClient`] with its own token (static or via TLS certificate login),
//! namespace and TLS trust. Both are wrapped in the configured retry policy.

pub mod client;
pub mod config;
pub mod kv;
pub mod transit;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use vaultsync_core::{CryptoService, ManagedStore, ReconciliationEngine, Retrying};

pub use client::VaultClient;
pub use config::{CertLoginConfig, ProviderConfig, RetryConfig, VaultEndpointConfig};
pub use kv::VaultKv;
pub use transit::VaultTransit;

/// Engine wired to live Vault servers.
pub type VaultEngine =
    ReconciliationEngine<CryptoService<Retrying<VaultTransit>>, Retrying<VaultKv>>;

/// Connect both Vault clients and assemble the reconciliation engine.
pub fn build_engine(config: &ProviderConfig) -> Result<VaultEngine> {
    for warning in config.warnings() {
        warn!("{warning}");
    }
    let policy = config.retry.policy();

    let transit_client = VaultClient::connect(&config.transit_vault)
        .context("failed to setup transit vault client")?;
    let kv_client =
        VaultClient::connect(&config.kv_vault).context("failed to setup KV vault client")?;
    info!(
        transit = %transit_client.addr(),
        kv = %kv_client.addr(),
        managed_by = %config.managed_by,
        "vault clients ready"
    );

    let transit = Retrying::new(VaultTransit::new(Arc::new(transit_client)), policy);
    let kv = Retrying::new(VaultKv::new(Arc::new(kv_client)), policy);
    Ok(ReconciliationEngine::new(
        CryptoService::new(transit, &config.transit_path, &config.transit_key),
        ManagedStore::new(kv, &config.kv_path, &config.managed_by),
    ))
}
