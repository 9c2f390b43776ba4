//! Reconciles declared ciphertext maps with live plaintext in a managed KV store.
//!
//! Writes decrypt every declared ciphertext and replace the remote map in one
//! `put`. Reads diff the live plaintext against the decrypted cache and only
//! re-encrypt values that changed, so an untouched secret keeps its exact
//! ciphertext across reads even when the transit key is non-deterministic.

use crate::store::ManagedStore;
use serde_json::{Map, Value};
use tracing::{debug, info};
use vaultsync_spec::{
    Cipher, CiphertextMap, KvApi, PlaintextMap, Result, SecretLifecycle, SecretRecord,
    coerce_plaintext,
};

/// Outcome of a read: the new cache plus what moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub secrets: CiphertextMap,
    /// Keys whose live value was new or differed from the cache.
    pub changed: Vec<String>,
    /// Cached keys no longer present remotely.
    pub removed: Vec<String>,
}

impl Reconciliation {
    pub fn has_drift(&self) -> bool {
        !self.changed.is_empty() || !self.removed.is_empty()
    }
}

pub struct ReconciliationEngine<C, K> {
    cipher: C,
    store: ManagedStore<K>,
}

impl<C: Cipher, K: KvApi> ReconciliationEngine<C, K> {
    pub fn new(cipher: C, store: ManagedStore<K>) -> Self {
        Self { cipher, store }
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    pub fn store(&self) -> &ManagedStore<K> {
        &self.store
    }

    /// Decrypt every entry, stopping at the first failure.
    fn decrypt_all(&self, ciphertexts: &CiphertextMap) -> Result<PlaintextMap> {
        ciphertexts
            .iter()
            .map(|(key, ciphertext)| {
                self.cipher
                    .decrypt(ciphertext)
                    .map(|plaintext| (key.clone(), plaintext))
                    .map_err(|err| err.for_key(key))
            })
            .collect()
    }

    fn apply(&self, path: &str, declared: &CiphertextMap) -> Result<CiphertextMap> {
        debug!(path, keys = declared.len(), "decrypting declared secrets");
        let plaintext = self.decrypt_all(declared)?;
        let value: Map<String, Value> = plaintext
            .into_iter()
            .map(|(key, plaintext)| (key, Value::String(plaintext)))
            .collect();
        let version = self.store.put(path, &value)?;
        info!(path, keys = declared.len(), version, "secret written");
        Ok(declared.clone())
    }

    /// Run the checks `create` makes before writing, without writing: every
    /// declared ciphertext decrypts and `path` is fresh or already ours.
    pub fn check_write(&self, path: &str, declared: &CiphertextMap) -> Result<()> {
        self.decrypt_all(declared)?;
        self.store.check_owner(path)?;
        Ok(())
    }

    /// Rebuild the ciphertext cache for `path` from its live plaintext.
    pub fn reconcile(&self, path: &str, cached: &CiphertextMap) -> Result<Reconciliation> {
        let cached_plaintext = self.decrypt_all(cached)?;
        let live = self.store.get(path)?;

        let mut report = Reconciliation::default();
        for (key, value) in &live {
            let unchanged = match (cached_plaintext.get(key), value) {
                (Some(previous), Value::String(current)) => previous == current,
                _ => false,
            };
            let ciphertext = match cached.get(key) {
                Some(ciphertext) if unchanged => ciphertext.clone(),
                _ => {
                    let plaintext = coerce_plaintext(key, value)?;
                    report.changed.push(key.clone());
                    self.cipher
                        .encrypt(plaintext)
                        .map_err(|err| err.for_key(key))?
                }
            };
            report.secrets.insert(key.clone(), ciphertext);
        }
        report.removed = cached
            .keys()
            .filter(|key| !live.contains_key(*key))
            .cloned()
            .collect();

        info!(
            path,
            keys = report.secrets.len(),
            changed = report.changed.len(),
            removed = report.removed.len(),
            "secret reconciled"
        );
        Ok(report)
    }
}

impl<C: Cipher, K: KvApi> SecretLifecycle for ReconciliationEngine<C, K> {
    fn create(&self, path: &str, declared: &CiphertextMap) -> Result<CiphertextMap> {
        self.apply(path, declared)
    }

    fn read(&self, path: &str, cached: &CiphertextMap) -> Result<CiphertextMap> {
        self.reconcile(path, cached).map(|report| report.secrets)
    }

    fn update(&self, path: &str, declared: &CiphertextMap) -> Result<CiphertextMap> {
        self.apply(path, declared)
    }

    fn destroy(&self, path: &str) -> Result<()> {
        self.store.destroy(path)?;
        info!(path, "secret destroyed");
        Ok(())
    }

    fn import(&self, path: &str) -> Result<SecretRecord> {
        self.store.overwrite_ownership_tag(path)?;
        info!(path, managed_by = %self.store.managed_by(), "secret imported");
        Ok(SecretRecord::claimed(path))
    }
}
