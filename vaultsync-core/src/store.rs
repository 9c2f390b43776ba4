//! Ownership-guarded access to a versioned KV mount.
//!
//! Every mutation of an existing entry first checks its `managed_by` custom
//! metadata against our identity. Fresh keys are claimed (tag written) before
//! their data lands, so a failure between the two writes leaves the key
//! claimed but empty rather than populated but unclaimed.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use vaultsync_spec::ownership::{self, OwnershipDecision};
use vaultsync_spec::{Error, KvApi, KvMetadata, MANAGED_BY_KEY, Result};

#[derive(Clone, Debug)]
pub struct ManagedStore<K> {
    api: K,
    mount: String,
    managed_by: String,
}

impl<K: KvApi> ManagedStore<K> {
    pub fn new(api: K, mount: impl Into<String>, managed_by: impl Into<String>) -> Self {
        Self {
            api,
            mount: mount.into().trim_matches('/').to_string(),
            managed_by: managed_by.into(),
        }
    }

    pub fn managed_by(&self) -> &str {
        &self.managed_by
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn api(&self) -> &K {
        &self.api
    }

    /// Metadata for `key`, or `NotFound`.
    pub fn metadata(&self, key: &str) -> Result<KvMetadata> {
        let key = normalize_key(key)?;
        self.api
            .read_metadata(&self.mount, key)?
            .ok_or_else(|| Error::not_found(self.entity(key)))
    }

    /// Current plaintext mapping for `key`, or `NotFound`.
    pub fn get(&self, key: &str) -> Result<Map<String, Value>> {
        let key = normalize_key(key)?;
        self.api
            .read_data(&self.mount, key)?
            .ok_or_else(|| Error::not_found(self.entity(key)))
    }

    /// Write `value` as the current version of `key`, claiming it if new.
    pub fn put(&self, key: &str, value: &Map<String, Value>) -> Result<u64> {
        let key = normalize_key(key)?;
        let existing = self.check_owner(key)?;
        self.claim(key, existing.as_ref())?;
        let version = self.api.write_data(&self.mount, key, value)?;
        debug!(
            mount = %self.mount,
            key,
            version,
            fields = value.len(),
            "kv value written"
        );
        Ok(version)
    }

    /// Metadata of `key` if it exists and is ours, `None` for a fresh key.
    pub fn check_owner(&self, key: &str) -> Result<Option<KvMetadata>> {
        let key = normalize_key(key)?;
        let existing = self.api.read_metadata(&self.mount, key)?;
        if let Some(meta) = &existing {
            ownership::evaluate(meta.managed_by(), &self.managed_by).into_result(key)?;
        }
        Ok(existing)
    }

    /// Set `managed_by` on `key` regardless of its current owner.
    pub fn overwrite_ownership_tag(&self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        let existing = self.api.read_metadata(&self.mount, key)?;
        if let Some(meta) = &existing {
            if let OwnershipDecision::Deny(reason) =
                ownership::evaluate(meta.managed_by(), &self.managed_by)
            {
                warn!(
                    mount = %self.mount,
                    key,
                    ?reason,
                    managed_by = %self.managed_by,
                    "taking over ownership tag"
                );
            }
        }
        self.claim(key, existing.as_ref())
    }

    /// Hard-delete `key`: metadata and every version.
    pub fn destroy(&self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        let meta = self
            .api
            .read_metadata(&self.mount, key)?
            .ok_or_else(|| Error::not_found(self.entity(key)))?;
        ownership::evaluate(meta.managed_by(), &self.managed_by).into_result(key)?;
        self.api.delete_metadata(&self.mount, key)?;
        debug!(mount = %self.mount, key, "kv metadata deleted");
        Ok(())
    }

    // Custom metadata is written back whole, so carry over the fields we don't own.
    fn claim(&self, key: &str, existing: Option<&KvMetadata>) -> Result<()> {
        let mut custom: BTreeMap<String, String> = existing
            .map(|meta| meta.custom_metadata.clone())
            .unwrap_or_default();
        custom.insert(MANAGED_BY_KEY.to_string(), self.managed_by.clone());
        self.api.write_metadata(&self.mount, key, &custom)?;
        debug!(mount = %self.mount, key, managed_by = %self.managed_by, "ownership tag written");
        Ok(())
    }

    fn entity(&self, key: &str) -> String {
        format!("{}/{key}", self.mount)
    }
}

fn normalize_key(key: &str) -> Result<&str> {
    let trimmed = key.trim_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Invalid("path".into(), "must not be empty".into()));
    }
    Ok(trimmed)
}
