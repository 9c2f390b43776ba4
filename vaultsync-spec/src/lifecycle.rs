use crate::error::Result;
use crate::record::{CiphertextMap, SecretRecord};

/// The five lifecycle events an orchestrator drives for one secret record.
pub trait SecretLifecycle {
    /// Decrypt `declared` and write it to `path`, claiming the entry.
    fn create(&self, path: &str, declared: &CiphertextMap) -> Result<CiphertextMap>;
    /// Re-derive the cached ciphertexts of `path` from the live plaintext.
    fn read(&self, path: &str, cached: &CiphertextMap) -> Result<CiphertextMap>;
    /// Replace the whole plaintext map at `path`.
    fn update(&self, path: &str, declared: &CiphertextMap) -> Result<CiphertextMap>;
    fn destroy(&self, path: &str) -> Result<()>;
    /// Adopt an existing entry without touching its data.
    fn import(&self, path: &str) -> Result<SecretRecord>;
}
