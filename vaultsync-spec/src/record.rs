use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical key → ciphertext, as declared by an operator or cached in state.
pub type CiphertextMap = BTreeMap<String, String>;

/// Logical key → decrypted plaintext.
pub type PlaintextMap = BTreeMap<String, String>;

/// Persisted representation of one managed secret path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub path: String,
    #[serde(default)]
    pub encrypted_secrets: CiphertextMap,
}

impl SecretRecord {
    pub fn new(path: impl Into<String>, encrypted_secrets: CiphertextMap) -> Self {
        Self {
            path: path.into(),
            encrypted_secrets,
        }
    }

    /// A freshly claimed record with nothing cached yet.
    pub fn claimed(path: impl Into<String>) -> Self {
        Self::new(path, CiphertextMap::new())
    }
}

/// The path is immutable; moving a record means destroying and recreating it.
pub fn requires_replacement(prior: &SecretRecord, desired: &SecretRecord) -> bool {
    prior.path != desired.path
}
