//! In-process transit and KV v2 backends.
//!
//! Both mirror the request shapes of the real services closely enough to
//! drive [`CryptoService`](crate::CryptoService) and
//! [`ManagedStore`](crate::ManagedStore) without a server. Clones share state,
//! so a test can keep a handle to inspect or mutate the "remote" side.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use vaultsync_spec::{Error, KvApi, KvMetadata, Result, TransitApi};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Transport("in-memory backend lock poisoned".into()))
}

#[derive(Default)]
struct KvEntry {
    custom_metadata: BTreeMap<String, String>,
    versions: Vec<Map<String, Value>>,
}

#[derive(Default)]
struct KvState {
    entries: HashMap<(String, String), KvEntry>,
    calls: Vec<String>,
}

/// Versioned KV store keyed by `(mount, path)`.
#[derive(Clone, Default)]
pub struct MemoryKv {
    state: Arc<Mutex<KvState>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry directly, bypassing the call log.
    pub fn seed(
        &self,
        mount: &str,
        path: &str,
        data: Map<String, Value>,
        custom_metadata: BTreeMap<String, String>,
    ) {
        if let Ok(mut state) = lock(&self.state) {
            let entry = state
                .entries
                .entry((mount.to_string(), path.to_string()))
                .or_default();
            entry.custom_metadata = custom_metadata;
            entry.versions.push(data);
        }
    }

    /// Operations performed through [`KvApi`], as `"<op> <mount>/<path>"`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state)
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = lock(&self.state) {
            state.calls.clear();
        }
    }

    fn record(state: &mut KvState, op: &str, mount: &str, path: &str) {
        state.calls.push(format!("{op} {mount}/{path}"));
    }
}

impl KvApi for MemoryKv {
    fn read_metadata(&self, mount: &str, path: &str) -> Result<Option<KvMetadata>> {
        let mut state = lock(&self.state)?;
        Self::record(&mut state, "read_metadata", mount, path);
        Ok(state
            .entries
            .get(&(mount.to_string(), path.to_string()))
            .map(|entry| KvMetadata {
                custom_metadata: entry.custom_metadata.clone(),
                current_version: entry.versions.len() as u64,
                versions: (1..=entry.versions.len() as u64).collect(),
            }))
    }

    fn write_metadata(
        &self,
        mount: &str,
        path: &str,
        custom_metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = lock(&self.state)?;
        Self::record(&mut state, "write_metadata", mount, path);
        state
            .entries
            .entry((mount.to_string(), path.to_string()))
            .or_default()
            .custom_metadata = custom_metadata.clone();
        Ok(())
    }

    fn read_data(&self, mount: &str, path: &str) -> Result<Option<Map<String, Value>>> {
        let mut state = lock(&self.state)?;
        Self::record(&mut state, "read_data", mount, path);
        Ok(state
            .entries
            .get(&(mount.to_string(), path.to_string()))
            .and_then(|entry| entry.versions.last().cloned()))
    }

    fn write_data(&self, mount: &str, path: &str, data: &Map<String, Value>) -> Result<u64> {
        let mut state = lock(&self.state)?;
        Self::record(&mut state, "write_data", mount, path);
        let entry = state
            .entries
            .entry((mount.to_string(), path.to_string()))
            .or_default();
        entry.versions.push(data.clone());
        Ok(entry.versions.len() as u64)
    }

    fn delete_metadata(&self, mount: &str, path: &str) -> Result<()> {
        let mut state = lock(&self.state)?;
        Self::record(&mut state, "delete_metadata", mount, path);
        state.entries.remove(&(mount.to_string(), path.to_string()));
        Ok(())
    }
}

const CIPHERTEXT_PREFIX: &str = "vault:v1:";

/// Transit stand-in producing `vault:v1:` ciphertexts.
///
/// Every encryption embeds a fresh nonce, so equal plaintexts never yield
/// equal ciphertexts, matching a non-deterministic transit key.
#[derive(Clone, Default)]
pub struct MemoryTransit {
    nonce: Arc<AtomicU64>,
    encrypts: Arc<AtomicUsize>,
    decrypts: Arc<AtomicUsize>,
}

impl MemoryTransit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.encrypts.store(0, Ordering::SeqCst);
        self.decrypts.store(0, Ordering::SeqCst);
    }

    fn seal(&self, encoded_plaintext: &str) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let inner = format!("{nonce}:{encoded_plaintext}");
        format!("{CIPHERTEXT_PREFIX}{}", STANDARD.encode(inner))
    }

    fn open(ciphertext: &str) -> Result<String> {
        let invalid = || Error::Transport("transit: invalid ciphertext".into());
        let body = ciphertext.strip_prefix(CIPHERTEXT_PREFIX).ok_or_else(invalid)?;
        let inner = STANDARD.decode(body).map_err(|_| invalid())?;
        let inner = String::from_utf8(inner).map_err(|_| invalid())?;
        let (_, encoded) = inner.split_once(':').ok_or_else(invalid)?;
        Ok(encoded.to_string())
    }
}

impl TransitApi for MemoryTransit {
    fn write(&self, path: &str, body: Map<String, Value>) -> Result<Map<String, Value>> {
        let operation = path.split('/').rev().nth(1).unwrap_or_default();
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Transport(format!("transit: missing {name}")))
        };
        let mut response = Map::new();
        match operation {
            "encrypt" => {
                self.encrypts.fetch_add(1, Ordering::SeqCst);
                let sealed = self.seal(&field("plaintext")?);
                response.insert("ciphertext".into(), Value::String(sealed));
            }
            "decrypt" => {
                self.decrypts.fetch_add(1, Ordering::SeqCst);
                let opened = Self::open(&field("ciphertext")?)?;
                response.insert("plaintext".into(), Value::String(opened));
            }
            other => {
                return Err(Error::Transport(format!(
                    "transit: unsupported operation {other:?}"
                )));
            }
        }
        Ok(response)
    }
}
