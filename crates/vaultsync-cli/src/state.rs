use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use vaultsync_spec::SecretRecord;

/// Records the CLI manages, keyed by KV path.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateFile {
    records: BTreeMap<String, SecretRecord>,
}

impl StateFile {
    /// Load `path`, or start empty if it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read state {}", path.display()))?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&data).with_context(|| format!("invalid state {}", path.display()))
    }

    /// Write through a sibling temp file so a crash never leaves half a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp = tmp_path(path);
        let data = serde_json::to_string_pretty(&self.records)?;
        fs::write(&tmp, data).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace state {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&SecretRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    pub fn upsert(&mut self, record: SecretRecord) {
        self.records.insert(record.path.clone(), record);
    }

    pub fn remove(&mut self, path: &str) -> Option<SecretRecord> {
        self.records.remove(path)
    }

    pub fn records(&self) -> impl Iterator<Item = &SecretRecord> {
        self.records.values()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "vaultsync-state".into());
    name.push(".tmp");
    path.with_file_name(name)
}
