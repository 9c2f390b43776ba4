use crate::error::Result;
use crate::ownership::MANAGED_BY_KEY;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata stored alongside a versioned KV entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvMetadata {
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub current_version: u64,
    /// Known versions, oldest first.
    #[serde(default)]
    pub versions: Vec<u64>,
}

impl KvMetadata {
    pub fn managed_by(&self) -> Option<&str> {
        self.custom_metadata.get(MANAGED_BY_KEY).map(String::as_str)
    }
}

/// A configured client for a versioned key-value service.
///
/// `None` from the read methods is the "not found" condition.
pub trait KvApi: Send + Sync {
    fn read_metadata(&self, mount: &str, path: &str) -> Result<Option<KvMetadata>>;
    /// Replace the custom metadata of `path`.
    fn write_metadata(
        &self,
        mount: &str,
        path: &str,
        custom_metadata: &BTreeMap<String, String>,
    ) -> Result<()>;
    fn read_data(&self, mount: &str, path: &str) -> Result<Option<Map<String, Value>>>;
    /// Write a new current version, returning its number.
    fn write_data(&self, mount: &str, path: &str, data: &Map<String, Value>) -> Result<u64>;
    /// Remove metadata and every version of `path`.
    fn delete_metadata(&self, mount: &str, path: &str) -> Result<()>;
}

impl<T> KvApi for Arc<T>
where
    T: KvApi + ?Sized,
{
    fn read_metadata(&self, mount: &str, path: &str) -> Result<Option<KvMetadata>> {
        (**self).read_metadata(mount, path)
    }

    fn write_metadata(
        &self,
        mount: &str,
        path: &str,
        custom_metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        (**self).write_metadata(mount, path, custom_metadata)
    }

    fn read_data(&self, mount: &str, path: &str) -> Result<Option<Map<String, Value>>> {
        (**self).read_data(mount, path)
    }

    fn write_data(&self, mount: &str, path: &str, data: &Map<String, Value>) -> Result<u64> {
        (**self).write_data(mount, path, data)
    }

    fn delete_metadata(&self, mount: &str, path: &str) -> Result<()> {
        (**self).delete_metadata(mount, path)
    }
}

impl<T> KvApi for Box<T>
where
    T: KvApi + ?Sized,
{
    fn read_metadata(&self, mount: &str, path: &str) -> Result<Option<KvMetadata>> {
        (**self).read_metadata(mount, path)
    }

    fn write_metadata(
        &self,
        mount: &str,
        path: &str,
        custom_metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        (**self).write_metadata(mount, path, custom_metadata)
    }

    fn read_data(&self, mount: &str, path: &str) -> Result<Option<Map<String, Value>>> {
        (**self).read_data(mount, path)
    }

    fn write_data(&self, mount: &str, path: &str, data: &Map<String, Value>) -> Result<u64> {
        (**self).write_data(mount, path, data)
    }

    fn delete_metadata(&self, mount: &str, path: &str) -> Result<()> {
        (**self).delete_metadata(mount, path)
    }
}
