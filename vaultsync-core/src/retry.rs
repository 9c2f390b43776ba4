//! Retry decorator for the transit and KV capabilities.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;
use vaultsync_spec::{KvApi, KvMetadata, Result, TransitApi};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    /// Delay after attempt `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub const fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Pause after failed attempt `attempt`, saturating instead of overflowing.
    pub fn delay(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
        self.backoff.checked_mul(factor).unwrap_or(Duration::MAX)
    }

    /// Run `op`, retrying transport failures with linear backoff.
    pub fn run<T>(&self, operation: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() || attempt >= self.max_attempts => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(operation, attempt, error = %err, "retrying after transport failure");
                    std::thread::sleep(self.delay(attempt));
                }
            }
        }
    }
}

/// Wraps a capability so every call goes through a [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> Retrying<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

impl<T: TransitApi> TransitApi for Retrying<T> {
    fn write(&self, path: &str, body: Map<String, Value>) -> Result<Map<String, Value>> {
        self.policy
            .run("transit write", || self.inner.write(path, body.clone()))
    }
}

impl<T: KvApi> KvApi for Retrying<T> {
    fn read_metadata(&self, mount: &str, path: &str) -> Result<Option<KvMetadata>> {
        self.policy
            .run("kv read metadata", || self.inner.read_metadata(mount, path))
    }

    fn write_metadata(
        &self,
        mount: &str,
        path: &str,
        custom_metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.policy.run("kv write metadata", || {
            self.inner.write_metadata(mount, path, custom_metadata)
        })
    }

    fn read_data(&self, mount: &str, path: &str) -> Result<Option<Map<String, Value>>> {
        self.policy
            .run("kv read data", || self.inner.read_data(mount, path))
    }

    fn write_data(&self, mount: &str, path: &str, data: &Map<String, Value>) -> Result<u64> {
        self.policy
            .run("kv write data", || self.inner.write_data(mount, path, data))
    }

    fn delete_metadata(&self, mount: &str, path: &str) -> Result<()> {
        self.policy
            .run("kv delete metadata", || self.inner.delete_metadata(mount, path))
    }
}
